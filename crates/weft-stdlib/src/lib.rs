//! Native module library for the Weft runtime.
//!
//! Modules here are optional: a host registers the ones it wants with
//! [`Context::add_module`](weft_vm::Context::add_module). The `sys` module
//! is not in this crate — every context carries it from birth.

mod math;

pub use math::MathModule;
