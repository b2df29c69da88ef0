//! Weft virtual machine core.
//!
//! The runtime for a small dynamically typed scripting language: a bytecode
//! VM with tagged heap values, cooperative green threads, a mark-and-sweep
//! garbage collector and a whole-process snapshot facility.
//!
//! # Architecture
//!
//! - [`Value`]: primitive payloads or heap handles; cheap kind recovery.
//! - [`Heap`]: the object arena, both GC lists, and kind dispatch.
//! - [`Context`]: the single owner — root table, threads, modules, GC.
//! - Green threads execute bytecode in bounded slices; the scheduler is a
//!   plain round-robin over the registration order.
//! - Snapshots serialize the entire object graph with back-references, so
//!   shared and cyclic structures restore identically, including suspended
//!   thread state.
//!
//! The compiler that produces [`FunctionObj`] bytecode is an external
//! collaborator; hosts load compiled images through the snapshot layer.
//!
//! # Example
//!
//! ```
//! use weft_vm::{Context, FunctionObj, Instr, Value};
//!
//! let mut ctx = Context::new();
//! let func = ctx.heap_mut().new_function(FunctionObj::new(
//!     0,
//!     vec![Instr::PushInt(2), Instr::PushInt(3), Instr::Add, Instr::Ret],
//!     Vec::new(),
//! ));
//! let tid = ctx.new_thread();
//! ctx.init_thread(tid, func, &[], Value::Null).unwrap();
//! while ctx.count_running_threads() > 0 {
//!     ctx.round_robin(-1).unwrap();
//! }
//! assert_eq!(ctx.thread_result(tid), Value::Int(5));
//! ctx.collect();
//! ctx.clear();
//! ```

mod array;
mod bytecode;
mod config;
mod context;
mod error;
mod exec;
mod function;
mod heap;
mod module;
mod object;
mod serial;
mod string;
mod sys;
mod table;
mod thread;
mod value;

pub use array::ArrayObj;
pub use bytecode::{op, Instr};
pub use config::VmConfig;
pub use context::Context;
pub use error::VmError;
pub use function::FunctionObj;
pub use heap::{GcHeader, Heap, ObjId};
pub use module::{Module, ModuleEntry, NativeArgs, NativeFn, UserDataHandler};
pub use object::{ExtFuncObj, Object, UserDataObj};
pub use serial::{load_value, save_value, SnapshotError, SnapshotReader, SnapshotWriter, STACKREF};
pub use string::StrObj;
pub use sys::SysModule;
pub use table::{TableEntry, TableObj};
pub use thread::{CallFrame, ThreadObj, ThreadState};
pub use value::Value;
