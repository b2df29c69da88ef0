//! Host driver for the Weft runtime.
//!
//! Wires the VM core and the native module library together for embedders
//! and the CLI: building a standard context, running compiled function
//! images, and saving/resuming whole-context snapshots.
//!
//! The compiler that turns source text into bytecode is a separate tool;
//! hosts consume its output as serialized `Function` values ("function
//! images") or whole-context snapshots.

use thiserror::Error;

pub use weft_stdlib::MathModule;
pub use weft_vm::{
    Context, FunctionObj, Instr, ObjId, SnapshotError, ThreadState, Value, VmConfig, VmError,
};

/// Errors surfaced by the host layer.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("vm error: {0}")]
    Vm(#[from] VmError),
    #[error("image does not contain a function")]
    NotAFunction,
}

/// A context with the standard module set: `sys` (implicit) plus `math`.
pub fn standard_context() -> Context {
    let mut ctx = Context::new();
    ctx.add_module(Box::new(MathModule::new()));
    ctx
}

/// Drive rounds until no thread is Running: each round is one scheduling
/// pass followed by a full collection cycle. Suspended threads do not keep
/// the loop alive; this is an all-work-exhausted signal.
pub fn run_rounds(ctx: &mut Context, timeout: i64) -> Result<(), VmError> {
    while ctx.count_running_threads() > 0 {
        ctx.round_robin(timeout)?;
        ctx.collect();
    }
    Ok(())
}

/// Drive at most `rounds` rounds (stopping early once nothing is Running).
/// Returns the number of rounds actually driven.
pub fn run_bounded(ctx: &mut Context, rounds: usize, timeout: i64) -> Result<usize, VmError> {
    for round in 0..rounds {
        if ctx.count_running_threads() == 0 {
            return Ok(round);
        }
        ctx.round_robin(timeout)?;
        ctx.collect();
    }
    Ok(rounds)
}

/// Load a function image, spin a thread on it and run to completion.
/// Returns the main thread's result.
pub fn run_function_image(ctx: &mut Context, image: &[u8]) -> Result<Value, HostError> {
    let main = ctx.load_value_bytes(image)?;
    if !matches!(main, Value::Function(_)) {
        return Err(HostError::NotAFunction);
    }
    let tid = ctx.new_thread();
    // Pin the main thread: once it finishes it is unreachable, and the
    // between-round collection cycles would reap it before the result is
    // read back.
    ctx.heap_mut().lock(tid);
    ctx.init_thread(tid, main, &[], Value::Null)?;
    run_rounds(ctx, -1)?;
    let result = ctx.thread_result(tid);
    ctx.heap_mut().unlock(tid);
    Ok(result)
}

/// Restore a context snapshot and run it to completion.
pub fn resume_snapshot(ctx: &mut Context, snapshot: &[u8]) -> Result<(), HostError> {
    ctx.load_snapshot(snapshot)?;
    run_rounds(ctx, -1)?;
    Ok(())
}
