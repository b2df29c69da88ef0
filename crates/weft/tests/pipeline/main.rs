//! End-to-end runtime scenarios.
//!
//! These tests drive the whole stack the way a host does: build a compiled
//! function (standing in for the external compiler), spin threads on it,
//! and loop scheduling rounds with full GC cycles in between. Script output
//! is captured through the context's output sink.

use std::io::Write;
use std::sync::{Arc, Mutex};

use weft::{standard_context, Context, FunctionObj, Instr, ObjId, Value};

mod arithmetic;
mod arrays;
mod gc;
mod runtime;
mod scheduler;
mod snapshot;

// ============================================================================
// Test helpers
// ============================================================================

/// A clonable output sink capturing everything the script prints.
#[derive(Clone, Default)]
pub struct SharedOut(Arc<Mutex<Vec<u8>>>);

impl SharedOut {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedOut {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A standard context with its output captured.
pub fn capture_context() -> (Context, SharedOut) {
    let out = SharedOut::default();
    let mut ctx = standard_context();
    ctx.set_output(Box::new(out.clone()));
    (ctx, out)
}

pub fn build_function(
    ctx: &mut Context,
    arity: u32,
    code: Vec<Instr>,
    constants: Vec<Value>,
) -> Value {
    ctx.heap_mut()
        .new_function(FunctionObj::new(arity, code, constants))
}

/// Create and initialize a thread calling `func` with no arguments.
pub fn spawn(ctx: &mut Context, func: Value) -> ObjId {
    let tid = ctx.new_thread();
    ctx.init_thread(tid, func, &[], Value::Null).unwrap();
    tid
}

/// Instruction sequence calling a root-table global: the callable and self
/// are pushed, then `arg_code` produces the arguments, then the call. The
/// call result is discarded.
pub fn call_global(name: &str, argc: i32, arg_code: Vec<Instr>) -> Vec<Instr> {
    let mut code = vec![
        Instr::PushRoot,
        Instr::PushStr(name.to_string()),
        Instr::TabGet,
        Instr::Push0,
    ];
    code.extend(arg_code);
    code.push(Instr::PushInt(argc));
    code.push(Instr::Mcall);
    code.push(Instr::Pop(1));
    code
}

/// Run rounds until all runnable work is exhausted, collecting after each.
pub fn drive(ctx: &mut Context) {
    while ctx.count_running_threads() > 0 {
        ctx.round_robin(-1).unwrap();
        ctx.collect();
    }
}
