//! The built-in `sys` module.
//!
//! Registered by every Context at construction. Provides the core globals
//! (`version`, `print`, `println`, `startthread`, `import`) plus the hidden
//! natives backing string and thread member methods, which object `get`
//! resolves to `sys_string_*` / `sys_thread_*` symbols.

use crate::context::Context;
use crate::heap::ObjId;
use crate::module::{Module, ModuleEntry, NativeArgs};
use crate::value::Value;

pub struct SysModule {
    entries: Vec<ModuleEntry>,
}

impl Default for SysModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SysModule {
    pub fn new() -> Self {
        Self {
            entries: vec![
                // global functions
                ModuleEntry::named("version", "sys_version", version),
                ModuleEntry::named("print", "sys_print", print),
                ModuleEntry::named("println", "sys_println", println),
                ModuleEntry::named("startthread", "sys_startthread", startthread),
                ModuleEntry::named("import", "sys_import", import),
                // string member functions
                ModuleEntry::hidden("sys_string_length", string_length),
                ModuleEntry::hidden("sys_string_concat", string_concat),
                ModuleEntry::hidden("sys_string_substr", string_substr),
                ModuleEntry::hidden("sys_string_replace", string_replace),
                // thread member functions
                ModuleEntry::hidden("sys_thread_kill", thread_kill),
                ModuleEntry::hidden("sys_thread_isrunning", thread_isrunning),
                ModuleEntry::hidden("sys_thread_suspend", thread_suspend),
                ModuleEntry::hidden("sys_thread_resume", thread_resume),
            ],
        }
    }
}

impl Module for SysModule {
    fn name(&self) -> &str {
        "sys"
    }

    fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }
}

// ============================================================================
// Global functions
// ============================================================================

fn version(ctx: &mut Context, _tid: ObjId, _args: &mut NativeArgs, _self_value: Value) -> Value {
    ctx.heap_mut().new_string("Weft scripting runtime -- version 0.1")
}

fn print(ctx: &mut Context, _tid: ObjId, args: &mut NativeArgs, _self_value: Value) -> Value {
    for arg in args.iter() {
        let text = ctx.heap().render(arg);
        ctx.print_str(&text);
    }
    Value::Null
}

fn println(ctx: &mut Context, tid: ObjId, args: &mut NativeArgs, self_value: Value) -> Value {
    print(ctx, tid, args, self_value);
    ctx.print_str("\n");
    Value::Null
}

/// `startthread(fn, args..., self)`: spawn a thread calling `fn`. The new
/// thread is scheduled from the next round.
fn startthread(ctx: &mut Context, tid: ObjId, args: &mut NativeArgs, _self_value: Value) -> Value {
    if args.len() < 2 {
        ctx.runtime_error(tid, "startthread expects a function and a self value");
        return Value::Null;
    }
    let func = args[0];
    let self_arg = args[args.len() - 1];
    let middle = &args[1..args.len() - 1];

    let new_tid = ctx.new_thread();
    if ctx.init_thread(new_tid, func, middle, self_arg).is_err() {
        ctx.runtime_error(tid, "startthread failed to initialize the new thread");
        return Value::Null;
    }
    Value::Thread(new_tid)
}

/// `import(dst, src)`: copy every key of src into dst.
fn import(ctx: &mut Context, tid: ObjId, args: &mut NativeArgs, _self_value: Value) -> Value {
    if args.len() < 2 || !args[0].is_object() || !args[1].is_object() {
        ctx.runtime_error(tid, "import expects two objects");
        return Value::Null;
    }
    let dst = args[0];
    let src = args[1];

    let mut it = ctx.heap().begin(src);
    while it.is_true() {
        let (next, key, value) = ctx.heap().next(src, it);
        ctx.heap_mut().set_key(dst, key, value);
        it = next;
    }
    Value::TRUE
}

// ============================================================================
// String member functions
// ============================================================================

fn self_string(ctx: &Context, self_value: Value) -> Option<Vec<u8>> {
    match self_value {
        Value::String(id) => ctx.heap().string(id).map(|s| s.bytes().to_vec()),
        _ => None,
    }
}

/// `<str>.length()` => length in bytes.
fn string_length(ctx: &mut Context, _tid: ObjId, _args: &mut NativeArgs, self_value: Value) -> Value {
    match self_string(ctx, self_value) {
        Some(bytes) => Value::Int(bytes.len() as i32),
        None => Value::Null,
    }
}

/// `<str>.concat(<str>)` => new string.
fn string_concat(ctx: &mut Context, _tid: ObjId, args: &mut NativeArgs, self_value: Value) -> Value {
    let Some(mut bytes) = self_string(ctx, self_value) else {
        return Value::Null;
    };
    let other = args.first().copied().and_then(|v| self_string(ctx, v));
    match other {
        Some(other_bytes) => {
            bytes.extend_from_slice(&other_bytes);
            ctx.heap_mut().new_string(bytes)
        }
        None => Value::Null,
    }
}

/// `<str>.substr(pos, len)` => new string. The range is clamped to the
/// string's bounds; negative arguments fail softly.
fn string_substr(ctx: &mut Context, _tid: ObjId, args: &mut NativeArgs, self_value: Value) -> Value {
    let Some(bytes) = self_string(ctx, self_value) else {
        return Value::Null;
    };
    let (Some(Value::Int(pos)), Some(Value::Int(len))) = (args.first(), args.get(1)) else {
        return Value::Null;
    };
    if *pos < 0 || *len < 0 {
        return Value::Null;
    }
    let start = (*pos as usize).min(bytes.len());
    let end = start.saturating_add(*len as usize).min(bytes.len());
    let slice = bytes[start..end].to_vec();
    ctx.heap_mut().new_string(slice)
}

/// `<str>.replace(pos, len, str)` => self, mutated in place.
fn string_replace(ctx: &mut Context, _tid: ObjId, args: &mut NativeArgs, self_value: Value) -> Value {
    let Value::String(sid) = self_value else {
        return Value::Null;
    };
    let (Some(Value::Int(pos)), Some(Value::Int(len))) = (args.first(), args.get(1)) else {
        return Value::Null;
    };
    if *pos < 0 || *len < 0 {
        return Value::Null;
    }
    let Some(other) = args.get(2).copied().and_then(|v| self_string(ctx, v)) else {
        return Value::Null;
    };
    let Some(mut bytes) = ctx.heap().string(sid).map(|s| s.bytes().to_vec()) else {
        return Value::Null;
    };

    let start = (*pos as usize).min(bytes.len());
    let end = start.saturating_add(*len as usize).min(bytes.len());
    bytes.splice(start..end, other.iter().copied());

    if let Some(s) = ctx.heap_mut().string_mut(sid) {
        s.set(bytes);
    }
    self_value
}

// ============================================================================
// Thread member functions
// ============================================================================

/// `<thread>.kill()` => True if the thread was running and got killed. A
/// thread cannot kill itself from inside its own native callback.
fn thread_kill(ctx: &mut Context, _tid: ObjId, _args: &mut NativeArgs, self_value: Value) -> Value {
    let Value::Thread(target) = self_value else {
        return Value::Null;
    };
    let running = ctx.heap().thread(target).is_some_and(|t| t.is_running());
    Value::truth(running && ctx.kill_thread(target))
}

fn thread_isrunning(ctx: &mut Context, _tid: ObjId, _args: &mut NativeArgs, self_value: Value) -> Value {
    let Value::Thread(target) = self_value else {
        return Value::Null;
    };
    Value::truth(ctx.heap().thread(target).is_some_and(|t| t.is_running()))
}

/// `<thread>.suspend()` => False if already suspended, True otherwise. The
/// suspension takes effect between slices.
fn thread_suspend(ctx: &mut Context, _tid: ObjId, _args: &mut NativeArgs, self_value: Value) -> Value {
    let Value::Thread(target) = self_value else {
        return Value::Null;
    };
    if ctx.heap().thread(target).is_some_and(|t| t.is_suspended()) {
        Value::FALSE
    } else {
        ctx.suspend_thread(target);
        Value::TRUE
    }
}

fn thread_resume(ctx: &mut Context, _tid: ObjId, _args: &mut NativeArgs, self_value: Value) -> Value {
    let Value::Thread(target) = self_value else {
        return Value::Null;
    };
    if ctx.heap().thread(target).is_some_and(|t| t.is_suspended()) {
        ctx.resume_thread(target);
        Value::TRUE
    } else {
        Value::FALSE
    }
}
