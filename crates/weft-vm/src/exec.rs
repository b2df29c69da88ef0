//! The execution loop.
//!
//! A thread executes bytecode in *slices*: `run_thread` retires instructions
//! until the thread leaves the Running state, the instruction budget runs
//! out, or a yield occurs with yield enabled. Slices are not reentrant per
//! thread.
//!
//! Script-level failures follow the soft-error model: non-fatal runtime
//! errors are logged to stderr (`<file>(<line>): Runtime error; <msg>`) and
//! push Null where a result is expected; fatal errors additionally kill the
//! thread. Neither surfaces as a Rust error — `run_thread` only fails for
//! host-level invariant violations.

use smallvec::smallvec;

use crate::bytecode::Instr;
use crate::context::Context;
use crate::error::VmError;
use crate::heap::ObjId;
use crate::module::NativeArgs;
use crate::thread::{CallFrame, ThreadState};
use crate::value::Value;

impl Context {
    /// Execute one slice of at most `timeout` instructions on a thread.
    /// A negative timeout means unbounded.
    pub fn run_thread(&mut self, tid: ObjId, timeout: i64) -> Result<(), VmError> {
        {
            let t = self.heap.thread_mut(tid).ok_or(VmError::UnknownThread)?;
            if t.inside_run {
                return Err(VmError::ReentrantRun);
            }
            t.inside_run = true;
            t.result = Value::Null;
        }
        self.exec_slice(tid, timeout);
        if let Some(t) = self.heap.thread_mut(tid) {
            t.inside_run = false;
        }
        Ok(())
    }

    fn exec_slice(&mut self, tid: ObjId, mut budget: i64) {
        loop {
            // Natives and fatal errors may change the thread state at any
            // instruction boundary; recheck every iteration.
            let Some(t) = self.heap.thread(tid) else { return };
            if t.state != ThreadState::Running {
                return;
            }
            let Some(frame) = t.frames.last() else {
                self.fatal(tid, "no active call frame");
                return;
            };
            let ip = frame.ip;
            let Value::Function(fid) = frame.func else {
                self.fatal(tid, "active frame does not hold a function");
                return;
            };

            if budget == 0 {
                return;
            }
            if budget > 0 {
                budget -= 1;
            }

            let Some(instr) = self
                .heap
                .function(fid)
                .and_then(|f| f.code.get(ip))
                .cloned()
            else {
                self.fatal(tid, "instruction pointer out of range");
                return;
            };
            if let Some(f) = self.heap.thread_mut(tid).and_then(|t| t.frames.last_mut()) {
                f.ip = ip + 1;
            }

            match instr {
                Instr::Nop => {}

                // ------------------------------------------------------------
                // Pushes, pops, locals
                // ------------------------------------------------------------
                Instr::Push0 => self.push_value(tid, Value::Null),
                Instr::PushRoot => {
                    let root = self.root();
                    self.push_value(tid, root);
                }
                Instr::PushSelf => {
                    let self_value = self
                        .heap
                        .thread(tid)
                        .and_then(|t| t.frames.last())
                        .map(|f| f.self_value)
                        .unwrap_or(Value::Null);
                    self.push_value(tid, self_value);
                }
                Instr::PushConst(i) => {
                    let constant = self
                        .heap
                        .function(fid)
                        .and_then(|f| f.constants.get(i as usize))
                        .copied();
                    match constant {
                        Some(v) => self.push_value(tid, v),
                        None => self.fatal(tid, "constant index out of range"),
                    }
                }
                Instr::PushExtFunc(symbol) => {
                    let v = self.heap.new_extfunc(symbol);
                    self.push_value(tid, v);
                }
                Instr::PushInt(i) => self.push_value(tid, Value::Int(i)),
                Instr::PushFloat(x) => self.push_value(tid, Value::Float(x)),
                Instr::PushStr(s) => {
                    let v = self.heap.new_string(s);
                    self.push_value(tid, v);
                }
                Instr::Pop(n) => {
                    if n < 0 {
                        self.fatal(tid, "invalid pop count");
                        continue;
                    }
                    for _ in 0..n {
                        if self.pop_value(tid).is_none() {
                            break;
                        }
                    }
                }
                Instr::Dup(k) => {
                    let copied = self.heap.thread(tid).and_then(|t| {
                        if k < 0 {
                            return None;
                        }
                        let len = t.stack.len();
                        len.checked_sub(1 + k as usize).map(|idx| t.stack[idx])
                    });
                    match copied {
                        Some(v) => self.push_value(tid, v),
                        None => self.fatal(tid, "dup offset out of range"),
                    }
                }
                Instr::PushLocal(i) => {
                    let local = self
                        .heap
                        .thread(tid)
                        .and_then(|t| t.frames.last())
                        .and_then(|f| f.locals.get(i as usize))
                        .copied();
                    match local {
                        Some(v) => self.push_value(tid, v),
                        None => self.fatal(tid, "local index out of range"),
                    }
                }
                Instr::PopLocal(i) => {
                    let Some(v) = self.pop_value(tid) else { continue };
                    let stored = self
                        .heap
                        .thread_mut(tid)
                        .and_then(|t| t.frames.last_mut())
                        .and_then(|f| f.locals.get_mut(i as usize))
                        .map(|slot| *slot = v)
                        .is_some();
                    if !stored {
                        self.fatal(tid, "local index out of range");
                    }
                }
                Instr::AddLocals(n) => {
                    if n < 0 {
                        self.fatal(tid, "invalid local count");
                        continue;
                    }
                    if let Some(f) = self.heap.thread_mut(tid).and_then(|t| t.frames.last_mut()) {
                        let new_len = f.locals.len() + n as usize;
                        f.locals.resize(new_len, Value::Null);
                    }
                }
                Instr::DelLocals(n) => {
                    let ok = self
                        .heap
                        .thread_mut(tid)
                        .and_then(|t| t.frames.last_mut())
                        .map(|f| {
                            if n < 0 || n as usize > f.locals.len() {
                                false
                            } else {
                                let new_len = f.locals.len() - n as usize;
                                f.locals.truncate(new_len);
                                true
                            }
                        })
                        .unwrap_or(false);
                    if !ok {
                        self.fatal(tid, "invalid local count");
                    }
                }

                // ------------------------------------------------------------
                // Operators
                // ------------------------------------------------------------
                Instr::Neg => self.unary_op(tid, |v| v.op_neg()),
                Instr::Add => self.binary_op(tid, |a, b| a.op_add(b)),
                Instr::Sub => self.binary_op(tid, |a, b| a.op_sub(b)),
                Instr::Mul => self.binary_op(tid, |a, b| a.op_mul(b)),
                Instr::Div => self.binary_op(tid, |a, b| a.op_div(b)),
                Instr::Shl => self.binary_op(tid, |a, b| a.op_shl(b)),
                Instr::Shr => self.binary_op(tid, |a, b| a.op_shr(b)),
                Instr::Modulo => self.binary_op(tid, |a, b| a.op_modulo(b)),
                Instr::BitOr => self.binary_op(tid, |a, b| a.op_bitor(b)),
                Instr::BitAnd => self.binary_op(tid, |a, b| a.op_bitand(b)),
                Instr::BitXor => self.binary_op(tid, |a, b| a.op_bitxor(b)),
                Instr::And => self.binary_op(tid, |a, b| a.op_booland(b)),
                Instr::Or => self.binary_op(tid, |a, b| a.op_boolor(b)),
                Instr::Not => self.unary_op(tid, |v| v.op_boolnot()),
                Instr::Lt => self.binary_op(tid, |a, b| a.op_lt(b)),
                Instr::Gt => self.binary_op(tid, |a, b| a.op_gt(b)),
                Instr::Le => self.binary_op(tid, |a, b| a.op_le(b)),
                Instr::Ge => self.binary_op(tid, |a, b| a.op_ge(b)),
                Instr::Eq => {
                    let Some(b) = self.pop_value(tid) else { continue };
                    let Some(a) = self.pop_value(tid) else { continue };
                    let equal = self.heap.values_equal(&a, &b);
                    self.push_value(tid, Value::truth(equal));
                }
                Instr::Neq => {
                    let Some(b) = self.pop_value(tid) else { continue };
                    let Some(a) = self.pop_value(tid) else { continue };
                    let equal = self.heap.values_equal(&a, &b);
                    self.push_value(tid, Value::truth(!equal));
                }

                // ------------------------------------------------------------
                // Objects
                // ------------------------------------------------------------
                Instr::NewTable => {
                    let v = self.heap.new_table();
                    self.push_value(tid, v);
                }
                Instr::NewArray => {
                    let v = self.heap.new_array();
                    self.push_value(tid, v);
                }
                Instr::TabSet => {
                    let Some(v) = self.pop_value(tid) else { continue };
                    let Some(k) = self.pop_value(tid) else { continue };
                    let Some(t) = self.pop_value(tid) else { continue };
                    if t.is_object() {
                        self.heap.set_key(t, k, v);
                    } else {
                        let msg = format!(
                            "Can't set property '{}' of non-object '{}'",
                            self.heap.render(&k),
                            self.heap.render(&t)
                        );
                        self.runtime_error(tid, &msg);
                    }
                    self.push_value(tid, v);
                }
                Instr::TabGet => {
                    let Some(k) = self.pop_value(tid) else { continue };
                    let Some(t) = self.pop_value(tid) else { continue };
                    let result = self.read_key(tid, t, &k);
                    self.push_value(tid, result);
                }
                Instr::TabGet2 => {
                    let Some(k) = self.pop_value(tid) else { continue };
                    let Some(t) = self.pop_value(tid) else { continue };
                    let result = self.read_key(tid, t, &k);
                    // The container stays above the result: the call protocol
                    // wants [callable, self] with self on top.
                    self.push_value(tid, result);
                    self.push_value(tid, t);
                }
                Instr::TabIt => {
                    let Some(t) = self.pop_value(tid) else { continue };
                    self.push_value(tid, t);
                    if t.is_object() {
                        let it = self.heap.begin(t);
                        self.push_value(tid, it);
                    } else {
                        let msg = format!("Can't iterate over '{}'", self.heap.render(&t));
                        self.runtime_error(tid, &msg);
                        self.push_value(tid, Value::Null);
                    }
                }
                Instr::TabNext => {
                    let Some(it) = self.pop_value(tid) else { continue };
                    let Some(t) = self.pop_value(tid) else { continue };
                    let (next, key, value) = if t.is_object() {
                        self.heap.next(t, it)
                    } else {
                        let msg = format!("Can't iterate over '{}'", self.heap.render(&t));
                        self.runtime_error(tid, &msg);
                        (Value::Null, Value::Null, Value::Null)
                    };
                    self.push_value(tid, t);
                    self.push_value(tid, next);
                    self.push_value(tid, value);
                    self.push_value(tid, key);
                }
                Instr::Clone => {
                    let Some(v) = self.pop_value(tid) else { continue };
                    match self.heap.clone_value(v) {
                        Some(copy) => self.push_value(tid, copy),
                        None => {
                            self.runtime_error(tid, "Cloning threads not supported");
                            self.push_value(tid, Value::Null);
                        }
                    }
                }

                // ------------------------------------------------------------
                // Control flow
                // ------------------------------------------------------------
                Instr::Jmp(target) => self.jump(tid, target),
                Instr::Jmpt(target) => {
                    let Some(c) = self.pop_value(tid) else { continue };
                    if c.is_true() {
                        self.jump(tid, target);
                    }
                }
                Instr::Jmpf(target) => {
                    let Some(c) = self.pop_value(tid) else { continue };
                    if c.is_false() {
                        self.jump(tid, target);
                    }
                }
                Instr::Mcall => self.op_mcall(tid),
                Instr::Ret => self.op_ret(tid),
                Instr::Yield => {
                    let Some(v) = self.pop_value(tid) else { continue };
                    let yield_enabled = self
                        .heap
                        .thread(tid)
                        .map(|t| t.yield_enabled)
                        .unwrap_or(false);
                    if let Some(t) = self.heap.thread_mut(tid) {
                        // With yield disabled the operand is still consumed,
                        // but the slice goes on and the result stays clear.
                        t.result = if yield_enabled { v } else { Value::Null };
                    }
                    if yield_enabled {
                        return;
                    }
                }

                // ------------------------------------------------------------
                // Debug coordinates
                // ------------------------------------------------------------
                Instr::File(file) => {
                    if let Some(t) = self.heap.thread_mut(tid) {
                        t.file = file;
                    }
                }
                Instr::Line(line) => {
                    if let Some(t) = self.heap.thread_mut(tid) {
                        t.line = line;
                    }
                }
            }
        }
    }

    /// Method call. The caller pushed: callable, self, args left-to-right,
    /// argc. Dispatch depends on the callable kind.
    pub(crate) fn op_mcall(&mut self, tid: ObjId) {
        let Some(argc_value) = self.pop_value(tid) else {
            return;
        };
        let Value::Int(argc) = argc_value else {
            self.fatal(tid, "argument count must be an integer");
            return;
        };
        if argc < 0 {
            self.fatal(tid, "argument count must be non-negative");
            return;
        }

        let mut args: NativeArgs = smallvec![Value::Null; argc as usize];
        for i in (0..argc as usize).rev() {
            let Some(v) = self.pop_value(tid) else { return };
            args[i] = v;
        }
        let Some(self_value) = self.pop_value(tid) else {
            return;
        };
        let Some(callable) = self.pop_value(tid) else {
            return;
        };

        match callable {
            Value::Function(fid) => {
                let Some(arity) = self.heap.function(fid).map(|f| f.arity) else {
                    self.fatal(tid, "call of a reaped function");
                    return;
                };
                // Surplus arguments are dropped, missing ones default to Null.
                let mut locals = args.into_vec();
                locals.resize(arity as usize, Value::Null);

                let depth = self.heap.thread(tid).map(|t| t.frames.len()).unwrap_or(0);
                if depth >= self.config.max_call_depth {
                    self.fatal(tid, "call stack overflow");
                    return;
                }
                if let Some(t) = self.heap.thread_mut(tid) {
                    t.frames.push(CallFrame::new(callable, self_value, locals));
                }
            }
            Value::ExtFunc(eid) => {
                let symbol = self
                    .heap
                    .extfunc(eid)
                    .map(|e| e.symbol.clone())
                    .unwrap_or_default();
                match self.resolve_external(&symbol) {
                    Some(native) => {
                        let result = native(self, tid, &mut args, self_value);
                        self.push_value(tid, result);
                    }
                    None => {
                        let shown = self.heap.render(&callable);
                        let msg = format!(
                            "Could not resolve external function '{}', ignoring call",
                            shown
                        );
                        self.runtime_error(tid, &msg);
                        self.push_value(tid, Value::Null);
                    }
                }
            }
            other => {
                let msg = format!(
                    "Ignoring call of uncallable value '{}'",
                    self.heap.render(&other)
                );
                self.runtime_error(tid, &msg);
                self.push_value(tid, Value::Null);
            }
        }
    }

    /// Return from the current frame. With the call stack empty the topmost
    /// stack value becomes the thread result and the thread is Done.
    pub(crate) fn op_ret(&mut self, tid: ObjId) {
        let finished = {
            let Some(t) = self.heap.thread_mut(tid) else { return };
            t.frames.pop();
            t.frames.is_empty()
        };
        if finished {
            let Some(v) = self.pop_value(tid) else { return };
            if let Some(t) = self.heap.thread_mut(tid) {
                t.result = v;
                t.state = ThreadState::Done;
            }
        }
    }

    fn jump(&mut self, tid: ObjId, target: i32) {
        if target < 0 {
            self.fatal(tid, "jump target out of range");
            return;
        }
        if let Some(f) = self.heap.thread_mut(tid).and_then(|t| t.frames.last_mut()) {
            f.ip = target as usize;
        }
    }

    fn unary_op(&mut self, tid: ObjId, op: fn(&Value) -> Value) {
        let Some(v) = self.pop_value(tid) else { return };
        self.push_value(tid, op(&v));
    }

    fn binary_op(&mut self, tid: ObjId, op: fn(&Value, &Value) -> Value) {
        let Some(b) = self.pop_value(tid) else { return };
        let Some(a) = self.pop_value(tid) else { return };
        self.push_value(tid, op(&a, &b));
    }

    /// Keyed read with the non-object error reported against the thread.
    fn read_key(&mut self, tid: ObjId, container: Value, key: &Value) -> Value {
        if container.is_object() {
            self.heap.get_key(container, key)
        } else {
            let msg = format!(
                "Can't get property '{}' of non-object '{}'",
                self.heap.render(key),
                self.heap.render(&container)
            );
            self.runtime_error(tid, &msg);
            Value::Null
        }
    }

    pub(crate) fn push_value(&mut self, tid: ObjId, v: Value) {
        let max_depth = self.config.max_stack_depth;
        let overflow = match self.heap.thread_mut(tid) {
            Some(t) if t.stack.len() < max_depth => {
                t.stack.push(v);
                false
            }
            Some(_) => true,
            None => false,
        };
        if overflow {
            self.fatal(tid, "stack overflow");
        }
    }

    pub(crate) fn pop_value(&mut self, tid: ObjId) -> Option<Value> {
        let popped = self.heap.thread_mut(tid).and_then(|t| t.stack.pop());
        if popped.is_none() {
            self.fatal(tid, "stack underflow");
        }
        popped
    }

    /// Report a non-fatal runtime error on the diagnostics channel.
    pub(crate) fn runtime_error(&mut self, tid: ObjId, msg: &str) {
        let (file, line) = self.thread_location(tid);
        eprintln!("{}({}): Runtime error; {}", file, line, msg);
    }

    /// Report a fatal runtime error and kill the thread.
    pub(crate) fn fatal(&mut self, tid: ObjId, msg: &str) {
        let (file, line) = self.thread_location(tid);
        eprintln!("{}({}): Fatal runtime error; {}", file, line, msg);
        eprintln!("=> Killed thread.");
        if let Some(t) = self.heap.thread_mut(tid) {
            t.kill();
        }
    }

    fn thread_location(&self, tid: ObjId) -> (String, i32) {
        self.heap
            .thread(tid)
            .map(|t| (t.file.clone(), t.line))
            .unwrap_or_else(|| ("<unknown>".to_string(), -1))
    }
}
