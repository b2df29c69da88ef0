//! Green threads.
//!
//! A thread owns a value stack and a call-frame stack and executes bytecode
//! one instruction at a time; the execution loop itself lives in `exec.rs`
//! because it needs the whole Context (heap allocation, module dispatch).
//! This module holds the state a thread carries between slices: stacks,
//! lifecycle state, the last yield/return result, and source coordinates for
//! diagnostics.

use crate::value::Value;

/// Thread lifecycle states. The wire values are stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Uninitialized = 0,
    Running = 1,
    Done = 2,
    Suspended = 3,
}

impl ThreadState {
    /// Decode a wire value.
    pub fn from_i32(v: i32) -> Option<ThreadState> {
        match v {
            0 => Some(ThreadState::Uninitialized),
            1 => Some(ThreadState::Running),
            2 => Some(ThreadState::Done),
            3 => Some(ThreadState::Suspended),
            _ => None,
        }
    }
}

/// One function activation: instruction pointer, the function being executed,
/// the self binding, and the locals (arguments included).
#[derive(Clone, Debug)]
pub struct CallFrame {
    pub ip: usize,
    pub func: Value,
    pub self_value: Value,
    pub locals: Vec<Value>,
}

impl CallFrame {
    pub fn new(func: Value, self_value: Value, locals: Vec<Value>) -> Self {
        Self {
            ip: 0,
            func,
            self_value,
            locals,
        }
    }
}

/// A green thread's suspendable state.
#[derive(Debug)]
pub struct ThreadObj {
    pub state: ThreadState,
    /// When false, YIELD consumes its operand but does not end the slice.
    pub yield_enabled: bool,
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,
    /// Last yield result while Running, return result once Done.
    pub result: Value,
    /// Current source file for diagnostics.
    pub file: String,
    /// Current source line for diagnostics.
    pub line: i32,
    /// Guards against reentrant `run` on the same thread.
    pub inside_run: bool,
}

impl Default for ThreadObj {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadObj {
    pub fn new() -> Self {
        Self {
            state: ThreadState::Uninitialized,
            yield_enabled: true,
            stack: Vec::new(),
            frames: Vec::new(),
            result: Value::Null,
            file: "<input>".to_string(),
            line: -1,
            inside_run: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ThreadState::Running
    }

    pub fn is_suspended(&self) -> bool {
        self.state == ThreadState::Suspended
    }

    pub fn is_initialized(&self) -> bool {
        self.state != ThreadState::Uninitialized
    }

    /// Discard both stacks and finish the thread. Idempotent.
    pub fn kill(&mut self) {
        self.result = Value::Null;
        self.frames.clear();
        self.stack.clear();
        self.state = ThreadState::Done;
    }

    /// Suspend if Running; takes effect between slices.
    pub fn suspend(&mut self) {
        if self.state == ThreadState::Running {
            self.state = ThreadState::Suspended;
        }
    }

    /// Resume if Suspended.
    pub fn resume(&mut self) {
        if self.state == ThreadState::Suspended {
            self.state = ThreadState::Running;
        }
    }
}
