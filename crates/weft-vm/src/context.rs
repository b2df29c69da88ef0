//! The runtime context.
//!
//! The Context owns everything: the heap (and with it both GC lists), the
//! root table, the thread registry, the module registry, and the userdata
//! snapshot hooks. There is no ambient global — hosts and native callbacks
//! are handed the context explicitly, so independent contexts can coexist.
//!
//! The host drives execution in rounds:
//!
//! ```ignore
//! while ctx.count_running_threads() > 0 {
//!     ctx.round_robin(-1)?;
//!     ctx.collect();
//! }
//! ctx.clear();
//! ```

use std::collections::HashMap;
use std::io::Write;

use crate::config::VmConfig;
use crate::error::VmError;
use crate::heap::{Heap, ObjId};
use crate::module::{Module, NativeFn, UserDataHandler};
use crate::object::Object;
use crate::sys::SysModule;
use crate::thread::{ThreadObj, ThreadState};
use crate::value::Value;

/// The process-wide owner of all runtime state.
pub struct Context {
    pub(crate) heap: Heap,
    pub(crate) config: VmConfig,
    root: Value,
    threads: Vec<ObjId>,
    modules: Vec<Box<dyn Module>>,
    userdata_handlers: HashMap<&'static str, Box<dyn UserDataHandler>>,
    out: Box<dyn Write>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a context with default limits. The `sys` module is always
    /// registered.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut ctx = Self {
            heap: Heap::new(),
            config,
            root: Value::Null,
            threads: Vec::new(),
            modules: Vec::new(),
            userdata_handlers: HashMap::new(),
            out: Box::new(std::io::stdout()),
        };
        ctx.root = ctx.heap.new_table();
        ctx.add_module(Box::new(SysModule::new()));
        ctx
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The root environment table.
    pub fn root(&self) -> Value {
        self.root
    }

    /// Replace the root value. Only the snapshot loader does this.
    pub(crate) fn set_root(&mut self, root: Value) {
        self.root = root;
    }

    /// Redirect script output (`print`/`println`). Default is stdout.
    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    /// Write to the script output channel.
    pub fn print_str(&mut self, s: &str) {
        let _ = self.out.write_all(s.as_bytes());
        let _ = self.out.flush();
    }

    // ========================================================================
    // Threads
    // ========================================================================

    /// Create a thread object. Registration in the thread list happens here,
    /// at construction; deregistration happens when the object is reaped.
    pub fn new_thread(&mut self) -> ObjId {
        let id = self.heap.alloc(Object::Thread(ThreadObj::new()));
        self.threads.push(id);
        id
    }

    /// The registered threads, in registration order.
    pub fn threads(&self) -> &[ObjId] {
        &self.threads
    }

    /// Prepare an uninitialized thread to call `func`: performs the synthetic
    /// call that pushes the first frame. A Null self binds to the root table.
    pub fn init_thread(
        &mut self,
        tid: ObjId,
        func: Value,
        args: &[Value],
        self_value: Value,
    ) -> Result<(), VmError> {
        let root = self.root;
        {
            let t = self.heap.thread_mut(tid).ok_or(VmError::UnknownThread)?;
            if t.is_initialized() {
                return Err(VmError::AlreadyInitialized);
            }
            t.stack.push(func);
            t.stack
                .push(if self_value.is_null() { root } else { self_value });
            t.stack.extend_from_slice(args);
            t.stack.push(Value::Int(args.len() as i32));
            t.state = ThreadState::Running;
        }
        self.op_mcall(tid);
        Ok(())
    }

    /// Kill a thread: discard its stacks, state becomes Done. Refused for a
    /// thread currently inside its own run (native callbacks cannot kill
    /// their own thread). Idempotent otherwise.
    pub fn kill_thread(&mut self, tid: ObjId) -> bool {
        match self.heap.thread_mut(tid) {
            Some(t) if !t.inside_run => {
                t.kill();
                true
            }
            _ => false,
        }
    }

    /// Suspend a Running thread. Takes effect between slices.
    pub fn suspend_thread(&mut self, tid: ObjId) {
        if let Some(t) = self.heap.thread_mut(tid) {
            t.suspend();
        }
    }

    /// Resume a Suspended thread.
    pub fn resume_thread(&mut self, tid: ObjId) {
        if let Some(t) = self.heap.thread_mut(tid) {
            t.resume();
        }
    }

    /// Enable or disable yield for a thread. With yield disabled, YIELD
    /// consumes its operand without ending the slice.
    pub fn set_yield_enabled(&mut self, tid: ObjId, enabled: bool) {
        if let Some(t) = self.heap.thread_mut(tid) {
            t.yield_enabled = enabled;
        }
    }

    pub fn thread_state(&self, tid: ObjId) -> Option<ThreadState> {
        self.heap.thread(tid).map(|t| t.state)
    }

    /// The thread's last yield result, or its return result once Done.
    pub fn thread_result(&self, tid: ObjId) -> Value {
        self.heap.thread(tid).map(|t| t.result).unwrap_or(Value::Null)
    }

    /// Number of threads whose state is Running right now. Suspended threads
    /// do not count: a zero here means all runnable work is exhausted, not
    /// that no threads are alive.
    pub fn count_running_threads(&self) -> usize {
        self.threads
            .iter()
            .filter(|&&tid| self.heap.thread(tid).is_some_and(|t| t.is_running()))
            .count()
    }

    /// Give every Running thread one slice of at most `timeout` instructions
    /// (negative means unbounded). The thread list is snapshotted first, so
    /// threads created mid-round are only scheduled from the next round.
    pub fn round_robin(&mut self, timeout: i64) -> Result<(), VmError> {
        let snapshot = self.threads.clone();
        for tid in snapshot {
            if self.heap.thread(tid).is_some_and(|t| t.is_running()) {
                self.run_thread(tid, timeout)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Modules
    // ========================================================================

    /// Append and initialize a module. Later registrations lose symbol lookup
    /// ties to earlier ones.
    pub fn add_module(&mut self, module: Box<dyn Module>) {
        self.modules.push(module);
        self.init_module(self.modules.len() - 1);
    }

    /// De-initialize and unlink a module by name.
    pub fn remove_module(&mut self, name: &str) -> bool {
        let Some(index) = self.modules.iter().position(|m| m.name() == name) else {
            return false;
        };
        self.deinit_module(index);
        self.modules.remove(index);
        true
    }

    /// Resolve a symbolic id against registered modules, in insertion order.
    pub fn resolve_external(&self, symbol: &str) -> Option<NativeFn> {
        for module in &self.modules {
            for entry in module.entries() {
                if entry.symbol == symbol {
                    return Some(entry.func);
                }
            }
        }
        None
    }

    /// Install the module's script-visible entries in the root table.
    fn init_module(&mut self, index: usize) {
        let named: Vec<(&'static str, &'static str)> = self.modules[index]
            .entries()
            .iter()
            .filter_map(|e| e.script_name.map(|n| (n, e.symbol)))
            .collect();
        let root = self.root;
        for (name, symbol) in named {
            let key = self.heap.new_string(name);
            let value = self.heap.new_extfunc(symbol);
            self.heap.set_key(root, key, value);
        }
    }

    /// Null out the module's script-visible entries in the root table.
    fn deinit_module(&mut self, index: usize) {
        let named: Vec<&'static str> = self.modules[index]
            .entries()
            .iter()
            .filter_map(|e| e.script_name)
            .collect();
        let root = self.root;
        for name in named {
            let key = self.heap.new_string(name);
            self.heap.set_key(root, key, Value::Null);
        }
    }

    // ========================================================================
    // Userdata snapshot hooks
    // ========================================================================

    pub fn register_userdata_handler(&mut self, handler: Box<dyn UserDataHandler>) {
        self.userdata_handlers.insert(handler.tag(), handler);
    }

    pub(crate) fn userdata_handler(&self, tag: &str) -> Option<&dyn UserDataHandler> {
        self.userdata_handlers.get(tag).map(|h| h.as_ref())
    }

    // ========================================================================
    // Garbage collection phases
    // ========================================================================

    /// Phase 1: clear every mark bit.
    pub fn unmark_objects(&mut self) {
        self.heap.unmark_all();
    }

    /// Phase 2: mark the root table and every Running thread. Suspended
    /// threads are not rooted by the scheduler; they survive only if
    /// reachable from other roots.
    pub fn mark_objects(&mut self) {
        let root = self.root;
        self.heap.mark_value(&root);
        let threads = self.threads.clone();
        for tid in threads {
            if self.heap.thread(tid).is_some_and(|t| t.is_running()) {
                self.heap.mark_object(tid);
            }
        }
    }

    /// Phase 3: condemn unmarked, unlocked objects.
    pub fn sweep_objects(&mut self) {
        self.heap.sweep();
    }

    /// Phase 4: destroy condemned objects and drop their thread
    /// registrations.
    pub fn reap_objects(&mut self) {
        self.heap.reap();
        let heap = &self.heap;
        self.threads.retain(|&tid| heap.contains(tid));
    }

    /// One complete collection cycle in phase order.
    pub fn collect(&mut self) {
        self.unmark_objects();
        self.mark_objects();
        self.sweep_objects();
        self.reap_objects();
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shut down (finalize and reap every live object), then recreate the
    /// root table and re-initialize each registered module.
    pub fn clear(&mut self) {
        self.shutdown();
        self.root = self.heap.new_table();
        for index in 0..self.modules.len() {
            self.init_module(index);
        }
    }

    fn shutdown(&mut self) {
        self.root = Value::Null;
        self.heap.finalize_all();
        self.heap.reap();
        self.threads.clear();
    }
}
