//! Native modules and the external-function registry.
//!
//! A module is a named bundle of native functions. Each entry carries an
//! optional script-visible name (installed in the root table as an
//! ExternalFunction value at module init) and a symbolic id by which the VM
//! resolves calls at dispatch time. Entries without a script-visible name are
//! reachable only through `PushExtFunc` or member lookup.
//!
//! Resolution by symbolic id rather than function address is what lets
//! snapshots survive across builds: the wire never contains a native pointer.

use smallvec::SmallVec;

use crate::context::Context;
use crate::heap::ObjId;
use crate::object::UserDataObj;
use crate::serial::{SnapshotError, SnapshotReader, SnapshotWriter};
use crate::value::Value;

/// Argument vector for native calls. Small calls stay off the heap.
pub type NativeArgs = SmallVec<[Value; 8]>;

/// A native callable. Receives the context, the id of the calling thread,
/// the (mutable) argument vector and the self value; returns the call result.
/// Natives are synchronous and must not reenter the VM.
pub type NativeFn = fn(&mut Context, ObjId, &mut NativeArgs, Value) -> Value;

/// One registered native function.
#[derive(Clone, Copy)]
pub struct ModuleEntry {
    /// Name installed in the root table, if script-visible.
    pub script_name: Option<&'static str>,
    /// Symbolic id used for dispatch and serialization.
    pub symbol: &'static str,
    pub func: NativeFn,
}

impl ModuleEntry {
    pub fn named(script_name: &'static str, symbol: &'static str, func: NativeFn) -> Self {
        Self {
            script_name: Some(script_name),
            symbol,
            func,
        }
    }

    pub fn hidden(symbol: &'static str, func: NativeFn) -> Self {
        Self {
            script_name: None,
            symbol,
            func,
        }
    }
}

/// A named bundle of native functions.
pub trait Module {
    fn name(&self) -> &str;
    fn entries(&self) -> &[ModuleEntry];
}

/// Host hook for serializing userdata payloads, keyed by tag.
pub trait UserDataHandler {
    fn tag(&self) -> &'static str;
    /// Write the payload of `data` to the snapshot.
    fn save(&self, data: &UserDataObj, w: &mut SnapshotWriter);
    /// Rebuild a payload from the snapshot.
    fn load(&self, r: &mut SnapshotReader<'_>) -> Result<Box<dyn std::any::Any>, SnapshotError>;
}
