//! Host-visible error types.
//!
//! Script-level failures are not errors in the Rust sense: the VM reports
//! them on the diagnostics channel and either pushes Null (non-fatal) or
//! kills the offending thread (fatal). `VmError` covers internal invariant
//! violations only — conditions a correct host never triggers.

use std::fmt;

/// Internal invariant violations surfaced to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VmError {
    /// `run` was entered again on a thread already executing.
    ReentrantRun,
    /// An object id did not name a live thread.
    UnknownThread,
    /// `init` was called on a thread that is already initialized.
    AlreadyInitialized,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::ReentrantRun => write!(f, "reentrant call to thread run"),
            VmError::UnknownThread => write!(f, "object id does not name a live thread"),
            VmError::AlreadyInitialized => write!(f, "thread is already initialized"),
        }
    }
}

impl std::error::Error for VmError {}
