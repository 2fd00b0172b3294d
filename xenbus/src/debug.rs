//! Debug dump callbacks

use {
    crate::Result,
    alloc::sync::Arc,
    core::fmt,
};

/// Function called to dump state, the flag is set if the domain is crashing
pub type DebugFn = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle to a registered debug callback
#[derive(Debug, PartialEq, Eq)]
pub struct DebugCallback(u64);

impl DebugCallback {
    /// Wrap a callback identifier issued by the bus
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Callback identifier
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Debug interface
pub trait DebugInterface: Send + Sync {
    /// Take a reference to the interface
    fn acquire(&self) -> Result<()>;

    /// Drop a reference to the interface
    fn release(&self);

    /// Register a dump callback, output lines are tagged with `prefix`
    fn register(&self, prefix: &str, callback: DebugFn) -> Result<DebugCallback>;

    /// Remove a dump callback
    fn deregister(&self, callback: DebugCallback);

    /// Emit a line from within a dump callback
    fn printf(&self, args: fmt::Arguments);
}
