//! Suspend and resume notifications

use {crate::Result, alloc::sync::Arc};

/// Point in the resume path at which a callback runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendPriority {
    /// Runs with interrupts disabled immediately after the domain resumes
    Early,
    /// Runs once the bus is fully operational again
    Late,
}

/// Function run on resume
pub type SuspendFn = Arc<dyn Fn() + Send + Sync>;

/// Handle to a registered suspend callback
#[derive(Debug, PartialEq, Eq)]
pub struct SuspendCallback(u64);

impl SuspendCallback {
    /// Wrap a callback identifier issued by the bus
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Callback identifier
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Suspend interface
pub trait SuspendInterface: Send + Sync {
    /// Take a reference to the interface
    fn acquire(&self) -> Result<()>;

    /// Drop a reference to the interface
    fn release(&self);

    /// Run `callback` at `priority` each time the domain resumes
    fn register(&self, priority: SuspendPriority, callback: SuspendFn)
        -> Result<SuspendCallback>;

    /// Remove a callback
    fn deregister(&self, callback: SuspendCallback);

    /// Number of times the domain has resumed
    fn count(&self) -> u32;
}
