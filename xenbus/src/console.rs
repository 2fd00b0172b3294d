//! Console ring interface

use {
    crate::{Notify, Result},
    alloc::sync::Arc,
};

/// Handle to a registered console wakeup
#[derive(Debug, PartialEq, Eq)]
pub struct Wakeup(u64);

impl Wakeup {
    /// Wrap a wakeup identifier issued by the bus
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Wakeup identifier
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Character console shared with the backend
pub trait ConsoleInterface: Send + Sync {
    /// Take a reference to the interface
    fn acquire(&self) -> Result<()>;

    /// Drop a reference to the interface
    fn release(&self);

    /// Whether input is waiting to be read
    fn can_read(&self) -> bool;

    /// Whether there is space to write output
    fn can_write(&self) -> bool;

    /// Read available input, returning the number of bytes copied
    fn read(&self, buffer: &mut [u8]) -> usize;

    /// Write output, returning the number of bytes accepted
    fn write(&self, buffer: &[u8]) -> usize;

    /// Notify `notify` whenever input arrives or output space frees up
    fn wakeup_add(&self, notify: Arc<dyn Notify>) -> Result<Wakeup>;

    /// Remove a wakeup
    fn wakeup_remove(&self, wakeup: Wakeup);
}
