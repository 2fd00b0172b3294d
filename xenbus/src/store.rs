//! XenStore interface
//!
//! "The XenStore is a storage system shared between Xen guests. It is a
//! simple hierarchical storage system, maintained by Domain 0 and accessed
//! via a shared memory page and an event channel." - The Definitive Guide
//! to the Xen Hypervisor, Chapter 8

use {
    crate::{Error, Notify, Result},
    alloc::{format, string::String, sync::Arc},
    core::fmt,
};

/// Handle to an open store transaction
#[derive(Debug, PartialEq, Eq)]
pub struct Transaction(u32);

impl Transaction {
    /// Wrap a transaction identifier issued by the store
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Transaction identifier
    pub fn id(&self) -> u32 {
        self.0
    }
}

/// Handle to a registered watch
#[derive(Debug, PartialEq, Eq)]
pub struct Watch(u64);

impl Watch {
    /// Wrap a watch identifier issued by the store
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Watch identifier
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Join an optional prefix and a node into a store path
pub fn path(prefix: Option<&str>, node: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix, node),
        None => String::from(node),
    }
}

/// Hierarchical key/value store shared with the backend
///
/// A watch is delivered as a bare notification: the watcher must re-read the
/// nodes it cares about. Watches fire once when registered.
pub trait StoreInterface: Send + Sync {
    /// Take a reference to the interface
    fn acquire(&self) -> Result<()>;

    /// Drop a reference to the interface
    fn release(&self);

    /// Read the value of a node
    fn read(&self, transaction: Option<&Transaction>, prefix: Option<&str>, node: &str)
        -> Result<String>;

    /// Write a formatted value to a node
    fn printf(
        &self,
        transaction: Option<&Transaction>,
        prefix: Option<&str>,
        node: &str,
        args: fmt::Arguments,
    ) -> Result<()>;

    /// Remove a node and its children
    fn remove(&self, transaction: Option<&Transaction>, prefix: Option<&str>, node: &str)
        -> Result<()>;

    /// Notify `notify` whenever a node at or below the path changes
    fn watch_add(&self, prefix: Option<&str>, node: &str, notify: Arc<dyn Notify>)
        -> Result<Watch>;

    /// Remove a watch
    fn watch_remove(&self, watch: Watch) -> Result<()>;

    /// Start a transaction
    fn transaction_start(&self) -> Result<Transaction>;

    /// End a transaction, `Error::Retry` means the writes conflicted and were discarded
    fn transaction_end(&self, transaction: Transaction, commit: bool) -> Result<()>;

    /// Service the store transport from a context that cannot wait for its interrupt
    fn poll(&self);

    /// Read a node and parse it as an unsigned integer in the given radix
    fn read_u32(
        &self,
        transaction: Option<&Transaction>,
        prefix: Option<&str>,
        node: &str,
        radix: u32,
    ) -> Result<u32> {
        let value = self.read(transaction, prefix, node)?;

        u32::from_str_radix(value.trim(), radix).map_err(|_| Error::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::path;

    #[test]
    fn join_paths() {
        assert_eq!(path(Some("device/vkbd/0"), "state"), "device/vkbd/0/state");
        assert_eq!(path(None, "device/vkbd/0/state"), "device/vkbd/0/state");
    }
}
