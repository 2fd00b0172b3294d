//! Interface to Xen event channels

use {
    crate::Result,
    alloc::sync::Arc,
    xen_sys::{domid_t, evtchn_port_t},
};

/// Handler invoked, with the channel masked, when an event arrives
pub type EvtchnCallback = Arc<dyn Fn() + Send + Sync>;

/// An open event channel
#[derive(Debug, PartialEq, Eq)]
pub struct Channel {
    port: evtchn_port_t,
}

impl Channel {
    /// Wrap a bound local port
    pub fn new(port: evtchn_port_t) -> Self {
        Self { port }
    }

    /// Local port of the channel
    pub fn port(&self) -> evtchn_port_t {
        self.port
    }
}

/// Event channel operations
pub trait EvtchnInterface: Send + Sync {
    /// Take a reference to the interface
    fn acquire(&self) -> Result<()>;

    /// Drop a reference to the interface
    fn release(&self);

    /// Allocate a port that `domain` may bind to, initially masked
    fn open_unbound(&self, domain: domid_t, callback: EvtchnCallback) -> Result<Channel>;

    /// Unmask a channel, delivering any event that arrived while it was masked
    fn unmask(&self, channel: &Channel);

    /// Signal the remote end
    fn send(&self, channel: &Channel);

    /// Local port of a channel
    fn port(&self, channel: &Channel) -> evtchn_port_t {
        channel.port()
    }

    /// Close a channel
    fn close(&self, channel: Channel);
}
