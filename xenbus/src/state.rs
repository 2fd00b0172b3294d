//! XenBus connection states

use {
    core::fmt,
    xen_sys::{
        xenbus_state_XenbusStateClosed, xenbus_state_XenbusStateClosing,
        xenbus_state_XenbusStateConnected, xenbus_state_XenbusStateInitWait,
        xenbus_state_XenbusStateInitialised, xenbus_state_XenbusStateInitialising,
        xenbus_state_XenbusStateReconfigured, xenbus_state_XenbusStateReconfiguring,
        xenbus_state_XenbusStateUnknown,
    },
};

/// State of either end of a XenBus connection, as published in the `state` node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XenbusState {
    /// Initial state of the device on the bus, before either end has been connected
    Unknown,
    /// End is in process of initializing itself
    Initialising,
    /// Entered by the back end while it is waiting for information before completing initialization
    InitWait,
    /// End is now ready for connection
    Initialised,
    /// Normal state of the bus
    Connected,
    /// Device has become unavailable, the end is no longer doing useful work
    Closing,
    /// Both halves of driver have disconnected
    Closed,
    /// Device is being reconfigured
    Reconfiguring,
    /// Device reconfiguring has finished
    Reconfigured,
}

impl XenbusState {
    /// Parse the decimal value of a `state` node, unrecognised values read as `Unknown`
    pub fn parse(value: &str) -> Self {
        value
            .trim()
            .parse::<u32>()
            .map(Self::from)
            .unwrap_or(XenbusState::Unknown)
    }
}

impl From<u32> for XenbusState {
    fn from(s: u32) -> Self {
        #[allow(non_upper_case_globals)]
        match s {
            xenbus_state_XenbusStateUnknown => XenbusState::Unknown,
            xenbus_state_XenbusStateInitialising => XenbusState::Initialising,
            xenbus_state_XenbusStateInitWait => XenbusState::InitWait,
            xenbus_state_XenbusStateInitialised => XenbusState::Initialised,
            xenbus_state_XenbusStateConnected => XenbusState::Connected,
            xenbus_state_XenbusStateClosing => XenbusState::Closing,
            xenbus_state_XenbusStateClosed => XenbusState::Closed,
            xenbus_state_XenbusStateReconfiguring => XenbusState::Reconfiguring,
            xenbus_state_XenbusStateReconfigured => XenbusState::Reconfigured,
            _ => XenbusState::Unknown,
        }
    }
}

impl From<XenbusState> for u32 {
    fn from(s: XenbusState) -> Self {
        match s {
            XenbusState::Unknown => xenbus_state_XenbusStateUnknown,
            XenbusState::Initialising => xenbus_state_XenbusStateInitialising,
            XenbusState::InitWait => xenbus_state_XenbusStateInitWait,
            XenbusState::Initialised => xenbus_state_XenbusStateInitialised,
            XenbusState::Connected => xenbus_state_XenbusStateConnected,
            XenbusState::Closing => xenbus_state_XenbusStateClosing,
            XenbusState::Closed => xenbus_state_XenbusStateClosed,
            XenbusState::Reconfiguring => xenbus_state_XenbusStateReconfiguring,
            XenbusState::Reconfigured => xenbus_state_XenbusStateReconfigured,
        }
    }
}

impl fmt::Display for XenbusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            XenbusState::Unknown => "UNKNOWN",
            XenbusState::Initialising => "INITIALISING",
            XenbusState::InitWait => "INITWAIT",
            XenbusState::Initialised => "INITIALISED",
            XenbusState::Connected => "CONNECTED",
            XenbusState::Closing => "CLOSING",
            XenbusState::Closed => "CLOSED",
            XenbusState::Reconfiguring => "RECONFIGURING",
            XenbusState::Reconfigured => "RECONFIGURED",
        };

        f.write_str(name)
    }
}
