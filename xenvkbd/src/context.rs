//! Services every device is created against

use {
    crate::config::Config,
    std::sync::Arc,
    xenbus::{
        console::ConsoleInterface, debug::DebugInterface, evtchn::EvtchnInterface,
        grant_table::GnttabInterface, store::StoreInterface, suspend::SuspendInterface,
    },
};

/// Parent bus of a device
pub trait Bus: Send + Sync {
    /// Ask for device `name` to be re-enumerated so that it can be removed
    fn request_eject(&self, name: &str);
}

/// Bus interfaces, parent bus and configuration shared by every device
#[derive(Clone)]
pub struct Context {
    /// Store
    pub store: Arc<dyn StoreInterface>,
    /// Event channels
    pub evtchn: Arc<dyn EvtchnInterface>,
    /// Grant table
    pub gnttab: Arc<dyn GnttabInterface>,
    /// Suspend notifications
    pub suspend: Arc<dyn SuspendInterface>,
    /// Debug dump
    pub debug: Arc<dyn DebugInterface>,
    /// Console
    pub console: Arc<dyn ConsoleInterface>,
    /// Parent bus
    pub bus: Arc<dyn Bus>,
    /// Tunables
    pub config: Config,
}
