//! Interfaces to the services a Xen bus driver provides to its child devices
//!
//! "XenBus provides a way of enumerating the (virtual) devices available to a
//! given domain, and connecting to them"
//!
//! Every service is exposed as a trait object so that a frontend can be driven
//! by the real bus or, with the `mock` feature, by an in-memory simulation of
//! the backend domain.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

extern crate alloc;

#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub use {
    error::{Error, Result},
    references::References,
    state::XenbusState,
    xen_sys,
};

pub mod console;
pub mod debug;
mod error;
pub mod evtchn;
pub mod grant_table;
pub mod memory;
#[cfg(feature = "mock")]
pub mod mock;
mod references;
pub mod state;
pub mod store;
pub mod suspend;

/// Receiver of an edge-triggered wakeup, such as a store watch firing
pub trait Notify: Send + Sync {
    /// Signal the receiver
    fn notify(&self);
}
