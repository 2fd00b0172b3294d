//! Xen PV keyboard and mouse frontend
//!
//! Connects to a `vkbd` backend through XenBus, decodes the input events the
//! backend places on the shared ring and presents them as HID keyboard and
//! absolute mouse reports.

#![deny(missing_docs)]

pub use {
    config::Config,
    context::{Bus, Context},
    fdo::HidFdo,
    frontend::{Frontend, FrontendState},
    hid::HidContext,
    pdo::Pdo,
    ring::Ring,
    stream::Stream,
    xenbus::{Error, Result},
};

pub mod config;
pub mod context;
pub mod dpc;
pub mod fdo;
pub mod frontend;
pub mod hid;
pub mod logger;
pub mod pdo;
pub mod queue;
pub mod ring;
pub mod stream;
pub mod thread;
