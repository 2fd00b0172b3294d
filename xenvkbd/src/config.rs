//! Frontend configuration

use std::time::Duration;

/// Store directory under which keyboard frontends live
pub const FRONTEND_PREFIX: &str = "device/vkbd";

/// Longest time to wait for the backend to change state
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(120);

/// Number of watch waits between reads of the backend state
pub const WATCH_POLL_ATTEMPTS: u32 = 1000;

/// Time to wait for a watch before polling the store transport
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Manufacturer reported by the HID device
pub const VENDOR_NAME: &str = "XenProject";

/// Tunables shared by every device created from a context
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Store directory under which frontends are created
    pub frontend_prefix: String,
    /// Longest time to wait for the backend to change state before treating it as gone
    pub backend_timeout: Duration,
    /// Number of watch waits between reads of the backend state
    pub watch_poll_attempts: u32,
    /// Time to wait for a watch before polling the store transport
    pub watch_poll_interval: Duration,
    /// Refuse to connect to a backend that does not offer raw pointer events
    pub require_raw_pointer: bool,
    /// Manufacturer string
    pub vendor_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frontend_prefix: FRONTEND_PREFIX.to_owned(),
            backend_timeout: BACKEND_TIMEOUT,
            watch_poll_attempts: WATCH_POLL_ATTEMPTS,
            watch_poll_interval: WATCH_POLL_INTERVAL,
            require_raw_pointer: true,
            vendor_name: VENDOR_NAME.to_owned(),
        }
    }
}

impl Config {
    /// Store path of the frontend for device `name`
    pub fn frontend_path(&self, name: &str) -> String {
        format!("{}/{}", self.frontend_prefix, name)
    }

    /// Set the backend state timeout
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Set the watch polling policy
    pub fn with_watch_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.watch_poll_attempts = attempts;
        self.watch_poll_interval = interval;
        self
    }

    /// Set whether raw pointer support is required of the backend
    pub fn with_require_raw_pointer(mut self, require: bool) -> Self {
        self.require_raw_pointer = require;
        self
    }
}
