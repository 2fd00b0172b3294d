//! Backend removal watcher
//!
//! Woken by the watch on the backend path. While the frontend is connected or
//! connecting, a backend that is no longer online gets the device ejected.

use {
    super::{Frontend, FrontendState},
    crate::thread::{Event, Thread, ThreadContext},
    log::{info, trace},
    std::sync::{Arc, Weak},
    xenbus::Result,
};

pub(super) fn spawn(frontend: &Arc<Frontend>) -> Result<Thread> {
    let weak = Arc::downgrade(frontend);
    let eject_event = frontend.eject_event.clone();
    let path = frontend.path.clone();

    Thread::create(&format!("{}/eject", frontend.path), move |thread| {
        run(&path, &weak, &eject_event, thread)
    })
}

fn run(path: &str, frontend: &Weak<Frontend>, eject_event: &Event, thread: &ThreadContext) {
    trace!("{}: eject: ====>", path);

    loop {
        thread.wait();

        if thread.is_alerted() {
            break;
        }

        let frontend = match frontend.upgrade() {
            Some(frontend) => frontend,
            None => break,
        };

        frontend.check_backend();

        eject_event.set();
    }

    eject_event.set();

    trace!("{}: eject: <====", path);
}

impl Frontend {
    fn check_backend(&self) {
        let inner = self.lock();

        // interfaces are not usable before this point
        if inner.state == FrontendState::Unknown || inner.state == FrontendState::Closed {
            return;
        }

        if !self.is_online() {
            return;
        }

        let backend_path = match inner.backend_path.as_deref() {
            Some(backend_path) => backend_path,
            None => return,
        };

        if !self.is_backend_online(backend_path) {
            info!("{}: backend {} is offline", self.path, backend_path);
            self.eject.request();
        }
    }
}
