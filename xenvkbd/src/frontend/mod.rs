//! Frontend connection state machine
//!
//! "XenBus provides a way of enumerating the (virtual) devices available to a
//! given domain, and connecting to them"
//!
//! The frontend drives its half of the XenBus handshake through the `state`
//! node under its own path and follows the backend through the `state` node
//! under the backend path. Every transition runs under the frontend lock, so
//! only one is ever in progress.

use {
    crate::{
        context::Context,
        hid::HidContext,
        pdo::Eject,
        ring::Ring,
        thread::{Event, Thread},
    },
    core::{convert::TryFrom, fmt},
    log::{debug, error, info, trace, warn},
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex, MutexGuard, PoisonError, Weak,
        },
        thread,
        time::Instant,
    },
    xenbus::{
        store::Watch,
        suspend::{SuspendCallback, SuspendPriority},
        xen_sys::{domid_t, DOMID_INVALID},
        Error, Result, XenbusState,
    },
};

mod eject;

/// Connection state of a frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendState {
    /// No backend has been looked up
    Unknown,
    /// The backend is being asked to close
    Closing,
    /// Both ends are closed, the backend path is known
    Closed,
    /// The backend is waiting for the ring
    Prepared,
    /// The ring is shared with the backend
    Connected,
    /// Events on the ring are being decoded
    Enabled,
}

impl FrontendState {
    /// How far along the connection the state is, for comparing states
    pub fn rank(self) -> u8 {
        match self {
            FrontendState::Unknown => 0,
            FrontendState::Closed => 1,
            FrontendState::Closing | FrontendState::Prepared => 2,
            FrontendState::Connected => 3,
            FrontendState::Enabled => 4,
        }
    }
}

impl fmt::Display for FrontendState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            FrontendState::Unknown => "UNKNOWN",
            FrontendState::Closing => "CLOSING",
            FrontendState::Closed => "CLOSED",
            FrontendState::Prepared => "PREPARED",
            FrontendState::Connected => "CONNECTED",
            FrontendState::Enabled => "ENABLED",
        })
    }
}

struct Inner {
    state: FrontendState,
    backend_path: Option<String>,
    backend_domain: domid_t,
    watch: Option<Watch>,
    suspend_early: Option<SuspendCallback>,
    suspend_late: Option<SuspendCallback>,
}

/// Guest half of one keyboard device
pub struct Frontend {
    context: Arc<Context>,
    path: String,
    this: Weak<Frontend>,
    hid: Arc<HidContext>,
    ring: Arc<Ring>,
    eject: Arc<Eject>,
    inner: Mutex<Inner>,
    online: AtomicBool,
    eject_event: Arc<Event>,
    eject_thread: spin::Mutex<Option<Thread>>,
}

impl Frontend {
    /// Create the frontend for device `name` and start its eject watcher
    pub fn new(context: Arc<Context>, name: &str, eject: Arc<Eject>) -> Result<Arc<Self>> {
        let path = context.config.frontend_path(name);

        let frontend = Arc::new_cyclic(|this: &Weak<Frontend>| {
            let hid = Arc::new(HidContext::new(
                this.clone(),
                &path,
                &context.config.vendor_name,
            ));
            let ring = Ring::new(context.clone(), hid.clone(), &path);

            Self {
                context,
                path,
                this: this.clone(),
                hid,
                ring,
                eject,
                inner: Mutex::new(Inner {
                    state: FrontendState::Unknown,
                    backend_path: None,
                    backend_domain: DOMID_INVALID,
                    watch: None,
                    suspend_early: None,
                    suspend_late: None,
                }),
                online: AtomicBool::new(true),
                eject_event: Arc::new(Event::new()),
                eject_thread: spin::Mutex::new(None),
            }
        });

        let thread = eject::spawn(&frontend)?;
        *frontend.eject_thread.lock() = Some(thread);

        info!("{}: created", frontend.path);

        Ok(frontend)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store path of the frontend
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current state
    pub fn state(&self) -> FrontendState {
        self.lock().state
    }

    /// Store path of the backend, known from CLOSED onwards
    pub fn backend_path(&self) -> Option<String> {
        self.lock().backend_path.clone()
    }

    /// Domain of the backend, `DOMID_INVALID` until it has been looked up
    pub fn backend_domain(&self) -> domid_t {
        self.lock().backend_domain
    }

    /// Whether the frontend considers itself online
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// HID interface of the device
    pub fn hid(&self) -> &Arc<HidContext> {
        &self.hid
    }

    /// Event ring of the device
    pub fn ring(&self) -> &Arc<Ring> {
        &self.ring
    }

    fn is_backend_online(&self, backend_path: &str) -> bool {
        self.context
            .store
            .read_u32(None, Some(backend_path), "online", 2)
            .map(|online| online != 0)
            .unwrap_or(false)
    }

    fn set_offline(&self) {
        trace!("{}: offline", self.path);

        self.online.store(false, Ordering::SeqCst);
        self.eject.request();
    }

    fn set_xenbus_state(&self, backend_path: &str, state: XenbusState) {
        trace!("{}: ====> {}", self.path, state);

        let online = self.is_backend_online(backend_path);

        if let Err(e) = self.context.store.printf(
            None,
            Some(&self.path),
            "state",
            format_args!("{}", u32::from(state)),
        ) {
            error!("{}: failed to write state {}: {}", self.path, state, e);
        }

        if state == XenbusState::Closed && !online {
            self.set_offline();
        }
    }

    /// Wait for the backend to leave `state`, then update it
    ///
    /// A backend whose state cannot be read is reported as `Unknown`. One that
    /// does not move before the timeout is also reported as `Unknown` and
    /// fails the wait with `Error::Timeout`.
    fn wait_for_backend_state_change(
        &self,
        backend_path: &str,
        state: &mut XenbusState,
    ) -> Result<()> {
        let store = &self.context.store;
        let config = &self.context.config;
        let old = *state;

        trace!("{}: ====> {}", backend_path, old);

        let event = Arc::new(Event::new());
        let watch = match store.watch_add(Some(backend_path), "state", event.clone()) {
            Ok(watch) => Some(watch),
            Err(e) => {
                warn!("{}: failed to watch backend state: {}", self.path, e);
                None
            }
        };

        let deadline = Instant::now() + config.backend_timeout;
        let mut result = Ok(());

        while *state == old {
            if Instant::now() >= deadline {
                warn!("{}: timed out waiting for {} to leave {}", self.path, backend_path, old);
                *state = XenbusState::Unknown;
                result = Err(Error::Timeout);
                break;
            }

            if watch.is_some() {
                for _ in 0..config.watch_poll_attempts {
                    if event.wait_timeout(config.watch_poll_interval) {
                        break;
                    }

                    // watches may not be delivered while we wait, so service the ring ourselves
                    store.poll();
                }
                event.clear();
            } else {
                thread::sleep(config.watch_poll_interval);
            }

            *state = store
                .read(None, Some(backend_path), "state")
                .map(|value| XenbusState::parse(&value))
                .unwrap_or(XenbusState::Unknown);
        }

        if let Some(watch) = watch {
            if let Err(e) = store.watch_remove(watch) {
                warn!("{}: failed to remove backend state watch: {}", self.path, e);
            }
        }

        trace!("{}: <==== {}", backend_path, state);

        result
    }

    fn update_path(&self, inner: &mut Inner) -> Result<String> {
        let store = &self.context.store;

        inner.backend_domain = store
            .read_u32(None, Some(&self.path), "backend-id", 10)
            .ok()
            .and_then(|domain| domid_t::try_from(domain).ok())
            .unwrap_or(0);

        let backend_path = store.read(None, Some(&self.path), "backend").map_err(|e| {
            error!("{}: no backend: {}", self.path, e);
            e
        })?;

        inner.backend_path = Some(backend_path.clone());

        Ok(backend_path)
    }

    fn remove_watch(&self, inner: &mut Inner) {
        if let Some(watch) = inner.watch.take() {
            if let Err(e) = self.context.store.watch_remove(watch) {
                warn!("{}: failed to remove backend watch: {}", self.path, e);
            }
        }
    }

    fn close(&self, inner: &mut Inner) -> Result<()> {
        trace!("{}: close", self.path);

        self.remove_watch(inner);

        let backend_path = self.update_path(inner)?;

        let mut state = XenbusState::Unknown;
        loop {
            self.wait_for_backend_state_change(&backend_path, &mut state)?;
            if state == XenbusState::Unknown {
                return Err(Error::Unsuccessful);
            }
            if state != XenbusState::Initialising {
                break;
            }
        }

        self.set_xenbus_state(&backend_path, XenbusState::Closing);

        loop {
            self.wait_for_backend_state_change(&backend_path, &mut state)?;
            if state == XenbusState::Unknown {
                return Err(Error::Unsuccessful);
            }
            if state == XenbusState::Closing || state == XenbusState::Closed {
                break;
            }
        }

        self.set_xenbus_state(&backend_path, XenbusState::Closed);

        while state != XenbusState::Closed {
            self.wait_for_backend_state_change(&backend_path, &mut state)?;
            if state == XenbusState::Unknown {
                return Err(Error::Unsuccessful);
            }
        }

        Ok(())
    }

    fn prepare(&self, inner: &mut Inner) -> Result<()> {
        trace!("{}: prepare", self.path);

        let backend_path = self.update_path(inner)?;

        let wake = self
            .eject_thread
            .lock()
            .as_ref()
            .map(Thread::event)
            .ok_or(Error::NotReady)?;

        inner.watch = Some(self.context.store.watch_add(None, &backend_path, wake)?);

        self.set_xenbus_state(&backend_path, XenbusState::Initialising);

        let mut state = XenbusState::Unknown;
        while state != XenbusState::InitWait {
            let result = self
                .wait_for_backend_state_change(&backend_path, &mut state)
                .and_then(|()| match state {
                    XenbusState::Unknown => Err(Error::Unsuccessful),
                    _ => Ok(()),
                });
            if let Err(e) = result {
                self.remove_watch(inner);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Publish the ring, retrying the whole transaction on conflict
    fn publish(&self) -> Result<()> {
        let store = &self.context.store;

        loop {
            let transaction = store.transaction_start()?;

            if let Err(e) = self.ring.store_write(&transaction) {
                if let Err(e) = store.transaction_end(transaction, false) {
                    warn!("{}: failed to abort transaction: {}", self.path, e);
                }
                return Err(e);
            }

            match store.transaction_end(transaction, true) {
                Err(Error::Retry) => debug!("{}: transaction conflict, retrying", self.path),
                result => return result,
            }
        }
    }

    fn connect(&self, inner: &mut Inner) -> Result<()> {
        trace!("{}: connect", self.path);

        let backend_path = inner.backend_path.clone().ok_or(Error::NotReady)?;

        self.ring.connect(&backend_path, inner.backend_domain)?;

        if let Err(e) = self.publish() {
            error!("{}: failed to publish ring: {}", self.path, e);
            self.ring.disconnect();
            return Err(e);
        }

        self.set_xenbus_state(&backend_path, XenbusState::Initialised);

        let mut state = XenbusState::Unknown;
        loop {
            if let Err(e) = self.wait_for_backend_state_change(&backend_path, &mut state) {
                self.ring.disconnect();
                return Err(e);
            }

            match state {
                XenbusState::InitWait | XenbusState::Initialising | XenbusState::Initialised => {}
                _ => break,
            }
        }

        if state != XenbusState::Connected {
            error!("{}: backend went to {} instead of connecting", self.path, state);
            self.ring.disconnect();
            return Err(Error::Unsuccessful);
        }

        self.set_xenbus_state(&backend_path, XenbusState::Connected);

        Ok(())
    }

    /// Move towards `target`, one adjacent state at a time
    ///
    /// On failure the frontend is left in a state less connected than
    /// `target` and the first error is returned.
    pub fn set_state(&self, target: FrontendState) -> Result<()> {
        use FrontendState::*;

        let mut inner = self.lock();

        info!("{}: ====> '{}' -> '{}'", self.path, inner.state, target);

        let mut result = Ok(());

        while inner.state != target && result.is_ok() {
            match (inner.state, target) {
                (Unknown, _) => {
                    result = self.close(&mut inner);
                    if result.is_ok() {
                        inner.state = Closed;
                    }
                }
                (Closing, _) => {
                    self.ring.disconnect();
                    inner.state = Closed;
                }
                (Closed, Unknown) => {
                    inner.backend_path = None;
                    inner.backend_domain = DOMID_INVALID;
                    inner.state = Unknown;
                }
                (Closed, Closing) => break,
                (Closed, _) => match self.prepare(&mut inner) {
                    Ok(()) => inner.state = Prepared,
                    Err(e) => {
                        if let Err(e) = self.close(&mut inner) {
                            warn!("{}: failed to close after prepare: {}", self.path, e);
                        }
                        inner.state = Closed;
                        result = Err(e);
                    }
                },
                (Prepared, Connected) | (Prepared, Enabled) => match self.connect(&mut inner) {
                    Ok(()) => inner.state = Connected,
                    Err(e) => {
                        if let Err(e) = self.close(&mut inner) {
                            warn!("{}: failed to close after connect: {}", self.path, e);
                        }
                        inner.state = Closed;
                        result = Err(e);
                    }
                },
                (Prepared, _) => {
                    if let Err(e) = self.close(&mut inner) {
                        warn!("{}: backend did not close: {}", self.path, e);
                    }
                    inner.state = Closed;
                }
                (Connected, Enabled) => {
                    result = self.ring.enable();
                    if result.is_ok() {
                        inner.state = Enabled;
                    }
                }
                (Connected, _) => {
                    if let Err(e) = self.close(&mut inner) {
                        warn!("{}: backend did not close: {}", self.path, e);
                    }
                    inner.state = Closing;
                }
                (Enabled, _) => {
                    self.ring.disable();
                    inner.state = Connected;
                }
            }

            info!("{}: in state '{}'", self.path, inner.state);
        }

        info!("{}: <====", self.path);

        result
    }

    fn sync_eject_watcher(&self) {
        self.eject_event.clear();

        match self.eject_thread.lock().as_ref() {
            Some(thread) => thread.wake(),
            None => return,
        }

        trace!("{}: waiting for eject thread", self.path);
        self.eject_event.wait();
    }

    fn register_suspend_callbacks(&self) -> Result<()> {
        let suspend = &self.context.suspend;

        let frontend = self.this.clone();
        let early = suspend.register(
            SuspendPriority::Early,
            Arc::new(move || {
                if let Some(frontend) = frontend.upgrade() {
                    frontend.online.store(false, Ordering::SeqCst);
                }
            }),
        )?;

        let frontend = self.this.clone();
        let late = match suspend.register(
            SuspendPriority::Late,
            Arc::new(move || {
                if let Some(frontend) = frontend.upgrade() {
                    frontend.resume_after_suspend();
                }
            }),
        ) {
            Ok(late) => late,
            Err(e) => {
                suspend.deregister(early);
                return Err(e);
            }
        };

        let mut inner = self.lock();
        inner.suspend_early = Some(early);
        inner.suspend_late = Some(late);

        Ok(())
    }

    fn resume_after_suspend(&self) {
        info!("{}: domain resumed", self.path);

        if let Err(e) = self.set_state(FrontendState::Unknown) {
            warn!("{}: failed to reset after suspend: {}", self.path, e);
        }

        self.online.store(true, Ordering::SeqCst);

        if let Err(e) = self.set_state(FrontendState::Closed) {
            warn!("{}: failed to close after suspend: {}", self.path, e);
        }
    }

    /// Bring the frontend up to CLOSED and follow domain suspend and resume
    pub fn resume(&self) -> Result<()> {
        trace!("{}: resume", self.path);

        let suspend = &self.context.suspend;
        suspend.acquire()?;

        self.online.store(true, Ordering::SeqCst);

        if let Err(e) = self.set_state(FrontendState::Closed) {
            warn!("{}: failed to close: {}", self.path, e);
        }

        if let Err(e) = self.register_suspend_callbacks() {
            error!("{}: failed to register suspend callbacks: {}", self.path, e);

            if let Err(e) = self.set_state(FrontendState::Unknown) {
                warn!("{}: failed to reset: {}", self.path, e);
            }
            suspend.release();
            return Err(e);
        }

        self.sync_eject_watcher();

        Ok(())
    }

    /// Tear the connection down to UNKNOWN
    pub fn suspend(&self) {
        trace!("{}: suspend", self.path);

        let suspend = &self.context.suspend;

        let (late, early) = {
            let mut inner = self.lock();
            (inner.suspend_late.take(), inner.suspend_early.take())
        };

        for callback in late.into_iter().chain(early) {
            suspend.deregister(callback);
        }

        if let Err(e) = self.set_state(FrontendState::Unknown) {
            warn!("{}: failed to reset: {}", self.path, e);
        }

        suspend.release();

        self.sync_eject_watcher();
    }

    /// Report a vetoed removal to tools outside the guest
    pub fn eject_failed(&self) {
        let _inner = self.lock();

        info!("{}: device eject failed", self.path);

        let path = format!("error/{}", self.path);
        if let Err(e) = self.context.store.printf(
            None,
            Some(&path),
            "error",
            format_args!("UNPLUG FAILED: device is still in use"),
        ) {
            error!("{}: failed to report eject failure: {}", self.path, e);
        }
    }

    /// Stop the eject watcher, the frontend must have been suspended
    pub fn teardown(&self) {
        let state = self.state();
        if state != FrontendState::Unknown {
            warn!("{}: torn down in state '{}'", self.path, state);
        }

        let thread = self.eject_thread.lock().take();
        if let Some(thread) = thread {
            thread.alert();
            thread.join();
        }

        info!("{}: destroyed", self.path);
    }
}
