//! Worker threads and notification events

use {
    log::{error, trace},
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Condvar, Mutex, MutexGuard, PoisonError,
        },
        thread::{self, JoinHandle},
        time::Duration,
    },
    xenbus::{Error, Notify, Result},
};

/// Notification event: stays signalled until explicitly cleared
#[derive(Debug, Default)]
pub struct Event {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl Event {
    /// Create an event in the cleared state
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.signalled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signal the event, releasing every waiter
    pub fn set(&self) {
        *self.lock() = true;
        self.condvar.notify_all();
    }

    /// Return the event to the cleared state
    pub fn clear(&self) {
        *self.lock() = false;
    }

    /// Whether the event is signalled
    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Block until the event is signalled
    pub fn wait(&self) {
        let mut signalled = self.lock();

        while !*signalled {
            signalled = self
                .condvar
                .wait(signalled)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the event is signalled or `timeout` passes, returns whether it was signalled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let signalled = self.lock();

        let (signalled, _) = self
            .condvar
            .wait_timeout_while(signalled, timeout, |signalled| !*signalled)
            .unwrap_or_else(PoisonError::into_inner);

        *signalled
    }
}

impl Notify for Event {
    fn notify(&self) {
        self.set()
    }
}

/// State visible to the body of a [`Thread`]
pub struct ThreadContext {
    event: Arc<Event>,
    alerted: Arc<AtomicBool>,
}

impl ThreadContext {
    /// Event used to wake the thread
    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    /// Whether the thread has been asked to exit
    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::SeqCst)
    }

    /// Block until woken, then clear the wake event
    pub fn wait(&self) {
        self.event.wait();
        self.event.clear();
    }
}

/// A named thread with a wake event and an alert flag
pub struct Thread {
    name: String,
    event: Arc<Event>,
    alerted: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Thread {
    /// Spawn a thread running `function`
    pub fn create<F>(name: &str, function: F) -> Result<Self>
    where
        F: FnOnce(&ThreadContext) + Send + 'static,
    {
        let event = Arc::new(Event::new());
        let alerted = Arc::new(AtomicBool::new(false));

        let context = ThreadContext {
            event: event.clone(),
            alerted: alerted.clone(),
        };

        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || function(&context))
            .map_err(|e| {
                error!("{}: failed to spawn thread: {}", name, e);
                Error::NoMemory
            })?;

        trace!("{}: created", name);

        Ok(Self {
            name: name.to_owned(),
            event,
            alerted,
            handle: Some(handle),
        })
    }

    /// Event used to wake the thread
    pub fn event(&self) -> Arc<Event> {
        self.event.clone()
    }

    /// Wake the thread
    pub fn wake(&self) {
        self.event.set();
    }

    /// Ask the thread to exit and wake it
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::SeqCst);
        self.wake();
    }

    /// Wait for the thread to exit
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{}: thread panicked", self.name);
            }
        }

        trace!("{}: joined", self.name);
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.alert();
        }
    }
}
