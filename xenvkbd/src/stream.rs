//! Character stream over the PV console
//!
//! Reads and writes are queued and serviced by a worker thread whenever the
//! console signals input or output space.

use {
    crate::{
        queue::{CancelSafeQueue, Request, RequestKind, Status},
        thread::{Thread, ThreadContext},
    },
    log::{debug, trace, warn},
    spin::Mutex,
    std::sync::Arc,
    xenbus::{
        console::{ConsoleInterface, Wakeup},
        Error, Result,
    },
};

/// Byte stream bound to the console
pub struct Stream {
    console: Arc<dyn ConsoleInterface>,
    queue: CancelSafeQueue,
    thread: Mutex<Option<Thread>>,
    wakeup: Mutex<Option<Wakeup>>,
}

impl Stream {
    /// Open the console and start servicing requests
    pub fn create(console: Arc<dyn ConsoleInterface>) -> Result<Self> {
        console.acquire()?;

        let queue = CancelSafeQueue::new("console", Status::Cancelled);

        let worker = {
            let console = console.clone();
            let queue = queue.clone();
            Thread::create("console", move |thread| run(&*console, &queue, thread))
        };
        let thread = match worker {
            Ok(thread) => thread,
            Err(e) => {
                console.release();
                return Err(e);
            }
        };

        let wakeup = match console.wakeup_add(thread.event()) {
            Ok(wakeup) => wakeup,
            Err(e) => {
                thread.alert();
                thread.join();
                console.release();
                return Err(e);
            }
        };

        queue.set_wakeup(thread.event());

        debug!("console: stream open");

        Ok(Self {
            console,
            queue,
            thread: Mutex::new(Some(thread)),
            wakeup: Mutex::new(Some(wakeup)),
        })
    }

    /// Requests waiting for the console
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a read of console input into the request buffer
    pub fn read(&self, request: Request) -> Result<()> {
        self.submit(RequestKind::Read, request)
    }

    /// Queue a write of the request buffer to the console
    pub fn write(&self, request: Request) -> Result<()> {
        self.submit(RequestKind::Write, request)
    }

    fn submit(&self, kind: RequestKind, request: Request) -> Result<()> {
        if request.kind() != kind {
            request.complete(Status::Failed(Error::InvalidParameter), 0);
            return Err(Error::InvalidParameter);
        }

        if self.thread.lock().is_none() {
            request.complete(Status::Cancelled, 0);
            return Err(Error::NotReady);
        }

        self.queue.insert(request, false)
    }

    /// Stop the worker and cancel whatever is still queued
    pub fn destroy(&self) {
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            thread.alert();
            thread.join();
        }

        let count = self.queue.cancel_all();
        if count != 0 {
            debug!("console: cancelled {} requests", count);
        }

        let wakeup = self.wakeup.lock().take();
        if let Some(wakeup) = wakeup {
            self.console.wakeup_remove(wakeup);
            self.console.release();
        }

        debug!("console: stream closed");
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn run(console: &dyn ConsoleInterface, queue: &CancelSafeQueue, thread: &ThreadContext) {
    trace!("console: ====>");

    loop {
        thread.wait();

        if thread.is_alerted() {
            break;
        }

        while let Some(request) = queue.remove_next() {
            if let Some(request) = service(console, request) {
                // console is busy, retry once it signals
                if let Err(e) = queue.insert(request, true) {
                    debug!("console: request dropped on reinsert: {}", e);
                }
                break;
            }
        }
    }

    trace!("console: <====");
}

/// Service one request, handing it back if the console cannot take it yet
fn service(console: &dyn ConsoleInterface, mut request: Request) -> Option<Request> {
    match request.kind() {
        RequestKind::Read => {
            if !console.can_read() {
                return Some(request);
            }

            let length = console.read(request.buffer_mut());
            request.complete(Status::Success, length);
        }
        RequestKind::Write => {
            if !console.can_write() {
                return Some(request);
            }

            let length = console.write(request.buffer());
            request.complete(Status::Success, length);
        }
        kind => {
            warn!("console: unexpected request {:?}", kind);
            request.complete(Status::Failed(Error::InvalidParameter), 0);
        }
    }

    None
}
