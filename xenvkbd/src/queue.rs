//! Cancel-safe request queue
//!
//! Requests that cannot be serviced yet wait here. A request may be cancelled
//! by its originator at any time; whichever of the cancel path and a dequeuing
//! worker takes it out of the list first owns its completion. A request is
//! consumed when completed, so it cannot be completed twice, and a request
//! dropped without completion completes itself as cancelled.

use {
    log::trace,
    spin::Mutex,
    std::{
        fmt,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Weak,
        },
    },
    xenbus::{Error, Notify, Result},
};

/// How a request finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Serviced
    Success,
    /// Cancelled while waiting
    Cancelled,
    /// The device went away while the request was waiting
    NotReady,
    /// Serviced unsuccessfully
    Failed(Error),
}

/// Operation a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Read into the request buffer
    Read,
    /// Write the request buffer
    Write,
    /// Wait for the next input report
    ReadReport,
    /// Fetch the current input report with the given id
    GetInputReport(u8),
}

/// Outcome handed back to the originator of a request
#[derive(Debug)]
pub struct Completion {
    /// Final status
    pub status: Status,
    /// Number of bytes transferred
    pub information: usize,
    /// The request buffer
    pub buffer: Vec<u8>,
}

type CompletionFn = Box<dyn FnOnce(Completion) + Send>;

struct Shared {
    cancelled: AtomicBool,
    owner: Mutex<Option<(Weak<Inner>, Slot)>>,
}

/// An I/O request
pub struct Request {
    kind: RequestKind,
    buffer: Vec<u8>,
    shared: Arc<Shared>,
    completion: Option<CompletionFn>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("kind", &self.kind)
            .field("length", &self.buffer.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Request {
    /// Create a request, returning it with the handle its originator cancels it through
    pub fn new<F>(kind: RequestKind, buffer: Vec<u8>, completion: F) -> (Self, CancelHandle)
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            cancelled: AtomicBool::new(false),
            owner: Mutex::new(None),
        });

        let request = Self {
            kind,
            buffer,
            shared: shared.clone(),
            completion: Some(Box::new(completion)),
        };

        (request, CancelHandle(shared))
    }

    /// Operation requested
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Request buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Request buffer, for operations that fill it
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Whether the originator has asked for the request to be cancelled
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Finish the request
    pub fn complete(mut self, status: Status, information: usize) {
        self.finish(status, information);
    }

    fn finish(&mut self, status: Status, information: usize) {
        if let Some(completion) = self.completion.take() {
            trace!("complete {:?} {:?} ({} bytes)", self.kind, status, information);

            completion(Completion {
                status,
                information,
                buffer: std::mem::take(&mut self.buffer),
            });
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        self.finish(Status::Cancelled, 0);
    }
}

/// Originator's handle for cancelling a request
#[derive(Clone)]
pub struct CancelHandle(Arc<Shared>);

impl CancelHandle {
    /// Cancel the request
    ///
    /// If the request is queued it is removed and completed with the queue's
    /// cancellation status. If a worker holds it, the worker's completion
    /// stands, or the request is cancelled when the worker puts it back.
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);

        let owner = self.0.owner.lock().clone();
        if let Some((queue, slot)) = owner {
            if let Some(queue) = queue.upgrade() {
                queue.cancel(slot, &self.0);
            }
        }
    }
}

/// Position of a queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    index: usize,
    generation: u64,
}

struct Node {
    request: Option<Request>,
    generation: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked list threaded through a vector, so that removal by slot is O(1)
#[derive(Default)]
struct List {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    generation: u64,
}

impl List {
    fn allocate(&mut self, request: Request) -> usize {
        self.generation += 1;

        let node = Node {
            request: Some(request),
            generation: self.generation,
            prev: None,
            next: None,
        };

        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn slot(&self, index: usize) -> Slot {
        Slot {
            index,
            generation: self.nodes[index].generation,
        }
    }

    fn push_back(&mut self, request: Request) -> Slot {
        let index = self.allocate(request);

        self.nodes[index].prev = self.tail;
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        self.slot(index)
    }

    fn push_front(&mut self, request: Request) -> Slot {
        let index = self.allocate(request);

        self.nodes[index].next = self.head;
        match self.head {
            Some(head) => self.nodes[head].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.len += 1;

        self.slot(index)
    }

    fn contains(&self, slot: Slot) -> bool {
        self.nodes
            .get(slot.index)
            .map_or(false, |node| node.generation == slot.generation && node.request.is_some())
    }

    fn get(&self, slot: Slot) -> Option<&Request> {
        if !self.contains(slot) {
            return None;
        }

        self.nodes[slot.index].request.as_ref()
    }

    fn remove(&mut self, slot: Slot) -> Option<Request> {
        if !self.contains(slot) {
            return None;
        }

        let (prev, next) = {
            let node = &self.nodes[slot.index];
            (node.prev, node.next)
        };

        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }

        let node = &mut self.nodes[slot.index];
        node.prev = None;
        node.next = None;
        self.free.push(slot.index);
        self.len -= 1;

        node.request.take()
    }

    fn front(&self) -> Option<Slot> {
        self.head.map(|index| self.slot(index))
    }

    fn next(&self, slot: Slot) -> Option<Slot> {
        if !self.contains(slot) {
            return None;
        }

        self.nodes[slot.index].next.map(|index| self.slot(index))
    }
}

struct Inner {
    name: String,
    list: Mutex<List>,
    cancel_status: Status,
    wakeup: Mutex<Option<Arc<dyn Notify>>>,
}

impl Inner {
    fn take(&self, list: &mut List, slot: Slot) -> Option<Request> {
        let request = list.remove(slot)?;
        *request.shared.owner.lock() = None;
        Some(request)
    }

    fn cancel(&self, slot: Slot, shared: &Arc<Shared>) {
        let request = {
            let mut list = self.list.lock();

            let queued = list
                .get(slot)
                .map_or(false, |request| Arc::ptr_eq(&request.shared, shared));

            if queued {
                self.take(&mut list, slot)
            } else {
                None
            }
        };

        if let Some(request) = request {
            trace!("{}: cancelled {:?}", self.name, request.kind());
            self.complete_canceled(request);
        }
    }

    fn complete_canceled(&self, request: Request) {
        request.complete(self.cancel_status, 0);
    }
}

/// Queue of requests waiting for a device to become able to service them
#[derive(Clone)]
pub struct CancelSafeQueue {
    inner: Arc<Inner>,
}

impl CancelSafeQueue {
    /// Create an empty queue whose cancelled requests complete with `cancel_status`
    pub fn new(name: &str, cancel_status: Status) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_owned(),
                list: Mutex::new(List::default()),
                cancel_status,
                wakeup: Mutex::new(None),
            }),
        }
    }

    /// Notify `notify` whenever a request is inserted at the tail
    pub fn set_wakeup(&self, notify: Arc<dyn Notify>) {
        *self.inner.wakeup.lock() = Some(notify);
    }

    /// Queue a request
    ///
    /// A new request goes to the tail and wakes the worker. A request a worker
    /// dequeued but found still blocked is put back at the head with
    /// `reinsert`. A request that was cancelled before it could be queued is
    /// completed as cancelled and `Error::Cancelled` is returned.
    pub fn insert(&self, request: Request, reinsert: bool) -> Result<()> {
        let shared = request.shared.clone();

        let cancelled = {
            let mut list = self.inner.list.lock();

            let slot = if reinsert {
                list.push_front(request)
            } else {
                list.push_back(request)
            };

            *shared.owner.lock() = Some((Arc::downgrade(&self.inner), slot));

            if shared.cancelled.load(Ordering::SeqCst) {
                self.inner.take(&mut list, slot)
            } else {
                None
            }
        };

        if let Some(request) = cancelled {
            self.inner.complete_canceled(request);
            return Err(Error::Cancelled);
        }

        if !reinsert {
            let wakeup = self.inner.wakeup.lock().clone();
            if let Some(wakeup) = wakeup {
                wakeup.notify();
            }
        }

        Ok(())
    }

    /// Remove a specific request
    pub fn remove(&self, slot: Slot) -> Option<Request> {
        let mut list = self.inner.list.lock();
        self.inner.take(&mut list, slot)
    }

    /// Position of the request after `cursor`, or of the first request if `cursor` is `None`
    pub fn peek_next(&self, cursor: Option<Slot>) -> Option<Slot> {
        let list = self.inner.list.lock();

        match cursor {
            Some(cursor) => list.next(cursor),
            None => list.front(),
        }
    }

    /// Remove the request at the head
    pub fn remove_next(&self) -> Option<Request> {
        let mut list = self.inner.list.lock();
        let slot = list.front()?;

        self.inner.take(&mut list, slot)
    }

    /// Complete a request that was cancelled while queued
    pub fn complete_canceled(&self, request: Request) {
        self.inner.complete_canceled(request)
    }

    /// Remove and cancel every queued request
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;

        while let Some(request) = self.remove_next() {
            self.complete_canceled(request);
            count += 1;
        }

        count
    }

    /// Number of queued requests
    pub fn len(&self) -> usize {
        self.inner.list.lock().len
    }

    /// Whether no request is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::{atomic::AtomicU32, Mutex as StdMutex},
            thread,
        },
    };

    fn recorder() -> (
        Arc<StdMutex<Vec<(usize, Status)>>>,
        impl Fn(usize) -> Box<dyn FnOnce(Completion) + Send>,
    ) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let l = log.clone();

        (log, move |id| -> Box<dyn FnOnce(Completion) + Send> {
            let l = l.clone();
            Box::new(move |c: Completion| l.lock().unwrap().push((id, c.status)))
        })
    }

    fn request(
        id: usize,
        done: &impl Fn(usize) -> Box<dyn FnOnce(Completion) + Send>,
    ) -> (Request, CancelHandle) {
        Request::new(RequestKind::Read, vec![id as u8], done(id))
    }

    #[test]
    fn fifo_order_with_reinsert_at_head() {
        let queue = CancelSafeQueue::new("test", Status::Cancelled);
        let (_, done) = recorder();

        for id in 0..3 {
            queue.insert(request(id, &done).0, false).unwrap();
        }

        let first = queue.remove_next().unwrap();
        queue.insert(first, true).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| queue.remove_next())
            .map(|r| r.buffer()[0])
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn peek_walks_in_order() {
        let queue = CancelSafeQueue::new("test", Status::Cancelled);
        let (_, done) = recorder();

        for id in 0..3 {
            queue.insert(request(id, &done).0, false).unwrap();
        }

        let first = queue.peek_next(None).unwrap();
        let second = queue.peek_next(Some(first)).unwrap();
        let third = queue.peek_next(Some(second)).unwrap();
        assert_eq!(queue.peek_next(Some(third)), None);

        assert!(queue.remove(second).is_some());
        assert!(queue.remove(second).is_none());
        assert_eq!(queue.peek_next(Some(first)), Some(third));
    }

    #[test]
    fn cancel_completes_queued_request_once() {
        let queue = CancelSafeQueue::new("test", Status::NotReady);
        let (log, done) = recorder();

        let (r, handle) = request(7, &done);
        queue.insert(r, false).unwrap();

        handle.cancel();
        handle.cancel();

        assert!(queue.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![(7, Status::NotReady)]);
    }

    #[test]
    fn cancel_while_dequeued_completes_on_reinsert() {
        let queue = CancelSafeQueue::new("test", Status::Cancelled);
        let (log, done) = recorder();

        let (r, handle) = request(1, &done);
        queue.insert(r, false).unwrap();

        let r = queue.remove_next().unwrap();
        handle.cancel();
        assert!(log.lock().unwrap().is_empty());

        assert_eq!(queue.insert(r, true), Err(Error::Cancelled));
        assert_eq!(*log.lock().unwrap(), vec![(1, Status::Cancelled)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn stale_slot_does_not_remove_reused_node() {
        let queue = CancelSafeQueue::new("test", Status::Cancelled);
        let (_, done) = recorder();

        queue.insert(request(0, &done).0, false).unwrap();
        let stale = queue.peek_next(None).unwrap();
        let _ = queue.remove(stale).unwrap();

        queue.insert(request(1, &done).0, false).unwrap();
        assert!(queue.remove(stale).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn dropped_request_completes_cancelled() {
        let (log, done) = recorder();

        drop(request(3, &done));

        assert_eq!(*log.lock().unwrap(), vec![(3, Status::Cancelled)]);
    }

    #[test]
    fn insert_wakes_worker_only_at_tail() {
        #[derive(Default)]
        struct Wakes(AtomicU32);

        impl Notify for Wakes {
            fn notify(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let queue = CancelSafeQueue::new("test", Status::Cancelled);
        let wakes = Arc::new(Wakes::default());
        queue.set_wakeup(wakes.clone());
        let (_, done) = recorder();

        queue.insert(request(0, &done).0, false).unwrap();
        let r = queue.remove_next().unwrap();
        queue.insert(r, true).unwrap();

        assert_eq!(wakes.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_cancel_and_drain_complete_each_request_once() {
        let queue = CancelSafeQueue::new("test", Status::Cancelled);
        let (log, done) = recorder();

        let handles: Vec<_> = (0..200)
            .map(|id| {
                let (r, handle) = request(id, &done);
                queue.insert(r, false).unwrap();
                handle
            })
            .collect();

        let canceller = thread::spawn(move || {
            for handle in handles {
                handle.cancel();
            }
        });

        let worker = {
            let queue = queue.clone();
            thread::spawn(move || {
                while let Some(r) = queue.remove_next() {
                    r.complete(Status::Success, 0);
                }
            })
        };

        canceller.join().unwrap();
        worker.join().unwrap();
        queue.cancel_all();

        let mut ids: Vec<_> = log.lock().unwrap().iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..200).collect::<Vec<_>>());
    }
}
