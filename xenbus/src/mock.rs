//! In-memory bus used to exercise frontends without a hypervisor
//!
//! Each mock implements one bus interface and also exposes the other end of
//! it, so that tests can play the part of the backend domain: writing store
//! nodes, raising events and mapping granted pages.

use {
    crate::{
        console::{ConsoleInterface, Wakeup},
        debug::{DebugCallback, DebugFn, DebugInterface},
        evtchn::{Channel, EvtchnCallback, EvtchnInterface},
        grant_table::{FreeList, GnttabCache, GnttabEntry, GnttabInterface},
        memory::{PageFrameNumber, VirtualAddress},
        store::{self, StoreInterface, Transaction, Watch},
        suspend::{SuspendCallback, SuspendFn, SuspendInterface, SuspendPriority},
        Error, Notify, References, Result,
    },
    alloc::{
        collections::VecDeque,
        string::{String, ToString},
        sync::Arc,
        vec::Vec,
    },
    core::{
        cmp, fmt,
        sync::atomic::{AtomicU32, Ordering},
    },
    hashbrown::HashMap,
    log::trace,
    spin::Mutex,
    xen_sys::{domid_t, evtchn_port_t, grant_ref_t},
};

/// Hook run after every committed change to the store, with the changed path
/// and its new value (`None` for a removal)
pub type StoreHook = Arc<dyn Fn(&MockStore, &str, Option<&str>) + Send + Sync>;

type Change = (String, Option<String>);

/// Interface operation a mock can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `acquire` of any interface
    Acquire,
    /// `GnttabInterface::create_cache`
    CreateCache,
    /// `GnttabInterface::permit_foreign_access`
    PermitForeignAccess,
    /// `EvtchnInterface::open_unbound`
    OpenUnbound,
    /// `DebugInterface::register`
    Register,
}

/// Operations armed to fail once each
#[derive(Default)]
struct Faults(Mutex<Vec<(Operation, Error)>>);

impl Faults {
    fn arm(&self, operation: Operation, error: Error) {
        self.0.lock().push((operation, error));
    }

    fn check(&self, operation: Operation) -> Result<()> {
        let mut faults = self.0.lock();

        match faults.iter().position(|(armed, _)| *armed == operation) {
            Some(index) => {
                let (_, error) = faults.remove(index);
                trace!("failing {:?} with {}", operation, error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct StoreState {
    nodes: HashMap<String, String>,
    watches: HashMap<u64, (String, Arc<dyn Notify>)>,
    transactions: HashMap<u32, Vec<Change>>,
    hooks: Vec<StoreHook>,
    next_id: u64,
    conflicts: u32,
    commits: u32,
    aborts: u32,
    polls: u32,
}

impl StoreState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn exists(&self, path: &str) -> bool {
        self.nodes
            .keys()
            .any(|node| node == path || is_below(node, path))
    }

    fn apply(&mut self, path: &str, value: Option<&str>) {
        match value {
            Some(value) => {
                self.nodes.insert(path.to_string(), value.to_string());
            }
            None => self
                .nodes
                .retain(|node, _| node != path && !is_below(node, path)),
        }
    }

    fn watchers(&self, path: &str, removal: bool) -> Vec<Arc<dyn Notify>> {
        self.watches
            .values()
            .filter(|(watched, _)| {
                watched == path || is_below(path, watched) || (removal && is_below(watched, path))
            })
            .map(|(_, notify)| notify.clone())
            .collect()
    }
}

/// Whether `path` lies strictly below `parent`
fn is_below(path: &str, parent: &str) -> bool {
    path.len() > parent.len() && path.starts_with(parent) && path[parent.len()..].starts_with('/')
}

/// Store held in memory
///
/// Watches fire when registered and whenever a node at or below the watched
/// path changes. Writes inside a transaction become visible when it commits.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<StoreState>,
    references: References,
    faults: Faults,
}

impl MockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a node outside of any transaction
    pub fn write(&self, path: &str, value: &str) {
        self.commit(alloc::vec![(path.to_string(), Some(value.to_string()))]);
    }

    /// Remove a node and its children outside of any transaction
    pub fn delete(&self, path: &str) {
        self.commit(alloc::vec![(path.to_string(), None)]);
    }

    /// Current value of a node
    pub fn get(&self, path: &str) -> Option<String> {
        self.state.lock().nodes.get(path).cloned()
    }

    /// Run `hook` after every committed change
    pub fn add_hook(&self, hook: StoreHook) {
        self.state.lock().hooks.push(hook);
    }

    /// Make the next `count` committing transactions fail with `Error::Retry`
    pub fn inject_conflicts(&self, count: u32) {
        self.state.lock().conflicts = count;
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: Error) {
        self.faults.arm(operation, error);
    }

    /// Number of transactions committed
    pub fn commits(&self) -> u32 {
        self.state.lock().commits
    }

    /// Number of transactions aborted by the caller
    pub fn aborts(&self) -> u32 {
        self.state.lock().aborts
    }

    /// Number of registered watches
    pub fn watches(&self) -> usize {
        self.state.lock().watches.len()
    }

    /// Number of times the transport was polled
    pub fn polls(&self) -> u32 {
        self.state.lock().polls
    }

    /// Number of outstanding interface references
    pub fn references(&self) -> usize {
        self.references.count()
    }

    fn commit(&self, changes: Vec<Change>) {
        let (notify, hooks) = {
            let mut state = self.state.lock();
            let mut notify = Vec::new();

            for (path, value) in &changes {
                state.apply(path, value.as_deref());
                notify.extend(state.watchers(path, value.is_none()));
            }

            (notify, state.hooks.clone())
        };

        for n in notify {
            n.notify();
        }

        for (path, value) in &changes {
            for hook in &hooks {
                hook(self, path, value.as_deref());
            }
        }
    }
}

impl StoreInterface for MockStore {
    fn acquire(&self) -> Result<()> {
        self.faults.check(Operation::Acquire)?;
        self.references.acquire(|| Ok(()))
    }

    fn release(&self) {
        self.references.release(|| ())
    }

    fn read(
        &self,
        transaction: Option<&Transaction>,
        prefix: Option<&str>,
        node: &str,
    ) -> Result<String> {
        let path = store::path(prefix, node);
        let state = self.state.lock();

        if let Some(transaction) = transaction {
            let changes = state
                .transactions
                .get(&transaction.id())
                .ok_or(Error::InvalidParameter)?;

            for (changed, value) in changes.iter().rev() {
                if *changed == path {
                    return value.clone().ok_or(Error::NotFound);
                }
                if value.is_none() && is_below(&path, changed) {
                    return Err(Error::NotFound);
                }
            }
        }

        state.nodes.get(&path).cloned().ok_or(Error::NotFound)
    }

    fn printf(
        &self,
        transaction: Option<&Transaction>,
        prefix: Option<&str>,
        node: &str,
        args: fmt::Arguments,
    ) -> Result<()> {
        let path = store::path(prefix, node);
        let value = alloc::fmt::format(args);

        trace!("store write {} = {}", path, value);

        match transaction {
            Some(transaction) => self
                .state
                .lock()
                .transactions
                .get_mut(&transaction.id())
                .ok_or(Error::InvalidParameter)
                .map(|changes| changes.push((path, Some(value)))),
            None => {
                self.commit(alloc::vec![(path, Some(value))]);
                Ok(())
            }
        }
    }

    fn remove(
        &self,
        transaction: Option<&Transaction>,
        prefix: Option<&str>,
        node: &str,
    ) -> Result<()> {
        let path = store::path(prefix, node);

        match transaction {
            Some(transaction) => self
                .state
                .lock()
                .transactions
                .get_mut(&transaction.id())
                .ok_or(Error::InvalidParameter)
                .map(|changes| changes.push((path, None))),
            None => {
                if !self.state.lock().exists(&path) {
                    return Err(Error::NotFound);
                }

                self.commit(alloc::vec![(path, None)]);
                Ok(())
            }
        }
    }

    fn watch_add(
        &self,
        prefix: Option<&str>,
        node: &str,
        notify: Arc<dyn Notify>,
    ) -> Result<Watch> {
        let path = store::path(prefix, node);

        let id = {
            let mut state = self.state.lock();
            let id = state.next_id();
            state.watches.insert(id, (path, notify.clone()));
            id
        };

        notify.notify();

        Ok(Watch::new(id))
    }

    fn watch_remove(&self, watch: Watch) -> Result<()> {
        self.state
            .lock()
            .watches
            .remove(&watch.id())
            .map(|_| ())
            .ok_or(Error::NotFound)
    }

    fn transaction_start(&self) -> Result<Transaction> {
        let mut state = self.state.lock();
        let id = state.next_id() as u32;

        state.transactions.insert(id, Vec::new());

        Ok(Transaction::new(id))
    }

    fn transaction_end(&self, transaction: Transaction, commit: bool) -> Result<()> {
        let changes = {
            let mut state = self.state.lock();
            let changes = state
                .transactions
                .remove(&transaction.id())
                .ok_or(Error::InvalidParameter)?;

            if !commit {
                state.aborts += 1;
                return Ok(());
            }

            if state.conflicts != 0 {
                state.conflicts -= 1;
                return Err(Error::Retry);
            }

            state.commits += 1;
            changes
        };

        self.commit(changes);

        Ok(())
    }

    fn poll(&self) {
        self.state.lock().polls += 1;
    }
}

struct Port {
    domain: domid_t,
    callback: EvtchnCallback,
    masked: bool,
    pending: bool,
    sent: u32,
}

#[derive(Default)]
struct EvtchnState {
    ports: HashMap<evtchn_port_t, Port>,
    next_port: evtchn_port_t,
}

/// Event channels delivered by direct call
///
/// A triggered port is masked before its callback runs. Events raised on a
/// masked port are held pending and delivered when it is unmasked.
#[derive(Default)]
pub struct MockEvtchn {
    state: Mutex<EvtchnState>,
    references: References,
    faults: Faults,
}

impl MockEvtchn {
    /// Create a bus with no open channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise an event from the remote end, returns whether the callback ran
    pub fn trigger(&self, port: evtchn_port_t) -> bool {
        let callback = {
            let mut state = self.state.lock();
            let p = match state.ports.get_mut(&port) {
                Some(p) => p,
                None => return false,
            };

            if p.masked {
                p.pending = true;
                return false;
            }

            p.masked = true;
            p.callback.clone()
        };

        callback();
        true
    }

    /// Whether a port is open
    pub fn is_open(&self, port: evtchn_port_t) -> bool {
        self.state.lock().ports.contains_key(&port)
    }

    /// Whether a port is masked
    pub fn is_masked(&self, port: evtchn_port_t) -> Option<bool> {
        self.state.lock().ports.get(&port).map(|p| p.masked)
    }

    /// Domain a port was opened for
    pub fn remote_domain(&self, port: evtchn_port_t) -> Option<domid_t> {
        self.state.lock().ports.get(&port).map(|p| p.domain)
    }

    /// Number of notifications sent to the remote end on a port
    pub fn sent(&self, port: evtchn_port_t) -> u32 {
        self.state.lock().ports.get(&port).map_or(0, |p| p.sent)
    }

    /// Number of open ports
    pub fn open_ports(&self) -> usize {
        self.state.lock().ports.len()
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: Error) {
        self.faults.arm(operation, error);
    }

    /// Number of outstanding interface references
    pub fn references(&self) -> usize {
        self.references.count()
    }
}

impl EvtchnInterface for MockEvtchn {
    fn acquire(&self) -> Result<()> {
        self.faults.check(Operation::Acquire)?;
        self.references.acquire(|| Ok(()))
    }

    fn release(&self) {
        self.references.release(|| ())
    }

    fn open_unbound(&self, domain: domid_t, callback: EvtchnCallback) -> Result<Channel> {
        self.faults.check(Operation::OpenUnbound)?;

        let mut state = self.state.lock();

        state.next_port += 1;
        let port = state.next_port;

        state.ports.insert(
            port,
            Port {
                domain,
                callback,
                masked: true,
                pending: false,
                sent: 0,
            },
        );

        Ok(Channel::new(port))
    }

    fn unmask(&self, channel: &Channel) {
        let callback = {
            let mut state = self.state.lock();
            let p = match state.ports.get_mut(&channel.port()) {
                Some(p) => p,
                None => return,
            };

            p.masked = false;
            if !p.pending {
                return;
            }

            p.pending = false;
            p.masked = true;
            p.callback.clone()
        };

        callback();
    }

    fn send(&self, channel: &Channel) {
        if let Some(p) = self.state.lock().ports.get_mut(&channel.port()) {
            p.sent += 1;
        }
    }

    fn close(&self, channel: Channel) {
        self.state.lock().ports.remove(&channel.port());
    }
}

const MOCK_GRANT_ENTRIES: usize = 128;

struct Grant {
    cache: u32,
    domain: domid_t,
    frame: PageFrameNumber,
    readonly: bool,
}

struct GnttabState {
    free: FreeList,
    grants: HashMap<grant_ref_t, Grant>,
    caches: HashMap<u32, String>,
    next_cache: u32,
}

/// Grant table that lets the test map granted pages as the remote domain would
pub struct MockGnttab {
    state: Arc<Mutex<GnttabState>>,
    references: References,
    faults: Faults,
}

impl Default for MockGnttab {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGnttab {
    /// Create an empty grant table
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GnttabState {
                free: FreeList::new(MOCK_GRANT_ENTRIES),
                grants: HashMap::new(),
                caches: HashMap::new(),
                next_cache: 0,
            })),
            references: References::new(),
            faults: Faults::default(),
        }
    }

    /// Map a granted page as `domain`
    pub fn map(&self, reference: grant_ref_t, domain: domid_t) -> Result<ForeignPage> {
        let state = self.state.lock();
        let grant = state.grants.get(&reference).ok_or(Error::NotFound)?;

        if grant.domain != domain {
            return Err(Error::InvalidParameter);
        }

        Ok(ForeignPage {
            state: self.state.clone(),
            reference,
            frame: grant.frame,
            writable: !grant.readonly,
        })
    }

    /// Whether a reference currently grants access
    pub fn is_granted(&self, reference: grant_ref_t) -> bool {
        self.state.lock().grants.contains_key(&reference)
    }

    /// Number of live grants
    pub fn grants(&self) -> usize {
        self.state.lock().grants.len()
    }

    /// Number of live caches
    pub fn caches(&self) -> usize {
        self.state.lock().caches.len()
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: Error) {
        self.faults.arm(operation, error);
    }

    /// Number of outstanding interface references
    pub fn references(&self) -> usize {
        self.references.count()
    }
}

impl GnttabInterface for MockGnttab {
    fn acquire(&self) -> Result<()> {
        self.faults.check(Operation::Acquire)?;
        self.references.acquire(|| Ok(()))
    }

    fn release(&self) {
        self.references.release(|| ())
    }

    fn create_cache(&self, name: &str) -> Result<GnttabCache> {
        self.faults.check(Operation::CreateCache)?;

        let mut state = self.state.lock();

        state.next_cache += 1;
        let id = state.next_cache;
        state.caches.insert(id, name.to_string());

        Ok(GnttabCache::new(id, name.to_string()))
    }

    fn destroy_cache(&self, cache: GnttabCache) {
        let mut state = self.state.lock();

        debug_assert!(
            !state.grants.values().any(|g| g.cache == cache.id()),
            "cache destroyed with live grants"
        );
        state.caches.remove(&cache.id());
    }

    fn permit_foreign_access(
        &self,
        cache: &GnttabCache,
        domain: domid_t,
        frame: PageFrameNumber,
        readonly: bool,
    ) -> Result<GnttabEntry> {
        self.faults.check(Operation::PermitForeignAccess)?;

        let mut state = self.state.lock();

        if !state.caches.contains_key(&cache.id()) {
            return Err(Error::InvalidParameter);
        }

        let reference = state.free.get_free_entry()?;
        state.grants.insert(
            reference,
            Grant {
                cache: cache.id(),
                domain,
                frame,
                readonly,
            },
        );

        trace!("granting access {} {} {} {}", domain, frame.0, readonly, reference);

        Ok(GnttabEntry::new(reference))
    }

    fn revoke_foreign_access(&self, cache: &GnttabCache, entry: GnttabEntry) -> Result<()> {
        let mut state = self.state.lock();

        match state.grants.get(&entry.reference()) {
            Some(grant) if grant.cache == cache.id() => (),
            _ => return Err(Error::InvalidParameter),
        }

        state.grants.remove(&entry.reference());
        state.free.put_free_entry(entry.reference());

        Ok(())
    }
}

/// A granted page as seen from the remote domain
pub struct ForeignPage {
    state: Arc<Mutex<GnttabState>>,
    reference: grant_ref_t,
    frame: PageFrameNumber,
    writable: bool,
}

impl ForeignPage {
    /// Run `f` with a pointer to the page
    ///
    /// Fails once the grant has been revoked. The grant table is locked while
    /// `f` runs so the owner cannot free the page underneath it.
    pub fn with<R, F: FnOnce(*mut u8) -> R>(&self, f: F) -> Result<R> {
        let state = self.state.lock();

        match state.grants.get(&self.reference) {
            Some(grant) if grant.frame == self.frame => (),
            _ => return Err(Error::NotFound),
        }

        Ok(f(VirtualAddress::from(self.frame).0 as *mut u8))
    }

    /// Whether the page was granted writable
    pub fn writable(&self) -> bool {
        self.writable
    }
}

#[derive(Default)]
struct SuspendState {
    callbacks: HashMap<u64, (SuspendPriority, SuspendFn)>,
    next_id: u64,
}

/// Suspend interface whose resume is triggered by the test
#[derive(Default)]
pub struct MockSuspend {
    state: Mutex<SuspendState>,
    references: References,
    count: AtomicU32,
}

impl MockSuspend {
    /// Create a suspend interface with no callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a suspend and resume of the domain
    pub fn trigger(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);

        let mut early = Vec::new();
        let mut late = Vec::new();
        {
            let state = self.state.lock();
            let mut ids: Vec<_> = state.callbacks.keys().copied().collect();
            ids.sort_unstable();

            for id in ids {
                if let Some((priority, callback)) = state.callbacks.get(&id) {
                    match priority {
                        SuspendPriority::Early => early.push(callback.clone()),
                        SuspendPriority::Late => late.push(callback.clone()),
                    }
                }
            }
        }

        for callback in early.iter().chain(late.iter()) {
            callback();
        }
    }

    /// Number of registered callbacks
    pub fn callbacks(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    /// Number of outstanding interface references
    pub fn references(&self) -> usize {
        self.references.count()
    }
}

impl SuspendInterface for MockSuspend {
    fn acquire(&self) -> Result<()> {
        self.references.acquire(|| Ok(()))
    }

    fn release(&self) {
        self.references.release(|| ())
    }

    fn register(
        &self,
        priority: SuspendPriority,
        callback: SuspendFn,
    ) -> Result<SuspendCallback> {
        let mut state = self.state.lock();

        state.next_id += 1;
        let id = state.next_id;
        state.callbacks.insert(id, (priority, callback));

        Ok(SuspendCallback::new(id))
    }

    fn deregister(&self, callback: SuspendCallback) {
        self.state.lock().callbacks.remove(&callback.id());
    }

    fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct DebugState {
    callbacks: HashMap<u64, (String, DebugFn)>,
    output: Vec<String>,
    next_id: u64,
}

/// Debug interface collecting dump output in memory
#[derive(Default)]
pub struct MockDebug {
    state: Mutex<DebugState>,
    references: References,
    faults: Faults,
}

impl MockDebug {
    /// Create a debug interface with no callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every registered dump callback
    pub fn dump(&self, crashing: bool) {
        let callbacks: Vec<_> = {
            let state = self.state.lock();
            let mut callbacks: Vec<_> = state
                .callbacks
                .iter()
                .map(|(id, (_, callback))| (*id, callback.clone()))
                .collect();
            callbacks.sort_unstable_by_key(|(id, _)| *id);
            callbacks
        };

        for (_, callback) in callbacks {
            callback(crashing);
        }
    }

    /// Lines emitted so far
    pub fn output(&self) -> Vec<String> {
        self.state.lock().output.clone()
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: Error) {
        self.faults.arm(operation, error);
    }

    /// Number of registered callbacks
    pub fn callbacks(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    /// Number of outstanding interface references
    pub fn references(&self) -> usize {
        self.references.count()
    }
}

impl DebugInterface for MockDebug {
    fn acquire(&self) -> Result<()> {
        self.faults.check(Operation::Acquire)?;
        self.references.acquire(|| Ok(()))
    }

    fn release(&self) {
        self.references.release(|| ())
    }

    fn register(&self, prefix: &str, callback: DebugFn) -> Result<DebugCallback> {
        self.faults.check(Operation::Register)?;

        let mut state = self.state.lock();

        state.next_id += 1;
        let id = state.next_id;
        state.callbacks.insert(id, (prefix.to_string(), callback));

        Ok(DebugCallback::new(id))
    }

    fn deregister(&self, callback: DebugCallback) {
        self.state.lock().callbacks.remove(&callback.id());
    }

    fn printf(&self, args: fmt::Arguments) {
        self.state.lock().output.push(alloc::fmt::format(args));
    }
}

#[derive(Default)]
struct ConsoleState {
    input: VecDeque<u8>,
    output: Vec<u8>,
    space: usize,
    wakeups: HashMap<u64, Arc<dyn Notify>>,
    next_id: u64,
}

/// Console whose input and output space are controlled by the test
#[derive(Default)]
pub struct MockConsole {
    state: Mutex<ConsoleState>,
    references: References,
}

impl MockConsole {
    /// Create a console that accepts up to `space` bytes of output
    pub fn new(space: usize) -> Self {
        let console = Self::default();
        console.state.lock().space = space;
        console
    }

    /// Queue input from the backend
    pub fn push_input(&self, bytes: &[u8]) {
        self.state.lock().input.extend(bytes.iter().copied());
        self.wake();
    }

    /// Make room for more output
    pub fn set_write_space(&self, space: usize) {
        self.state.lock().space = space;
        self.wake();
    }

    /// Take everything written so far
    pub fn take_output(&self) -> Vec<u8> {
        core::mem::take(&mut self.state.lock().output)
    }

    /// Number of registered wakeups
    pub fn wakeups(&self) -> usize {
        self.state.lock().wakeups.len()
    }

    /// Number of outstanding interface references
    pub fn references(&self) -> usize {
        self.references.count()
    }

    fn wake(&self) {
        let wakeups: Vec<_> = self.state.lock().wakeups.values().cloned().collect();

        for wakeup in wakeups {
            wakeup.notify();
        }
    }
}

impl ConsoleInterface for MockConsole {
    fn acquire(&self) -> Result<()> {
        self.references.acquire(|| Ok(()))
    }

    fn release(&self) {
        self.references.release(|| ())
    }

    fn can_read(&self) -> bool {
        !self.state.lock().input.is_empty()
    }

    fn can_write(&self) -> bool {
        self.state.lock().space != 0
    }

    fn read(&self, buffer: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let count = cmp::min(buffer.len(), state.input.len());

        for (dst, src) in buffer.iter_mut().zip(state.input.drain(..count)) {
            *dst = src;
        }

        count
    }

    fn write(&self, buffer: &[u8]) -> usize {
        let mut state = self.state.lock();
        let count = cmp::min(buffer.len(), state.space);

        state.output.extend_from_slice(&buffer[..count]);
        state.space -= count;

        count
    }

    fn wakeup_add(&self, notify: Arc<dyn Notify>) -> Result<Wakeup> {
        let mut state = self.state.lock();

        state.next_id += 1;
        let id = state.next_id;
        state.wakeups.insert(id, notify);

        Ok(Wakeup::new(id))
    }

    fn wakeup_remove(&self, wakeup: Wakeup) {
        self.state.lock().wakeups.remove(&wakeup.id());
    }
}
