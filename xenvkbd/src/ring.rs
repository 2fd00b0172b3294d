//! Shared keyboard ring
//!
//! The backend produces input events into the inbound ring of a page granted
//! to it and signals an event channel. A DPC drains the ring, folding each
//! event into the keyboard or absolute mouse report and offering the updated
//! report to the HID context. A report that cannot be delivered stays pending
//! until the HID minidriver asks for it.
//!
//! Reports are offered with the ring lock dropped: the minidriver callback
//! completes requests, and their originators may call straight back into the
//! ring or the frontend.

use {
    crate::{
        context::Context,
        dpc::Dpc,
        hid::{
            keycode_to_usage, AbsMouseReport, HidContext, KeyboardReport, ABSMOUSE_REPORT_ID,
            ABSMOUSE_REPORT_LENGTH, BTN_EXTRA, BTN_LEFT, KEYBOARD_REPORT_ID,
            KEYBOARD_REPORT_LENGTH,
        },
    },
    core::{
        ptr,
        sync::atomic::{fence, AtomicU32, AtomicU64, Ordering},
    },
    log::{debug, error, info, trace, warn},
    memoffset::offset_of,
    spin::Mutex,
    std::sync::{Arc, Weak},
    xenbus::{
        debug::DebugCallback,
        evtchn::Channel,
        grant_table::{GnttabCache, GnttabEntry},
        memory::Page,
        store::Transaction,
        xen_sys::{
            domid_t, xenkbd_in_event, xenkbd_page, XENKBD_IN_EVENT_SIZE, XENKBD_IN_RING_LEN,
            XENKBD_IN_RING_OFFS, XENKBD_TYPE_KEY, XENKBD_TYPE_MOTION, XENKBD_TYPE_MTOUCH,
            XENKBD_TYPE_POS,
        },
        Error, Result,
    },
};

/// Number of event slots in the inbound ring
pub const IN_RING_SLOTS: u32 = XENKBD_IN_RING_LEN as u32;

/// Keyboard page shared with the backend
struct SharedPage(Page);

impl SharedPage {
    fn index(&self, offset: usize) -> &AtomicU32 {
        // page aligned, and every index field of xenkbd_page is a naturally aligned u32
        unsafe { &*(self.0.as_ptr().add(offset) as *const AtomicU32) }
    }

    fn in_cons(&self) -> &AtomicU32 {
        self.index(offset_of!(xenkbd_page, in_cons))
    }

    fn in_prod(&self) -> &AtomicU32 {
        self.index(offset_of!(xenkbd_page, in_prod))
    }

    fn out_cons(&self) -> &AtomicU32 {
        self.index(offset_of!(xenkbd_page, out_cons))
    }

    fn out_prod(&self) -> &AtomicU32 {
        self.index(offset_of!(xenkbd_page, out_prod))
    }

    /// Copy out the event at `index`
    fn in_event(&self, index: u32) -> xenkbd_in_event {
        let slot = (index % IN_RING_SLOTS) as usize;

        unsafe {
            ptr::read_volatile(
                self.0
                    .as_ptr()
                    .add(XENKBD_IN_RING_OFFS + slot * XENKBD_IN_EVENT_SIZE)
                    as *const xenkbd_in_event,
            )
        }
    }
}

/// Decoded inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputEvent {
    Motion { dx: i32, dy: i32, dz: i32 },
    Key { keycode: u32, pressed: bool },
    Position { x: i32, y: i32, dz: i32 },
    MultiTouch { event_type: u8, contact_id: u8 },
    Unknown(u8),
}

impl From<&xenkbd_in_event> for InputEvent {
    fn from(event: &xenkbd_in_event) -> Self {
        // every member starts with the type byte
        unsafe {
            match event.type_ {
                XENKBD_TYPE_MOTION => InputEvent::Motion {
                    dx: event.motion.rel_x,
                    dy: event.motion.rel_y,
                    dz: event.motion.rel_z,
                },
                XENKBD_TYPE_KEY => InputEvent::Key {
                    keycode: event.key.keycode,
                    pressed: event.key.pressed != 0,
                },
                XENKBD_TYPE_POS => InputEvent::Position {
                    x: event.pos.abs_x,
                    y: event.pos.abs_y,
                    dz: event.pos.rel_z,
                },
                XENKBD_TYPE_MTOUCH => InputEvent::MultiTouch {
                    event_type: event.mtouch.event_type,
                    contact_id: event.mtouch.contact_id,
                },
                other => InputEvent::Unknown(other),
            }
        }
    }
}

const REPORT_MAX_LENGTH: usize = if KEYBOARD_REPORT_LENGTH > ABSMOUSE_REPORT_LENGTH {
    KEYBOARD_REPORT_LENGTH
} else {
    ABSMOUSE_REPORT_LENGTH
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportKind {
    Keyboard = 0,
    Mouse = 1,
}

/// Snapshot of a report on its way to the HID context
struct Delivery {
    kind: ReportKind,
    generation: u64,
    report: [u8; REPORT_MAX_LENGTH],
    length: usize,
}

impl Delivery {
    fn report(&self) -> &[u8] {
        &self.report[..self.length]
    }
}

#[derive(Debug, Default)]
struct Reports {
    keyboard: KeyboardReport,
    mouse: AbsMouseReport,
    pending: [bool; 2],
    /// Bumped whenever a report changes, so a late delivery result cannot
    /// overwrite the pending state of a newer report
    generation: [u64; 2],
}

impl Reports {
    fn is_pending(&self, kind: ReportKind) -> bool {
        self.pending[kind as usize]
    }

    /// Take `kind` for delivery, it is no longer pending while in flight
    fn take(&mut self, kind: ReportKind) -> Delivery {
        let mut report = [0; REPORT_MAX_LENGTH];
        let length = match kind {
            ReportKind::Keyboard => {
                report[..KEYBOARD_REPORT_LENGTH].copy_from_slice(&self.keyboard.to_bytes());
                KEYBOARD_REPORT_LENGTH
            }
            ReportKind::Mouse => {
                report[..ABSMOUSE_REPORT_LENGTH].copy_from_slice(&self.mouse.to_bytes());
                ABSMOUSE_REPORT_LENGTH
            }
        };

        self.pending[kind as usize] = false;

        Delivery {
            kind,
            generation: self.generation[kind as usize],
            report,
            length,
        }
    }

    /// `kind` was updated by an event
    fn changed(&mut self, kind: ReportKind) -> Delivery {
        self.generation[kind as usize] += 1;
        self.take(kind)
    }

    /// Next pending report, keyboard first
    fn take_pending(&mut self) -> Option<Delivery> {
        [ReportKind::Keyboard, ReportKind::Mouse]
            .iter()
            .find(|kind| self.is_pending(**kind))
            .map(|kind| self.take(*kind))
    }

    /// Record the outcome of `delivery` unless its report has changed since
    fn settle(&mut self, delivery: &Delivery, pending: bool) {
        let kind = delivery.kind as usize;

        if self.generation[kind] == delivery.generation {
            self.pending[kind] = pending;
        }
    }

    fn reset(&mut self) {
        let generation = self.generation;

        *self = Self {
            generation: [generation[0] + 1, generation[1] + 1],
            ..Self::default()
        };
    }
}

struct Connection {
    cache: GnttabCache,
    page: SharedPage,
    entry: GnttabEntry,
    channel: Channel,
    debug: DebugCallback,
}

#[derive(Default)]
struct RingState {
    connection: Option<Connection>,
    enabled: bool,
    abs_pointer: bool,
    raw_pointer: bool,
    reports: Reports,
}

/// Inbound event ring of one keyboard frontend
pub struct Ring {
    path: String,
    context: Arc<Context>,
    hid: Arc<HidContext>,
    this: Weak<Ring>,
    state: Mutex<RingState>,
    dpc: Dpc,
    events: AtomicU64,
}

impl Ring {
    pub(crate) fn new(context: Arc<Context>, hid: Arc<HidContext>, path: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            path: path.to_owned(),
            context,
            hid,
            this: this.clone(),
            state: Mutex::new(RingState::default()),
            dpc: Dpc::new(),
            events: AtomicU64::new(0),
        })
    }

    /// Whether the ring page is shared with a backend
    pub fn is_connected(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    /// Whether events are being decoded
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Number of event channel notifications received since connecting
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Number of DPC runs
    pub fn dpcs(&self) -> u64 {
        self.dpc.runs()
    }

    fn acquire_interfaces(&self) -> Result<()> {
        let context = &self.context;

        context.debug.acquire()?;

        if let Err(e) = context.store.acquire() {
            context.debug.release();
            return Err(e);
        }

        if let Err(e) = context.evtchn.acquire() {
            context.store.release();
            context.debug.release();
            return Err(e);
        }

        if let Err(e) = context.gnttab.acquire() {
            context.evtchn.release();
            context.store.release();
            context.debug.release();
            return Err(e);
        }

        Ok(())
    }

    fn release_interfaces(&self) {
        let context = &self.context;

        context.gnttab.release();
        context.evtchn.release();
        context.store.release();
        context.debug.release();
    }

    fn read_feature(&self, backend_path: &str, node: &str) -> bool {
        self.context
            .store
            .read_u32(None, Some(backend_path), node, 2)
            .map(|value| value != 0)
            .unwrap_or(false)
    }

    /// Share a fresh page with `domain` and open a channel for it to signal
    fn share(&self, cache: &GnttabCache, domain: domid_t) -> Result<(SharedPage, GnttabEntry, Channel)> {
        let gnttab = &self.context.gnttab;

        let page = Page::new()?;

        let entry = gnttab.permit_foreign_access(cache, domain, page.pfn(), false)?;

        let ring = self.this.clone();
        let callback = Arc::new(move || {
            if let Some(ring) = ring.upgrade() {
                ring.interrupt();
            }
        });

        let channel = match self.context.evtchn.open_unbound(domain, callback) {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(e) = gnttab.revoke_foreign_access(cache, entry) {
                    error!("{}: failed to revoke grant: {}", self.path, e);
                }
                return Err(e);
            }
        };

        Ok((SharedPage(page), entry, channel))
    }

    fn register_debug(&self) -> Result<DebugCallback> {
        let ring = self.this.clone();

        self.context.debug.register(
            "XENVKBD|RING",
            Arc::new(move |crashing| {
                if let Some(ring) = ring.upgrade() {
                    ring.debug_callback(crashing);
                }
            }),
        )
    }

    /// Share the ring with the backend in `domain`
    ///
    /// Every step is undone in reverse order if a later one fails.
    pub fn connect(&self, backend_path: &str, domain: domid_t) -> Result<()> {
        trace!("{}: ring: connect to {} ({})", self.path, backend_path, domain);

        if self.is_connected() {
            return Err(Error::InvalidParameter);
        }

        self.acquire_interfaces()?;

        let gnttab = &self.context.gnttab;
        let evtchn = &self.context.evtchn;

        let cache = match gnttab.create_cache(&format!("{}/ring", self.path)) {
            Ok(cache) => cache,
            Err(e) => {
                self.release_interfaces();
                return Err(e);
            }
        };

        let abs_pointer = self.read_feature(backend_path, "feature-abs-pointer");
        let raw_pointer = self.read_feature(backend_path, "feature-raw-pointer");

        debug!(
            "{}: ring: abs-pointer {} raw-pointer {}",
            self.path, abs_pointer, raw_pointer
        );

        let shared = if self.context.config.require_raw_pointer && !raw_pointer {
            warn!("{}: ring: backend does not offer raw pointer events", self.path);
            Err(Error::DeviceNotReady)
        } else {
            self.share(&cache, domain)
        };

        let (page, entry, channel) = match shared {
            Ok(shared) => shared,
            Err(e) => {
                gnttab.destroy_cache(cache);
                self.release_interfaces();
                return Err(e);
            }
        };

        evtchn.unmask(&channel);

        let debug = match self.register_debug() {
            Ok(debug) => debug,
            Err(e) => {
                evtchn.close(channel);
                if let Err(e) = gnttab.revoke_foreign_access(&cache, entry) {
                    error!("{}: failed to revoke grant: {}", self.path, e);
                }
                drop(page);
                gnttab.destroy_cache(cache);
                self.release_interfaces();
                return Err(e);
            }
        };

        info!(
            "{}: ring: connected, page-gref {} event-channel {}",
            self.path,
            gnttab.reference(&entry),
            evtchn.port(&channel)
        );

        let mut state = self.state.lock();
        state.abs_pointer = abs_pointer;
        state.raw_pointer = raw_pointer;
        state.connection = Some(Connection {
            cache,
            page,
            entry,
            channel,
            debug,
        });

        Ok(())
    }

    /// Publish the ring in the frontend area of the store
    ///
    /// Called once per attempt of the enclosing transaction.
    pub fn store_write(&self, transaction: &Transaction) -> Result<()> {
        let state = self.state.lock();
        let connection = state.connection.as_ref().ok_or(Error::NotReady)?;

        let store = &self.context.store;
        let prefix = Some(self.path.as_str());
        let transaction = Some(transaction);

        store.printf(
            transaction,
            prefix,
            "page-gref",
            format_args!("{}", self.context.gnttab.reference(&connection.entry)),
        )?;

        // legacy backends map the frame directly
        store.printf(
            transaction,
            prefix,
            "page-ref",
            format_args!("{}", connection.page.0.pfn().0),
        )?;

        store.printf(
            transaction,
            prefix,
            "event-channel",
            format_args!("{}", self.context.evtchn.port(&connection.channel)),
        )?;

        store.printf(
            transaction,
            prefix,
            "request-abs-pointer",
            format_args!("{}", u32::from(state.abs_pointer)),
        )?;

        store.printf(
            transaction,
            prefix,
            "request-raw-pointer",
            format_args!("{}", u32::from(state.raw_pointer)),
        )?;

        Ok(())
    }

    /// Start decoding events, including any produced while disabled
    pub fn enable(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.connection.is_none() {
                return Err(Error::NotReady);
            }

            state.enabled = true;
        }

        debug!("{}: ring: enabled", self.path);

        self.notify();

        Ok(())
    }

    /// Stop decoding events
    pub fn disable(&self) {
        self.state.lock().enabled = false;

        debug!("{}: ring: disabled", self.path);
    }

    /// Undo `connect`
    pub fn disconnect(&self) {
        let connection = {
            let mut state = self.state.lock();
            state.enabled = false;
            state.connection.take()
        };

        let connection = match connection {
            Some(connection) => connection,
            None => {
                warn!("{}: ring: not connected", self.path);
                return;
            }
        };

        trace!("{}: ring: disconnect", self.path);

        let gnttab = &self.context.gnttab;

        self.context.debug.deregister(connection.debug);

        self.context.evtchn.close(connection.channel);
        self.events.store(0, Ordering::Relaxed);

        if let Err(e) = gnttab.revoke_foreign_access(&connection.cache, connection.entry) {
            error!("{}: ring: failed to revoke grant: {}", self.path, e);
        }

        drop(connection.page);

        {
            let mut state = self.state.lock();
            state.reports.reset();
            state.abs_pointer = false;
            state.raw_pointer = false;
        }

        gnttab.destroy_cache(connection.cache);

        self.release_interfaces();

        info!("{}: ring: disconnected", self.path);
    }

    /// Schedule a drain of the ring
    pub fn notify(&self) {
        self.dpc.queue(|| self.poll());
    }

    fn interrupt(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.notify();
    }

    fn poll(&self) {
        loop {
            let delivery = {
                let mut guard = self.state.lock();
                let state = &mut *guard;

                if !state.enabled {
                    return;
                }

                let connection = match state.connection.as_ref() {
                    Some(connection) => connection,
                    None => return,
                };
                let shared = &connection.page;

                fence(Ordering::SeqCst);

                let cons = shared.in_cons().load(Ordering::Relaxed);
                let prod = shared.in_prod().load(Ordering::Acquire);

                if cons == prod {
                    self.context.evtchn.unmask(&connection.channel);
                    return;
                }

                fence(Ordering::SeqCst);

                let event = shared.in_event(cons);

                fence(Ordering::SeqCst);

                shared.in_cons().store(cons.wrapping_add(1), Ordering::Release);

                self.process(&mut state.reports, InputEvent::from(&event))
            };

            if let Some(delivery) = delivery {
                self.deliver(delivery);
            }
        }
    }

    /// Fold `event` into the reports, returning the report to offer if one changed
    fn process(&self, reports: &mut Reports, event: InputEvent) -> Option<Delivery> {
        match event {
            InputEvent::Motion { dx, dy, dz } => {
                reports.mouse.motion(dx, dy, dz);
                Some(reports.changed(ReportKind::Mouse))
            }
            InputEvent::Key { keycode, pressed } if (BTN_LEFT..=BTN_EXTRA).contains(&keycode) => {
                reports.mouse.button(keycode - BTN_LEFT, pressed);
                Some(reports.changed(ReportKind::Mouse))
            }
            InputEvent::Key { keycode, pressed } => {
                let usage = keycode_to_usage(keycode);
                if usage == 0 {
                    trace!("{}: ring: no usage for keycode {}", self.path, keycode);
                    return None;
                }

                reports.keyboard.key(usage, pressed);
                Some(reports.changed(ReportKind::Keyboard))
            }
            InputEvent::Position { x, y, dz } => {
                reports.mouse.position(x, y, dz);
                Some(reports.changed(ReportKind::Mouse))
            }
            InputEvent::MultiTouch {
                event_type,
                contact_id,
            } => {
                trace!(
                    "{}: ring: MTOUCH: {} {}",
                    self.path,
                    event_type,
                    contact_id
                );
                None
            }
            InputEvent::Unknown(type_) => {
                debug!("{}: ring: UNKNOWN: {}", self.path, type_);
                None
            }
        }
    }

    /// Offer a report to the HID context, the ring lock must not be held
    fn deliver(&self, delivery: Delivery) {
        let pending = self.hid.send_read_report(delivery.report());

        self.state.lock().reports.settle(&delivery, pending);
    }

    /// Offer one pending report, keyboard first
    pub fn read_report(&self) {
        let delivery = self.state.lock().reports.take_pending();

        if let Some(delivery) = delivery {
            self.deliver(delivery);
        }
    }

    /// Copy the current report with id `report_id` into `buffer`
    pub fn get_input_report(&self, report_id: u8, buffer: &mut [u8]) -> Result<usize> {
        let state = self.state.lock();

        match report_id {
            KEYBOARD_REPORT_ID => copy_report(buffer, &state.reports.keyboard.to_bytes()),
            ABSMOUSE_REPORT_ID => copy_report(buffer, &state.reports.mouse.to_bytes()),
            _ => Err(Error::NotSupported),
        }
    }

    fn debug_callback(&self, _crashing: bool) {
        let state = self.state.lock();
        let debug = &self.context.debug;

        debug.printf(format_args!(
            "{} [{}]\n",
            self.path,
            if state.enabled { "ENABLED" } else { "DISABLED" }
        ));

        if let Some(connection) = &state.connection {
            let shared = &connection.page;

            debug.printf(format_args!(
                "in_cons = {} in_prod = {} out_cons = {} out_prod = {}\n",
                shared.in_cons().load(Ordering::Relaxed),
                shared.in_prod().load(Ordering::Relaxed),
                shared.out_cons().load(Ordering::Relaxed),
                shared.out_prod().load(Ordering::Relaxed),
            ));

            debug.printf(format_args!(
                "page-gref = {} event-channel = {}\n",
                self.context.gnttab.reference(&connection.entry),
                self.context.evtchn.port(&connection.channel),
            ));
        }

        debug.printf(format_args!(
            "dpcs = {} events = {}\n",
            self.dpcs(),
            self.events()
        ));

        let keyboard = &state.reports.keyboard;
        debug.printf(format_args!(
            "KBD: {:02x} {:02x} {:02x?}{}\n",
            KEYBOARD_REPORT_ID,
            keyboard.modifiers.bits(),
            keyboard.keys,
            if state.reports.is_pending(ReportKind::Keyboard) {
                " PENDING"
            } else {
                ""
            }
        ));

        let mouse = &state.reports.mouse;
        debug.printf(format_args!(
            "MOU: {:02x} {:02x} {:04x} {:04x} {:02x}{}\n",
            ABSMOUSE_REPORT_ID,
            mouse.buttons.bits(),
            mouse.x,
            mouse.y,
            mouse.dz,
            if state.reports.is_pending(ReportKind::Mouse) {
                " PENDING"
            } else {
                ""
            }
        ));
    }
}

fn copy_report(buffer: &mut [u8], report: &[u8]) -> Result<usize> {
    if buffer.len() < report.len() {
        return Err(Error::BufferTooSmall {
            required: report.len(),
        });
    }

    buffer[..report.len()].copy_from_slice(report);

    Ok(report.len())
}
