//! Simulated backend domain shared by the integration tests

#![allow(dead_code)]

use {
    log::LevelFilter,
    memoffset::offset_of,
    std::{
        ptr,
        sync::{
            atomic::{AtomicU32, Ordering},
            mpsc::{self, Receiver},
            Arc, Mutex,
        },
        thread,
        time::{Duration, Instant},
    },
    xenbus::{
        mock::{MockConsole, MockDebug, MockEvtchn, MockGnttab, MockStore, MockSuspend},
        xen_sys::{
            domid_t, evtchn_port_t, grant_ref_t, xenkbd_key, xenkbd_motion, xenkbd_page,
            xenkbd_position, XENKBD_IN_EVENT_SIZE, XENKBD_IN_RING_LEN, XENKBD_IN_RING_OFFS,
            XENKBD_TYPE_KEY, XENKBD_TYPE_MOTION, XENKBD_TYPE_POS,
        },
    },
    xenvkbd::{
        hid::HidContext,
        logger,
        queue::{CancelHandle, Completion, Request, RequestKind},
        Bus, Config, Context, HidFdo, Pdo,
    },
};

pub const NAME: &str = "0";
pub const FRONTEND: &str = "device/vkbd/0";
pub const BACKEND: &str = "backend/vkbd/1/0";
pub const BACKEND_DOMAIN: domid_t = 1;

pub const KEY_Q: u32 = 16;
pub const KEY_W: u32 = 17;
pub const KEY_E: u32 = 18;
pub const KEY_R: u32 = 19;
pub const KEY_T: u32 = 20;
pub const KEY_Y: u32 = 21;
pub const KEY_U: u32 = 22;
pub const KEY_A: u32 = 30;
pub const KEY_LEFTSHIFT: u32 = 42;
pub const BTN_LEFT: u32 = 0x110;

/// Bus that records every eject request
#[derive(Default)]
pub struct RecordingBus(Mutex<Vec<String>>);

impl RecordingBus {
    pub fn ejects(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Bus for RecordingBus {
    fn request_eject(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_owned());
    }
}

/// Event the backend places on the inbound ring
#[derive(Debug, Clone, Copy)]
pub enum Input {
    Key(u32, bool),
    Motion(i32, i32, i32),
    Position(i32, i32, i32),
    Raw(u8),
}

impl Input {
    unsafe fn write(self, slot: *mut u8) {
        ptr::write_bytes(slot, 0, XENKBD_IN_EVENT_SIZE);

        match self {
            Input::Key(keycode, pressed) => ptr::write_unaligned(
                slot as *mut xenkbd_key,
                xenkbd_key {
                    type_: XENKBD_TYPE_KEY,
                    pressed: u8::from(pressed),
                    keycode,
                },
            ),
            Input::Motion(rel_x, rel_y, rel_z) => ptr::write_unaligned(
                slot as *mut xenkbd_motion,
                xenkbd_motion {
                    type_: XENKBD_TYPE_MOTION,
                    rel_x,
                    rel_y,
                    rel_z,
                },
            ),
            Input::Position(abs_x, abs_y, rel_z) => ptr::write_unaligned(
                slot as *mut xenkbd_position,
                xenkbd_position {
                    type_: XENKBD_TYPE_POS,
                    abs_x,
                    abs_y,
                    rel_z,
                },
            ),
            Input::Raw(type_) => *slot = type_,
        }
    }
}

pub struct Backend {
    pub store: Arc<MockStore>,
    pub evtchn: Arc<MockEvtchn>,
    pub gnttab: Arc<MockGnttab>,
    pub suspend: Arc<MockSuspend>,
    pub debug: Arc<MockDebug>,
    pub console: Arc<MockConsole>,
    pub bus: Arc<RecordingBus>,
    pub context: Arc<Context>,
}

pub fn config() -> Config {
    Config::default()
        .with_backend_timeout(Duration::from_secs(5))
        .with_watch_poll(10, Duration::from_millis(1))
}

impl Backend {
    /// A backend that follows the frontend through the whole handshake
    pub fn new() -> Self {
        let backend = Self::silent(config());
        backend.follow_frontend();
        backend
    }

    /// A backend that publishes its nodes but never changes state by itself
    pub fn silent(config: Config) -> Self {
        let _ = logger::init(LevelFilter::Debug);

        let store = Arc::new(MockStore::new());
        let evtchn = Arc::new(MockEvtchn::new());
        let gnttab = Arc::new(MockGnttab::new());
        let suspend = Arc::new(MockSuspend::new());
        let debug = Arc::new(MockDebug::new());
        let console = Arc::new(MockConsole::new(0));
        let bus = Arc::new(RecordingBus::default());

        store.write(&format!("{}/backend", FRONTEND), BACKEND);
        store.write(&format!("{}/backend-id", FRONTEND), &BACKEND_DOMAIN.to_string());
        store.write(&format!("{}/state", BACKEND), "2");
        store.write(&format!("{}/online", BACKEND), "1");
        store.write(&format!("{}/feature-abs-pointer", BACKEND), "1");
        store.write(&format!("{}/feature-raw-pointer", BACKEND), "1");

        let context = Arc::new(Context {
            store: store.clone(),
            evtchn: evtchn.clone(),
            gnttab: gnttab.clone(),
            suspend: suspend.clone(),
            debug: debug.clone(),
            console: console.clone(),
            bus: bus.clone(),
            config,
        });

        Self {
            store,
            evtchn,
            gnttab,
            suspend,
            debug,
            console,
            bus,
            context,
        }
    }

    /// Answer every frontend state with the backend state that lets the handshake proceed
    pub fn follow_frontend(&self) {
        self.answer(&[("1", "2"), ("3", "4"), ("5", "5"), ("6", "6")]);
    }

    /// Write backend state `to` whenever the frontend writes state `from`
    pub fn answer(&self, table: &[(&'static str, &'static str)]) {
        let table = table.to_vec();
        let frontend_state = format!("{}/state", FRONTEND);
        let backend_state = format!("{}/state", BACKEND);

        self.store.add_hook(Arc::new(move |store: &MockStore, path: &str, value: Option<&str>| {
            if path != frontend_state {
                return;
            }

            let reply = table
                .iter()
                .find(|(from, _)| Some(*from) == value)
                .map(|(_, to)| *to);

            if let Some(reply) = reply {
                store.write(&backend_state, reply);
            }
        }));
    }

    pub fn frontend_node(&self, node: &str) -> Option<String> {
        self.store.get(&format!("{}/{}", FRONTEND, node))
    }

    pub fn backend_state(&self) -> Option<String> {
        self.store.get(&format!("{}/state", BACKEND))
    }

    pub fn gref(&self) -> grant_ref_t {
        self.frontend_node("page-gref").unwrap().parse().unwrap()
    }

    pub fn port(&self) -> evtchn_port_t {
        self.frontend_node("event-channel").unwrap().parse().unwrap()
    }

    fn with_page<R, F: FnOnce(*mut u8) -> R>(&self, f: F) -> R {
        self.gnttab
            .map(self.gref(), BACKEND_DOMAIN)
            .unwrap()
            .with(f)
            .unwrap()
    }

    fn index(page: *mut u8, offset: usize) -> &'static AtomicU32 {
        unsafe { &*(page.add(offset) as *const AtomicU32) }
    }

    /// Place events on the ring without signalling the frontend
    pub fn produce(&self, events: &[Input]) {
        self.with_page(|page| {
            let in_prod = Self::index(page, offset_of!(xenkbd_page, in_prod));
            let mut prod = in_prod.load(Ordering::Relaxed);

            for event in events {
                let slot = (prod as usize) % XENKBD_IN_RING_LEN;
                unsafe { event.write(page.add(XENKBD_IN_RING_OFFS + slot * XENKBD_IN_EVENT_SIZE)) };
                prod = prod.wrapping_add(1);
            }

            in_prod.store(prod, Ordering::Release);
        })
    }

    /// Signal the frontend
    pub fn notify(&self) -> bool {
        self.evtchn.trigger(self.port())
    }

    pub fn send(&self, events: &[Input]) {
        self.produce(events);
        self.notify();
    }

    /// (in_cons, in_prod)
    pub fn indices(&self) -> (u32, u32) {
        self.with_page(|page| {
            (
                Self::index(page, offset_of!(xenkbd_page, in_cons)).load(Ordering::Acquire),
                Self::index(page, offset_of!(xenkbd_page, in_prod)).load(Ordering::Acquire),
            )
        })
    }
}

/// A started device whose HID interface is bound to a function device
pub struct Device {
    pub pdo: Arc<Pdo>,
    pub fdo: Arc<HidFdo>,
}

impl Device {
    pub fn start(backend: &Backend) -> Self {
        let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();

        pdo.resume().unwrap();
        pdo.d3_to_d0().unwrap();

        let fdo = Arc::new(HidFdo::new(pdo.hid().clone()));
        fdo.d3_to_d0().unwrap();

        Self { pdo, fdo }
    }

    pub fn hid(&self) -> &Arc<HidContext> {
        self.pdo.hid()
    }

    pub fn stop(self) {
        self.fdo.d0_to_d3();
        self.pdo.d0_to_d3();
        self.pdo.suspend();
        self.pdo.destroy();
    }
}

/// Build a request whose completion is sent down a channel
pub fn request(
    kind: RequestKind,
    buffer: Vec<u8>,
) -> (Request, CancelHandle, Receiver<Completion>) {
    let (sender, receiver) = mpsc::channel();
    let (request, handle) = Request::new(kind, buffer, move |completion| {
        let _ = sender.send(completion);
    });

    (request, handle, receiver)
}

pub fn completion(receiver: &Receiver<Completion>) -> Completion {
    receiver.recv_timeout(Duration::from_secs(5)).unwrap()
}

/// Poll `condition` until it holds or a few seconds pass
pub fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }

    condition()
}
