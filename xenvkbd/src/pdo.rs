//! Physical device object of one virtual keyboard

use {
    crate::{
        context::{Bus, Context},
        frontend::{Frontend, FrontendState},
        hid::HidContext,
    },
    log::{error, info, trace},
    spin::Mutex,
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    xenbus::{
        suspend::{SuspendCallback, SuspendPriority},
        Result,
    },
};

/// Device power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Working
    D0,
    /// Off
    D3,
}

/// Latch guarding requests to remove a device
pub struct Eject {
    name: String,
    bus: Arc<dyn Bus>,
    requested: AtomicBool,
}

impl Eject {
    /// Create a cleared latch for device `name`
    pub fn new(name: &str, bus: Arc<dyn Bus>) -> Self {
        Self {
            name: name.to_owned(),
            bus,
            requested: AtomicBool::new(false),
        }
    }

    /// Ask the bus to remove the device
    ///
    /// Only the first request after the latch was last cleared reaches the bus.
    pub fn request(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("{}: eject requested", self.name);

        self.bus.request_eject(&self.name);
    }

    /// Whether a removal is outstanding
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear the latch, returns whether it was set
    pub fn clear(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

/// Device object owning the frontend of one keyboard
pub struct Pdo {
    name: String,
    context: Arc<Context>,
    this: Weak<Pdo>,
    frontend: Arc<Frontend>,
    eject: Arc<Eject>,
    power: Mutex<PowerState>,
    suspend_late: Mutex<Option<SuspendCallback>>,
}

impl Pdo {
    /// Create the device `name`
    pub fn create(context: Arc<Context>, name: &str) -> Result<Arc<Self>> {
        let eject = Arc::new(Eject::new(name, context.bus.clone()));
        let frontend = Frontend::new(context.clone(), name, eject.clone())?;

        info!("{}: created", name);

        Ok(Arc::new_cyclic(|this| Self {
            name: name.to_owned(),
            context,
            this: this.clone(),
            frontend,
            eject,
            power: Mutex::new(PowerState::D3),
            suspend_late: Mutex::new(None),
        }))
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frontend of the device
    pub fn frontend(&self) -> &Arc<Frontend> {
        &self.frontend
    }

    /// HID interface of the device
    pub fn hid(&self) -> &Arc<HidContext> {
        self.frontend.hid()
    }

    /// Current power state
    pub fn power_state(&self) -> PowerState {
        *self.power.lock()
    }

    /// Bring the frontend up after the bus starts the device
    pub fn resume(&self) -> Result<()> {
        self.frontend.resume()
    }

    /// Take the frontend down before the bus stops the device
    pub fn suspend(&self) {
        self.frontend.suspend()
    }

    fn power_up(&self) -> Result<()> {
        trace!("({}) ====>", self.name);

        // input is only taken over once the HID minidriver enables the device
        self.frontend.set_state(FrontendState::Closed)?;

        *self.power.lock() = PowerState::D0;

        trace!("({}) <====", self.name);

        Ok(())
    }

    fn power_down(&self) {
        trace!("({}) ====>", self.name);

        *self.power.lock() = PowerState::D3;

        if let Err(e) = self.frontend.set_state(FrontendState::Closed) {
            error!("{}: failed to close: {}", self.name, e);
        }

        trace!("({}) <====", self.name);
    }

    /// Power the device on
    pub fn d3_to_d0(&self) -> Result<()> {
        let suspend = &self.context.suspend;

        suspend.acquire()?;

        if let Err(e) = self.power_up() {
            error!("{}: failed to power up: {}", self.name, e);
            suspend.release();
            return Err(e);
        }

        let pdo = self.this.clone();
        let callback = suspend.register(
            SuspendPriority::Late,
            Arc::new(move || {
                if let Some(pdo) = pdo.upgrade() {
                    pdo.power_down();
                    if let Err(e) = pdo.power_up() {
                        error!("{}: failed to power up after resume: {}", pdo.name, e);
                    }
                }
            }),
        );

        match callback {
            Ok(callback) => {
                *self.suspend_late.lock() = Some(callback);
                Ok(())
            }
            Err(e) => {
                error!("{}: failed to register suspend callback: {}", self.name, e);
                self.power_down();
                suspend.release();
                Err(e)
            }
        }
    }

    /// Power the device off
    pub fn d0_to_d3(&self) {
        let suspend = &self.context.suspend;

        let callback = self.suspend_late.lock().take();
        if let Some(callback) = callback {
            suspend.deregister(callback);
        }

        self.power_down();

        suspend.release();
    }

    /// Ask the bus to remove the device, at most once until the removal is cancelled
    pub fn request_eject(&self) {
        self.eject.request()
    }

    /// Whether a removal is outstanding
    pub fn is_eject_requested(&self) -> bool {
        self.eject.is_requested()
    }

    /// The bus vetoed the removal
    pub fn cancel_remove(&self) {
        if self.eject.clear() {
            self.frontend.eject_failed();
        }
    }

    /// Release the device, which must have been suspended
    pub fn destroy(&self) {
        self.frontend.teardown();

        info!("{}: destroyed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{Bus, Eject},
        std::sync::{Arc, Mutex},
    };

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Bus for Recorder {
        fn request_eject(&self, name: &str) {
            self.0.lock().unwrap().push(name.to_owned());
        }
    }

    #[test]
    fn eject_reaches_bus_once_per_latch() {
        let bus = Arc::new(Recorder::default());
        let eject = Eject::new("0", bus.clone());

        eject.request();
        eject.request();
        assert!(eject.is_requested());
        assert_eq!(*bus.0.lock().unwrap(), vec!["0"]);

        assert!(eject.clear());
        assert!(!eject.clear());

        eject.request();
        assert_eq!(bus.0.lock().unwrap().len(), 2);
    }
}
