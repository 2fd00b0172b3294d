//! HID view of the virtual keyboard and absolute pointer
//!
//! The device presents two input reports: a boot-style keyboard report and an
//! absolute mouse report. The HID minidriver binds to a [`HidContext`] and
//! receives reports through the callback it supplies when enabling it.

use {
    crate::frontend::{Frontend, FrontendState},
    bitflags::bitflags,
    log::{debug, error, info},
    spin::Mutex,
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    xenbus::{Error, References, Result},
};

/// Report id of the keyboard report
pub const KEYBOARD_REPORT_ID: u8 = 1;

/// Report id of the absolute mouse report
pub const ABSMOUSE_REPORT_ID: u8 = 2;

/// Length of an encoded keyboard report
pub const KEYBOARD_REPORT_LENGTH: usize = 8;

/// Length of an encoded absolute mouse report
pub const ABSMOUSE_REPORT_LENGTH: usize = 7;

/// Largest absolute coordinate
pub const ABSOLUTE_MAX: i32 = 0x7FFF;

/// Largest wheel movement in one report
pub const WHEEL_MAX: i32 = 127;

/// Number of ordinary keys that can be held at once
pub const ROLLOVER: usize = 6;

/// Vendor id reported in the device attributes
pub const VENDOR_ID: u16 = 0xF001;

/// Product id reported in the device attributes
pub const PRODUCT_ID: u16 = 0xF001;

/// Version reported in the device attributes
pub const VERSION_NUMBER: u16 = 0x0101;

/// Product string
pub const PRODUCT_NAME: &str = "PV HID Device";

#[rustfmt::skip]
/// Report descriptor for both reports
pub const REPORT_DESCRIPTOR: [u8; 107] = [
    // report 1: keyboard
    0x05, 0x01,         // USAGE_PAGE (Generic Desktop)
    0x09, 0x06,         // USAGE (Keyboard)
    0xa1, 0x01,         // COLLECTION (Application)
    0x85, 0x01,         //   REPORT_ID (1)
    0x05, 0x07,         //   USAGE_PAGE (Keyboard)
    0x19, 0xe0,         //   USAGE_MINIMUM (Keyboard LeftControl)
    0x29, 0xe7,         //   USAGE_MAXIMUM (Keyboard Right GUI)
    0x15, 0x00,         //   LOGICAL_MINIMUM (0)
    0x25, 0x01,         //   LOGICAL_MAXIMUM (1)
    0x75, 0x01,         //   REPORT_SIZE (1)
    0x95, 0x08,         //   REPORT_COUNT (8)
    0x81, 0x02,         //   INPUT (Data,Var,Abs)
    0x95, 0x06,         //   REPORT_COUNT (6)
    0x75, 0x08,         //   REPORT_SIZE (8)
    0x15, 0x00,         //   LOGICAL_MINIMUM (0)
    0x25, 0x65,         //   LOGICAL_MAXIMUM (101)
    0x05, 0x07,         //   USAGE_PAGE (Keyboard)
    0x19, 0x00,         //   USAGE_MINIMUM (Reserved (no event indicated))
    0x29, 0x65,         //   USAGE_MAXIMUM (Keyboard Application)
    0x81, 0x00,         //   INPUT (Data,Ary,Abs)
    0xc0,               // END_COLLECTION
    // report 2: absolute mouse
    0x05, 0x01,         // USAGE_PAGE (Generic Desktop)
    0x09, 0x02,         // USAGE (Mouse)
    0xa1, 0x01,         // COLLECTION (Application)
    0x85, 0x02,         //   REPORT_ID (2)
    0x09, 0x01,         //   USAGE (Pointer)
    0xa1, 0x00,         //   COLLECTION (Physical)
    0x05, 0x09,         //     USAGE_PAGE (Button)
    0x19, 0x01,         //     USAGE_MINIMUM (Button 1)
    0x29, 0x05,         //     USAGE_MAXIMUM (Button 5)
    0x15, 0x00,         //     LOGICAL_MINIMUM (0)
    0x25, 0x01,         //     LOGICAL_MAXIMUM (1)
    0x95, 0x05,         //     REPORT_COUNT (5)
    0x75, 0x01,         //     REPORT_SIZE (1)
    0x81, 0x02,         //     INPUT (Data,Var,Abs)
    0x95, 0x01,         //     REPORT_COUNT (1)
    0x75, 0x03,         //     REPORT_SIZE (3)
    0x81, 0x03,         //     INPUT (Cnst,Var,Abs)
    0x05, 0x01,         //     USAGE_PAGE (Generic Desktop)
    0x09, 0x30,         //     USAGE (X)
    0x09, 0x31,         //     USAGE (Y)
    0x16, 0x00, 0x00,   //     LOGICAL_MINIMUM (0)
    0x26, 0xff, 0x7f,   //     LOGICAL_MAXIMUM (32767)
    0x75, 0x10,         //     REPORT_SIZE (16)
    0x95, 0x02,         //     REPORT_COUNT (2)
    0x81, 0x02,         //     INPUT (Data,Var,Abs)
    0x09, 0x38,         //     USAGE (Z)
    0x15, 0x81,         //     LOGICAL_MINIMUM (-127)
    0x25, 0x7f,         //     LOGICAL_MAXIMUM (127)
    0x75, 0x08,         //     REPORT_SIZE (8)
    0x95, 0x01,         //     REPORT_COUNT (1)
    0x81, 0x06,         //     INPUT (Data,Var,Rel)
    0xc0,               //   END_COLLECTION
    0xc0,               // END_COLLECTION
];

/// HID class descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// HID specification release, BCD
    pub hid: u16,
    /// Country code
    pub country: u8,
    /// Number of class descriptors
    pub descriptors: u8,
    /// Type of the class descriptor
    pub report_type: u8,
    /// Length of the report descriptor
    pub report_length: u16,
}

/// Descriptor pointing at [`REPORT_DESCRIPTOR`]
pub const DEVICE_DESCRIPTOR: DeviceDescriptor = DeviceDescriptor {
    hid: 0x0101,
    country: 0x00,
    descriptors: 0x01,
    report_type: 0x22,
    report_length: REPORT_DESCRIPTOR.len() as u16,
};

impl DeviceDescriptor {
    /// Encoded length
    pub const LENGTH: usize = 9;

    /// Encode in the layout the HID class driver reads
    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let hid = self.hid.to_le_bytes();
        let report_length = self.report_length.to_le_bytes();

        [
            Self::LENGTH as u8,
            0x21,
            hid[0],
            hid[1],
            self.country,
            self.descriptors,
            self.report_type,
            report_length[0],
            report_length[1],
        ]
    }
}

/// Identity of the HID device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAttributes {
    /// Vendor id
    pub vendor_id: u16,
    /// Product id
    pub product_id: u16,
    /// Version number
    pub version_number: u16,
}

/// Attributes of this device
pub const DEVICE_ATTRIBUTES: DeviceAttributes = DeviceAttributes {
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    version_number: VERSION_NUMBER,
};

/// String descriptors the device can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringId {
    /// Manufacturer
    Manufacturer,
    /// Product
    Product,
    /// Serial number
    SerialNumber,
}

bitflags! {
    /// Keyboard modifier bits, in usage order from Left Control
    #[derive(Default)]
    pub struct Modifiers: u8 {
        /// Left Control
        const LEFT_CTRL = 1 << 0;
        /// Left Shift
        const LEFT_SHIFT = 1 << 1;
        /// Left Alt
        const LEFT_ALT = 1 << 2;
        /// Left GUI
        const LEFT_GUI = 1 << 3;
        /// Right Control
        const RIGHT_CTRL = 1 << 4;
        /// Right Shift
        const RIGHT_SHIFT = 1 << 5;
        /// Right Alt
        const RIGHT_ALT = 1 << 6;
        /// Right GUI
        const RIGHT_GUI = 1 << 7;
    }
}

bitflags! {
    /// Mouse buttons
    #[derive(Default)]
    pub struct Buttons: u8 {
        /// Button 1
        const LEFT = 1 << 0;
        /// Button 2
        const RIGHT = 1 << 1;
        /// Button 3
        const MIDDLE = 1 << 2;
        /// Button 4
        const SIDE = 1 << 3;
        /// Button 5
        const EXTRA = 1 << 4;
    }
}

/// Usage of the first modifier key
pub const USAGE_MODIFIER_FIRST: u8 = 0xE0;

/// Usage of the last modifier key
pub const USAGE_MODIFIER_LAST: u8 = 0xE7;

/// Keyboard report
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardReport {
    /// Held modifiers
    pub modifiers: Modifiers,
    /// Usages of held keys, packed towards the start, zero for unused
    pub keys: [u8; ROLLOVER],
}

impl KeyboardReport {
    /// Apply a key press or release given its usage
    ///
    /// Returns whether the report changed. A press with every slot in use is
    /// dropped.
    pub fn key(&mut self, usage: u8, pressed: bool) -> bool {
        if usage == 0 {
            return false;
        }

        if (USAGE_MODIFIER_FIRST..=USAGE_MODIFIER_LAST).contains(&usage) {
            let bit = Modifiers::from_bits_truncate(1 << (usage - USAGE_MODIFIER_FIRST));
            let old = self.modifiers;
            self.modifiers.set(bit, pressed);
            return self.modifiers != old;
        }

        if pressed {
            self.press(usage)
        } else {
            self.release(usage)
        }
    }

    fn press(&mut self, usage: u8) -> bool {
        if self.keys.contains(&usage) {
            return false;
        }

        match self.keys.iter_mut().find(|key| **key == 0) {
            Some(key) => {
                *key = usage;
                true
            }
            None => false,
        }
    }

    fn release(&mut self, usage: u8) -> bool {
        let index = match self.keys.iter().position(|key| *key == usage) {
            Some(index) => index,
            None => return false,
        };

        self.keys.copy_within(index + 1.., index);
        self.keys[ROLLOVER - 1] = 0;
        true
    }

    /// Encode with the report id prefix
    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_LENGTH] {
        let mut bytes = [0; KEYBOARD_REPORT_LENGTH];

        bytes[0] = KEYBOARD_REPORT_ID;
        bytes[1] = self.modifiers.bits();
        bytes[2..].copy_from_slice(&self.keys);

        bytes
    }
}

/// Absolute mouse report
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AbsMouseReport {
    /// Held buttons
    pub buttons: Buttons,
    /// Horizontal position, 0 to 32767
    pub x: u16,
    /// Vertical position, 0 to 32767
    pub y: u16,
    /// Wheel movement since the last report
    pub dz: i8,
}

impl AbsMouseReport {
    /// Move the pointer by a relative amount
    pub fn motion(&mut self, dx: i32, dy: i32, dz: i32) {
        self.x = clamp_absolute(i32::from(self.x).saturating_add(dx));
        self.y = clamp_absolute(i32::from(self.y).saturating_add(dy));
        self.dz = wheel(dz);
    }

    /// Move the pointer to an absolute position
    pub fn position(&mut self, x: i32, y: i32, dz: i32) {
        self.x = clamp_absolute(x);
        self.y = clamp_absolute(y);
        self.dz = wheel(dz);
    }

    /// Press or release button `index`, counted from zero
    pub fn button(&mut self, index: u32, pressed: bool) {
        if let Some(button) = Buttons::from_bits(1 << index) {
            self.buttons.set(button, pressed);
        }
    }

    /// Encode with the report id prefix
    pub fn to_bytes(&self) -> [u8; ABSMOUSE_REPORT_LENGTH] {
        let x = self.x.to_le_bytes();
        let y = self.y.to_le_bytes();

        [
            ABSMOUSE_REPORT_ID,
            self.buttons.bits(),
            x[0],
            x[1],
            y[0],
            y[1],
            self.dz as u8,
        ]
    }
}

fn clamp_absolute(value: i32) -> u16 {
    value.clamp(0, ABSOLUTE_MAX) as u16
}

// wheel up is negative from the backend, positive in HID
fn wheel(dz: i32) -> i8 {
    -(dz.clamp(-WHEEL_MAX, WHEEL_MAX)) as i8
}

/// First Linux input code of a mouse button
pub const BTN_LEFT: u32 = 0x110;

/// Last Linux input code of a mouse button this device reports
pub const BTN_EXTRA: u32 = 0x114;

#[rustfmt::skip]
const KEYCODE_TO_USAGE: [u8; 128] = [
    0x00, 0x29, 0x1E, 0x1F, 0x20, 0x21, 0x22, 0x23, // RESERVED ESC 1 2 3 4 5 6
    0x24, 0x25, 0x26, 0x27, 0x2D, 0x2E, 0x2A, 0x2B, // 7 8 9 0 MINUS EQUAL BACKSPACE TAB
    0x14, 0x1A, 0x08, 0x15, 0x17, 0x1C, 0x18, 0x0C, // Q W E R T Y U I
    0x12, 0x13, 0x2F, 0x30, 0x28, 0xE0, 0x04, 0x16, // O P [ ] ENTER LEFTCTRL A S
    0x07, 0x09, 0x0A, 0x0B, 0x0D, 0x0E, 0x0F, 0x33, // D F G H J K L ;
    0x34, 0x35, 0xE1, 0x31, 0x1D, 0x1B, 0x06, 0x19, // ' ` LEFTSHIFT \ Z X C V
    0x05, 0x11, 0x10, 0x36, 0x37, 0x38, 0xE5, 0x55, // B N M , . / RIGHTSHIFT KPASTERISK
    0xE2, 0x2C, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, // LEFTALT SPACE CAPSLOCK F1 F2 F3 F4 F5
    0x3F, 0x40, 0x41, 0x42, 0x43, 0x53, 0x47, 0x5F, // F6 F7 F8 F9 F10 NUMLOCK SCROLLLOCK KP7
    0x60, 0x61, 0x56, 0x5C, 0x5D, 0x5E, 0x57, 0x59, // KP8 KP9 KPMINUS KP4 KP5 KP6 KPPLUS KP1
    0x5A, 0x5B, 0x62, 0x63, 0x00, 0x94, 0x64, 0x44, // KP2 KP3 KP0 KPDOT - ZENKAKUHANKAKU 102ND F11
    0x45, 0x87, 0x92, 0x93, 0x8A, 0x88, 0x8B, 0x8C, // F12 RO KATAKANA HIRAGANA HENKAN KATAKANAHIRAGANA MUHENKAN KPJPCOMMA
    0x58, 0xE4, 0x54, 0x46, 0xE6, 0x00, 0x4A, 0x52, // KPENTER RIGHTCTRL KPSLASH SYSRQ RIGHTALT LINEFEED HOME UP
    0x4B, 0x50, 0x4F, 0x4D, 0x51, 0x4E, 0x49, 0x4C, // PAGEUP LEFT RIGHT END DOWN PAGEDOWN INSERT DELETE
    0x00, 0x7F, 0x81, 0x80, 0x66, 0x67, 0x00, 0x48, // MACRO MUTE VOLUMEDOWN VOLUMEUP POWER KPEQUAL KPPLUSMINUS PAUSE
    0x00, 0x85, 0x90, 0x91, 0x89, 0xE3, 0xE7, 0x65, // SCALE KPCOMMA HANGEUL HANJA YEN LEFTMETA RIGHTMETA COMPOSE
];

/// Translate a Linux input keycode to a keyboard page usage, zero if it has none
pub fn keycode_to_usage(keycode: u32) -> u8 {
    KEYCODE_TO_USAGE
        .get(keycode as usize)
        .copied()
        .unwrap_or(0)
}

/// Callback delivering a report to the HID minidriver
///
/// Returns `false` if the minidriver had no request to complete with it.
pub type ReportCallback = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Interface the HID minidriver binds to
pub struct HidContext {
    frontend: Weak<Frontend>,
    path: String,
    references: References,
    enabled: AtomicBool,
    callback: Mutex<Option<ReportCallback>>,
    vendor_name: String,
}

impl HidContext {
    pub(crate) fn new(frontend: Weak<Frontend>, path: &str, vendor_name: &str) -> Self {
        Self {
            frontend,
            path: path.to_owned(),
            references: References::new(),
            enabled: AtomicBool::new(false),
            callback: Mutex::new(None),
            vendor_name: vendor_name.to_owned(),
        }
    }

    /// Store path of the frontend this interface belongs to
    pub fn path(&self) -> &str {
        &self.path
    }

    fn frontend(&self) -> Result<Arc<Frontend>> {
        self.frontend.upgrade().ok_or(Error::NotReady)
    }

    /// Take a reference to the interface
    pub fn acquire(&self) -> Result<()> {
        self.references.acquire(|| {
            debug!("{}: hid: bound", self.path);
            Ok(())
        })
    }

    /// Drop a reference to the interface
    pub fn release(&self) {
        self.references.release(|| {
            debug_assert!(!self.is_enabled());
            debug!("{}: hid: unbound", self.path);
        })
    }

    /// Whether reports are being delivered
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Start delivering reports through `callback`
    ///
    /// The frontend is driven to ENABLED. A backend that lacks a required
    /// feature does not fail the call: the device simply produces no input.
    pub fn enable(&self, callback: ReportCallback) -> Result<()> {
        if self.is_enabled() {
            return Ok(());
        }

        *self.callback.lock() = Some(callback);
        self.enabled.store(true, Ordering::SeqCst);

        match self.frontend()?.set_state(FrontendState::Enabled) {
            Ok(()) => (),
            Err(Error::DeviceNotReady) => {
                info!("{}: hid: backend not ready, no input available", self.path)
            }
            Err(e) => {
                error!("{}: hid: failed to enable: {}", self.path, e);

                self.enabled.store(false, Ordering::SeqCst);
                *self.callback.lock() = None;
                return Err(e);
            }
        }

        Ok(())
    }

    /// Stop delivering reports
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Ok(frontend) = self.frontend() {
            if let Err(e) = frontend.set_state(FrontendState::Connected) {
                error!("{}: hid: failed to disable: {}", self.path, e);
            }
        }

        *self.callback.lock() = None;
    }

    /// Identity of the device
    pub fn device_attributes(&self) -> DeviceAttributes {
        DEVICE_ATTRIBUTES
    }

    /// HID class descriptor
    pub fn device_descriptor(&self) -> DeviceDescriptor {
        DEVICE_DESCRIPTOR
    }

    /// Report descriptor
    pub fn report_descriptor(&self) -> &'static [u8] {
        &REPORT_DESCRIPTOR
    }

    /// String descriptor
    pub fn string(&self, id: StringId) -> Result<String> {
        match id {
            StringId::Manufacturer => Ok(self.vendor_name.clone()),
            StringId::Product => Ok(PRODUCT_NAME.to_owned()),
            StringId::SerialNumber => Err(Error::NotSupported),
        }
    }

    fn unsupported(&self) -> Result<usize> {
        if !self.is_enabled() {
            return Err(Error::NotReady);
        }

        Err(Error::NotSupported)
    }

    /// Indexed string descriptor
    pub fn indexed_string(&self, _index: u32, _buffer: &mut [u8]) -> Result<usize> {
        self.unsupported()
    }

    /// Feature report
    pub fn get_feature(&self, _report_id: u8, _buffer: &mut [u8]) -> Result<usize> {
        self.unsupported()
    }

    /// Set a feature report
    pub fn set_feature(&self, _report_id: u8, _buffer: &[u8]) -> Result<()> {
        self.unsupported().map(|_| ())
    }

    /// Output report
    pub fn set_output_report(&self, _report_id: u8, _buffer: &[u8]) -> Result<()> {
        self.unsupported().map(|_| ())
    }

    /// Write an output report
    pub fn write_report(&self, _report_id: u8, _buffer: &[u8]) -> Result<()> {
        self.unsupported().map(|_| ())
    }

    /// Copy the current state of input report `report_id` into `buffer`
    pub fn get_input_report(&self, report_id: u8, buffer: &mut [u8]) -> Result<usize> {
        if !self.is_enabled() {
            return Err(Error::NotReady);
        }

        self.frontend()?.ring().get_input_report(report_id, buffer)
    }

    /// Ask for one pending report to be delivered
    pub fn read_report(&self) {
        if !self.is_enabled() {
            return;
        }

        if let Ok(frontend) = self.frontend() {
            frontend.ring().read_report();
        }
    }

    /// Deliver a report, returns `true` if it is still pending
    pub(crate) fn send_read_report(&self, report: &[u8]) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => !callback(report),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_lengths_agree() {
        assert_eq!(DEVICE_DESCRIPTOR.report_length as usize, REPORT_DESCRIPTOR.len());
        assert_eq!(DEVICE_DESCRIPTOR.to_bytes()[0], 9);
        assert_eq!(&DEVICE_DESCRIPTOR.to_bytes()[7..], &[107, 0]);
    }

    #[test]
    fn keycodes_map_to_usages() {
        assert_eq!(keycode_to_usage(1), 0x29); // ESC
        assert_eq!(keycode_to_usage(28), 0x28); // ENTER
        assert_eq!(keycode_to_usage(30), 0x04); // A
        assert_eq!(keycode_to_usage(42), 0xE1); // LEFTSHIFT
        assert_eq!(keycode_to_usage(111), 0x4C); // DELETE
        assert_eq!(keycode_to_usage(125), 0xE3); // LEFTMETA
        assert_eq!(keycode_to_usage(84), 0);
        assert_eq!(keycode_to_usage(0x200), 0);
    }

    #[test]
    fn modifier_sets_and_clears_bit() {
        let mut report = KeyboardReport::default();

        assert!(report.key(0xE1, true));
        assert_eq!(report.modifiers, Modifiers::LEFT_SHIFT);
        assert_eq!(report.keys, [0; ROLLOVER]);

        assert!(report.key(0xE1, false));
        assert!(report.modifiers.is_empty());
    }

    #[test]
    fn seventh_key_is_dropped() {
        let mut report = KeyboardReport::default();

        for usage in 0x04..0x0A {
            assert!(report.key(usage, true));
        }
        let full = report;

        assert!(!report.key(0x0A, true));
        assert_eq!(report, full);

        assert!(report.key(0x06, false));
        assert_eq!(report.keys, [0x04, 0x05, 0x07, 0x08, 0x09, 0]);

        assert!(report.key(0x0A, true));
        assert_eq!(report.keys, [0x04, 0x05, 0x07, 0x08, 0x09, 0x0A]);
    }

    #[test]
    fn repeated_press_is_not_duplicated() {
        let mut report = KeyboardReport::default();

        assert!(report.key(0x04, true));
        assert!(!report.key(0x04, true));
        assert_eq!(report.keys, [0x04, 0, 0, 0, 0, 0]);

        assert!(!report.key(0x05, false));
    }

    #[test]
    fn pointer_is_clamped() {
        let mut report = AbsMouseReport::default();

        report.motion(-10, 40000, 300);
        assert_eq!((report.x, report.y, report.dz), (0, 0x7FFF, -127));

        report.position(100, -5, -2);
        assert_eq!((report.x, report.y, report.dz), (100, 0, 2));
    }

    #[test]
    fn reports_encode_with_id() {
        let mut mouse = AbsMouseReport::default();
        mouse.button(0, true);
        mouse.button(2, true);
        mouse.position(0x1234, 0x0102, 1);

        assert_eq!(mouse.to_bytes(), [2, 0b101, 0x34, 0x12, 0x02, 0x01, 0xFF]);

        let mut keyboard = KeyboardReport::default();
        keyboard.key(0xE0, true);
        keyboard.key(0x04, true);

        assert_eq!(keyboard.to_bytes(), [1, 1, 0x04, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn context_rejects_requests_while_disabled() {
        let hid = HidContext::new(Weak::new(), "device/vkbd/0", "vendor");

        assert_eq!(hid.get_feature(1, &mut [0; 8]), Err(Error::NotReady));
        assert_eq!(hid.get_input_report(1, &mut [0; 8]), Err(Error::NotReady));
        assert!(hid.send_read_report(&[1]));
        assert_eq!(hid.string(StringId::Product).unwrap(), PRODUCT_NAME);
        assert_eq!(hid.string(StringId::Manufacturer).unwrap(), "vendor");
    }
}
