//! Raw definitions from the Xen public headers used by paravirtualized frontends
//!
//! Names and layouts follow `xen/include/public` so that structures can be
//! overlaid directly on pages shared with a backend domain.

#![no_std]
#![allow(non_camel_case_types, non_upper_case_globals)]

use cty::{c_char, c_uint};

/// Domain identifier
pub type domid_t = u16;

/// Grant table reference
pub type grant_ref_t = u32;

/// Event channel port
pub type evtchn_port_t = u32;

/// Domain ID of this domain
pub const DOMID_SELF: domid_t = 0x7FF0;

/// Domain ID used when no domain is known
pub const DOMID_INVALID: domid_t = 0x7FF4;

/// log2 of the size of a Xen page
pub const XEN_PAGE_SHIFT: usize = 12;

/// Size of a Xen page
pub const XEN_PAGE_SIZE: usize = 1 << XEN_PAGE_SHIFT;

/* io/xenbus.h */

/// State of either end of a XenBus connection
pub type XenbusState = c_uint;

pub const xenbus_state_XenbusStateUnknown: XenbusState = 0;
pub const xenbus_state_XenbusStateInitialising: XenbusState = 1;
pub const xenbus_state_XenbusStateInitWait: XenbusState = 2;
pub const xenbus_state_XenbusStateInitialised: XenbusState = 3;
pub const xenbus_state_XenbusStateConnected: XenbusState = 4;
pub const xenbus_state_XenbusStateClosing: XenbusState = 5;
pub const xenbus_state_XenbusStateClosed: XenbusState = 6;
pub const xenbus_state_XenbusStateReconfiguring: XenbusState = 7;
pub const xenbus_state_XenbusStateReconfigured: XenbusState = 8;

/* io/kbdif.h */

pub const XENKBD_TYPE_MOTION: u8 = 1;
pub const XENKBD_TYPE_RESERVED: u8 = 2;
pub const XENKBD_TYPE_KEY: u8 = 3;
pub const XENKBD_TYPE_POS: u8 = 4;
pub const XENKBD_TYPE_MTOUCH: u8 = 5;

pub const XENKBD_MT_EV_DOWN: u8 = 0;
pub const XENKBD_MT_EV_UP: u8 = 1;
pub const XENKBD_MT_EV_MOTION: u8 = 2;
pub const XENKBD_MT_EV_SYN: u8 = 3;
pub const XENKBD_MT_EV_SHAPE: u8 = 4;
pub const XENKBD_MT_EV_ORIENT: u8 = 5;

pub const XENKBD_IN_EVENT_SIZE: usize = 40;
pub const XENKBD_IN_RING_SIZE: usize = 2048;
pub const XENKBD_IN_RING_LEN: usize = XENKBD_IN_RING_SIZE / XENKBD_IN_EVENT_SIZE;
pub const XENKBD_IN_RING_OFFS: usize = 1024;

pub const XENKBD_OUT_EVENT_SIZE: usize = 40;
pub const XENKBD_OUT_RING_SIZE: usize = 1024;
pub const XENKBD_OUT_RING_LEN: usize = XENKBD_OUT_RING_SIZE / XENKBD_OUT_EVENT_SIZE;
pub const XENKBD_OUT_RING_OFFS: usize = XENKBD_IN_RING_OFFS + XENKBD_IN_RING_SIZE;

/// Relative pointer movement
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct xenkbd_motion {
    pub type_: u8,
    pub rel_x: i32,
    pub rel_y: i32,
    pub rel_z: i32,
}

/// Key or button press/release
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct xenkbd_key {
    pub type_: u8,
    pub pressed: u8,
    pub keycode: u32,
}

/// Absolute pointer position
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct xenkbd_position {
    pub type_: u8,
    pub abs_x: i32,
    pub abs_y: i32,
    pub rel_z: i32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct xenkbd_mtouch__bindgen_ty_1__bindgen_ty_1 {
    pub abs_x: i32,
    pub abs_y: i32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct xenkbd_mtouch__bindgen_ty_1__bindgen_ty_2 {
    pub major: u32,
    pub minor: u32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union xenkbd_mtouch__bindgen_ty_1 {
    pub pos: xenkbd_mtouch__bindgen_ty_1__bindgen_ty_1,
    pub shape: xenkbd_mtouch__bindgen_ty_1__bindgen_ty_2,
    pub orientation: i16,
}

/// Multi-touch contact event
#[repr(C)]
#[derive(Copy, Clone)]
pub struct xenkbd_mtouch {
    pub type_: u8,
    pub event_type: u8,
    pub contact_id: u8,
    pub reserved: [u8; 5],
    pub u: xenkbd_mtouch__bindgen_ty_1,
}

/// One slot of the inbound (backend to frontend) ring
#[repr(C)]
#[derive(Copy, Clone)]
pub union xenkbd_in_event {
    pub type_: u8,
    pub motion: xenkbd_motion,
    pub key: xenkbd_key,
    pub pos: xenkbd_position,
    pub mtouch: xenkbd_mtouch,
    pub pad: [c_char; XENKBD_IN_EVENT_SIZE],
}

/// Header of the shared keyboard page
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct xenkbd_page {
    pub in_cons: u32,
    pub in_prod: u32,
    pub out_cons: u32,
    pub out_prod: u32,
}

#[cfg(test)]
mod tests {
    use {super::*, core::mem::size_of};

    #[test]
    fn in_event_fills_a_slot() {
        assert_eq!(size_of::<xenkbd_in_event>(), XENKBD_IN_EVENT_SIZE);
        assert_eq!(XENKBD_IN_RING_LEN, 51);
    }

    #[test]
    fn page_header_precedes_rings() {
        assert!(size_of::<xenkbd_page>() <= XENKBD_IN_RING_OFFS);
        assert!(XENKBD_OUT_RING_OFFS + XENKBD_OUT_RING_SIZE <= XEN_PAGE_SIZE);
    }
}
