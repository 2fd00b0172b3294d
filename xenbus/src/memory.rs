//! Pages shared with other domains

use {
    crate::{Error, Result},
    alloc::alloc::{alloc_zeroed, dealloc, Layout},
    core::ptr::{self, NonNull},
    xen_sys::{XEN_PAGE_SHIFT, XEN_PAGE_SIZE},
};

/// log2 of the page size
pub const PAGE_SHIFT: usize = XEN_PAGE_SHIFT;

/// Size of a page in bytes
pub const PAGE_SIZE: usize = XEN_PAGE_SIZE;

const LAYOUT: Layout = unsafe { Layout::from_size_align_unchecked(PAGE_SIZE, PAGE_SIZE) };

/// Virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(pub usize);

/// Number for page frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageFrameNumber(pub usize);

// virt_to_pfn
impl From<VirtualAddress> for PageFrameNumber {
    fn from(virt: VirtualAddress) -> Self {
        Self(virt.0 >> PAGE_SHIFT)
    }
}

// pfn_to_virt
impl From<PageFrameNumber> for VirtualAddress {
    fn from(pfn: PageFrameNumber) -> Self {
        Self(pfn.0 << PAGE_SHIFT)
    }
}

/// A single zeroed, page aligned allocation, freed on drop
///
/// The contents are only ever accessed through raw pointers since another
/// domain may write to the page at any time.
#[derive(Debug)]
pub struct Page(NonNull<u8>);

// Ownership of the allocation is unique, concurrent access goes through atomics or volatile reads
unsafe impl Send for Page {}
unsafe impl Sync for Page {}

impl Page {
    /// Allocate a zeroed page
    pub fn new() -> Result<Self> {
        NonNull::new(unsafe { alloc_zeroed(LAYOUT) })
            .map(Self)
            .ok_or(Error::NoMemory)
    }

    /// Pointer to the first byte of the page
    pub fn as_ptr(&self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Virtual address of the page
    pub fn address(&self) -> VirtualAddress {
        VirtualAddress(self.0.as_ptr() as usize)
    }

    /// Frame number of the page
    pub fn pfn(&self) -> PageFrameNumber {
        PageFrameNumber::from(self.address())
    }

    /// Clear the contents of the page
    pub fn zero(&self) {
        unsafe { ptr::write_bytes(self.as_ptr(), 0, PAGE_SIZE) }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        unsafe { dealloc(self.0.as_ptr(), LAYOUT) }
    }
}
