//! Interface for Xen Grant Tables
//!
//! "The grant table mechanism [..] allows memory pages to be transferred or shared between virtual machines"

use {
    crate::{memory::PageFrameNumber, Error, Result},
    alloc::{string::String, vec, vec::Vec},
    core::convert::TryFrom,
    xen_sys::{domid_t, grant_ref_t},
};

/// Number of entries reserved for the toolstack
pub const NUM_RESERVED_ENTRIES: usize = 8;

/// A named group of grant entries owned by one device
#[derive(Debug, PartialEq, Eq)]
pub struct GnttabCache {
    id: u32,
    name: String,
}

impl GnttabCache {
    /// Wrap a cache issued by the bus
    pub fn new(id: u32, name: String) -> Self {
        Self { id, name }
    }

    /// Cache identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Name the cache was created with
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A grant of foreign access to one page
#[derive(Debug, PartialEq, Eq)]
pub struct GnttabEntry {
    reference: grant_ref_t,
}

impl GnttabEntry {
    /// Wrap an allocated grant reference
    pub fn new(reference: grant_ref_t) -> Self {
        Self { reference }
    }

    /// Reference the remote domain maps the page with
    pub fn reference(&self) -> grant_ref_t {
        self.reference
    }
}

/// Grant table operations
pub trait GnttabInterface: Send + Sync {
    /// Take a reference to the interface
    fn acquire(&self) -> Result<()>;

    /// Drop a reference to the interface
    fn release(&self);

    /// Create a cache of grant entries
    fn create_cache(&self, name: &str) -> Result<GnttabCache>;

    /// Destroy a cache, all of its entries must have been revoked
    fn destroy_cache(&self, cache: GnttabCache);

    /// Grant `domain` access to the supplied frame
    fn permit_foreign_access(
        &self,
        cache: &GnttabCache,
        domain: domid_t,
        frame: PageFrameNumber,
        readonly: bool,
    ) -> Result<GnttabEntry>;

    /// End access to the supplied grant
    fn revoke_foreign_access(&self, cache: &GnttabCache, entry: GnttabEntry) -> Result<()>;

    /// Reference of a grant
    fn reference(&self, entry: &GnttabEntry) -> grant_ref_t {
        entry.reference()
    }
}

/// Free list of grant references, threaded through the list itself with the
/// head kept in slot 0
#[derive(Debug)]
pub struct FreeList {
    list: Vec<grant_ref_t>,
    free: usize,
}

impl FreeList {
    /// Create a list of `entries` references with the reserved ones withheld
    pub fn new(entries: usize) -> Self {
        let mut celf = Self {
            list: vec![0; entries],
            free: 0,
        };

        for i in (NUM_RESERVED_ENTRIES..entries).rev() {
            if let Ok(reference) = grant_ref_t::try_from(i) {
                celf.put_free_entry(reference);
            }
        }

        celf
    }

    /// Return a reference to the list
    pub fn put_free_entry(&mut self, reference: grant_ref_t) {
        self.list[reference as usize] = self.list[0];
        self.list[0] = reference;
        self.free += 1;
    }

    /// Take a reference from the list
    pub fn get_free_entry(&mut self) -> Result<grant_ref_t> {
        if self.free == 0 {
            return Err(Error::NoMemory);
        }

        let reference = self.list[0];
        self.list[0] = self.list[reference as usize];
        self.free -= 1;

        Ok(reference)
    }

    /// Number of references available
    pub fn free(&self) -> usize {
        self.free
    }
}

#[cfg(test)]
mod tests {
    use super::{FreeList, NUM_RESERVED_ENTRIES};

    #[test]
    fn reserved_entries_are_never_handed_out() {
        let mut list = FreeList::new(16);
        let mut taken = alloc::vec::Vec::new();

        while let Ok(reference) = list.get_free_entry() {
            assert!(reference as usize >= NUM_RESERVED_ENTRIES);
            taken.push(reference);
        }

        assert_eq!(taken.len(), 16 - NUM_RESERVED_ENTRIES);
        assert_eq!(taken[0] as usize, NUM_RESERVED_ENTRIES);
    }

    #[test]
    fn freed_reference_is_reused_first() {
        let mut list = FreeList::new(16);
        let a = list.get_free_entry().unwrap();
        let _b = list.get_free_entry().unwrap();

        list.put_free_entry(a);
        assert_eq!(list.get_free_entry().unwrap(), a);
    }
}
