use {crate::Result, spin::Mutex};

/// Reference count for an interface that is initialised on first acquire and
/// torn down on last release
#[derive(Debug, Default)]
pub struct References {
    count: Mutex<usize>,
}

impl References {
    /// Create a counter with no references
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(0),
        }
    }

    /// Take a reference, running `init` if this is the first one
    ///
    /// The count is unchanged if `init` fails.
    pub fn acquire<F: FnOnce() -> Result<()>>(&self, init: F) -> Result<()> {
        let mut count = self.count.lock();

        if *count == 0 {
            init()?;
        }

        *count += 1;
        Ok(())
    }

    /// Drop a reference, running `teardown` if it was the last one
    pub fn release<F: FnOnce()>(&self, teardown: F) {
        let mut count = self.count.lock();

        debug_assert!(*count != 0, "released an interface that was not acquired");
        if *count == 0 {
            return;
        }

        *count -= 1;
        if *count == 0 {
            teardown();
        }
    }

    /// Number of outstanding references
    pub fn count(&self) -> usize {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use {super::References, crate::Error, core::cell::Cell};

    #[test]
    fn init_and_teardown_run_once() {
        let references = References::new();
        let inits = Cell::new(0);
        let teardowns = Cell::new(0);

        for _ in 0..3 {
            references
                .acquire(|| {
                    inits.set(inits.get() + 1);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(references.count(), 3);

        for _ in 0..3 {
            references.release(|| teardowns.set(teardowns.get() + 1));
        }

        assert_eq!(inits.get(), 1);
        assert_eq!(teardowns.get(), 1);
        assert_eq!(references.count(), 0);
    }

    #[test]
    fn failed_init_takes_no_reference() {
        let references = References::new();

        assert_eq!(references.acquire(|| Err(Error::NoMemory)), Err(Error::NoMemory));
        assert_eq!(references.count(), 0);
    }
}
