//! HID minidriver read path
//!
//! Read requests from the HID class driver wait in a cancel-safe queue until
//! the ring produces a report to complete them with.

use {
    crate::{
        hid::HidContext,
        queue::{CancelSafeQueue, Request, RequestKind, Status},
    },
    log::{debug, trace, warn},
    std::sync::Arc,
    xenbus::{Error, Result},
};

/// Function device stacked on a keyboard's HID interface
pub struct HidFdo {
    hid: Arc<HidContext>,
    queue: CancelSafeQueue,
}

impl HidFdo {
    /// Create the function device for `hid`
    pub fn new(hid: Arc<HidContext>) -> Self {
        let queue = CancelSafeQueue::new(&format!("{}: fdo", hid.path()), Status::NotReady);

        Self { hid, queue }
    }

    /// Requests waiting for a report
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Bind to the HID interface and start receiving reports
    pub fn d3_to_d0(&self) -> Result<()> {
        trace!("{}: fdo: ====>", self.hid.path());

        self.hid.acquire()?;

        let queue = self.queue.clone();
        let callback = Arc::new(move |report: &[u8]| match queue.remove_next() {
            Some(mut request) => {
                let buffer = request.buffer_mut();
                let length = report.len().min(buffer.len());

                buffer[..length].copy_from_slice(&report[..length]);
                request.complete(Status::Success, length);
                true
            }
            None => false,
        });

        if let Err(e) = self.hid.enable(callback) {
            self.hid.release();
            return Err(e);
        }

        trace!("{}: fdo: <====", self.hid.path());

        Ok(())
    }

    /// Stop receiving reports and fail every waiting request
    pub fn d0_to_d3(&self) {
        trace!("{}: fdo: ====>", self.hid.path());

        self.hid.disable();
        self.hid.release();

        let count = self.queue.cancel_all();
        if count != 0 {
            debug!("{}: fdo: cancelled {} read requests", self.hid.path(), count);
        }

        trace!("{}: fdo: <====", self.hid.path());
    }

    /// Queue a read, completed by the next report
    pub fn read_report(&self, request: Request) -> Result<()> {
        if request.kind() != RequestKind::ReadReport {
            request.complete(Status::Failed(Error::InvalidParameter), 0);
            return Err(Error::InvalidParameter);
        }

        self.queue.insert(request, false)?;
        self.hid.read_report();

        Ok(())
    }

    /// Complete a request with the current state of one input report
    pub fn get_input_report(&self, mut request: Request) {
        let report_id = match request.kind() {
            RequestKind::GetInputReport(report_id) => report_id,
            kind => {
                warn!("{}: fdo: unexpected request {:?}", self.hid.path(), kind);
                request.complete(Status::Failed(Error::InvalidParameter), 0);
                return;
            }
        };

        match self.hid.get_input_report(report_id, request.buffer_mut()) {
            Ok(length) => request.complete(Status::Success, length),
            Err(e) => request.complete(Status::Failed(e), 0),
        }
    }
}
