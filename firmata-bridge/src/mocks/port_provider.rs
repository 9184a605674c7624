use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::{ConnectionError, Error};
use crate::io::{IoTransport, PortProvider};
use crate::mocks::MockTransportLayer;

/// A port provider handing out clones of a single [`MockTransportLayer`].
#[derive(Clone, Debug, Default)]
pub struct MockPortProvider {
    transport: MockTransportLayer,
    unavailable: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
    last_baud_rate: Arc<AtomicU32>,
}

impl MockPortProvider {
    /// Creates a provider handing out the given transport.
    pub fn new(transport: MockTransportLayer) -> Self {
        Self {
            transport,
            ..Default::default()
        }
    }

    /// Makes the following requests fail with `NoPortAvailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of port requests received.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Baud rate of the last request.
    pub fn last_baud_rate(&self) -> u32 {
        self.last_baud_rate.load(Ordering::SeqCst)
    }
}

impl PortProvider for MockPortProvider {
    fn request_port(&self, baud_rate: u32) -> Result<Box<dyn IoTransport>, Error> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.last_baud_rate.store(baud_rate, Ordering::SeqCst);
        match self.unavailable.load(Ordering::SeqCst) {
            true => Err(ConnectionError::NoPortAvailable.into()),
            false => Ok(Box::new(self.transport.clone())),
        }
    }
}
