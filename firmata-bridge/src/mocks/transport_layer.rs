use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::{Error, ProtocolError};
use crate::io::IoTransport;
use crate::pause_sync;

#[derive(Debug, Default)]
struct MockTransportState {
    opened: bool,
    fail_open: bool,
    wait_for_data: bool,
    open_count: usize,
    incoming: VecDeque<u8>,
    written: Vec<Vec<u8>>,
}

/// An in-memory transport: bytes pushed with [`MockTransportLayer::push_incoming`] are what the
/// "board" sends, every write is recorded.
///
/// Clones share the same state, the way clones of a real port share the same line.
#[derive(Clone, Debug, Default)]
pub struct MockTransportLayer {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransportLayer {
    /// Creates an already opened transport.
    pub fn opened() -> Self {
        let transport = Self::default();
        transport.state.lock().opened = true;
        transport
    }

    /// Queues bytes for the next reads.
    pub fn push_incoming(&self, data: &[u8]) {
        self.state.lock().incoming.extend(data);
    }

    /// Returns every write done so far (one entry per write).
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Forgets the writes done so far.
    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    /// Makes the next `open()` fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// When set, reads block until enough bytes are queued (or the transport closes) instead of
    /// timing out: simulates a board that never answers.
    pub fn set_wait_for_data(&self, wait: bool) {
        self.state.lock().wait_for_data = wait;
    }

    /// Number of successful `open()` calls.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }
}

impl Display for MockTransportLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransportLayer")
    }
}

impl IoTransport for MockTransportLayer {
    fn open(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(std::io::Error::from(ErrorKind::NotFound).into());
        }
        state.opened = true;
        state.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.state.lock().opened = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().opened
    }

    fn set_timeout(&mut self, _: Duration) -> Result<(), Error> {
        Ok(())
    }

    fn available(&self) -> Result<usize, Error> {
        let state = self.state.lock();
        match state.opened {
            true => Ok(state.incoming.len()),
            false => Err(ProtocolError::NotInitialized.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut state = self.state.lock();
        if !state.opened {
            return Err(ProtocolError::NotInitialized.into());
        }
        state.written.push(buf.to_vec());
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        loop {
            {
                let mut state = self.state.lock();
                if !state.opened {
                    return Err(ProtocolError::NotInitialized.into());
                }
                if state.incoming.len() >= buf.len() {
                    for byte in buf.iter_mut() {
                        *byte = state.incoming.pop_front().unwrap_or_default();
                    }
                    return Ok(());
                }
                if !state.wait_for_data {
                    return Err(std::io::Error::from(ErrorKind::TimedOut).into());
                }
            }
            pause_sync!(5);
        }
    }
}
