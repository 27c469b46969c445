//! The host side of a target-to-host DMA FIFO.
//!
//! A [`FifoChannel`] moves through `Unconfigured -> Configured -> Running -> Stopped` and refuses
//! any call that doesn't fit its current state, without touching the device. Every channel on the
//! same FIFO of a [`crate::device::Device`] shares one state.

use crate::{
    core::{
        Fifo,
        RegisterValue,
    },
    transport::{
        Error,
        FifoRead,
        Transport,
        TransportResult,
    },
};
use std::{
    marker::PhantomData,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
    },
    time::Duration,
};
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FifoState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

/// Host-side view of one FIFO, common to all its channels
#[derive(Debug)]
pub(crate) struct Shared {
    state: FifoState,
    /// The depth the device granted at the last `configure`
    depth: Option<usize>,
}

impl Shared {
    pub(crate) fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            state: FifoState::Unconfigured,
            depth: None,
        }))
    }

    /// The device drops a running stream when the VI resets
    pub(crate) fn stop(shared: &Mutex<Self>) {
        let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if shared.state == FifoState::Running {
            shared.state = FifoState::Stopped;
        }
    }
}

/// A target-to-host DMA FIFO carrying elements of type `V`
#[derive(Debug)]
pub struct FifoChannel<T, V> {
    /// Upwards pointer to the parent class' transport
    transport: Weak<Mutex<T>>,
    fifo: Fifo,
    shared: Arc<Mutex<Shared>>,
    phantom: PhantomData<V>,
}

impl<T, V> FifoChannel<T, V>
where
    T: Transport,
    V: RegisterValue,
{
    /// # Errors
    /// Returns an error if `V` isn't the FIFO's element type
    pub fn new(transport: &Arc<Mutex<T>>, fifo: Fifo) -> TransportResult<Self> {
        Self::from_descriptor(Arc::downgrade(transport), fifo)
    }

    /// Builds a [`FifoChannel`] from the parent's weak transport pointer
    /// # Errors
    /// Returns an error if `V` isn't the FIFO's element type
    pub fn from_descriptor(transport: Weak<Mutex<T>>, fifo: Fifo) -> TransportResult<Self> {
        Self::with_shared(transport, fifo, Shared::new())
    }

    pub(crate) fn with_shared(
        transport: Weak<Mutex<T>>,
        fifo: Fifo,
        shared: Arc<Mutex<Shared>>,
    ) -> TransportResult<Self> {
        if V::KIND != fifo.kind {
            return Err(Error::TypeMismatch {
                name: fifo.name,
                expected: fifo.kind,
                found: V::KIND.to_string(),
            });
        }
        Ok(Self {
            transport,
            fifo,
            shared,
            phantom: PhantomData,
        })
    }

    // Nothing panics while this is held, so a poisoned lock still has a consistent state
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> FifoState {
        self.shared().state
    }

    /// The depth granted by the last successful [`FifoChannel::configure`]
    #[must_use]
    pub fn depth(&self) -> Option<usize> {
        self.shared().depth
    }

    #[must_use]
    pub fn fifo(&self) -> &Fifo {
        &self.fifo
    }

    /// Record that the device reset, which stops a running stream. Call this after resetting the
    /// transport behind this channel's back.
    pub fn mark_reset(&self) {
        Shared::stop(&self.shared);
    }

    fn invalid(&self, state: FifoState, operation: &'static str) -> Error {
        Error::InvalidState {
            fifo: self.fifo.name.clone(),
            state,
            operation,
        }
    }

    fn with_transport<R>(
        &self,
        f: impl FnOnce(&mut T) -> TransportResult<R>,
    ) -> TransportResult<R> {
        let tarc = self.transport.upgrade().ok_or(Error::InvalidSession)?;
        let mut transport = tarc.lock().map_err(|_| Error::InvalidSession)?;
        f(&mut transport)
    }

    /// Request a host-side depth of `requested_depth` elements. The device may grant a different
    /// depth, which is returned and used to validate every later read. Size buffers from the
    /// returned depth, not the requested one.
    /// # Errors
    /// Returns an error while running, or on transport errors
    pub fn configure(&mut self, requested_depth: usize) -> TransportResult<usize> {
        let mut shared = self.shared();
        if shared.state == FifoState::Running {
            return Err(self.invalid(shared.state, "configure"));
        }
        let granted =
            self.with_transport(|t| t.configure_fifo(&self.fifo, requested_depth))?;
        debug!(fifo = %self.fifo.name, requested_depth, granted, "configured");
        shared.depth = Some(granted);
        shared.state = FifoState::Configured;
        Ok(granted)
    }

    /// Start streaming
    /// # Errors
    /// Returns an error if the FIFO was never configured or is already running, or on transport
    /// errors
    pub fn start(&mut self) -> TransportResult<()> {
        let mut shared = self.shared();
        if !matches!(shared.state, FifoState::Configured | FifoState::Stopped) {
            return Err(self.invalid(shared.state, "start"));
        }
        self.with_transport(|t| t.start_fifo(&self.fifo))?;
        debug!(fifo = %self.fifo.name, "started");
        shared.state = FifoState::Running;
        Ok(())
    }

    /// Stop streaming. Elements still queued on the host are dropped.
    /// # Errors
    /// Returns an error if the FIFO isn't running, or on transport errors
    pub fn stop(&mut self) -> TransportResult<()> {
        let mut shared = self.shared();
        if shared.state != FifoState::Running {
            return Err(self.invalid(shared.state, "stop"));
        }
        self.with_transport(|t| t.stop_fifo(&self.fifo))?;
        debug!(fifo = %self.fifo.name, "stopped");
        shared.state = FifoState::Stopped;
        Ok(())
    }

    /// Read `max_elements` into the front of `buf`, blocking until they arrive, the stream ends
    /// or `timeout` elapses. `None` waits forever. Nothing past `buf[..max_elements]` is ever
    /// written, whatever depth the device granted.
    /// # Errors
    /// Returns an error if the FIFO isn't running, if `max_elements` exceeds `buf` or the granted
    /// depth, on timeout, or on transport errors
    pub fn read_bulk(
        &mut self,
        buf: &mut [V],
        max_elements: usize,
        timeout: Option<Duration>,
    ) -> TransportResult<FifoRead> {
        let (state, depth) = {
            let shared = self.shared();
            (shared.state, shared.depth)
        };
        if state != FifoState::Running {
            return Err(self.invalid(state, "read_bulk"));
        }
        if max_elements > buf.len() {
            return Err(Error::BufferTooSmall {
                requested: max_elements,
                capacity: buf.len(),
            });
        }
        // Running implies configured
        let depth = depth.ok_or_else(|| self.invalid(state, "read_bulk"))?;
        if max_elements > depth {
            return Err(Error::ExceedsDepth {
                fifo: self.fifo.name.clone(),
                requested: max_elements,
                depth,
            });
        }
        // State lock is released across the blocking read
        let read =
            self.with_transport(|t| t.read_fifo(&self.fifo, &mut buf[..max_elements], timeout))?;
        debug!(
            fifo = %self.fifo.name,
            read = read.read,
            remaining = read.remaining,
            "read"
        );
        Ok(read)
    }
}
