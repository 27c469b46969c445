//! Defines the transport mechanism that every riofpga session must implement

pub mod mock;

use crate::{
    core::{
        Fifo,
        Kind,
        Register,
        RegisterValue,
        Value,
    },
    fifo::FifoState,
};
use kstring::KString;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Vendor-compatible status codes, for callers that need to hand a flat integer on
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const FIFO_TIMEOUT: i32 = -50400;
    pub const INVALID_PARAMETER: i32 = -52005;
    pub const SIGNATURE_MISMATCH: i32 = -63106;
    pub const INVALID_RESOURCE_NAME: i32 = -63192;
    pub const INVALID_SESSION: i32 = -63195;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("The session is not open")]
    InvalidSession,
    #[error("`{found}` doesn't match the {expected} register `{name}`")]
    TypeMismatch {
        name: KString,
        expected: Kind,
        found: String,
    },
    #[error("Register `{0}` is an indicator and can't be written")]
    ReadOnly(KString),
    #[error("Requested register doesn't exist - `{0}`")]
    MissingRegister(KString),
    #[error("Requested FIFO doesn't exist - `{0}`")]
    MissingFifo(KString),
    #[error("`{operation}` is not valid while FIFO `{fifo}` is {state:?}")]
    InvalidState {
        fifo: KString,
        state: FifoState,
        operation: &'static str,
    },
    #[error("Asked for {requested} elements but the buffer only holds {capacity}")]
    BufferTooSmall { requested: usize, capacity: usize },
    #[error("Asked for {requested} elements but FIFO `{fifo}` was granted a depth of {depth}")]
    ExceedsDepth {
        fifo: KString,
        requested: usize,
        depth: usize,
    },
    #[error("Timed out waiting on the device")]
    Timeout,
    #[error("The device reported status {code}")]
    Device { code: i32 },
}

impl Error {
    /// The vendor-style status code for this error
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Error::Device { code } => *code,
            Error::Timeout => codes::FIFO_TIMEOUT,
            Error::InvalidSession => codes::INVALID_SESSION,
            _ => codes::INVALID_PARAMETER,
        }
    }

    pub(crate) fn mismatch(register: &Register, found: impl ToString) -> Self {
        Error::TypeMismatch {
            name: register.name.clone(),
            expected: register.kind,
            found: found.to_string(),
        }
    }
}

pub type TransportResult<T> = Result<T, Error>;

/// The outcome of a bulk FIFO read
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FifoRead {
    /// Elements copied into the caller's buffer
    pub read: usize,
    /// Elements still queued on the host side after the read
    pub remaining: usize,
}

/// The trait that is implemented for riofpga sessions.
/// The methods of this trait *assume* the session was opened by a [`crate::session::Driver`],
/// and every required method is exactly one device transaction.
///
/// Nothing here locks. A session is not reentrant, so callers sharing one across threads must
/// serialize access themselves (see [`crate::device::Device`]).
pub trait Transport {
    /// Tests to see if the FPGA behind this session is running
    fn is_running(&mut self) -> TransportResult<bool>;

    /// Read the register at `addr` as `kind`
    fn read_raw(&mut self, addr: u32, kind: Kind) -> TransportResult<Value>;

    /// Write `value` to the register at `addr`
    fn write_raw(&mut self, addr: u32, value: Value) -> TransportResult<()>;

    /// Read the value of `register`
    fn read_value(&mut self, register: &Register) -> TransportResult<Value> {
        let value = self.read_raw(register.addr, register.kind)?;
        trace!(register = %register.name, %value, "read");
        if value.kind() != register.kind {
            return Err(Error::mismatch(register, value));
        }
        Ok(value)
    }

    /// Generically read `register` as the Rust type `V`, which must match the register's kind.
    /// # Example
    /// ```
    /// # use riofpga::core::{Direction, Fifos, Kind, Register, Registers};
    /// # use riofpga::transport::{mock::Mock, Transport};
    /// let ao = Register::new("Connector1AO0", 0x8112, Kind::I16, Direction::Control);
    /// # let registers = Registers::from([(ao.name.clone(), ao.clone())]);
    /// # let mut transport = Mock::new(&registers, &Fifos::new());
    /// transport.write(&ao, -1200i16).unwrap();
    /// let readback: i16 = transport.read(&ao).unwrap();
    /// assert_eq!(readback, -1200);
    /// ```
    fn read<V>(&mut self, register: &Register) -> TransportResult<V>
    where
        V: RegisterValue,
    {
        // Check before touching the device
        if V::KIND != register.kind {
            return Err(Error::mismatch(register, V::KIND));
        }
        let value = self.read_value(register)?;
        V::from_value(value).ok_or_else(|| Error::mismatch(register, value))
    }

    /// Write `value` to `register`. The value's kind must match the register's exactly and the
    /// register must be a control, otherwise nothing is sent to the device.
    fn write_value(&mut self, register: &Register, value: Value) -> TransportResult<()> {
        if !register.is_writable() {
            return Err(Error::ReadOnly(register.name.clone()));
        }
        if value.kind() != register.kind {
            return Err(Error::mismatch(register, value));
        }
        trace!(register = %register.name, %value, "write");
        self.write_raw(register.addr, value)
    }

    /// Generically write the Rust value `value` to `register`
    fn write<V>(&mut self, register: &Register, value: V) -> TransportResult<()>
    where
        V: RegisterValue,
    {
        self.write_value(register, value.into_value())
    }

    /// Write the integer `n` to `register`, failing if `n` doesn't fit the register's width
    fn write_int(&mut self, register: &Register, n: i128) -> TransportResult<()> {
        let value = Value::from_int(register.kind, n).ok_or_else(|| Error::mismatch(register, n))?;
        self.write_value(register, value)
    }

    /// Resets the FPGA VI, returning every register to its power-on value
    fn reset(&mut self) -> TransportResult<()>;

    /// Starts the FPGA VI
    fn run(&mut self) -> TransportResult<()>;

    /// Closes the session. Every later call reports [`Error::InvalidSession`].
    fn close(&mut self) -> TransportResult<()>;

    /// Sets the host-side depth of `fifo`, returning the depth the device actually granted
    fn configure_fifo(&mut self, fifo: &Fifo, requested_depth: usize) -> TransportResult<usize>;

    /// Starts the DMA transfer of `fifo`
    fn start_fifo(&mut self, fifo: &Fifo) -> TransportResult<()>;

    /// Stops the DMA transfer of `fifo`, dropping anything still queued
    fn stop_fifo(&mut self, fifo: &Fifo) -> TransportResult<()>;

    /// Fill all of `buf` from `fifo`. Blocks until enough elements are queued, the stream ends
    /// (a short read) or `timeout` elapses ([`Error::Timeout`], nothing is consumed).
    /// A `timeout` of `None` waits forever.
    fn read_fifo<V>(
        &mut self,
        fifo: &Fifo,
        buf: &mut [V],
        timeout: Option<Duration>,
    ) -> TransportResult<FifoRead>
    where
        V: RegisterValue;
}
