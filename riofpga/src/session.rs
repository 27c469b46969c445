//! Process-wide driver lifecycle and scoped sessions.
//!
//! The session API must be initialized before anything else and finalized after everything
//! else. [`Runtime`] turns that into ownership: sessions borrow the runtime, so the runtime can't
//! be finalized (or dropped) while any of them is still open.

use crate::{
    core::{
        DeviceImage,
        Fifo,
        Kind,
        RegisterValue,
        Value,
    },
    transport::{
        FifoRead,
        Transport,
        TransportResult,
    },
};
use std::{
    marker::PhantomData,
    ops::{
        Deref,
        DerefMut,
    },
    time::Duration,
};
use tracing::{
    info,
    warn,
};

/// The resource name of the first target attached to a host
pub const DEFAULT_RESOURCE: &str = "RIO0";

/// Options for opening a session
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct OpenAttributes {
    /// Download the bitfile but don't start the VI
    pub no_run: bool,
}

/// The vendor session API. Implementors own bitfile download, signature verification and
/// target discovery.
pub trait Driver {
    type Session: Transport;

    /// Must be called before any other call
    fn initialize(&mut self) -> TransportResult<()>;

    /// Opens a session to the target `resource`, downloading `bitfile` if the target isn't
    /// already running it
    fn open(
        &self,
        bitfile: &str,
        signature: &str,
        resource: &str,
        attributes: OpenAttributes,
    ) -> TransportResult<Self::Session>;

    /// Must be called after all other calls
    fn finalize(&mut self) -> TransportResult<()>;
}

/// An initialized session API. Finalizes on drop.
#[derive(Debug)]
pub struct Runtime<D>
where
    D: Driver,
{
    driver: D,
    finalized: bool,
}

impl<D> Runtime<D>
where
    D: Driver,
{
    /// Initialize the session API
    /// # Errors
    /// Returns an error if the driver fails to initialize
    pub fn initialize(mut driver: D) -> TransportResult<Self> {
        driver.initialize()?;
        info!("session API initialized");
        Ok(Self {
            driver,
            finalized: false,
        })
    }

    /// Open a session for `image` on `resource`
    /// # Errors
    /// Returns an error if the driver refuses the image or resource
    pub fn open<I>(
        &self,
        image: &I,
        resource: &str,
        attributes: OpenAttributes,
    ) -> TransportResult<Session<'_, D::Session>>
    where
        I: DeviceImage,
    {
        let transport =
            self.driver
                .open(image.bitfile(), image.signature(), resource, attributes)?;
        info!(bitfile = image.bitfile(), resource, "session opened");
        Ok(Session {
            transport,
            closed: false,
            runtime: PhantomData,
        })
    }

    /// Bring up `image` on `resource` from a known state: open without running, reset, then run
    /// # Errors
    /// Returns the first error of the sequence. A session that opened is closed again on error.
    pub fn start<I>(&self, image: &I, resource: &str) -> TransportResult<Session<'_, D::Session>>
    where
        I: DeviceImage,
    {
        let mut session = self.open(image, resource, OpenAttributes { no_run: true })?;
        session.reset()?;
        session.run()?;
        info!(resource, "FPGA running");
        Ok(session)
    }

    /// Finalize the session API, reporting any error
    /// # Errors
    /// Returns an error if the driver fails to finalize
    pub fn finalize(mut self) -> TransportResult<()> {
        self.finalized = true;
        self.driver.finalize()?;
        info!("session API finalized");
        Ok(())
    }
}

impl<D> Drop for Runtime<D>
where
    D: Driver,
{
    fn drop(&mut self) {
        if !self.finalized {
            if let Err(e) = self.driver.finalize() {
                warn!(error = %e, "failed to finalize the session API");
            }
        }
    }
}

/// An open session that can't outlive its [`Runtime`]. Closes on drop.
#[derive(Debug)]
pub struct Session<'rt, T>
where
    T: Transport,
{
    transport: T,
    closed: bool,
    runtime: PhantomData<&'rt ()>,
}

impl<'rt, T> Session<'rt, T>
where
    T: Transport,
{
    /// Close the session, reporting any error
    /// # Errors
    /// Returns an error if the device fails to close the session
    pub fn close(mut self) -> TransportResult<()> {
        Transport::close(&mut self)
    }
}

impl<'rt, T> Deref for Session<'rt, T>
where
    T: Transport,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.transport
    }
}

impl<'rt, T> DerefMut for Session<'rt, T>
where
    T: Transport,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transport
    }
}

impl<'rt, T> Drop for Session<'rt, T>
where
    T: Transport,
{
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.transport.close() {
                warn!(error = %e, "failed to close session");
            }
        }
    }
}

// Sessions are transports themselves so they can be handed to a `Device`
impl<'rt, T> Transport for Session<'rt, T>
where
    T: Transport,
{
    fn is_running(&mut self) -> TransportResult<bool> {
        self.transport.is_running()
    }

    fn read_raw(&mut self, addr: u32, kind: Kind) -> TransportResult<Value> {
        self.transport.read_raw(addr, kind)
    }

    fn write_raw(&mut self, addr: u32, value: Value) -> TransportResult<()> {
        self.transport.write_raw(addr, value)
    }

    fn reset(&mut self) -> TransportResult<()> {
        self.transport.reset()
    }

    fn run(&mut self) -> TransportResult<()> {
        self.transport.run()
    }

    fn close(&mut self) -> TransportResult<()> {
        self.closed = true;
        self.transport.close()?;
        info!("session closed");
        Ok(())
    }

    fn configure_fifo(&mut self, fifo: &Fifo, requested_depth: usize) -> TransportResult<usize> {
        self.transport.configure_fifo(fifo, requested_depth)
    }

    fn start_fifo(&mut self, fifo: &Fifo) -> TransportResult<()> {
        self.transport.start_fifo(fifo)
    }

    fn stop_fifo(&mut self, fifo: &Fifo) -> TransportResult<()> {
        self.transport.stop_fifo(fifo)
    }

    fn read_fifo<V>(
        &mut self,
        fifo: &Fifo,
        buf: &mut [V],
        timeout: Option<Duration>,
    ) -> TransportResult<FifoRead>
    where
        V: RegisterValue,
    {
        self.transport.read_fifo(fifo, buf, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            Direction,
            Fifos,
            Register,
            Registers,
        },
        transport::{
            codes,
            mock::MockDriver,
            Error,
        },
    };
    use rio_utils::image::header::Header;

    fn image() -> Header {
        let reg = Register::new("run_mode", 0x8112, Kind::U16, Direction::Control);
        Header {
            target: "NiFpga_main_FPGA".to_owned(),
            bitfile: "NiFpga_main_FPGA.lvbitx".to_owned(),
            signature: "D0D9E5A2".to_owned(),
            registers: Registers::from([(reg.name.clone(), reg)]),
            fifos: Fifos::new(),
        }
    }

    #[test]
    fn test_start_resets_and_runs() {
        let image = image();
        let run_mode = image.registers.get("run_mode").unwrap().clone();
        let runtime = Runtime::initialize(MockDriver::new(&image)).unwrap();
        let mut session = runtime.start(&image, DEFAULT_RESOURCE).unwrap();
        assert!(session.is_running().unwrap());
        session.write(&run_mode, 2u16).unwrap();
        assert_eq!(session.read::<u16>(&run_mode).unwrap(), 2);
        session.close().unwrap();
        runtime.finalize().unwrap();
    }

    #[test]
    fn test_open_no_run() {
        let image = image();
        let runtime = Runtime::initialize(MockDriver::new(&image)).unwrap();
        let mut session = runtime
            .open(&image, DEFAULT_RESOURCE, OpenAttributes { no_run: true })
            .unwrap();
        assert!(!session.is_running().unwrap());
    }

    #[test]
    fn test_start_bad_signature() {
        let image = image();
        let runtime = Runtime::initialize(MockDriver::new(&image)).unwrap();
        let mut other = image.clone();
        other.signature = "FFFFFFFF".to_owned();
        assert_eq!(
            runtime.start(&other, DEFAULT_RESOURCE).err(),
            Some(Error::Device {
                code: codes::SIGNATURE_MISMATCH
            })
        );
    }

    #[test]
    fn test_closed_session_is_invalid() {
        let image = image();
        let run_mode = image.registers.get("run_mode").unwrap().clone();
        let runtime = Runtime::initialize(MockDriver::new(&image)).unwrap();
        let mut session = runtime.start(&image, DEFAULT_RESOURCE).unwrap();
        Transport::close(&mut session).unwrap();
        assert_eq!(session.write(&run_mode, 1u16), Err(Error::InvalidSession));
    }
}
