//! A device looked up by register name at runtime, for when the image isn't known at compile time.

use crate::{
    core::{
        DeviceImage,
        Fifo,
        Fifos,
        Register,
        RegisterValue,
        Registers,
        Value,
    },
    fifo::{
        FifoChannel,
        Shared,
    },
    registers::{
        Control,
        Indicator,
    },
    transport::{
        Error,
        Transport,
        TransportResult,
    },
};
use kstring::KString;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

/// A session paired with the register and FIFO maps of the image it runs
#[derive(Debug)]
pub struct Device<T> {
    pub transport: Arc<Mutex<T>>,
    registers: Registers,
    fifos: Fifos,
    /// One host-side FIFO state per name, handed to every channel on it
    channels: HashMap<KString, Arc<Mutex<Shared>>>,
}

impl<T> Device<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new<I>(transport: T, image: &I) -> Self
    where
        I: DeviceImage,
    {
        let fifos = image.fifos().clone();
        let channels = fifos
            .keys()
            .map(|name| (name.clone(), Shared::new()))
            .collect();
        Self {
            transport: Arc::new(Mutex::new(transport)),
            registers: image.registers().clone(),
            fifos,
            channels,
        }
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    #[must_use]
    pub fn fifos(&self) -> &Fifos {
        &self.fifos
    }

    /// # Errors
    /// Returns an error if the image has no register `name`
    pub fn register(&self, name: &str) -> TransportResult<&Register> {
        self.registers
            .get(name)
            .ok_or_else(|| Error::MissingRegister(KString::from_ref(name)))
    }

    /// # Errors
    /// Returns an error if the image has no FIFO `name`
    pub fn fifo_descriptor(&self, name: &str) -> TransportResult<&Fifo> {
        self.fifos
            .get(name)
            .ok_or_else(|| Error::MissingFifo(KString::from_ref(name)))
    }

    fn lock(&self) -> TransportResult<MutexGuard<'_, T>> {
        self.transport.lock().map_err(|_| Error::InvalidSession)
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn is_running(&self) -> TransportResult<bool> {
        self.lock()?.is_running()
    }

    /// Reset the VI. Running FIFO channels are left `Stopped`.
    /// # Errors
    /// Returns an error on bad transport
    pub fn reset(&self) -> TransportResult<()> {
        self.lock()?.reset()?;
        for shared in self.channels.values() {
            Shared::stop(shared);
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn run(&self) -> TransportResult<()> {
        self.lock()?.run()
    }

    /// Read register `name` without knowing its kind up front
    /// # Errors
    /// Returns an error on a bad name or bad transport
    pub fn read_value(&self, name: &str) -> TransportResult<Value> {
        let register = self.register(name)?;
        self.lock()?.read_value(register)
    }

    /// # Errors
    /// Returns an error on a bad name, a mismatched type or bad transport
    pub fn read<V>(&self, name: &str) -> TransportResult<V>
    where
        V: RegisterValue,
    {
        let register = self.register(name)?;
        self.lock()?.read(register)
    }

    /// # Errors
    /// Returns an error on a bad name, a mismatched type, a read-only register or bad transport
    pub fn write<V>(&self, name: &str, value: V) -> TransportResult<()>
    where
        V: RegisterValue,
    {
        let register = self.register(name)?;
        self.lock()?.write(register, value)
    }

    /// Write the integer `n` to register `name`, whatever its width
    /// # Errors
    /// Returns an error if `n` doesn't fit, as well as on a bad name, a read-only register or bad
    /// transport
    pub fn write_int(&self, name: &str, n: i128) -> TransportResult<()> {
        let register = self.register(name)?;
        self.lock()?.write_int(register, n)
    }

    /// Get a typed handle to the control `name`
    /// # Errors
    /// Returns an error on a bad name, a mismatched type or an indicator
    pub fn control<V>(&self, name: &str) -> TransportResult<Control<T, V>>
    where
        V: RegisterValue,
    {
        Control::new(&self.transport, self.register(name)?.clone())
    }

    /// Get a typed, read-only handle to the register `name`
    /// # Errors
    /// Returns an error on a bad name or a mismatched type
    pub fn indicator<V>(&self, name: &str) -> TransportResult<Indicator<T, V>>
    where
        V: RegisterValue,
    {
        Indicator::new(&self.transport, self.register(name)?.clone())
    }

    /// Get a channel on the FIFO `name`. Channels on the same FIFO share their state, so a second
    /// handle sees the configuration and streaming done through the first.
    /// # Errors
    /// Returns an error on a bad name or a mismatched element type
    pub fn fifo<V>(&self, name: &str) -> TransportResult<FifoChannel<T, V>>
    where
        V: RegisterValue,
    {
        let fifo = self.fifo_descriptor(name)?.clone();
        let shared = self
            .channels
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MissingFifo(KString::from_ref(name)))?;
        FifoChannel::with_shared(Arc::downgrade(&self.transport), fifo, shared)
    }
}
