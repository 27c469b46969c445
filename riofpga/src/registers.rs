//! Typed handles to the scalar registers of a device.
//!
//! A handle only holds a weak pointer to its device's transport, so it never keeps a session
//! alive. Every call locks the transport for exactly one transaction.

use crate::{
    core::{
        Direction,
        Register,
        RegisterValue,
    },
    transport::{
        Error,
        Transport,
        TransportResult,
    },
};
use std::{
    marker::PhantomData,
    sync::{
        Arc,
        Mutex,
        Weak,
    },
};

fn checked<V>(register: &Register) -> TransportResult<()>
where
    V: RegisterValue,
{
    if V::KIND != register.kind {
        return Err(Error::mismatch(register, V::KIND));
    }
    Ok(())
}

fn locked<T, R>(
    transport: &Weak<Mutex<T>>,
    f: impl FnOnce(&mut T) -> TransportResult<R>,
) -> TransportResult<R>
where
    T: Transport,
{
    let tarc = transport.upgrade().ok_or(Error::InvalidSession)?;
    let mut transport = tarc.lock().map_err(|_| Error::InvalidSession)?;
    f(&mut transport)
}

/// A register the host writes and the FPGA reads
#[derive(Debug)]
pub struct Control<T, V> {
    /// Upwards pointer to the parent class' transport
    transport: Weak<Mutex<T>>,
    register: Register,
    phantom: PhantomData<V>,
}

impl<T, V> Control<T, V>
where
    T: Transport,
    V: RegisterValue,
{
    /// # Errors
    /// Returns an error if `register` isn't a control of type `V`
    pub fn new(transport: &Arc<Mutex<T>>, register: Register) -> TransportResult<Self> {
        Self::from_descriptor(Arc::downgrade(transport), register)
    }

    /// # Errors
    /// Returns an error if `register` isn't a control of type `V`
    pub fn from_descriptor(transport: Weak<Mutex<T>>, register: Register) -> TransportResult<Self> {
        checked::<V>(&register)?;
        if register.direction != Direction::Control {
            return Err(Error::ReadOnly(register.name));
        }
        Ok(Self {
            transport,
            register,
            phantom: PhantomData,
        })
    }

    #[must_use]
    pub fn register(&self) -> &Register {
        &self.register
    }

    /// Read back the last value written
    /// # Errors
    /// Returns an error on bad transport
    pub fn read(&self) -> TransportResult<V> {
        locked(&self.transport, |t| t.read(&self.register))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn write(&self, value: V) -> TransportResult<()> {
        locked(&self.transport, |t| t.write(&self.register, value))
    }
}

/// A register the FPGA writes and the host reads
#[derive(Debug)]
pub struct Indicator<T, V> {
    /// Upwards pointer to the parent class' transport
    transport: Weak<Mutex<T>>,
    register: Register,
    phantom: PhantomData<V>,
}

impl<T, V> Indicator<T, V>
where
    T: Transport,
    V: RegisterValue,
{
    /// # Errors
    /// Returns an error if `register` isn't of type `V`
    pub fn new(transport: &Arc<Mutex<T>>, register: Register) -> TransportResult<Self> {
        Self::from_descriptor(Arc::downgrade(transport), register)
    }

    /// Controls can be watched through an indicator handle too
    /// # Errors
    /// Returns an error if `register` isn't of type `V`
    pub fn from_descriptor(transport: Weak<Mutex<T>>, register: Register) -> TransportResult<Self> {
        checked::<V>(&register)?;
        Ok(Self {
            transport,
            register,
            phantom: PhantomData,
        })
    }

    #[must_use]
    pub fn register(&self) -> &Register {
        &self.register
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn read(&self) -> TransportResult<V> {
        locked(&self.transport, |t| t.read(&self.register))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            Fifos,
            Kind,
            Registers,
            Value,
        },
        transport::mock::Mock,
    };

    fn device() -> (Arc<Mutex<Mock>>, Register, Register) {
        let ao = Register::new("Connector1AO0", 0x8112, Kind::I16, Direction::Control);
        let ai = Register::new("Connector1AI0", 0x8116, Kind::I16, Direction::Indicator);
        let registers = Registers::from([
            (ao.name.clone(), ao.clone()),
            (ai.name.clone(), ai.clone()),
        ]);
        let transport = Arc::new(Mutex::new(Mock::new(&registers, &Fifos::new())));
        (transport, ao, ai)
    }

    #[test]
    fn test_control_round_trip() {
        let (transport, ao, _) = device();
        let control = Control::<_, i16>::new(&transport, ao).unwrap();
        control.write(-1200).unwrap();
        assert_eq!(control.read().unwrap(), -1200);
        assert_eq!(transport.lock().unwrap().transactions(), 2);
    }

    #[test]
    fn test_indicator_follows_fpga() {
        let (transport, _, ai) = device();
        let indicator = Indicator::<_, i16>::new(&transport, ai).unwrap();
        assert_eq!(indicator.read().unwrap(), 0);
        transport
            .lock()
            .unwrap()
            .poke(0x8116, Value::I16(2047))
            .unwrap();
        assert_eq!(indicator.read().unwrap(), 2047);
    }

    #[test]
    fn test_wrong_handle() {
        let (transport, ao, ai) = device();
        assert!(matches!(
            Control::<_, u16>::new(&transport, ao.clone()),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(
            Control::<_, i16>::new(&transport, ai).err(),
            Some(Error::ReadOnly("Connector1AI0".into()))
        );
        // Controls are readable
        let watched = Indicator::<_, i16>::new(&transport, ao).unwrap();
        assert_eq!(watched.read().unwrap(), 0);
    }

    #[test]
    fn test_dropped_device() {
        let (transport, ao, _) = device();
        let control = Control::<_, i16>::new(&transport, ao).unwrap();
        drop(transport);
        assert_eq!(control.write(1), Err(Error::InvalidSession));
    }
}
