//! Mock transport implementations used in testing the interface

use super::{
    codes,
    Error,
    FifoRead,
    Transport,
    TransportResult,
};
use crate::{
    core::{
        DeviceImage,
        Fifo,
        Fifos,
        Kind,
        RegisterValue,
        Registers,
        Value,
    },
    session::{
        Driver,
        OpenAttributes,
        DEFAULT_RESOURCE,
    },
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Condvar,
        Mutex,
    },
    time::{
        Duration,
        Instant,
    },
};

/// Host-side depth of a FIFO that was never configured
pub const DEFAULT_FIFO_DEPTH: usize = 4096;

#[derive(Debug)]
struct Queue {
    elements: VecDeque<Value>,
    depth: usize,
    running: bool,
    ended: bool,
}

#[derive(Debug)]
struct Stream {
    kind: Kind,
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl Stream {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            queue: Mutex::new(Queue {
                elements: VecDeque::new(),
                depth: DEFAULT_FIFO_DEPTH,
                running: false,
                ended: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> TransportResult<std::sync::MutexGuard<'_, Queue>> {
        self.queue.lock().map_err(|_| Error::InvalidSession)
    }
}

/// The FPGA side of a mocked DMA FIFO. Clone it into whatever thread plays the hardware.
#[derive(Debug, Clone)]
pub struct FifoFeeder {
    stream: Arc<Stream>,
}

impl FifoFeeder {
    /// Push `data` into the FIFO as the FPGA would, returning how many elements fit in the
    /// remaining host-side depth. Nothing is accepted while the FIFO isn't started.
    /// # Errors
    /// Returns an error if `V` isn't the FIFO's element type
    pub fn push<V>(&self, data: &[V]) -> TransportResult<usize>
    where
        V: RegisterValue,
    {
        if V::KIND != self.stream.kind {
            return Err(Error::Device {
                code: codes::INVALID_PARAMETER,
            });
        }
        let mut queue = self.stream.lock()?;
        if !queue.running {
            return Ok(0);
        }
        let room = queue.depth.saturating_sub(queue.elements.len());
        let accepted = room.min(data.len());
        queue
            .elements
            .extend(data[..accepted].iter().map(|v| v.into_value()));
        self.stream.ready.notify_all();
        Ok(accepted)
    }

    /// Signal the end of the stream, waking any blocked reader with whatever is queued
    /// # Errors
    /// Returns an error if the queue lock was poisoned
    pub fn end_stream(&self) -> TransportResult<()> {
        let mut queue = self.stream.lock()?;
        queue.ended = true;
        self.stream.ready.notify_all();
        Ok(())
    }
}

/// A simulated FPGA target that keeps its registers in memory, useful for testing
#[derive(Debug)]
pub struct Mock {
    memory: HashMap<u32, Value>,
    streams: HashMap<u32, Arc<Stream>>,
    open: bool,
    running: bool,
    transactions: usize,
    fault: Option<i32>,
}

impl Mock {
    /// Construct a new, open and running mock target from its register and FIFO maps
    #[must_use]
    pub fn new(registers: &Registers, fifos: &Fifos) -> Self {
        let memory = registers
            .values()
            .map(|reg| (reg.addr, Value::zero(reg.kind)))
            .collect();
        let streams = fifos
            .values()
            .map(|fifo| (fifo.number, Arc::new(Stream::new(fifo.kind))))
            .collect();
        Self {
            memory,
            streams,
            open: true,
            running: true,
            transactions: 0,
            fault: None,
        }
    }

    #[must_use]
    pub fn from_image<I>(image: &I) -> Self
    where
        I: DeviceImage,
    {
        Self::new(image.registers(), image.fifos())
    }

    /// The number of device transactions attempted on this session so far
    #[must_use]
    pub fn transactions(&self) -> usize {
        self.transactions
    }

    /// Make the next transaction fail with the device status `code`
    pub fn fail_next(&mut self, code: i32) {
        self.fault = Some(code);
    }

    /// Change a register from the FPGA side, as the running VI would for an indicator. This is not
    /// a host transaction.
    /// # Errors
    /// Returns an error if there is no register of `value`'s kind at `addr`
    pub fn poke(&mut self, addr: u32, value: Value) -> TransportResult<()> {
        match self.memory.get_mut(&addr) {
            Some(slot) if slot.kind() == value.kind() => {
                *slot = value;
                Ok(())
            }
            _ => Err(Error::Device {
                code: codes::INVALID_PARAMETER,
            }),
        }
    }

    /// Get the FPGA side of `fifo`
    #[must_use]
    pub fn feeder(&self, fifo: &Fifo) -> Option<FifoFeeder> {
        self.streams.get(&fifo.number).map(|stream| FifoFeeder {
            stream: Arc::clone(stream),
        })
    }

    fn transaction(&mut self) -> TransportResult<()> {
        if !self.open {
            return Err(Error::InvalidSession);
        }
        self.transactions += 1;
        match self.fault.take() {
            Some(code) => Err(Error::Device { code }),
            None => Ok(()),
        }
    }

    fn stream(&self, fifo: &Fifo) -> TransportResult<Arc<Stream>> {
        self.streams
            .get(&fifo.number)
            .cloned()
            .ok_or_else(|| Error::MissingFifo(fifo.name.clone()))
    }

    fn stop_streams(&self) -> TransportResult<()> {
        for stream in self.streams.values() {
            let mut queue = stream.lock()?;
            queue.running = false;
            queue.elements.clear();
            stream.ready.notify_all();
        }
        Ok(())
    }
}

impl Transport for Mock {
    fn is_running(&mut self) -> TransportResult<bool> {
        self.transaction()?;
        Ok(self.running)
    }

    fn read_raw(&mut self, addr: u32, kind: Kind) -> TransportResult<Value> {
        self.transaction()?;
        match self.memory.get(&addr) {
            Some(value) if value.kind() == kind => Ok(*value),
            _ => Err(Error::Device {
                code: codes::INVALID_PARAMETER,
            }),
        }
    }

    fn write_raw(&mut self, addr: u32, value: Value) -> TransportResult<()> {
        self.transaction()?;
        self.poke(addr, value)
    }

    fn reset(&mut self) -> TransportResult<()> {
        self.transaction()?;
        for value in self.memory.values_mut() {
            *value = Value::zero(value.kind());
        }
        self.stop_streams()?;
        self.running = false;
        Ok(())
    }

    fn run(&mut self) -> TransportResult<()> {
        self.transaction()?;
        self.running = true;
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        self.transaction()?;
        self.stop_streams()?;
        self.open = false;
        Ok(())
    }

    fn configure_fifo(&mut self, fifo: &Fifo, requested_depth: usize) -> TransportResult<usize> {
        self.transaction()?;
        let stream = self.stream(fifo)?;
        let mut queue = stream.lock()?;
        if requested_depth == 0 || queue.running {
            return Err(Error::Device {
                code: codes::INVALID_PARAMETER,
            });
        }
        // The DMA engine allocates host buffers in powers of two
        let granted = requested_depth
            .checked_next_power_of_two()
            .ok_or(Error::Device {
                code: codes::INVALID_PARAMETER,
            })?;
        queue.depth = granted;
        queue.elements.clear();
        Ok(granted)
    }

    fn start_fifo(&mut self, fifo: &Fifo) -> TransportResult<()> {
        self.transaction()?;
        let stream = self.stream(fifo)?;
        let mut queue = stream.lock()?;
        queue.running = true;
        queue.ended = false;
        Ok(())
    }

    fn stop_fifo(&mut self, fifo: &Fifo) -> TransportResult<()> {
        self.transaction()?;
        let stream = self.stream(fifo)?;
        let mut queue = stream.lock()?;
        queue.running = false;
        queue.elements.clear();
        stream.ready.notify_all();
        Ok(())
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
        self.transaction()?;
        let stream = self.stream(fifo)?;
        if V::KIND != stream.kind {
            return Err(Error::Device {
                code: codes::INVALID_PARAMETER,
            });
        }
        // A timeout too large to represent is as good as forever
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut queue = stream.lock()?;
        if !queue.running {
            return Err(Error::Device {
                code: codes::INVALID_PARAMETER,
            });
        }
        while queue.elements.len() < buf.len() && !queue.ended {
            queue = match deadline {
                None => stream
                    .ready
                    .wait(queue)
                    .map_err(|_| Error::InvalidSession)?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Timeout);
                    }
                    stream
                        .ready
                        .wait_timeout(queue, deadline - now)
                        .map_err(|_| Error::InvalidSession)?
                        .0
                }
            };
        }
        let read = buf.len().min(queue.elements.len());
        for (slot, value) in buf.iter_mut().zip(queue.elements.drain(..read)) {
            *slot = V::from_value(value).ok_or(Error::Device {
                code: codes::INVALID_PARAMETER,
            })?;
        }
        Ok(FifoRead {
            read,
            remaining: queue.elements.len(),
        })
    }
}

/// A session driver that hands out [`Mock`] sessions for one device image
#[derive(Debug)]
pub struct MockDriver {
    registers: Registers,
    fifos: Fifos,
    signature: String,
    resources: Vec<String>,
    initialized: bool,
}

impl MockDriver {
    /// A driver with the image's target attached as [`DEFAULT_RESOURCE`]
    #[must_use]
    pub fn new<I>(image: &I) -> Self
    where
        I: DeviceImage,
    {
        Self {
            registers: image.registers().clone(),
            fifos: image.fifos().clone(),
            signature: image.signature().to_owned(),
            resources: vec![DEFAULT_RESOURCE.to_owned()],
            initialized: false,
        }
    }

    /// Attach another target under `resource`
    #[must_use]
    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resources.push(resource.to_owned());
        self
    }
}

impl Driver for MockDriver {
    type Session = Mock;

    fn initialize(&mut self) -> TransportResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn open(
        &self,
        _bitfile: &str,
        signature: &str,
        resource: &str,
        attributes: OpenAttributes,
    ) -> TransportResult<Mock> {
        if !self.initialized {
            return Err(Error::InvalidSession);
        }
        if !self.resources.iter().any(|r| r == resource) {
            return Err(Error::Device {
                code: codes::INVALID_RESOURCE_NAME,
            });
        }
        if signature != self.signature {
            return Err(Error::Device {
                code: codes::SIGNATURE_MISMATCH,
            });
        }
        let mut mock = Mock::new(&self.registers, &self.fifos);
        mock.running = !attributes.no_run;
        Ok(mock)
    }

    fn finalize(&mut self) -> TransportResult<()> {
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        Direction,
        Register,
    };
    use paste::paste;
    use std::thread;

    fn scratchpad(kind: Kind) -> (Mock, Register) {
        let reg = Register::new("scratchpad", 0x8000, kind, Direction::Control);
        let transport = Mock::new(
            &Registers::from([(reg.name.clone(), reg.clone())]),
            &Fifos::new(),
        );
        (transport, reg)
    }

    fn dma() -> (Mock, Fifo) {
        let fifo = Fifo::new("DMA", 0, Kind::I32);
        let transport = Mock::new(
            &Registers::new(),
            &Fifos::from([(fifo.name.clone(), fifo.clone())]),
        );
        (transport, fifo)
    }

    macro_rules! test_rw_kind {
        ($num:ty, $kind:ident, $v:literal) => {
            paste! {
                #[test]
                fn [<test_rw_$num>]() {
                    let (mut transport, reg) = scratchpad(Kind::$kind);
                    let num: $num = $v;
                    transport.write(&reg, num).unwrap();
                    let read_num: $num = transport.read(&reg).unwrap();
                    assert_eq!(read_num, num);
                }
            }
        };
    }

    #[test]
    fn test_read_power_on() {
        let (mut transport, reg) = scratchpad(Kind::U16);
        assert_eq!(transport.read_value(&reg).unwrap(), Value::U16(0));
        assert_eq!(transport.transactions(), 1);
    }

    #[test]
    fn test_indicator_is_read_only() {
        let reg = Register::new("Connector1AI0", 0x8000, Kind::I16, Direction::Indicator);
        let mut transport = Mock::new(
            &Registers::from([(reg.name.clone(), reg.clone())]),
            &Fifos::new(),
        );
        assert_eq!(
            transport.write(&reg, 5i16),
            Err(Error::ReadOnly("Connector1AI0".into()))
        );
        transport.poke(0x8000, Value::I16(-300)).unwrap();
        assert_eq!(transport.read::<i16>(&reg).unwrap(), -300);
        assert_eq!(transport.transactions(), 1);
    }

    #[test]
    fn test_type_mismatch_never_reaches_device() {
        let (mut transport, reg) = scratchpad(Kind::I16);
        assert!(matches!(
            transport.write(&reg, 70_000i32),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            transport.write_int(&reg, 40_000),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            transport.read::<u16>(&reg),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(transport.transactions(), 0);
        transport.write_int(&reg, -32_768).unwrap();
        assert_eq!(transport.read::<i16>(&reg).unwrap(), i16::MIN);
    }

    #[test]
    fn test_device_fault() {
        let (mut transport, reg) = scratchpad(Kind::U32);
        transport.fail_next(-61_499);
        assert_eq!(
            transport.write(&reg, 1u32),
            Err(Error::Device { code: -61_499 })
        );
        // Faults are not retried and don't stick
        transport.write(&reg, 2u32).unwrap();
        assert_eq!(transport.read::<u32>(&reg).unwrap(), 2);
        assert_eq!(transport.transactions(), 3);
    }

    #[test]
    fn test_closed_session() {
        let (mut transport, reg) = scratchpad(Kind::Bool);
        transport.close().unwrap();
        assert_eq!(transport.write(&reg, true), Err(Error::InvalidSession));
        assert_eq!(transport.close(), Err(Error::InvalidSession));
    }

    #[test]
    fn test_reset() {
        let (mut transport, reg) = scratchpad(Kind::U8);
        transport.write(&reg, 3u8).unwrap();
        transport.reset().unwrap();
        assert!(!transport.is_running().unwrap());
        assert_eq!(transport.read::<u8>(&reg).unwrap(), 0);
        transport.run().unwrap();
        assert!(transport.is_running().unwrap());
    }

    #[test]
    fn test_configure_rounds_up() {
        let (mut transport, fifo) = dma();
        assert_eq!(transport.configure_fifo(&fifo, 1000).unwrap(), 1024);
        assert_eq!(transport.configure_fifo(&fifo, 1024).unwrap(), 1024);
        assert!(transport.configure_fifo(&fifo, 0).is_err());
    }

    #[test]
    fn test_push_respects_depth() {
        let (mut transport, fifo) = dma();
        let feeder = transport.feeder(&fifo).unwrap();
        transport.configure_fifo(&fifo, 4).unwrap();
        // Not started yet
        assert_eq!(feeder.push(&[1i32, 2]).unwrap(), 0);
        transport.start_fifo(&fifo).unwrap();
        assert_eq!(feeder.push(&[1i32, 2, 3, 4, 5, 6]).unwrap(), 4);
        assert!(feeder.push(&[1u8]).is_err());
    }

    #[test]
    fn test_read_fifo_timeout_consumes_nothing() {
        let (mut transport, fifo) = dma();
        let feeder = transport.feeder(&fifo).unwrap();
        transport.start_fifo(&fifo).unwrap();
        feeder.push(&[7i32]).unwrap();
        let mut buf = [0i32; 2];
        assert_eq!(
            transport.read_fifo(&fifo, &mut buf, Some(Duration::ZERO)),
            Err(Error::Timeout)
        );
        let read = transport
            .read_fifo(&fifo, &mut buf[..1], Some(Duration::ZERO))
            .unwrap();
        assert_eq!(read, FifoRead { read: 1, remaining: 0 });
        assert_eq!(buf, [7, 0]);
    }

    #[test]
    fn test_read_fifo_blocks_for_data() {
        let (mut transport, fifo) = dma();
        let feeder = transport.feeder(&fifo).unwrap();
        transport.start_fifo(&fifo).unwrap();
        let producer = thread::spawn(move || {
            for chunk in [[1i32, 2], [3, 4]] {
                thread::sleep(Duration::from_millis(10));
                feeder.push(&chunk).unwrap();
            }
        });
        let mut buf = [0i32; 3];
        let read = transport.read_fifo(&fifo, &mut buf, None).unwrap();
        producer.join().unwrap();
        assert_eq!(read.read, 3);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_end_of_stream_short_read() {
        let (mut transport, fifo) = dma();
        let feeder = transport.feeder(&fifo).unwrap();
        transport.start_fifo(&fifo).unwrap();
        feeder.push(&[9i32, 8]).unwrap();
        feeder.end_stream().unwrap();
        let mut buf = [0i32; 8];
        let read = transport.read_fifo(&fifo, &mut buf, None).unwrap();
        assert_eq!(read, FifoRead { read: 2, remaining: 0 });
        assert_eq!(&buf[..2], &[9, 8]);
    }

    #[test]
    fn test_driver_open() {
        let reg = Register::new("run_mode", 0x8000, Kind::U16, Direction::Control);
        let header = rio_utils::image::header::Header {
            target: "NiFpga_test".to_owned(),
            bitfile: "test.lvbitx".to_owned(),
            signature: "ABCD".to_owned(),
            registers: Registers::from([(reg.name.clone(), reg)]),
            fifos: Fifos::new(),
        };
        let mut driver = MockDriver::new(&header).with_resource("RIO1");
        let attrs = OpenAttributes::default();
        assert_eq!(
            driver.open("test.lvbitx", "ABCD", "RIO0", attrs).err(),
            Some(Error::InvalidSession)
        );
        driver.initialize().unwrap();
        assert_eq!(
            driver.open("test.lvbitx", "ABCD", "RIO7", attrs).err(),
            Some(Error::Device {
                code: codes::INVALID_RESOURCE_NAME
            })
        );
        assert_eq!(
            driver.open("test.lvbitx", "FFFF", "RIO1", attrs).err(),
            Some(Error::Device {
                code: codes::SIGNATURE_MISMATCH
            })
        );
        let mut session = driver
            .open("test.lvbitx", "ABCD", "RIO1", OpenAttributes { no_run: true })
            .unwrap();
        assert!(!session.is_running().unwrap());
    }

    test_rw_kind!(bool, Bool, true);
    test_rw_kind!(u8, U8, 42);
    test_rw_kind!(u16, U16, 0xDEAD);
    test_rw_kind!(u32, U32, 0xDEAD_BEEF);
    test_rw_kind!(u64, U64, 0xDEAD_BEEF_B0BA_CAFE);
    test_rw_kind!(i8, I8, -42);
    test_rw_kind!(i16, I16, -0xDEA);
    test_rw_kind!(i32, I32, -0x0DEA_DBEE);
    test_rw_kind!(i64, I64, -0x0DEA_DBEE_FB0B_ACAF);
}
