pub mod fxas21002;
pub mod fxos8700;
mod registers;

use log::debug;

use crate::{
    bus::{RegisterRead, SensorBus},
    context::{ChannelSet, FusionContext},
    error::SensorError,
    fifo::SampleFifo,
    sample::{packets, PACKET_LEN},
};

pub use fxas21002::Fxas21002;
pub use fxos8700::Fxos8700;

/// Deepest hardware FIFO of the supported parts, in packets.
pub const MAX_FIFO_PACKETS: usize = 32;
/// Default burst cap. 15 packets keep a transaction at 90 bytes, some I2C
/// adapters fail on reads longer than ~126 bytes.
pub const DEFAULT_MAX_FIFO_PACKETS_PER_READ: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Initialized,
    Idle,
}

/// Per-instance state of an installed sensor, mutated by its driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorHandle {
    pub address: u8,
    /// Channels successfully brought up by the last `init`.
    pub initialized: ChannelSet,
    pub state: DriverState,
}

impl SensorHandle {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            initialized: ChannelSet::empty(),
            state: DriverState::Uninitialized,
        }
    }

    pub fn require(&self, channels: ChannelSet) -> Result<(), SensorError> {
        if self.initialized.contains(channels) {
            Ok(())
        } else {
            Err(SensorError::NotInitialized)
        }
    }
}

/// Successful outcome of a driver read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Number of readings taken from the device.
    Samples(usize),
    /// The device had nothing new. Expected when polling faster than the ODR.
    NoData,
}

impl ReadStatus {
    pub fn merge(self, other: ReadStatus) -> ReadStatus {
        match (self, other) {
            (ReadStatus::NoData, ReadStatus::NoData) => ReadStatus::NoData,
            (ReadStatus::Samples(n), ReadStatus::NoData)
            | (ReadStatus::NoData, ReadStatus::Samples(n)) => ReadStatus::Samples(n),
            (ReadStatus::Samples(a), ReadStatus::Samples(b)) => ReadStatus::Samples(a + b),
        }
    }

    pub fn count(self) -> usize {
        match self {
            ReadStatus::Samples(n) => n,
            ReadStatus::NoData => 0,
        }
    }
}

/// One device family. Selected at install time, held by the registry as a trait object.
pub trait SensorDriver {
    fn name(&self) -> &'static str;

    /// Every channel the device can provide.
    fn channels(&self) -> ChannelSet;

    fn init(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError>;

    fn read(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<ReadStatus, SensorError>;

    /// Puts the whole device into standby.
    fn idle(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError>;
}

/// Collects the sub-results of a composite read. The first failure is reported,
/// later ones are only logged.
#[derive(Debug)]
pub struct FirstFailure {
    name: &'static str,
    first: Option<SensorError>,
    status: ReadStatus,
}

impl FirstFailure {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            first: None,
            status: ReadStatus::NoData,
        }
    }

    pub fn record(&mut self, channel: &str, result: Result<ReadStatus, SensorError>) {
        match result {
            Ok(status) => self.status = self.status.merge(status),
            Err(err) if self.first.is_none() => self.first = Some(err),
            Err(err) => debug!("{} {}: {} (masked by earlier failure)", self.name, channel, err),
        }
    }

    pub fn finish(self) -> Result<ReadStatus, SensorError> {
        match self.first {
            Some(err) => Err(err),
            None => Ok(self.status),
        }
    }
}

/// Where a FIFO-backed channel lives on its device.
#[derive(Debug, Clone, Copy)]
pub struct FifoLayout {
    pub status_reg: u8,
    pub count_mask: u8,
    pub data_reg: u8,
}

/// Empties a device FIFO into `fifo` in bursts of at most `max_packets`.
///
/// Reads the pending count once, then issues `ceil(pending / max_packets)` burst
/// reads. Stops at the first failed burst; packets from earlier bursts stay buffered.
pub fn drain_fifo<const N: usize>(
    bus: &mut dyn SensorBus,
    address: u8,
    layout: FifoLayout,
    max_packets: usize,
    fifo: &mut SampleFifo<N>,
) -> Result<ReadStatus, SensorError> {
    let mut pending = (bus.read_register(address, layout.status_reg)? & layout.count_mask) as usize;
    if pending == 0 {
        return Ok(ReadStatus::NoData);
    }

    let max_packets = max_packets.clamp(1, MAX_FIFO_PACKETS);
    let mut buf = [0u8; PACKET_LEN * MAX_FIFO_PACKETS];
    let mut drained = 0;

    while pending > 0 {
        let count = pending.min(max_packets);
        pending -= count;

        let burst = RegisterRead::burst(layout.data_reg, count, PACKET_LEN);
        let bytes = &mut buf[..burst.len];
        bus.read(address, &[burst], bytes)?;

        for sample in packets(bytes) {
            fifo.push(sample);
        }
        drained += count;
    }

    Ok(ReadStatus::Samples(drained))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::mock::MockBus, error::BusError, sample::ChannelSample};

    const ADDR: u8 = 0x1F;
    const LAYOUT: FifoLayout = FifoLayout {
        status_reg: 0x00,
        count_mask: 0x3F,
        data_reg: 0x01,
    };

    fn packet_bytes(range: std::ops::Range<i16>) -> Vec<u8> {
        range
            .flat_map(|i| {
                let mut p = Vec::with_capacity(PACKET_LEN);
                p.extend_from_slice(&i.to_be_bytes());
                p.extend_from_slice(&(-i).to_be_bytes());
                p.extend_from_slice(&(i * 2).to_be_bytes());
                p
            })
            .collect()
    }

    #[test]
    fn drains_37_packets_in_three_bursts() {
        let mut bus = MockBus::new();
        // upper bits of F_STATUS are flags and must be masked off
        bus.push_stream(ADDR, 0x00, &[0xC0 | 37]);
        bus.push_stream(ADDR, 0x01, &packet_bytes(0..37));

        let mut fifo = SampleFifo::<64>::new();
        let status = drain_fifo(&mut bus, ADDR, LAYOUT, 15, &mut fifo).unwrap();

        assert_eq!(status, ReadStatus::Samples(37));
        assert_eq!(bus.reads(), vec![(0x00, 1), (0x01, 90), (0x01, 90), (0x01, 42)]);
        let got: Vec<_> = fifo.drain().collect();
        let want: Vec<_> = (0..37).map(|i| ChannelSample::new(i, -i, i * 2)).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn empty_fifo_is_no_data() {
        let mut bus = MockBus::new();
        bus.push_stream(ADDR, 0x00, &[0x80]);
        let mut fifo = SampleFifo::<8>::new();

        assert_eq!(
            drain_fifo(&mut bus, ADDR, LAYOUT, 15, &mut fifo),
            Ok(ReadStatus::NoData)
        );
        assert_eq!(bus.reads().len(), 1);
        assert!(fifo.is_empty());
    }

    #[test]
    fn failed_burst_stops_draining_and_keeps_earlier_samples() {
        let mut bus = MockBus::new();
        bus.push_stream(ADDR, 0x00, &[20]);
        // only the first burst has data, the second comes up short
        bus.push_stream(ADDR, 0x01, &packet_bytes(0..15));
        bus.push_stream(ADDR, 0x01, &[0u8; 6]);

        let mut fifo = SampleFifo::<32>::new();
        let result = drain_fifo(&mut bus, ADDR, LAYOUT, 15, &mut fifo);

        assert_eq!(result, Err(SensorError::Bus(BusError::ShortRead)));
        assert_eq!(fifo.len(), 15);
        assert_eq!(bus.reads(), vec![(0x00, 1), (0x01, 90), (0x01, 30)]);
    }

    #[test]
    fn status_read_failure_is_returned() {
        let mut bus = MockBus::new();
        bus.fail_next(ADDR, 0x00, BusError::Nack);
        let mut fifo = SampleFifo::<8>::new();
        assert_eq!(
            drain_fifo(&mut bus, ADDR, LAYOUT, 15, &mut fifo),
            Err(SensorError::Bus(BusError::Nack))
        );
    }

    #[test]
    fn first_failure_wins() {
        let mut agg = FirstFailure::new("test");
        agg.record("accel", Ok(ReadStatus::Samples(3)));
        agg.record("mag", Err(SensorError::Bus(BusError::Timeout)));
        agg.record("thermal", Err(SensorError::Bus(BusError::Nack)));
        assert_eq!(agg.finish(), Err(SensorError::Bus(BusError::Timeout)));

        let mut agg = FirstFailure::new("test");
        agg.record("accel", Ok(ReadStatus::NoData));
        agg.record("mag", Ok(ReadStatus::Samples(1)));
        assert_eq!(agg.finish(), Ok(ReadStatus::Samples(1)));
    }

    #[test]
    fn require_checks_every_bit() {
        let mut handle = SensorHandle::new(ADDR);
        handle.initialized = ChannelSet::ACCEL;
        assert!(handle.require(ChannelSet::ACCEL).is_ok());
        assert_eq!(
            handle.require(ChannelSet::ACCEL | ChannelSet::MAG),
            Err(SensorError::NotInitialized)
        );
    }
}
