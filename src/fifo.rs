use heapless::Deque;

use crate::sample::ChannelSample;

pub const ACCEL_FIFO_SIZE: usize = 32;
pub const MAG_FIFO_SIZE: usize = 16;
pub const GYRO_FIFO_SIZE: usize = 32;

/// Fixed-capacity sample queue for one physical channel.
///
/// The driver pushes, the fusion engine drains. When full the oldest sample is
/// dropped so the producer never waits. `N` must be non-zero, `heapless` rejects
/// an empty deque at compile time.
#[derive(Debug, Clone)]
pub struct SampleFifo<const N: usize> {
    samples: Deque<ChannelSample, N>,
}

impl<const N: usize> SampleFifo<N> {
    pub const fn new() -> Self {
        Self {
            samples: Deque::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn push(&mut self, sample: ChannelSample) {
        if self.samples.is_full() {
            self.samples.pop_front();
        }
        // room was made above
        let _ = self.samples.push_back(sample);
    }

    pub fn pop(&mut self) -> Option<ChannelSample> {
        self.samples.pop_front()
    }

    /// Oldest-first view without consuming.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelSample> + '_ {
        self.samples.iter()
    }

    /// Takes every buffered sample, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = ChannelSample> + '_ {
        core::iter::from_fn(move || self.samples.pop_front())
    }
}

impl<const N: usize> Default for SampleFifo<N> {
    fn default() -> Self {
        Self::new()
    }
}
