use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Mutex, PoisonError, TryLockError,
};

use crate::config::clamp_gain;

/// Capability handed to a platform audio callback. Implementations must not
/// block, allocate or analyse: they only copy.
pub trait SampleSink: Send + Sync {
    fn on_samples_ready(&self, block: &[f32]);
}

/// Single-slot hand-off between the capture callback and the analysis tick.
///
/// The writer copies a complete block into the slot under a lock it only
/// *tries* to take; if the reader is mid-copy the block is dropped instead
/// of waiting. The reader holds the lock for exactly one copy. Either side
/// therefore sees a whole block, never a torn mix of two.
#[derive(Debug)]
pub struct SampleHandoff {
    slot: Mutex<Box<[f32]>>,
    gain_bits: AtomicU32,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl SampleHandoff {
    pub fn new(block_size: usize, gain: f32) -> Self {
        Self {
            slot: Mutex::new(vec![0.0; block_size].into_boxed_slice()),
            gain_bits: AtomicU32::new(clamp_gain(gain).to_bits()),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    /// Stores a gain clamped to `[0, 4]` and returns the stored value.
    pub fn set_gain(&self, gain: f32) -> f32 {
        let gain = clamp_gain(gain);
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
        gain
    }

    /// Number of blocks written into the slot so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Number of blocks discarded because the reader held the slot.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Copies the latest complete block into `out`, zero-filling any excess,
    /// and returns the delivery count at the time of the copy.
    pub fn snapshot_into(&self, out: &mut [f32]) -> u64 {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let shared = out.len().min(slot.len());
        out[..shared].copy_from_slice(&slot[..shared]);
        out[shared..].fill(0.0);
        self.delivered.load(Ordering::Acquire)
    }

    /// Resets the slot to silence.
    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.fill(0.0);
    }
}

impl SampleSink for SampleHandoff {
    fn on_samples_ready(&self, block: &[f32]) {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let gain = self.gain();
        let shared = block.len().min(slot.len());
        for (dst, src) in slot[..shared].iter_mut().zip(block) {
            *dst = src * gain;
        }
        slot[shared..].fill(0.0);
        self.delivered.fetch_add(1, Ordering::Release);
    }
}

/// Collects mono samples into fixed-size blocks without allocating after
/// construction. Used inside capture callbacks whose buffer sizes are chosen
/// by the platform.
#[derive(Debug, Clone)]
pub struct BlockAssembler {
    block: Box<[f32]>,
    filled: usize,
}

impl BlockAssembler {
    pub fn new(block_size: usize) -> Self {
        Self {
            block: vec![0.0; block_size.max(1)].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Appends one sample; returns true when this completed a block, which
    /// is then available from [`BlockAssembler::block`] until the next push.
    pub fn push(&mut self, sample: f32) -> bool {
        self.block[self.filled] = sample;
        self.filled += 1;
        if self.filled == self.block.len() {
            self.filled = 0;
            true
        } else {
            false
        }
    }

    pub fn block(&self) -> &[f32] {
        &self.block
    }

    /// Averages interleaved frames down to mono, forwarding every completed
    /// block to `sink`. Returns the number of blocks forwarded.
    pub fn push_interleaved(
        &mut self,
        samples: impl IntoIterator<Item = f32>,
        channels: usize,
        sink: &dyn SampleSink,
    ) -> usize {
        let channels = channels.max(1);
        let scale = 1.0 / channels as f32;
        let mut completed = 0;
        let mut acc = 0.0;
        let mut in_frame = 0;

        for sample in samples {
            acc += sample;
            in_frame += 1;
            if in_frame == channels {
                if self.push(acc * scale) {
                    sink.on_samples_ready(self.block());
                    completed += 1;
                }
                acc = 0.0;
                in_frame = 0;
            }
        }
        completed
    }
}
