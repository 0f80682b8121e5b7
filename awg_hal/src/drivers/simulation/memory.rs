//! Simulated sample memory and step memory.
//!
//! Sample memory is partitioned into `MaxSegments` equal segments. A write
//! selects a segment, declares its size and transfers the whole buffer in
//! one call. Step memory holds one control word per step index.

use awg_common::card::consts::{
    DEFAULT_BYTES_PER_SAMPLE, MIN_SEGMENTS, STEP_COUNT, TOTAL_MEMORY_BYTES,
};
use awg_common::card::driver::DeviceError;
use awg_common::card::word::ControlWord;
use std::collections::BTreeMap;

/// Partitioned sample memory.
#[derive(Debug, Clone)]
pub struct SegmentMemory {
    segments: Vec<Option<Vec<i16>>>,
    selected: usize,
    declared_size: usize,
}

impl SegmentMemory {
    /// Create memory split into `count` segments.
    pub fn new(count: usize) -> Self {
        Self {
            segments: vec![None; count],
            selected: 0,
            declared_size: 0,
        }
    }

    /// Re-partition memory. All segment data is discarded.
    pub fn partition(&mut self, count: usize) -> Result<(), DeviceError> {
        if count < MIN_SEGMENTS as usize || !count.is_power_of_two() {
            return Err(DeviceError::Register(format!(
                "segment count {count} must be a power of two >= {MIN_SEGMENTS}"
            )));
        }
        self.segments = vec![None; count];
        self.selected = 0;
        self.declared_size = 0;
        Ok(())
    }

    /// Number of segments.
    #[inline]
    pub fn count(&self) -> usize {
        self.segments.len()
    }

    /// Maximum samples per segment.
    pub fn max_samples(&self) -> usize {
        (TOTAL_MEMORY_BYTES as usize) / DEFAULT_BYTES_PER_SAMPLE as usize / self.count().max(1)
    }

    /// Select the segment written by the next transfer.
    pub fn select(&mut self, index: usize) -> Result<(), DeviceError> {
        if index >= self.count() {
            return Err(DeviceError::Register(format!(
                "write segment {index} out of range (card has {} segments)",
                self.count()
            )));
        }
        self.selected = index;
        Ok(())
    }

    /// Currently selected segment.
    #[inline]
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Declare the size in samples of the selected segment.
    pub fn declare_size(&mut self, samples: usize) -> Result<(), DeviceError> {
        if samples == 0 || samples > self.max_samples() {
            return Err(DeviceError::Register(format!(
                "segment size {samples} outside 1..={}",
                self.max_samples()
            )));
        }
        self.declared_size = samples;
        Ok(())
    }

    /// Declared size of the selected segment.
    #[inline]
    pub fn declared_size(&self) -> usize {
        self.declared_size
    }

    /// Store a full buffer in the selected segment.
    pub fn store(&mut self, samples: &[i16], channels: usize) -> Result<(), DeviceError> {
        let expected = self.declared_size * channels;
        if samples.len() != expected {
            return Err(DeviceError::Transfer(format!(
                "buffer holds {} values, segment {} expects {} ({} samples x {} channels)",
                samples.len(),
                self.selected,
                expected,
                self.declared_size,
                channels
            )));
        }
        self.segments[self.selected] = Some(samples.to_vec());
        Ok(())
    }

    /// Data of a segment, if loaded.
    pub fn data(&self, index: usize) -> Option<&[i16]> {
        self.segments.get(index)?.as_deref()
    }

    /// True if the segment holds data.
    pub fn is_loaded(&self, index: usize) -> bool {
        self.data(index).is_some()
    }
}

/// Step memory (one control word per step).
#[derive(Debug, Clone, Default)]
pub struct StepMemory {
    words: BTreeMap<u16, ControlWord>,
}

impl StepMemory {
    /// Write one entry.
    pub fn write(&mut self, step: u16, word: ControlWord) -> Result<(), DeviceError> {
        if step as usize >= STEP_COUNT {
            return Err(DeviceError::Register(format!(
                "step memory index {step} out of range (max {})",
                STEP_COUNT - 1
            )));
        }
        self.words.insert(step, word);
        Ok(())
    }

    /// Read one entry.
    pub fn read(&self, step: u16) -> Option<ControlWord> {
        self.words.get(&step).copied()
    }

    /// Snapshot of all programmed entries.
    pub fn snapshot(&self) -> BTreeMap<u16, ControlWord> {
        self.words.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awg_common::card::types::StepCondition;

    #[test]
    fn partition_rejects_non_power_of_two() {
        let mut mem = SegmentMemory::new(2);
        assert!(mem.partition(12).is_err());
        assert!(mem.partition(1).is_err());
        mem.partition(16).unwrap();
        assert_eq!(mem.count(), 16);
    }

    #[test]
    fn store_requires_declared_size() {
        let mut mem = SegmentMemory::new(4);
        mem.select(2).unwrap();
        mem.declare_size(1024).unwrap();
        assert!(matches!(
            mem.store(&[0; 512], 1),
            Err(DeviceError::Transfer(_))
        ));
        mem.store(&[1; 1024], 1).unwrap();
        assert!(mem.is_loaded(2));
        assert!(!mem.is_loaded(0));
    }

    #[test]
    fn interleaved_channels_double_the_buffer() {
        let mut mem = SegmentMemory::new(2);
        mem.declare_size(1024).unwrap();
        mem.store(&[0; 2048], 2).unwrap();
        assert_eq!(mem.data(0).unwrap().len(), 2048);
    }

    #[test]
    fn select_out_of_range() {
        let mut mem = SegmentMemory::new(2);
        assert!(mem.select(2).is_err());
    }

    #[test]
    fn step_memory_bounds() {
        let mut steps = StepMemory::default();
        let word = ControlWord::encode(StepCondition::Terminate, 1, 0, 0);
        steps.write(4095, word).unwrap();
        assert!(steps.write(4096, word).is_err());
        assert_eq!(steps.read(4095), Some(word));
    }
}
