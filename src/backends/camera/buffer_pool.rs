// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-size frame buffer pool
//!
//! Slots live in one arena and move between three index queues:
//!
//! ```text
//!            begin_write            finish_write
//!   empty ──────────────► writer ──────────────► filled
//!     ▲                                             │
//!     │ release_held                    take_filled │
//!     └──────────────────── app_held ◄──────────────┘
//! ```
//!
//! `empty` is LIFO so the most recently freed buffer is reused first.
//! `filled` is ordered newest to oldest and consumers take the oldest.
//! At most one slot is out with the writer at a time.

use super::types::FrameData;
use crate::errors::{CameraError, CameraResult};
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct Slot {
    data: FrameData,
    stride: u32,
    timestamp_ns: u64,
}

/// A filled slot handed out to the consumer
#[derive(Debug)]
pub struct FilledSlot {
    pub index: usize,
    pub data: FrameData,
    pub stride: u32,
    pub timestamp_ns: u64,
}

/// Snapshot of slot distribution across the queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub total: usize,
    pub empty: usize,
    pub filled: usize,
    pub app_held: usize,
    pub in_flight: usize,
}

impl PoolStats {
    /// Every slot is accounted for exactly once
    pub fn is_conserved(&self) -> bool {
        self.empty + self.filled + self.app_held + self.in_flight == self.total
    }
}

#[derive(Debug, Default)]
pub struct BufferPool {
    slots: Vec<Slot>,
    empty: Vec<usize>,
    filled: VecDeque<usize>,
    app_held: Vec<usize>,
    in_flight: Option<usize>,
}

impl BufferPool {
    /// Pool of `count` slots
    ///
    /// With `slot_len` each slot gets an owned buffer of that size up front,
    /// used as conversion output. Without it slots start empty and take
    /// ownership of backend buffers (zero-copy).
    pub fn new(count: usize, slot_len: Option<usize>) -> CameraResult<Self> {
        if count == 0 {
            return Err(CameraError::InvalidArgument(
                "buffer pool needs at least one slot".to_string(),
            ));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(count)
            .map_err(|_| CameraError::OutOfMemory)?;
        for _ in 0..count {
            let data = match slot_len {
                Some(len) => {
                    let mut bytes = Vec::new();
                    bytes
                        .try_reserve_exact(len)
                        .map_err(|_| CameraError::OutOfMemory)?;
                    bytes.resize(len, 0);
                    FrameData::Owned(bytes)
                }
                None => FrameData::Empty,
            };
            slots.push(Slot {
                data,
                ..Slot::default()
            });
        }

        Ok(Self {
            slots,
            // Reversed so slot 0 is handed out first
            empty: (0..count).rev().collect(),
            filled: VecDeque::with_capacity(count),
            app_held: Vec::with_capacity(count),
            in_flight: None,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Take an empty slot for writing, along with its current buffer
    pub fn begin_write(&mut self) -> Option<(usize, FrameData)> {
        debug_assert!(self.in_flight.is_none(), "only one writer at a time");
        let index = self.empty.pop()?;
        self.in_flight = Some(index);
        Some((index, std::mem::take(&mut self.slots[index].data)))
    }

    /// Publish a written slot as the newest filled frame
    pub fn finish_write(&mut self, index: usize, data: FrameData, stride: u32, timestamp_ns: u64) {
        debug_assert_eq!(self.in_flight, Some(index));
        self.in_flight = None;
        let slot = &mut self.slots[index];
        slot.data = data;
        slot.stride = stride;
        slot.timestamp_ns = timestamp_ns;
        self.filled.push_front(index);
    }

    /// Give a slot back to `empty` without publishing it
    pub fn abort_write(&mut self, index: usize, data: FrameData) {
        debug_assert_eq!(self.in_flight, Some(index));
        self.in_flight = None;
        let slot = &mut self.slots[index];
        slot.data = data;
        slot.timestamp_ns = 0;
        self.empty.push(index);
    }

    /// Move the oldest filled slot to the application
    pub fn take_filled(&mut self) -> Option<FilledSlot> {
        let index = self.filled.pop_back()?;
        self.app_held.push(index);
        let slot = &mut self.slots[index];
        Some(FilledSlot {
            index,
            data: std::mem::take(&mut slot.data),
            stride: slot.stride,
            timestamp_ns: slot.timestamp_ns,
        })
    }

    /// Return an application-held slot to `empty`
    ///
    /// `data` becomes the slot's buffer again. Fails, handing `data` back,
    /// if the slot isn't currently held by the application.
    pub fn release_held(&mut self, index: usize, data: FrameData) -> Result<(), FrameData> {
        let Some(pos) = self.app_held.iter().position(|&i| i == index) else {
            return Err(data);
        };
        self.app_held.swap_remove(pos);
        let slot = &mut self.slots[index];
        slot.data = data;
        slot.stride = 0;
        slot.timestamp_ns = 0;
        self.empty.push(index);
        Ok(())
    }

    pub fn is_held(&self, index: usize) -> bool {
        self.app_held.contains(&index)
    }

    /// Drain the buffers of all filled slots, returning the slots to `empty`
    pub fn drain_filled(&mut self) -> Vec<FrameData> {
        let mut drained = Vec::with_capacity(self.filled.len());
        while let Some(index) = self.filled.pop_back() {
            let slot = &mut self.slots[index];
            drained.push(std::mem::take(&mut slot.data));
            slot.timestamp_ns = 0;
            self.empty.push(index);
        }
        drained
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.slots.len(),
            empty: self.empty.len(),
            filled: self.filled.len(),
            app_held: self.app_held.len(),
            in_flight: usize::from(self.in_flight.is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(byte: u8) -> FrameData {
        FrameData::Owned(vec![byte; 4])
    }

    #[test]
    fn test_new_pool_all_empty() {
        let pool = BufferPool::new(8, Some(16)).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total, 8);
        assert_eq!(stats.empty, 8);
        assert!(stats.is_conserved());
    }

    #[test]
    fn test_zero_slots_rejected() {
        assert!(matches!(
            BufferPool::new(0, None),
            Err(CameraError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_filled_is_fifo() {
        let mut pool = BufferPool::new(3, None).unwrap();
        for ts in [10, 20, 30] {
            let (index, _) = pool.begin_write().unwrap();
            pool.finish_write(index, owned(ts as u8), 4, ts);
        }
        assert!(pool.begin_write().is_none());

        let order: Vec<u64> = std::iter::from_fn(|| pool.take_filled())
            .map(|slot| slot.timestamp_ns)
            .collect();
        assert_eq!(order, vec![10, 20, 30]);
        assert_eq!(pool.stats().app_held, 3);
    }

    #[test]
    fn test_empty_is_lifo() {
        let mut pool = BufferPool::new(4, None).unwrap();
        let (a, _) = pool.begin_write().unwrap();
        pool.finish_write(a, owned(1), 4, 1);
        let (b, _) = pool.begin_write().unwrap();
        pool.finish_write(b, owned(2), 4, 2);

        let first = pool.take_filled().unwrap();
        let second = pool.take_filled().unwrap();
        pool.release_held(first.index, first.data).unwrap();
        pool.release_held(second.index, second.data).unwrap();

        // Most recently released slot comes back first
        let (next, data) = pool.begin_write().unwrap();
        assert_eq!(next, second.index);
        assert_eq!(data.as_slice(), &[2, 2, 2, 2]);
    }

    #[test]
    fn test_release_unknown_slot_returns_data() {
        let mut pool = BufferPool::new(2, None).unwrap();
        let result = pool.release_held(1, owned(7));
        assert!(matches!(result, Err(FrameData::Owned(_))));
        assert!(pool.stats().is_conserved());
    }

    #[test]
    fn test_double_release_rejected() {
        let mut pool = BufferPool::new(2, None).unwrap();
        let (index, _) = pool.begin_write().unwrap();
        pool.finish_write(index, owned(1), 4, 1);
        let slot = pool.take_filled().unwrap();
        assert!(pool.release_held(slot.index, slot.data).is_ok());
        assert!(pool.release_held(slot.index, FrameData::Empty).is_err());
    }

    #[test]
    fn test_abort_write_returns_slot() {
        let mut pool = BufferPool::new(1, Some(4)).unwrap();
        let (index, data) = pool.begin_write().unwrap();
        assert_eq!(pool.stats().in_flight, 1);
        assert!(pool.stats().is_conserved());
        pool.abort_write(index, data);
        assert_eq!(pool.stats().empty, 1);
    }

    #[test]
    fn test_drain_filled() {
        let mut pool = BufferPool::new(3, None).unwrap();
        for ts in 1..=2 {
            let (index, _) = pool.begin_write().unwrap();
            pool.finish_write(index, owned(ts as u8), 4, ts);
        }
        let drained = pool.drain_filled();
        assert_eq!(drained.len(), 2);
        assert_eq!(pool.stats().empty, 3);
    }

    #[test]
    fn test_conservation_under_interleaving() {
        let mut pool = BufferPool::new(4, None).unwrap();
        let mut held = Vec::new();
        // Deterministic pseudo-random interleaving of writes, takes and releases
        let mut seed: u32 = 0x2545_f491;
        for step in 0..2000u64 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            match seed % 3 {
                0 => {
                    if let Some((index, data)) = pool.begin_write() {
                        pool.finish_write(index, data, 0, step);
                    }
                }
                1 => {
                    if let Some(slot) = pool.take_filled() {
                        held.push(slot);
                    }
                }
                _ => {
                    if !held.is_empty() {
                        let slot = held.remove(seed as usize % held.len());
                        pool.release_held(slot.index, slot.data).unwrap();
                    }
                }
            }
            let stats = pool.stats();
            assert!(stats.is_conserved());
            assert_eq!(stats.app_held, held.len());
        }
    }
}
