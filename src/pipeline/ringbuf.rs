//! Bounded drop-oldest frame queue

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::Frame;

/// FIFO of captured frames with a fixed capacity.
///
/// Admitting into a full buffer evicts the oldest frame first, so the
/// length never exceeds the capacity. Every operation takes the one mutex,
/// which makes pushes from the capture thread and pops from a controller
/// mutually exclusive.
pub struct FrameBuffer {
    ring: Mutex<HeapRb<Frame>>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_admitted: AtomicUsize,
    frames_popped: AtomicUsize,
    frames_evicted: AtomicUsize,
    frames_flushed: AtomicUsize,
}

/// Snapshot of buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub admitted: usize,
    pub popped: usize,
    pub evicted: usize,
    pub flushed: usize,
}

impl FrameBuffer {
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame buffer capacity must be non-zero");
        Self {
            ring: Mutex::new(HeapRb::new(capacity)),
            stats: CachePadded::new(Stats::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeapRb<Frame>> {
        // A panic while holding the lock cannot leave the ring half-updated
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Push a frame, returning the oldest frame if it had to be evicted
    pub fn admit(&self, frame: Frame) -> Option<Frame> {
        let evicted = self.lock().push_overwrite(frame);

        self.stats.frames_admitted.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.stats.frames_evicted.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Remove and return the oldest frame
    pub fn pop_oldest(&self) -> Option<Frame> {
        let frame = self.lock().try_pop();
        if frame.is_some() {
            self.stats.frames_popped.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// The most recently admitted frame, left in place
    pub fn latest(&self) -> Option<Frame> {
        self.lock().iter().last().cloned()
    }

    /// Discard every buffered frame, returning how many were dropped
    pub fn drain(&self) -> usize {
        let mut ring = self.lock();
        let mut dropped = 0;
        while ring.try_pop().is_some() {
            dropped += 1;
        }
        self.stats.frames_flushed.fetch_add(dropped, Ordering::Relaxed);
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity().get()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            admitted: self.stats.frames_admitted.load(Ordering::Relaxed),
            popped: self.stats.frames_popped.load(Ordering::Relaxed),
            evicted: self.stats.frames_evicted.load(Ordering::Relaxed),
            flushed: self.stats.frames_flushed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![sequence as u8; 3], 1, 1, 3, sequence).unwrap()
    }

    #[test]
    fn test_keeps_most_recent_in_fifo_order() {
        let buffer = FrameBuffer::new(3);
        for seq in 1..=5 {
            buffer.admit(frame(seq));
            assert!(buffer.len() <= 3);
        }

        assert_eq!(buffer.len(), 3);
        let order: Vec<u64> = std::iter::from_fn(|| buffer.pop_oldest())
            .map(|f| f.sequence)
            .collect();
        assert_eq!(order, vec![3, 4, 5]);
        assert!(buffer.pop_oldest().is_none());
    }

    #[test]
    fn test_admit_reports_evicted_frame() {
        let buffer = FrameBuffer::new(2);
        assert!(buffer.admit(frame(1)).is_none());
        assert!(buffer.admit(frame(2)).is_none());
        assert_eq!(buffer.admit(frame(3)).map(|f| f.sequence), Some(1));
        assert_eq!(buffer.admit(frame(4)).map(|f| f.sequence), Some(2));

        let stats = buffer.stats();
        assert_eq!(stats.admitted, 4);
        assert_eq!(stats.evicted, 2);
    }

    #[test]
    fn test_latest_does_not_consume() {
        let buffer = FrameBuffer::new(4);
        assert!(buffer.latest().is_none());

        buffer.admit(frame(1));
        buffer.admit(frame(2));
        assert_eq!(buffer.latest().map(|f| f.sequence), Some(2));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_drain_empties_buffer() {
        let buffer = FrameBuffer::new(8);
        for seq in 0..5 {
            buffer.admit(frame(seq));
        }

        assert_eq!(buffer.drain(), 5);
        assert!(buffer.is_empty());
        assert_eq!(buffer.drain(), 0);
        assert_eq!(buffer.stats().flushed, 5);
        assert_eq!(buffer.capacity(), 8);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_capacity_rejected() {
        let _ = FrameBuffer::new(0);
    }
}
