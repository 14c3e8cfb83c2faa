//! Lock-free SPSC ring buffer over interleaved multi-channel audio frames.
//!
//! [`spsc_ring`] yields split [`RingProducer`]/[`RingConsumer`] handles over
//! jointly owned storage. Each handle is meant to live on exactly one
//! thread; the `&mut self` receivers on the transfer methods make the
//! single-producer/single-consumer roles a compile-time fact rather than a
//! runtime check.
//!
//! The read and write counters are monotonic frame positions. After copying
//! payload, the writer publishes with a release store of `write_pos` and the
//! reader with a release store of `read_pos`; each side loads the
//! counterparty counter with acquire ordering. Samples are stored as
//! `AtomicU32` bit patterns; the relaxed per-sample accesses are ordered by
//! the counter protocol.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

/// Minimum ring capacity in frames.
const MIN_CAPACITY_FRAMES: usize = 2;

struct Shared {
    /// Interleaved sample storage, `capacity_frames * channels` cells.
    data: Box<[AtomicU32]>,
    /// Capacity in frames; always a power of two.
    capacity_frames: usize,
    /// `capacity_frames - 1`, for cheap position wrapping.
    mask: u64,
    /// Samples per frame.
    channels: usize,
    read_pos: CachePadded<AtomicU64>,
    write_pos: CachePadded<AtomicU64>,
}

impl Shared {
    fn available_to_read(&self) -> usize {
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Acquire);
        w.wrapping_sub(r) as usize
    }

    fn available_to_write(&self) -> usize {
        self.capacity_frames - self.available_to_read()
    }
}

/// Creates a matched producer/consumer pair over a fresh ring.
///
/// `capacity_frames` is rounded up to the next power of two, with a minimum
/// of 2. Each frame holds `channels` samples; the storage is allocated here
/// and never reallocated.
///
/// # Panics
///
/// Panics if `channels` is zero.
pub fn spsc_ring(capacity_frames: usize, channels: usize) -> (RingProducer, RingConsumer) {
    assert!(channels >= 1, "ring needs at least one channel");
    let capacity_frames = capacity_frames
        .next_power_of_two()
        .max(MIN_CAPACITY_FRAMES);
    let data: Box<[AtomicU32]> = (0..capacity_frames * channels)
        .map(|_| AtomicU32::new(0))
        .collect();
    let shared = Arc::new(Shared {
        data,
        capacity_frames,
        mask: capacity_frames as u64 - 1,
        channels,
        read_pos: CachePadded::new(AtomicU64::new(0)),
        write_pos: CachePadded::new(AtomicU64::new(0)),
    });
    (
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    )
}

#[inline]
fn copy_in(cells: &[AtomicU32], src: &[f32]) {
    for (cell, &sample) in cells.iter().zip(src.iter()) {
        cell.store(sample.to_bits(), Ordering::Relaxed);
    }
}

#[inline]
fn copy_out(cells: &[AtomicU32], dst: &mut [f32]) {
    for (cell, sample) in cells.iter().zip(dst.iter_mut()) {
        *sample = f32::from_bits(cell.load(Ordering::Relaxed));
    }
}

/// Write half of an SPSC frame ring.
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Returns the fixed capacity in frames.
    #[inline]
    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity_frames
    }

    /// Returns the samples-per-frame count.
    #[inline]
    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    /// Returns free frames available for writing.
    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.shared.available_to_write()
    }

    /// Writes up to `frames` interleaved frames from `src`.
    ///
    /// The count is clamped to the free space; the payload is copied in at
    /// most two contiguous segments around the wrap point, then the new
    /// write position is published with a single release store. Returns the
    /// number of frames actually written.
    pub fn write_interleaved(&mut self, src: &[f32], frames: usize) -> usize {
        let ch = self.shared.channels;
        let frames = frames.min(self.shared.available_to_write());
        if frames == 0 {
            return 0;
        }
        let src = &src[..frames * ch];

        let w = self.shared.write_pos.load(Ordering::Relaxed);
        let start = (w & self.shared.mask) as usize;
        let first = frames.min(self.shared.capacity_frames - start);
        copy_in(
            &self.shared.data[start * ch..(start + first) * ch],
            &src[..first * ch],
        );
        let second = frames - first;
        if second > 0 {
            copy_in(&self.shared.data[..second * ch], &src[first * ch..]);
        }

        self.shared
            .write_pos
            .store(w.wrapping_add(frames as u64), Ordering::Release);
        frames
    }
}

/// Read half of an SPSC frame ring.
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Returns the fixed capacity in frames.
    #[inline]
    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity_frames
    }

    /// Returns the samples-per-frame count.
    #[inline]
    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    /// Returns frames available for reading.
    #[inline]
    pub fn available_to_read(&self) -> usize {
        self.shared.available_to_read()
    }

    /// Reads up to `frames` interleaved frames into `dst`.
    ///
    /// Symmetric to [`RingProducer::write_interleaved`]: clamps to the
    /// occupied count, copies in at most two segments, and publishes the new
    /// read position with a single release store. Returns the number of
    /// frames actually read.
    pub fn read_interleaved(&mut self, dst: &mut [f32], frames: usize) -> usize {
        let ch = self.shared.channels;
        let frames = frames.min(self.shared.available_to_read());
        if frames == 0 {
            return 0;
        }
        let dst = &mut dst[..frames * ch];

        let r = self.shared.read_pos.load(Ordering::Relaxed);
        let start = (r & self.shared.mask) as usize;
        let first = frames.min(self.shared.capacity_frames - start);
        copy_out(
            &self.shared.data[start * ch..(start + first) * ch],
            &mut dst[..first * ch],
        );
        let second = frames - first;
        if second > 0 {
            copy_out(&self.shared.data[..second * ch], &mut dst[first * ch..]);
        }

        self.shared
            .read_pos
            .store(r.wrapping_add(frames as u64), Ordering::Release);
        frames
    }
}
