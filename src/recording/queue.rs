//! Bounded chunk queues between the encoder drain thread and the motion
//! file writer thread.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::types::VectorGeometry;

/// Poll bound for blocking reads, keeping the writer thread responsive to
/// shutdown.
pub const QUEUE_READ_POLL: Duration = Duration::from_millis(20);

/// Kush gauge constant for estimating encoded frame payload sizes.
const KUSH_GAUGE_CONSTANT: f32 = 0.07;

/// Intra-frame period of the motion encoder, in seconds.
pub const INTRA_FRAME_PERIOD_S: u32 = 3;

/// Capacity limits for one queue: a chunk-count ceiling and an overall byte
/// ceiling.
#[derive(Debug, Clone, Copy)]
pub struct QueueBudget {
    pub max_chunks: usize,
    pub max_bytes: usize,
}

impl QueueBudget {
    fn chunk_capacity(framerate: u32) -> usize {
        // two intra periods of frames, plus 10% slack
        ((framerate * INTRA_FRAME_PERIOD_S * 2) as f32 * 1.1) as usize
    }

    /// Budget for encoded video frames, sized off the Kush gauge bitrate
    /// estimate at motion rank 2.
    pub fn for_video(width: u32, height: u32, framerate: u32) -> Self {
        let max_chunks = Self::chunk_capacity(framerate);
        let frame_estimate = ((width * height) as f32 * KUSH_GAUGE_CONSTANT * 2.0 / 8.0) as usize;
        Self {
            max_chunks,
            max_bytes: max_chunks * frame_estimate,
        }
    }

    /// Budget for inline motion vector buffers, which have a fixed size per
    /// frame.
    pub fn for_motion_vectors(geometry: VectorGeometry, framerate: u32) -> Self {
        let max_chunks = Self::chunk_capacity(framerate);
        Self {
            max_chunks,
            max_bytes: max_chunks * geometry.vector_buffer_len(),
        }
    }
}

struct QueueInner {
    chunks: VecDeque<Bytes>,
    queued_bytes: usize,
    max_chunks: usize,
    max_bytes: usize,
    writer_active: bool,
    dropped: u64,
}

/// Fixed-capacity FIFO of byte chunks with an overall byte ceiling.
///
/// One producer (the drain thread) and one consumer (the writer thread).
/// Writes are gated while the writer is inactive so a recording always
/// starts at a keyframe; capacity overruns silently drop, trading
/// completeness for pipeline liveness.
pub struct BoundedByteQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

impl BoundedByteQueue {
    pub fn new(budget: QueueBudget) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                chunks: VecDeque::new(),
                queued_bytes: 0,
                max_chunks: budget.max_chunks.max(1),
                max_bytes: budget.max_bytes.max(1),
                writer_active: false,
                dropped: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Enqueue one chunk. Returns whether the chunk was actually queued;
    /// `false` means it was gated or dropped, which is never an error.
    pub fn write_back(&self, data: Bytes, is_keyframe: bool) -> bool {
        let mut g = self.inner.lock().expect("lock poisoned");

        // Not recording and nothing buffered: hold out for a keyframe so a
        // later recording never starts mid-GOP.
        if !g.writer_active && g.chunks.is_empty() && !is_keyframe {
            return false;
        }

        if g.chunks.len() >= g.max_chunks || g.queued_bytes + data.len() > g.max_bytes {
            g.dropped = g.dropped.saturating_add(1);
            return false;
        }

        g.queued_bytes += data.len();
        g.chunks.push_back(data);
        if g.writer_active {
            self.cv.notify_one();
        }
        true
    }

    /// Dequeue the oldest chunk, waiting at most `timeout` for one to
    /// arrive.
    pub fn read_front(&self, timeout: Duration) -> Option<Bytes> {
        let mut g = self.inner.lock().expect("lock poisoned");

        if timeout == Duration::ZERO {
            return pop(&mut g);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(chunk) = pop(&mut g) {
                return Some(chunk);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (ng, _) = self
                .cv
                .wait_timeout(g, deadline - now)
                .expect("lock poisoned");
            g = ng;
        }
    }

    /// Discard everything queued, so stale GOP data never splices into a
    /// fresh recording.
    pub fn clear(&self) {
        let mut g = self.inner.lock().expect("lock poisoned");
        g.chunks.clear();
        g.queued_bytes = 0;
    }

    pub fn set_writer_active(&self, active: bool) {
        let mut g = self.inner.lock().expect("lock poisoned");
        g.writer_active = active;
        if active {
            self.cv.notify_all();
        }
    }

    pub fn writer_active(&self) -> bool {
        self.inner.lock().expect("lock poisoned").writer_active
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn queued_bytes(&self) -> usize {
        self.inner.lock().expect("lock poisoned").queued_bytes
    }

    pub fn dropped(&self) -> u64 {
        self.inner.lock().expect("lock poisoned").dropped
    }
}

fn pop(g: &mut QueueInner) -> Option<Bytes> {
    let chunk = g.chunks.pop_front()?;
    g.queued_bytes -= chunk.len();
    Some(chunk)
}
