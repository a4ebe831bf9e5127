//! Core data types shared across the motion pipeline.

use std::time::Duration;

use bytes::Bytes;

use crate::errors::MotionError;

/// Macroblock edge length in pixels; the encoder reports one motion vector
/// per macroblock.
pub const MACROBLOCK_PIXELS: u32 = 16;

/// Size of one motion vector record on the wire.
pub const MOTION_VECTOR_BYTES: usize = 4;

/// One inline motion vector record as emitted by the hardware encoder:
/// signed displacement plus the sum-of-absolute-differences error metric.
/// Wire layout is `{ int8 dx, int8 dy, uint16 sad }`, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionVector {
    pub dx: i8,
    pub dy: i8,
    pub sad: u16,
}

impl MotionVector {
    pub fn from_bytes(raw: [u8; MOTION_VECTOR_BYTES]) -> Self {
        Self {
            dx: raw[0] as i8,
            dy: raw[1] as i8,
            sad: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }

    pub fn to_bytes(self) -> [u8; MOTION_VECTOR_BYTES] {
        let sad = self.sad.to_le_bytes();
        [self.dx as u8, self.dy as u8, sad[0], sad[1]]
    }

    /// Displacement magnitude, floored to an integer.
    pub fn magnitude(self) -> u32 {
        let dx = self.dx as i32;
        let dy = self.dy as i32;
        (((dx * dx + dy * dy) as f64).sqrt().floor()) as u32
    }
}

/// Dimensions of the per-macroblock motion vector grid.
///
/// The encoder emits one extra sentinel column past the visible macroblocks,
/// so a 640x480 stream yields a 41x30 grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorGeometry {
    pub cols: usize,
    pub rows: usize,
}

impl VectorGeometry {
    /// Derive the grid from pixel dimensions.
    pub fn from_pixels(width: u32, height: u32) -> Self {
        Self {
            cols: (width / MACROBLOCK_PIXELS + 1) as usize,
            rows: (height / MACROBLOCK_PIXELS) as usize,
        }
    }

    /// Derive the grid from dimensions already expressed in macroblock
    /// units (the codec-inline coordination mode, which still carries the
    /// sentinel column).
    pub fn from_inline(cols: u32, rows: u32) -> Self {
        Self {
            cols: (cols + 1) as usize,
            rows: rows as usize,
        }
    }

    pub fn cells(&self) -> usize {
        self.cols * self.rows
    }

    /// Exact byte length of a valid motion vector buffer for this grid.
    pub fn vector_buffer_len(&self) -> usize {
        self.cells() * MOTION_VECTOR_BYTES
    }
}

/// Classification of a buffer drained from the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Compressed video frame data.
    VideoFrame,
    /// Inline motion vector side info for the preceding frame.
    MotionVectors,
}

/// One buffer drained from the hardware encoder output port.
///
/// Dropping the last `Bytes` handle releases the buffer back to the
/// encoder's pool.
#[derive(Debug, Clone)]
pub struct EncodedBuffer {
    pub data: Bytes,
    pub kind: BufferKind,
    pub is_keyframe: bool,
    pub timestamp_us: i64,
}

/// Encoder configuration consumed once before capture starts.
#[derive(Debug, Clone, Copy)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub bitrate_kbps: u32,
    pub intra_period_frames: u32,
    pub inline_motion_vectors: bool,
}

/// The hardware encoder wrapper as seen by the motion pipeline.
///
/// Configuration setters are only called before `start_capture` and after
/// the drain thread has been joined; during steady-state capture the drain
/// thread is the sole caller of `next_frame`.
pub trait EncoderSource: Send {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<(), MotionError>;

    fn start_capture(&mut self) -> Result<(), MotionError>;

    fn stop_capture(&mut self);

    /// Pull the next encoded buffer, waiting at most `timeout`.
    fn next_frame(&mut self, timeout: Duration) -> Option<EncodedBuffer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_round_trip() {
        let v = MotionVector {
            dx: -3,
            dy: 4,
            sad: 513,
        };
        assert_eq!(MotionVector::from_bytes(v.to_bytes()), v);
    }

    #[test]
    fn test_magnitude_floors() {
        let v = MotionVector {
            dx: 3,
            dy: 4,
            sad: 0,
        };
        assert_eq!(v.magnitude(), 5);
        let v = MotionVector {
            dx: 1,
            dy: 1,
            sad: 0,
        };
        assert_eq!(v.magnitude(), 1); // sqrt(2) floors to 1
        let zero = MotionVector {
            dx: 0,
            dy: 0,
            sad: 0,
        };
        assert_eq!(zero.magnitude(), 0);
    }

    #[test]
    fn test_geometry_from_pixels() {
        let geom = VectorGeometry::from_pixels(640, 480);
        assert_eq!(geom.cols, 41);
        assert_eq!(geom.rows, 30);
        assert_eq!(geom.vector_buffer_len(), 41 * 30 * 4);
    }

    #[test]
    fn test_geometry_from_inline_adds_sentinel_column() {
        let geom = VectorGeometry::from_inline(9, 8);
        assert_eq!(geom.cols, 10);
        assert_eq!(geom.rows, 8);
    }
}
