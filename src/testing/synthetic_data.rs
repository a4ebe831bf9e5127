//! Synthetic encoder output for offline testing
//!
//! Provides a scripted encoder source that emits keyframe-periodic video
//! buffers and per-frame inline motion vector buffers without any camera
//! hardware, enabling reliable offline testing of the whole pipeline.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use crate::errors::MotionError;
use crate::types::{
    BufferKind, EncodedBuffer, EncoderSettings, EncoderSource, MotionVector, VectorGeometry,
    MOTION_VECTOR_BYTES,
};

/// Build a raw motion vector buffer for `geometry` with an optional
/// rectangular block of cells displaced by `(dx, dy)`.
pub fn vector_buffer_with_block(
    geometry: VectorGeometry,
    block: Option<(usize, usize, usize, usize)>,
    dx: i8,
    dy: i8,
) -> Vec<u8> {
    let mut buffer = vec![0u8; geometry.vector_buffer_len()];
    if let Some((x0, y0, w, h)) = block {
        for y in y0..(y0 + h).min(geometry.rows) {
            for x in x0..(x0 + w).min(geometry.cols) {
                let vector = MotionVector { dx, dy, sad: 100 };
                let idx = (y * geometry.cols + x) * MOTION_VECTOR_BYTES;
                buffer[idx..idx + MOTION_VECTOR_BYTES].copy_from_slice(&vector.to_bytes());
            }
        }
    }
    buffer
}

/// One step of a motion script: `frames` frames with an optional moving
/// block at `block = (x0, y0, w, h)` in macroblock coordinates.
#[derive(Debug, Clone)]
pub struct MotionPhase {
    pub frames: u32,
    pub block: Option<(usize, usize, usize, usize)>,
    pub displacement: (i8, i8),
}

impl MotionPhase {
    pub fn quiet(frames: u32) -> Self {
        Self {
            frames,
            block: None,
            displacement: (0, 0),
        }
    }

    pub fn moving(frames: u32, block: (usize, usize, usize, usize)) -> Self {
        Self {
            frames,
            block: Some(block),
            displacement: (8, 0),
        }
    }
}

/// Scripted stand-in for the hardware encoder wrapper. Each frame yields a
/// video buffer followed by its inline motion vector buffer; keyframes
/// repeat at the configured intra period.
pub struct SyntheticEncoder {
    settings: Option<EncoderSettings>,
    geometry: Option<VectorGeometry>,
    script: VecDeque<MotionPhase>,
    phase: Option<(MotionPhase, u32)>,
    frame_index: u64,
    capturing: bool,
    pending: VecDeque<EncodedBuffer>,
    paced: bool,
}

impl SyntheticEncoder {
    pub fn new(script: Vec<MotionPhase>) -> Self {
        Self {
            settings: None,
            geometry: None,
            script: script.into(),
            phase: None,
            frame_index: 0,
            capturing: false,
            pending: VecDeque::new(),
            paced: false,
        }
    }

    /// Emit frames at the configured framerate instead of as fast as the
    /// drain thread pulls them.
    pub fn with_pacing(mut self) -> Self {
        self.paced = true;
        self
    }

    fn next_phase_frame(&mut self) -> Option<MotionPhase> {
        loop {
            if let Some((phase, remaining)) = self.phase.take() {
                if remaining > 0 {
                    self.phase = Some((phase.clone(), remaining - 1));
                    return Some(phase);
                }
            }
            let phase = self.script.pop_front()?;
            let frames = phase.frames;
            self.phase = Some((phase, frames));
        }
    }
}

impl EncoderSource for SyntheticEncoder {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<(), MotionError> {
        self.geometry = Some(VectorGeometry::from_pixels(settings.width, settings.height));
        self.settings = Some(*settings);
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), MotionError> {
        if self.settings.is_none() {
            return Err(MotionError::EncoderError(
                "synthetic encoder started before configure".to_string(),
            ));
        }
        self.capturing = true;
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.capturing = false;
    }

    fn next_frame(&mut self, timeout: Duration) -> Option<EncodedBuffer> {
        if !self.capturing {
            std::thread::sleep(timeout);
            return None;
        }
        if let Some(buffered) = self.pending.pop_front() {
            return Some(buffered);
        }

        let Some(phase) = self.next_phase_frame() else {
            // script exhausted; behave like an idle encoder
            std::thread::sleep(timeout);
            return None;
        };
        let settings = self.settings.expect("capturing implies configured");
        let geometry = self.geometry.expect("capturing implies configured");

        if self.paced {
            std::thread::sleep(Duration::from_millis(1000 / settings.framerate.max(1) as u64));
        }

        let is_keyframe = self.frame_index % settings.intra_period_frames.max(1) as u64 == 0;
        let timestamp_us = (self.frame_index * 1_000_000 / settings.framerate.max(1) as u64) as i64;
        let payload = if is_keyframe {
            Bytes::from(vec![0x65u8; 1024])
        } else {
            Bytes::from(vec![0x41u8; 256])
        };

        let video = EncodedBuffer {
            data: payload,
            kind: BufferKind::VideoFrame,
            is_keyframe,
            timestamp_us,
        };
        let (dx, dy) = phase.displacement;
        let vectors = EncodedBuffer {
            data: Bytes::from(vector_buffer_with_block(geometry, phase.block, dx, dy)),
            kind: BufferKind::MotionVectors,
            is_keyframe,
            timestamp_us,
        };
        self.pending.push_back(vectors);
        self.frame_index += 1;
        Some(video)
    }
}
