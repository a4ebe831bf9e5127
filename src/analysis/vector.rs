//! Per-frame analysis of inline motion vector buffers.
//!
//! Each macroblock cell keeps a 32-bit shift register of its recent
//! activity; a cell only enters the motion grid once enough of its last 32
//! frames saw a nonzero displacement, which filters single-frame encoder
//! noise before blob extraction runs.

use crate::analysis::blob::BlobTracker;
use crate::analysis::grid::Grid;
use crate::errors::MotionError;
use crate::types::{MotionVector, VectorGeometry, MOTION_VECTOR_BYTES};

/// Bit shifted into a cell's activity mask on frames with motion.
const MOTION_BIT: u32 = 1 << 31;

/// A cell qualifies once strictly more than this many of its last 32 frames
/// saw motion.
const MOTION_CUT_BIT_THRESHOLD: u32 = 2;

/// Normalized intensities below this are treated as no motion.
const MOTION_INTENSITY_FLOOR: u8 = 3;

/// Motion vectors are unstable immediately after encoder start, so observer
/// callbacks are suppressed until this much wall-clock time of frames has
/// been analysed.
const OBSERVER_WARMUP_MS: u64 = 3000;

/// Receives blob activity transitions.
pub trait BlobObserver {
    fn on_motion_triggered(&mut self, active_count: usize);
    fn on_motion_cleared(&mut self, last_update_peak: u32);
}

/// Receives per-frame active-point statistics.
pub trait ImvObserver {
    fn on_active_points(&mut self, total_points: usize, active_points: usize);
}

/// Combined observer surface; a single implementer (typically the pipeline
/// driver) carries both capability sets.
pub trait MotionObserver: BlobObserver + ImvObserver {}

impl<T: BlobObserver + ImvObserver> MotionObserver for T {}

/// Converts raw per-macroblock motion vector buffers into a
/// persistence-filtered motion grid and drives the blob tracker.
pub struct MotionVectorAnalyzer {
    geometry: VectorGeometry,
    candidate: Grid<u32>,
    motion: Grid<u8>,
    frame_counter: u64,
    warmup_frames: u64,
    observers_enabled: bool,
    blob: Option<BlobTracker>,
    blob_active_count: usize,
    blob_update_peak: u32,
}

impl MotionVectorAnalyzer {
    pub fn new(geometry: VectorGeometry, framerate: u32) -> Self {
        Self {
            geometry,
            candidate: Grid::new(geometry.cols, geometry.rows),
            motion: Grid::new(geometry.cols, geometry.rows),
            frame_counter: 0,
            warmup_frames: framerate as u64 * OBSERVER_WARMUP_MS / 1000,
            observers_enabled: false,
            blob: None,
            blob_active_count: 0,
            blob_update_peak: 0,
        }
    }

    /// Enable connected-component analysis over the motion grid.
    pub fn enable_blob_tracking(&mut self, cancel_percent: f32, tracking_threshold: u32) {
        log::info!("Blob analysis enabled");
        self.blob = Some(BlobTracker::new(
            self.geometry.cols,
            self.geometry.rows,
            cancel_percent,
            tracking_threshold,
        ));
    }

    pub fn disable_blob_tracking(&mut self) {
        log::info!("Blob analysis disabled");
        self.blob = None;
    }

    pub fn geometry(&self) -> VectorGeometry {
        self.geometry
    }

    /// Analyse one motion vector buffer. `buffer` must be exactly
    /// `cols * rows * 4` bytes; anything else is a geometry mismatch with
    /// the upstream encoder and cannot be recovered mid-stream.
    pub fn analyse(
        &mut self,
        buffer: &[u8],
        observer: &mut dyn MotionObserver,
    ) -> Result<(), MotionError> {
        let expected = self.geometry.vector_buffer_len();
        debug_assert_eq!(buffer.len(), expected, "motion vector size mismatch");
        if buffer.len() != expected {
            return Err(MotionError::GeometryMismatch(format!(
                "motion vector buffer is {} bytes, expected {}",
                buffer.len(),
                expected
            )));
        }

        // Shift every cell's activity mask and fold in this frame's motion,
        // tracking the candidate value range for normalization.
        let mut motion_max = 0u32;
        let mut motion_min = u32::MAX;
        for (cell, raw) in self
            .candidate
            .as_mut_slice()
            .iter_mut()
            .zip(buffer.chunks_exact(MOTION_VECTOR_BYTES))
        {
            let vector = MotionVector::from_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let shifted = *cell >> 1;
            *cell = if vector.magnitude() != 0 {
                shifted | MOTION_BIT
            } else {
                shifted
            };
            motion_max = motion_max.max(*cell);
            motion_min = motion_min.min(*cell);
        }

        // Normalize qualifying cells into 1-255 and count active points.
        let range = motion_max.saturating_sub(motion_min);
        let mut active_points = 0usize;
        for (motion, &candidate) in self
            .motion
            .as_mut_slice()
            .iter_mut()
            .zip(self.candidate.as_slice().iter())
        {
            if candidate.count_ones() > MOTION_CUT_BIT_THRESHOLD {
                let normalized = if range == 0 {
                    0
                } else {
                    (((candidate - motion_min) as f64 / range as f64) * 255.0).floor() as u8
                };
                if normalized < MOTION_INTENSITY_FLOOR {
                    *motion = 0;
                } else {
                    *motion = normalized;
                    active_points += 1;
                }
            } else {
                *motion = 0;
            }
        }

        if self.observers_enabled {
            observer.on_active_points(self.geometry.cells(), active_points);
        }

        self.frame_counter += 1;
        if !self.observers_enabled && self.frame_counter > self.warmup_frames {
            self.observers_enabled = true;
            log::info!(
                "Motion vector warm-up complete after {} frames",
                self.frame_counter
            );
        }

        if let Some(blob) = self.blob.as_mut() {
            blob.update(self.motion.as_slice())?;
            let new_active_count = blob.active_blob_count();
            if self.observers_enabled && new_active_count != self.blob_active_count {
                self.blob_active_count = new_active_count;
                if new_active_count > 0 {
                    observer.on_motion_triggered(new_active_count);
                } else {
                    observer.on_motion_cleared(self.blob_update_peak);
                }
            }
            self.blob_update_peak = blob.active_blob_update_peak();
        }
        Ok(())
    }

    /// The current normalized motion grid, one byte per macroblock.
    pub fn motion_image(&self) -> &[u8] {
        self.motion.as_slice()
    }

    /// Render the most recent frame's raw activity bit as a 0/255 image.
    pub fn imv_image(&self, buffer: &mut [u8]) -> Result<(), MotionError> {
        if buffer.len() < self.geometry.cells() {
            return Err(MotionError::GeometryMismatch(format!(
                "imv image buffer is {} bytes, need {}",
                buffer.len(),
                self.geometry.cells()
            )));
        }
        for (dst, &candidate) in buffer.iter_mut().zip(self.candidate.as_slice().iter()) {
            *dst = if candidate & MOTION_BIT != 0 { 255 } else { 0 };
        }
        Ok(())
    }

    /// Render the aged blob image; returns false when blob analysis is
    /// disabled.
    pub fn blob_image(&self, buffer: &mut [u8]) -> Result<bool, MotionError> {
        match self.blob.as_ref() {
            Some(blob) => {
                blob.blob_image(buffer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingObserver {
        triggered: Vec<usize>,
        cleared: Vec<u32>,
        active_points: Vec<(usize, usize)>,
    }

    impl BlobObserver for RecordingObserver {
        fn on_motion_triggered(&mut self, active_count: usize) {
            self.triggered.push(active_count);
        }
        fn on_motion_cleared(&mut self, last_update_peak: u32) {
            self.cleared.push(last_update_peak);
        }
    }

    impl ImvObserver for RecordingObserver {
        fn on_active_points(&mut self, total_points: usize, active_points: usize) {
            self.active_points.push((total_points, active_points));
        }
    }

    /// 10x8 grid from 144x128 pixels.
    fn test_geometry() -> VectorGeometry {
        VectorGeometry::from_pixels(144, 128)
    }

    fn vector_buffer(geometry: VectorGeometry, block: Option<(usize, usize, usize, usize)>) -> Vec<u8> {
        let mut buffer = vec![0u8; geometry.vector_buffer_len()];
        if let Some((x0, y0, w, h)) = block {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    let idx = (y * geometry.cols + x) * MOTION_VECTOR_BYTES;
                    buffer[idx] = 8; // dx
                }
            }
        }
        buffer
    }

    #[test]
    fn test_motion_grid_stays_in_bounds() {
        let geometry = test_geometry();
        let mut analyzer = MotionVectorAnalyzer::new(geometry, 30);
        let mut observer = RecordingObserver::default();
        for _ in 0..10 {
            analyzer
                .analyse(&vector_buffer(geometry, Some((2, 2, 4, 4))), &mut observer)
                .unwrap();
        }
        assert_eq!(analyzer.motion_image().len(), geometry.cells());
    }

    #[test]
    fn test_cell_needs_persistent_activity() {
        let geometry = test_geometry();
        let mut analyzer = MotionVectorAnalyzer::new(geometry, 30);
        let mut observer = RecordingObserver::default();
        let active = vector_buffer(geometry, Some((5, 5, 3, 3)));

        // two frames of activity: popcount 2 is not > threshold 2
        analyzer.analyse(&active, &mut observer).unwrap();
        analyzer.analyse(&active, &mut observer).unwrap();
        assert!(analyzer.motion_image().iter().all(|&c| c == 0));

        // third frame crosses the bit-count threshold
        analyzer.analyse(&active, &mut observer).unwrap();
        assert!(analyzer.motion_image().iter().any(|&c| c > 0));
    }

    #[test]
    fn test_observer_suppressed_during_warmup() {
        let geometry = test_geometry();
        // framerate 2 -> warm-up is 6 frames
        let mut analyzer = MotionVectorAnalyzer::new(geometry, 2);
        let mut observer = RecordingObserver::default();
        let active = vector_buffer(geometry, Some((5, 5, 3, 3)));

        for _ in 0..6 {
            analyzer.analyse(&active, &mut observer).unwrap();
        }
        assert!(observer.active_points.is_empty());

        analyzer.analyse(&active, &mut observer).unwrap();
        analyzer.analyse(&active, &mut observer).unwrap();
        assert!(!observer.active_points.is_empty());
    }

    #[test]
    fn test_trigger_and_clear_fire_on_count_change() {
        let geometry = test_geometry();
        let mut analyzer = MotionVectorAnalyzer::new(geometry, 1); // warm-up 3 frames
        analyzer.enable_blob_tracking(5.0, 2);
        let mut observer = RecordingObserver::default();
        let active = vector_buffer(geometry, Some((5, 5, 3, 3)));
        let quiet = vector_buffer(geometry, None);

        for _ in 0..12 {
            analyzer.analyse(&active, &mut observer).unwrap();
        }
        assert_eq!(observer.triggered, vec![1]);
        assert!(observer.cleared.is_empty());

        // activity stops; the cell masks thin out until the blob dissolves
        for _ in 0..40 {
            analyzer.analyse(&quiet, &mut observer).unwrap();
        }
        assert_eq!(observer.cleared.len(), 1);
        assert!(observer.cleared[0] > 0, "peak update count carried into clear");
    }

    #[test]
    fn test_wrong_length_is_geometry_mismatch() {
        let geometry = test_geometry();
        let mut analyzer = MotionVectorAnalyzer::new(geometry, 30);
        let mut observer = RecordingObserver::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            analyzer.analyse(&[0u8; 16], &mut observer)
        }));
        if let Ok(result) = result {
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_imv_image_tracks_latest_frame() {
        let geometry = test_geometry();
        let mut analyzer = MotionVectorAnalyzer::new(geometry, 30);
        let mut observer = RecordingObserver::default();
        analyzer
            .analyse(&vector_buffer(geometry, Some((0, 0, 2, 2))), &mut observer)
            .unwrap();

        let mut image = vec![0u8; geometry.cells()];
        analyzer.imv_image(&mut image).unwrap();
        assert_eq!(image[0], 255);
        assert_eq!(image[geometry.cells() - 1], 0);
    }
}
