//! The motion pipeline driver: one thread draining the encoder, one thread
//! analysing motion vectors and steering the recorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::analysis::MotionVectorAnalyzer;
use crate::config::MotionCamConfig;
use crate::errors::MotionError;
use crate::pipeline::state::{MotionState, MotionStateMachine};
use crate::recording::{FrameRecorder, QueueBudget, INTRA_FRAME_PERIOD_S};
use crate::types::{BufferKind, EncoderSettings, EncoderSource, VectorGeometry};

/// Bound on blocking waits in the worker threads, keeping shutdown latency
/// in the tens of milliseconds.
const EVENT_WAIT: Duration = Duration::from_millis(20);

/// A single drain iteration slower than this points at an encoder stall.
const DRAIN_LATENCY_LIMIT: Duration = Duration::from_millis(32);

/// Owns the capture worker threads and the wiring between encoder source,
/// analysis, state machine, and recorder.
pub struct MotionPipeline {
    config: MotionCamConfig,
    source: Arc<Mutex<Box<dyn EncoderSource>>>,
    recorder: Arc<FrameRecorder>,
    active: bool,
    drain_quit: Arc<AtomicBool>,
    vector_quit: Arc<AtomicBool>,
    drain_thread: Option<JoinHandle<()>>,
    vector_thread: Option<JoinHandle<()>>,
}

impl MotionPipeline {
    pub fn new(config: MotionCamConfig, source: Box<dyn EncoderSource>) -> Self {
        let video = &config.video;
        let geometry = VectorGeometry::from_pixels(video.width, video.height);
        let recorder = FrameRecorder::new(
            &config.storage,
            QueueBudget::for_video(video.width, video.height, video.framerate),
            QueueBudget::for_motion_vectors(geometry, video.framerate),
        );
        Self {
            config,
            source: Arc::new(Mutex::new(source)),
            recorder: Arc::new(recorder),
            active: false,
            drain_quit: Arc::new(AtomicBool::new(false)),
            vector_quit: Arc::new(AtomicBool::new(false)),
            drain_thread: None,
            vector_thread: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn recorder(&self) -> &FrameRecorder {
        &self.recorder
    }

    /// Configure the encoder and spawn the worker threads. Starting an
    /// already-active pipeline is a no-op.
    pub fn start(&mut self) -> Result<(), MotionError> {
        if self.active {
            log::debug!("Motion pipeline already started");
            return Ok(());
        }

        let video = self.config.video.clone();
        let geometry = VectorGeometry::from_pixels(video.width, video.height);
        log::info!(
            "Initial motion video: {} x {} @{}, {} kbps",
            video.width,
            video.height,
            video.framerate,
            video.bitrate_kbps
        );

        {
            let mut source = self.source.lock().expect("lock poisoned");
            source.configure(&EncoderSettings {
                width: video.width,
                height: video.height,
                framerate: video.framerate,
                bitrate_kbps: video.bitrate_kbps,
                intra_period_frames: video.framerate * INTRA_FRAME_PERIOD_S,
                inline_motion_vectors: true,
            })?;
            source.start_capture()?;
        }

        self.drain_quit.store(false, Ordering::Relaxed);
        self.vector_quit.store(false, Ordering::Relaxed);

        let mv_budget = QueueBudget::for_motion_vectors(geometry, video.framerate);
        let (mv_tx, mv_rx) = bounded::<Bytes>(mv_budget.max_chunks);

        let drain_thread = std::thread::Builder::new()
            .name("motioncam-drain".to_string())
            .spawn({
                let source = self.source.clone();
                let recorder = self.recorder.clone();
                let quit = self.drain_quit.clone();
                move || drain_loop(source, recorder, mv_tx, quit)
            })
            .map_err(|e| MotionError::EncoderError(format!("spawn failed: {}", e)))?;
        log::info!("Frame drain thread initialized");

        let mut analyzer = MotionVectorAnalyzer::new(geometry, video.framerate);
        analyzer.enable_blob_tracking(
            self.config.blob.cancel_percent,
            self.config.blob.tracking_threshold,
        );
        let monitor = MotionStateMachine::new(
            self.config.detection.clear_percent,
            Duration::from_millis(self.config.detection.clear_wait_period_ms),
        );

        let vector_thread = std::thread::Builder::new()
            .name("motioncam-vector".to_string())
            .spawn({
                let recorder = self.recorder.clone();
                let quit = self.vector_quit.clone();
                move || vector_loop(mv_rx, analyzer, monitor, recorder, quit)
            })
            .map_err(|e| MotionError::EncoderError(format!("spawn failed: {}", e)))?;
        log::info!("Motion vector analysis thread initialized");

        self.drain_thread = Some(drain_thread);
        self.vector_thread = Some(vector_thread);
        self.active = true;
        Ok(())
    }

    /// Tear down both worker threads, release the encoder, and finalize any
    /// open recording session. Stopping an inactive pipeline is a no-op.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        self.vector_quit.store(true, Ordering::Relaxed);
        if let Some(handle) = self.vector_thread.take() {
            let _ = handle.join();
        }

        self.drain_quit.store(true, Ordering::Relaxed);
        if let Some(handle) = self.drain_thread.take() {
            let _ = handle.join();
        }

        self.source.lock().expect("lock poisoned").stop_capture();

        if self.recorder.writer_active() {
            self.recorder.stop_writer();
        }
        log::info!("Motion pipeline stopped");
    }
}

impl Drop for MotionPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pull encoded buffers and route them: motion vectors feed both the `.imv`
/// file queue and the analysis channel, everything else is video frame
/// data. Buffers are released back to the encoder by dropping the handle at
/// the end of each iteration.
fn drain_loop(
    source: Arc<Mutex<Box<dyn EncoderSource>>>,
    recorder: Arc<FrameRecorder>,
    mv_tx: Sender<Bytes>,
    quit: Arc<AtomicBool>,
) {
    while !quit.load(Ordering::Relaxed) {
        let started = Instant::now();
        let buffer = source
            .lock()
            .expect("lock poisoned")
            .next_frame(EVENT_WAIT);

        if let Some(buffer) = buffer {
            if buffer.data.is_empty() {
                continue;
            }
            match buffer.kind {
                BufferKind::MotionVectors => {
                    recorder.queue_motion_vectors(buffer.data.clone(), buffer.is_keyframe);
                    match mv_tx.try_send(buffer.data) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            log::error!("Motion vector analysis queue full, dropping buffer")
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
                BufferKind::VideoFrame => {
                    recorder.queue_frame(buffer.data, buffer.is_keyframe);
                }
            }
        }

        let elapsed = started.elapsed();
        if elapsed > DRAIN_LATENCY_LIMIT {
            log::error!("Frame drain process took {:?}", elapsed);
        }
    }
}

/// Consume queued motion vector buffers one at a time, run the analysis,
/// and translate state machine transitions into recorder start/stop.
fn vector_loop(
    mv_rx: Receiver<Bytes>,
    mut analyzer: MotionVectorAnalyzer,
    mut monitor: MotionStateMachine,
    recorder: Arc<FrameRecorder>,
    quit: Arc<AtomicBool>,
) {
    while !quit.load(Ordering::Relaxed) {
        let buffer = match mv_rx.recv_timeout(EVENT_WAIT) {
            Ok(buffer) => buffer,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let started = Instant::now();
        if let Err(e) = analyzer.analyse(&buffer, &mut monitor) {
            log::error!("{}", e);
            continue;
        }
        log::debug!("Motion vector analysis took {:?}", started.elapsed());

        match monitor.state() {
            MotionState::Cleared if recorder.writer_active() => {
                recorder.stop_writer();
                recorder.manage_video_folder();
            }
            MotionState::Triggered if !recorder.writer_active() => {
                if let Err(e) = recorder.start_writer() {
                    log::error!("{}", e);
                }
            }
            _ => {}
        }
    }
}
