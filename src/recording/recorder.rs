//! Motion recording sessions: frame and motion-vector queues drained by a
//! per-session writer thread into timestamped files.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;

use crate::config::StorageConfig;
use crate::errors::MotionError;
use crate::recording::queue::{BoundedByteQueue, QueueBudget, QUEUE_READ_POLL};
use crate::recording::writer::FileSink;

const VIDEO_FILE_EXTENSION: &str = "h264";
const IMV_FILE_EXTENSION: &str = "imv";
const FILENAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d.%H:%M:%S";

struct WriterState {
    handle: Option<JoinHandle<()>>,
    quit: Arc<AtomicBool>,
}

/// Buffers encoded frames and inline motion vectors, and writes them out
/// through a dedicated thread while a recording session is open.
///
/// Queuing happens on the drain thread while session start/stop happens on
/// the analysis thread; the writer-thread lifecycle is serialized behind its
/// own lock.
pub struct FrameRecorder {
    directory: PathBuf,
    prefix: String,
    frame_file_size_limit: u64,
    total_size_limit: u64,
    save_imv_file: bool,
    frame_queue: Arc<BoundedByteQueue>,
    imv_queue: Arc<BoundedByteQueue>,
    writer_active: AtomicBool,
    writer: Mutex<WriterState>,
}

impl FrameRecorder {
    pub fn new(storage: &StorageConfig, frame_budget: QueueBudget, imv_budget: QueueBudget) -> Self {
        Self {
            directory: PathBuf::from(&storage.directory),
            prefix: storage.file_prefix.clone(),
            frame_file_size_limit: storage.file_size_limit_kb * 1024,
            total_size_limit: storage.total_size_limit_kb * 1024,
            save_imv_file: storage.save_imv_file,
            frame_queue: Arc::new(BoundedByteQueue::new(frame_budget)),
            imv_queue: Arc::new(BoundedByteQueue::new(imv_budget)),
            writer_active: AtomicBool::new(false),
            writer: Mutex::new(WriterState {
                handle: None,
                quit: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Queue one encoded video frame. While no session is open, a keyframe
    /// with stale data still queued flushes both queues so the eventual
    /// recording starts on a clean GOP boundary.
    pub fn queue_frame(&self, data: Bytes, is_keyframe: bool) -> bool {
        if is_keyframe && !self.writer_active() && !self.frame_queue.is_empty() {
            self.frame_queue.clear();
            self.imv_queue.clear();
        }
        self.frame_queue.write_back(data, is_keyframe)
    }

    /// Queue one inline motion vector buffer for the `.imv` file.
    pub fn queue_motion_vectors(&self, data: Bytes, is_keyframe: bool) -> bool {
        self.imv_queue.write_back(data, is_keyframe)
    }

    pub fn writer_active(&self) -> bool {
        self.writer_active.load(Ordering::Relaxed)
    }

    /// Open the session files and spawn the writer thread. Returns false
    /// when a session is already active.
    pub fn start_writer(&self) -> Result<bool, MotionError> {
        let mut writer = self.writer.lock().expect("lock poisoned");
        if self.writer_active() {
            log::debug!("Motion file writer already started");
            return Ok(false);
        }

        let timestamp = chrono::Local::now().format(FILENAME_TIMESTAMP_FORMAT);
        let base = format!("{}_{}", self.prefix, timestamp);
        let video_path = self
            .directory
            .join(format!("{}.{}", base, VIDEO_FILE_EXTENSION));
        let video_sink = FileSink::create(&video_path, self.frame_file_size_limit)?;

        let imv_sink = if self.save_imv_file {
            let imv_path = self
                .directory
                .join(format!("{}.{}", base, IMV_FILE_EXTENSION));
            match FileSink::create(&imv_path, 0) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    video_sink.discard();
                    return Err(e);
                }
            }
        } else {
            None
        };

        let quit = Arc::new(AtomicBool::new(false));
        let handle = std::thread::Builder::new()
            .name("motioncam-writer".to_string())
            .spawn({
                let frame_queue = self.frame_queue.clone();
                let imv_queue = self.imv_queue.clone();
                let quit = quit.clone();
                move || writer_loop(frame_queue, imv_queue, video_sink, imv_sink, quit)
            })
            .map_err(|e| MotionError::WriterError(format!("failed to spawn writer: {}", e)))?;

        writer.handle = Some(handle);
        writer.quit = quit;
        self.frame_queue.set_writer_active(true);
        self.imv_queue.set_writer_active(true);
        self.writer_active.store(true, Ordering::Relaxed);
        log::info!("Motion file writer started");
        Ok(true)
    }

    /// Stop the writer thread and finalize the session files. Returns false
    /// when no session is active.
    pub fn stop_writer(&self) -> bool {
        let mut writer = self.writer.lock().expect("lock poisoned");
        if !self.writer_active() {
            return false;
        }

        self.writer_active.store(false, Ordering::Relaxed);
        self.frame_queue.set_writer_active(false);
        self.imv_queue.set_writer_active(false);
        writer.quit.store(true, Ordering::Relaxed);
        if let Some(handle) = writer.handle.take() {
            let _ = handle.join();
        }
        log::info!("Motion file writer stopped");
        true
    }

    /// Delete the oldest recordings until the directory is back under the
    /// configured size ceiling. Filenames embed the session timestamp, so
    /// lexicographic order equals chronological order.
    pub fn manage_video_folder(&self) {
        if self.total_size_limit == 0 {
            return;
        }

        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Failed to list {:?}: {}", self.directory, e);
                return;
            }
        };

        let mut files: Vec<(String, u64)> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(&self.prefix) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push((name, size));
        }
        files.sort();

        let mut total: u64 = files.iter().map(|(_, size)| size).sum();
        log::info!(
            "Directory {:?}: {} files, total size: {}",
            self.directory,
            files.len(),
            total
        );

        for (name, size) in files {
            if total <= self.total_size_limit {
                break;
            }
            let path = self.directory.join(&name);
            log::info!("Removing video file {:?}", path);
            match std::fs::remove_file(&path) {
                Ok(()) => total -= size,
                Err(e) => log::warn!("Failed to remove {:?}: {}", path, e),
            }
        }
    }

    /// Chunks dropped so far from the (frame, imv) queues.
    pub fn dropped_chunks(&self) -> (u64, u64) {
        (self.frame_queue.dropped(), self.imv_queue.dropped())
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        self.stop_writer();
    }
}

fn writer_loop(
    frame_queue: Arc<BoundedByteQueue>,
    imv_queue: Arc<BoundedByteQueue>,
    mut video_sink: FileSink,
    mut imv_sink: Option<FileSink>,
    quit: Arc<AtomicBool>,
) {
    while !quit.load(Ordering::Relaxed) {
        let wrote_frame = frame_file_write(&frame_queue, &mut video_sink, Duration::ZERO);
        let wrote_imv = imv_file_write(&imv_queue, imv_sink.as_mut());
        if !wrote_frame && !wrote_imv {
            // nothing pending; block briefly so shutdown stays responsive
            frame_file_write(&frame_queue, &mut video_sink, QUEUE_READ_POLL);
        }
    }

    if let Err(e) = video_sink.finalize() {
        log::error!("Failed to finalize video file: {}", e);
    }
    if let Some(sink) = imv_sink {
        if let Err(e) = sink.finalize() {
            log::error!("Failed to finalize imv file: {}", e);
        }
    }
}

/// Pull one frame chunk and append it to the video file. A failed write is
/// logged and dropped; the pipeline keeps running.
fn frame_file_write(queue: &BoundedByteQueue, sink: &mut FileSink, timeout: Duration) -> bool {
    let Some(chunk) = queue.read_front(timeout) else {
        return false;
    };
    if let Err(e) = sink.write_chunk(&chunk) {
        log::error!("{}", e);
    }
    true
}

/// Pull one motion-vector chunk. The queue is drained even when no `.imv`
/// file was requested so it cannot back up.
fn imv_file_write(queue: &BoundedByteQueue, sink: Option<&mut FileSink>) -> bool {
    let Some(chunk) = queue.read_front(Duration::ZERO) else {
        return false;
    };
    if let Some(sink) = sink {
        if let Err(e) = sink.write_chunk(&chunk) {
            log::error!("{}", e);
        }
    }
    true
}
