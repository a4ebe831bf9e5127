//! motioncam: motion-triggered recording over hardware encoder motion vectors
//!
//! This crate turns the inline motion vectors emitted by a hardware H.264
//! encoder into recording decisions: per-macroblock displacements are
//! persistence-filtered into a motion grid, connected components ("blobs")
//! are extracted and aged across frames by spatial overlap, and a small
//! state machine with hysteresis starts and stops a file writer that drains
//! bounded frame/motion-vector queues into timestamped recordings.
//!
//! # Features
//! - Blob extraction and overlap tracking over the macroblock grid
//! - Trigger/clear state machine with moving-average and cool-down hysteresis
//! - Bounded double-buffered queues between drain, analysis, and writer threads
//! - Crash-safe recordings (`.saving` staging, atomic rename)
//! - Directory retention by total size
//!
//! # Usage
//! ```rust,ignore
//! use motioncam::{MotionCamConfig, MotionPipeline};
//!
//! let config = MotionCamConfig::load_from_file("motioncam.toml")?;
//! let mut pipeline = MotionPipeline::new(config, encoder_source);
//! pipeline.start()?;
//! // ... recordings appear in the configured directory on motion ...
//! pipeline.stop();
//! ```
pub mod analysis;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod recording;
pub mod types;

// Testing utilities - synthetic encoder data for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::MotionCamConfig;
pub use errors::MotionError;
pub use pipeline::{MotionPipeline, MotionState, MotionStateMachine};
pub use types::{
    EncodedBuffer, EncoderSettings, EncoderSource, MotionVector, VectorGeometry,
};

/// Initialize logging for the motion pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "motioncam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
