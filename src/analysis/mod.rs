//! Motion vector analysis: persistence filtering, blob extraction, and
//! overlap tracking.

mod average;
mod blob;
mod grid;
mod vector;

pub use average::MovingAverage;
pub use blob::BlobTracker;
pub use grid::Grid;
pub use vector::{BlobObserver, ImvObserver, MotionObserver, MotionVectorAnalyzer};
