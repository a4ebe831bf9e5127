//! Motion recording: bounded chunk queues, session files, and the writer
//! thread that drains them.

mod queue;
mod recorder;
mod writer;

pub use queue::{BoundedByteQueue, QueueBudget, INTRA_FRAME_PERIOD_S, QUEUE_READ_POLL};
pub use recorder::FrameRecorder;
pub use writer::{FileSink, TEMP_FILE_SUFFIX};
