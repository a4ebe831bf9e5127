use std::fmt;

#[derive(Debug)]
pub enum MotionError {
    ConfigError(String),
    GeometryMismatch(String),
    EncoderError(String),
    WriterError(String),
    IoError(String),
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MotionError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            MotionError::GeometryMismatch(msg) => write!(f, "Vector geometry mismatch: {}", msg),
            MotionError::EncoderError(msg) => write!(f, "Encoder source error: {}", msg),
            MotionError::WriterError(msg) => write!(f, "Motion file writer error: {}", msg),
            MotionError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for MotionError {}
