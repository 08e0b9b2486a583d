pub mod scanner;

pub use scanner::{DEFAULT_EXTENSION, FrameScanner, parse_frame_order};
