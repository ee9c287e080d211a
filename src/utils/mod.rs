//! Small shared utilities

mod timer;

pub use timer::{StageTiming, Timer};
