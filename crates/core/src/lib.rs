pub mod error;
pub mod panics;
pub mod threads;

pub use error::ConfigError;
pub use panics::panic_message;
pub use threads::{PriorityHint, ThreadFactory};
