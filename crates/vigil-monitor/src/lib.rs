//! Stream monitor supervising one detection pipeline per channel.

pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod settings;

pub use error::{MonitorError, MonitorResult};
pub use lifecycle::ShutdownLatch;
pub use monitor::Monitor;
pub use settings::load_config;
