pub mod config;
pub mod core;
pub mod errors;
pub mod logging;
pub mod tool;

// Re-export commonly used items for convenience
pub use config::ToolConfig;
pub use crate::core::*;
pub use errors::{IatError, IatResult};
pub use tool::{AsrTool, FileType, ToolFile, ToolMessage};
