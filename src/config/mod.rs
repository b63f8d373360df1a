//! Configuration loading and management for the ingestion workflow.
//!
//! This module provides functionality to load workflow options from YAML
//! files. Configuration is always passed explicitly into a run; nothing here
//! is global.
//!
//! # Example
//!
//! ```no_run
//! use timesheet_ingest::config::ConfigLoader;
//!
//! let config = ConfigLoader::load("./config/workflow.yaml").unwrap().into_config();
//! println!("Two-pass threshold: {}", config.decision.two_pass_threshold);
//! ```

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{DEFAULT_HEADER_MARKER_PATTERN, DecisionConfig, WorkflowConfig};
