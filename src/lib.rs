//! Two-pass punch event extraction for timesheet documents.
//!
//! This crate turns an already-decoded timesheet document into a normalized,
//! deduplicated list of employee punch events. Large multi-employee files are
//! processed in two passes: employees are discovered first, then extracted one
//! request per employee in bounded concurrent batches, and the per-employee
//! results are stitched back together.

#![warn(missing_docs)]

pub mod capability;
pub mod config;
pub mod error;
pub mod models;
pub mod workflow;
