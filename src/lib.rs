//! NewsLens - sentiment reports for news text.
//!
//! Submitted text is split into blocks, each block is labelled by an
//! [`analyzer::Analyzer`], and the labelled items are rolled up into a
//! report aggregate. Reports belong to one user and can be shared with
//! others; [`orchestrator::ReportService`] is the entry point for both.

pub mod analysis;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod sharing;
pub mod store;

pub use error::{NewsLensError, Result, StoreError};
pub use orchestrator::{OrchestratorConfig, ReportService};
