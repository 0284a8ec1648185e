//! Batch import pipeline, hook-generation jobs, and env configuration.

pub mod config;
pub mod importer;
pub mod jobs;

pub const CRATE_NAME: &str = "leadbase-ingest";

pub use config::AppConfig;
pub use importer::{import_csv, ImportError};
pub use jobs::{HookEngine, HookJobSpec, HookRunSummary, JobId, JobStatus, JobTracker};
