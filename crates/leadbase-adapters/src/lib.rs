//! External collaborators: HTTP retry plumbing, credential resolution, the
//! text-generation service, and the remote file source.

pub mod filesource;
pub mod http;
pub mod secrets;
pub mod textgen;

pub const CRATE_NAME: &str = "leadbase-adapters";

pub use filesource::{FileSource, FileSourceConfig, RemoteFile};
pub use http::{classify_reqwest_error, classify_status, BackoffPolicy, FetchError, RetryDisposition};
pub use secrets::{ApiKey, ApiKeyResolver, KeySource, ResolvedKey, SecretError};
pub use textgen::{SalaryConfidence, SalaryVerdict, TextGenClient, TextGenConfig, TextGenError};
