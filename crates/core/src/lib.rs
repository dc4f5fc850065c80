pub mod cipher;
pub mod config;
pub mod error;
pub mod http;
pub mod job;
pub mod validate;

pub use cipher::TargetCipher;
pub use config::Config;
pub use error::*;
pub use job::{FreqMode, Job, JobFactory, JobId, JobStatus, ScanId};
