//! Catalog error types.

use std::path::PathBuf;

use microq_core::http::HttpError;
use microq_core::FreqMode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The catalog answered in a way the pagination cannot continue from.
    #[error("Catalog protocol violation: {0}")]
    Protocol(String),

    #[error("No backend known for freqmode {0}")]
    UnknownFreqMode(FreqMode),

    #[error("Invalid scan id on line {line}: {value:?}")]
    Parse { line: usize, value: String },

    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
