//! Client side of the Odin data catalog.
//!
//! - [`Catalog`]: the catalog endpoints this workspace consumes
//! - [`OdinClient`]: reqwest implementation of [`Catalog`]
//! - [`ScanIdSource`]: lazy scan id streams from a file, the fixed vds
//!   dataset, or a date-windowed walk of the catalog

pub mod backend;
pub mod client;
pub mod error;
pub mod source;

pub use backend::{backend_for, Backend};
pub use client::{Catalog, DayEntry, Level2Project, OdinClient, PeriodInfo};
pub use error::CatalogError;
pub use source::{first_day, ScanIdSource, ScanIdStream, DEFAULT_WINDOW_DAYS, FIRST_DAY};
