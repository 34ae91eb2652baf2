pub mod analyzer;
pub mod batch;
pub mod cli;
pub mod color;
pub mod config;
pub mod db;
pub mod error;
mod metrics;
pub mod provider;
pub mod ranker;
pub mod section;
mod server;
pub mod similarity;
pub mod utils;

pub use analyzer::SectionAnalyzer;
pub use batch::{BatchController, BatchReport, BatchScope};
pub use config::Opts;
pub use db::{SectionStore, SqliteStore};
pub use error::{Error, ProviderError, Result};
pub use ranker::{RankedResult, SearchOptions, rank};
pub use section::{SectionCatalog, SectionProfile, SectionRecord, SectionType, WorkItem};
