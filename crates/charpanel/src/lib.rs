#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/charpanel/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod exec;
pub mod frame;
pub mod io;
pub mod normalize;
pub mod pipeline;
pub mod portfolio;
pub mod taxonomy;
pub mod traits;

// Re-export core types
pub use config::{ColumnNames, PipelineConfig, PortfolioConfig};
pub use error::{PanelError, Result, UnitFailure};
pub use io::{CsvSink, CsvSource, MemorySink, MemorySource};
pub use normalize::{NormalizedPanel, Normalizer, normalize_slice};
pub use pipeline::{Pipeline, RunSummary};
pub use portfolio::{
    CrossSection, CrossSections, DecileCalculator, PortfolioLegs, PortfolioReturns, ReturnTable,
    portfolio_return,
};
pub use taxonomy::{Characteristic, CharacteristicGroup, Taxonomy};
pub use traits::{PanelSink, PanelSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
