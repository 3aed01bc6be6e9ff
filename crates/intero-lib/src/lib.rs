pub mod config;
pub mod detectors;
pub mod error;
pub mod filter;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod sensitivity;
pub mod signal;

pub use config::PipelineConfig;
pub use detectors::*;
pub use error::{PipelineError, Result};
pub use metrics::*;
pub use signal::*;
