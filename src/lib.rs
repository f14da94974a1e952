//! Split CSV and spreadsheet files into one output file per distinct value of
//! a column, with a background job layer that archives the results.

pub mod archive;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod state;
pub mod streaming;
pub mod validation;

pub use config::SplitterConfig;
pub use engine::{SplitEngine, SplitResult};
pub use error::{AppError, ErrorKind, ErrorPresentation};
pub use state::AppState;
