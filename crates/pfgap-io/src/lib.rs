//! Delimited dataset reading and result writing for the pfgap pipeline.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{ExperimentName, LabelColumn, ReadOptions};
pub use error::IoError;
pub use reader::DatasetReader;
pub use writer::{RepeatSummary, ResultWriter, RunSummary};
