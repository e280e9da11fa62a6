//! Proximity Forest: train, predict, measure proximity, impute.
//!
//! An ensemble of randomized nearest-exemplar trees over series data. Each
//! internal node draws a distance measure and one exemplar per class, then
//! routes instances to their nearest exemplar. The trained forest yields
//! out-of-bag instance proximities, which drive outlier scores and an
//! iterative proximity-weighted imputation loop.

mod config;
mod dataset;
mod error;
mod forest;
mod impute;
mod kernel;
mod label;
mod node;
mod outlier;
mod predict;
mod proximity;
mod purity;
mod result;
mod serialize;
mod series;
mod slot;
mod splitter;
mod tree;

pub use config::{ForestConfig, Task, Voting};
pub use dataset::{Dataset, DatasetView, Instance};
pub use error::ForestError;
pub use forest::{ProximityForest, task_seed};
pub use impute::{ImputationLoop, ImputeConfig, ImputeReport, InitialImputer, InitialImputerKind};
pub use kernel::{
    BuiltinKernel, DEFAULT_MEASURES, DistanceKernel, KernelError, KernelId, KernelRegistry, KernelTable,
    MeasureKind, ParamSet,
};
pub use label::{Label, LabelMapping};
pub use node::{Exemplar, Impurity, Node, NodeIndex, NodeKind};
pub use outlier::{OutlierScores, outlier_scores};
pub use proximity::{ProximityConfig, ProximityMatrix};
pub use purity::PurityMeasure;
pub use result::{Score, TestResult, TrainingMetadata};
pub use series::{Cell, MissingIndex, SeriesKind, SeriesValue};
pub use slot::DistanceSlot;
pub use splitter::SplitRule;
pub use tree::ProximityTree;
