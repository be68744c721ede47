//! Regularized adjusted plus/minus (RAPM) for basketball lineups.
//!
//! Stints are encoded as sparse ±1 player vectors, a ridge regression is fit
//! by gradient descent against point margin per 100 possessions, and a grid
//! of regularization strengths is searched on a seeded held-out split.

pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod exact;
pub mod report;
pub mod search;
pub mod sparse;
pub mod stint;
pub mod trainer;

pub use error::{RapmError, RapmResult};
pub use search::{GridSearch, SearchResult};
pub use sparse::{Example, SparseVector};
pub use trainer::{RidgeConfig, StepSchedule, TrainedModel, Weights};
