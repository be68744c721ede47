use thiserror::Error;

pub type RapmResult<T> = Result<T, RapmError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RapmError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("diverged at lambda={reg_param} during {stage}: {detail}")]
    Diverged {
        reg_param: f64,
        stage: Stage,
        detail: String,
    },
    #[error("evaluation undefined: held-out set is empty")]
    EmptyEvaluation,
    #[error("feature index {index} outside universe of size {dim}")]
    DimensionMismatch { index: usize, dim: usize },
    #[error("no viable candidate ({} failed)", .failures.len())]
    NoViableCandidate { failures: Vec<CandidateFailure> },
    #[error("normal equations are singular")]
    Singular,
    #[error("ingest error on line {line}: {detail}")]
    Ingest { line: usize, detail: String },
    /// `index` is the position in the stint slice handed to the encoder.
    #[error("invalid stint #{index}: {detail}")]
    InvalidStint { index: usize, detail: String },
}

/// Where a numerical failure was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Training { iteration: usize },
    Evaluation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Training { iteration } => write!(f, "training (iteration {iteration})"),
            Stage::Evaluation => write!(f, "evaluation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFailure {
    pub reg_param: f64,
    pub error: Box<RapmError>,
}

impl RapmError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RapmError::InvalidConfig(message.into())
    }

    pub fn diverged(reg_param: f64, stage: Stage, detail: impl Into<String>) -> Self {
        RapmError::Diverged {
            reg_param,
            stage,
            detail: detail.into(),
        }
    }

    pub fn is_divergence(&self) -> bool {
        matches!(self, RapmError::Diverged { .. })
    }
}
