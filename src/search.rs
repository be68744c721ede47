//! Grid search over regularization strengths.
//!
//! Tie-break rule: two held-out RMSEs within [`RMSE_TIE_TOLERANCE`] (relative,
//! floored at 1.0) are equal, and the smaller λ wins. Outcomes are visited in
//! ascending λ order and the incumbent is only replaced by a strictly better
//! RMSE, so the selection does not depend on execution order or timing.

use rayon::prelude::*;

use crate::error::{CandidateFailure, RapmError, RapmResult, Stage};
use crate::evaluate;
use crate::sparse::Example;
use crate::trainer::{self, RidgeConfig, Weights, validate_reg_param};

pub const RMSE_TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    #[default]
    Sequential,
    Parallel {
        threads: usize,
    },
}

/// Weights and held-out RMSE for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFit {
    pub weights: Weights,
    pub rmse: f64,
}

/// Trains and scores one candidate λ.
pub trait CandidateRunner: Sync {
    fn run(&self, reg_param: f64) -> RapmResult<CandidateFit>;
}

/// Production runner: gradient training on `train`, RMSE on `held_out`.
pub struct RidgeRunner<'a> {
    train: &'a [Example],
    held_out: &'a [Example],
    base: RidgeConfig,
}

impl<'a> RidgeRunner<'a> {
    pub fn new(train: &'a [Example], held_out: &'a [Example], base: RidgeConfig) -> Self {
        Self {
            train,
            held_out,
            base,
        }
    }
}

impl CandidateRunner for RidgeRunner<'_> {
    fn run(&self, reg_param: f64) -> RapmResult<CandidateFit> {
        let config = self.base.clone().with_reg_param(reg_param);
        let model = trainer::train(self.train, &config)?;
        let rmse = evaluate::rmse(&model.weights, self.held_out, reg_param)?;
        Ok(CandidateFit {
            weights: model.weights,
            rmse,
        })
    }
}

/// What the driver observed for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSummary {
    pub reg_param: f64,
    pub outcome: Result<f64, RapmError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub reg_param: f64,
    pub rmse: f64,
    pub weights: Weights,
}

#[derive(Debug, Clone)]
pub struct GridSearch {
    candidates: Vec<f64>,
    execution: Execution,
}

impl GridSearch {
    pub fn new(candidates: Vec<f64>) -> Self {
        Self {
            candidates,
            execution: Execution::Sequential,
        }
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn candidates(&self) -> &[f64] {
        &self.candidates
    }

    /// Train one ridge model per candidate and keep the best held-out RMSE.
    pub fn run(
        &self,
        train: &[Example],
        held_out: &[Example],
        base: &RidgeConfig,
    ) -> RapmResult<SearchResult> {
        self.run_observed(train, held_out, base, |_| {})
    }

    /// Like [`GridSearch::run`], reporting each candidate to `observer` as it finishes.
    pub fn run_observed<F>(
        &self,
        train: &[Example],
        held_out: &[Example],
        base: &RidgeConfig,
        observer: F,
    ) -> RapmResult<SearchResult>
    where
        F: Fn(&CandidateSummary) + Sync,
    {
        base.validate()?;
        if train.is_empty() {
            return Err(RapmError::invalid("training set is empty"));
        }
        if held_out.is_empty() {
            return Err(RapmError::EmptyEvaluation);
        }
        let runner = RidgeRunner::new(train, held_out, base.clone());
        self.run_with(&runner, observer)
    }

    pub fn run_with<R, F>(&self, runner: &R, observer: F) -> RapmResult<SearchResult>
    where
        R: CandidateRunner,
        F: Fn(&CandidateSummary) + Sync,
    {
        self.validate()?;

        let evaluate_one = |&reg_param: &f64| {
            let result = runner.run(reg_param);
            let summary = CandidateSummary {
                reg_param,
                outcome: result.as_ref().map(|fit| fit.rmse).map_err(|err| err.clone()),
            };
            match &summary.outcome {
                Ok(rmse) => log::info!("lambda={reg_param} held-out rmse={rmse:.6}"),
                Err(err) => log::warn!("lambda={reg_param} failed: {err}"),
            }
            observer(&summary);
            (reg_param, result)
        };

        let outcomes: Vec<(f64, RapmResult<CandidateFit>)> = match self.execution {
            Execution::Sequential => self.candidates.iter().map(evaluate_one).collect(),
            Execution::Parallel { threads } => with_search_pool(threads, || {
                self.candidates.par_iter().map(evaluate_one).collect()
            }),
        };

        let best = select_best(outcomes)?;
        log::info!(
            "selected lambda={} held-out rmse={:.6}",
            best.reg_param,
            best.rmse
        );
        Ok(best)
    }

    fn validate(&self) -> RapmResult<()> {
        if self.candidates.is_empty() {
            return Err(RapmError::invalid("candidate list is empty"));
        }
        for &reg_param in &self.candidates {
            validate_reg_param(reg_param)?;
        }
        if let Execution::Parallel { threads } = self.execution
            && threads == 0
        {
            return Err(RapmError::invalid("parallel search needs at least one thread"));
        }
        Ok(())
    }
}

/// Pick the lowest RMSE among successful candidates, smaller λ on ties.
///
/// Diverged candidates (including a non-finite RMSE) are excluded. Any other
/// error is not candidate-specific and is returned as is.
pub fn select_best(
    mut outcomes: Vec<(f64, RapmResult<CandidateFit>)>,
) -> RapmResult<SearchResult> {
    outcomes.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut best: Option<SearchResult> = None;
    let mut failures = Vec::new();
    for (reg_param, outcome) in outcomes {
        let fit = match outcome {
            Ok(fit) if fit.rmse.is_finite() => fit,
            Ok(fit) => {
                failures.push(CandidateFailure {
                    reg_param,
                    error: Box::new(RapmError::diverged(
                        reg_param,
                        Stage::Evaluation,
                        format!("held-out rmse is {}", fit.rmse),
                    )),
                });
                continue;
            }
            Err(err) if err.is_divergence() => {
                failures.push(CandidateFailure {
                    reg_param,
                    error: Box::new(err),
                });
                continue;
            }
            Err(err) => return Err(err),
        };

        let replace = match &best {
            None => true,
            Some(cur) => !rmse_ties(fit.rmse, cur.rmse) && fit.rmse < cur.rmse,
        };
        if replace {
            best = Some(SearchResult {
                reg_param,
                rmse: fit.rmse,
                weights: fit.weights,
            });
        }
    }

    best.ok_or(RapmError::NoViableCandidate { failures })
}

pub fn rmse_ties(a: f64, b: f64) -> bool {
    (a - b).abs() <= RMSE_TIE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

fn with_search_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(err) => {
            log::warn!("search pool unavailable ({err}); using global pool");
            action()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(rmse: f64) -> RapmResult<CandidateFit> {
        Ok(CandidateFit {
            weights: Weights::from(vec![rmse]),
            rmse,
        })
    }

    #[test]
    fn tie_within_tolerance_prefers_smaller_lambda_regardless_of_order() {
        let a = select_best(vec![(1.0, fit(2.0)), (0.1, fit(2.0 + 1e-12))]).unwrap();
        assert_eq!(a.reg_param, 0.1);
        let b = select_best(vec![(0.1, fit(2.0 + 1e-12)), (1.0, fit(2.0))]).unwrap();
        assert_eq!(b.reg_param, 0.1);
    }

    #[test]
    fn non_finite_rmse_is_never_selected() {
        let best = select_best(vec![(0.0, fit(f64::NAN)), (0.5, fit(9.0))]).unwrap();
        assert_eq!(best.reg_param, 0.5);
    }

    #[test]
    fn all_failed_reports_every_failure() {
        let diverged = |l| Err(RapmError::diverged(l, Stage::Training { iteration: 1 }, "x"));
        let err = select_best(vec![(0.0, diverged(0.0)), (1.0, diverged(1.0))]).unwrap_err();
        match err {
            RapmError::NoViableCandidate { failures } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_divergence_error_aborts_selection() {
        let err = select_best(vec![(0.0, fit(1.0)), (1.0, Err(RapmError::EmptyEvaluation))])
            .unwrap_err();
        assert_eq!(err, RapmError::EmptyEvaluation);
    }

    #[test]
    fn rmse_tie_is_relative_for_large_values() {
        assert!(rmse_ties(1e6, 1e6 + 1e-4));
        assert!(!rmse_ties(1.0, 1.0 + 1e-6));
    }
}
