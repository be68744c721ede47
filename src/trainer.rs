//! Ridge regression fit by (mini-batch) gradient descent over sparse examples.
//!
//! Minimizes `J(w) = (1/|D|) Σ (w·x_i − y_i)² + λ‖w‖²` starting from `w = 0`.
//! The data gradient only touches coordinates that are nonzero in the sampled
//! batch; the L2 term is applied densely once per iteration as a shrink factor.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::dataset::universe_dim;
use crate::error::{RapmError, RapmResult, Stage};
use crate::sparse::Example;

pub const DEFAULT_STEP_SIZE: f64 = 0.1;
pub const DEFAULT_ITERATIONS: usize = 1000;
pub const DEFAULT_DECAY: f64 = 0.003;
pub const DEFAULT_DIVERGENCE_RATIO: f64 = 1e6;

const LOG_EVERY: usize = 100;

/// Learning-rate schedule, evaluated at iteration `t` (1-based).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepSchedule {
    /// `η / (1 + decay·(t − 1))`
    InverseTime { decay: f64 },
    /// `η / sqrt(t)`
    InverseSqrt,
    Constant,
}

impl Default for StepSchedule {
    fn default() -> Self {
        StepSchedule::InverseTime {
            decay: DEFAULT_DECAY,
        }
    }
}

impl StepSchedule {
    pub fn rate(&self, base: f64, t: usize) -> f64 {
        let t = t.max(1) as f64;
        match self {
            StepSchedule::InverseTime { decay } => base / (1.0 + decay * (t - 1.0)),
            StepSchedule::InverseSqrt => base / t.sqrt(),
            StepSchedule::Constant => base,
        }
    }
}

/// Hyperparameters for a single training run.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeConfig {
    pub reg_param: f64,
    pub step_size: f64,
    pub iterations: usize,
    pub schedule: StepSchedule,
    /// Probability that an example joins a given iteration's batch; `1.0` is full batch.
    pub mini_batch_fraction: f64,
    pub seed: u64,
    /// Batch objective above `divergence_ratio × J(0)` counts as divergence.
    pub divergence_ratio: f64,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            reg_param: 0.0,
            step_size: DEFAULT_STEP_SIZE,
            iterations: DEFAULT_ITERATIONS,
            schedule: StepSchedule::default(),
            mini_batch_fraction: 1.0,
            seed: 0,
            divergence_ratio: DEFAULT_DIVERGENCE_RATIO,
        }
    }
}

impl RidgeConfig {
    pub fn with_reg_param(mut self, reg_param: f64) -> Self {
        self.reg_param = reg_param;
        self
    }

    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_schedule(mut self, schedule: StepSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_mini_batch_fraction(mut self, fraction: f64) -> Self {
        self.mini_batch_fraction = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> RapmResult<()> {
        validate_reg_param(self.reg_param)?;
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(RapmError::invalid(format!(
                "step size must be positive and finite, got {}",
                self.step_size
            )));
        }
        if self.iterations == 0 {
            return Err(RapmError::invalid("iteration count must be at least 1"));
        }
        if let StepSchedule::InverseTime { decay } = self.schedule
            && !(decay.is_finite() && decay >= 0.0)
        {
            return Err(RapmError::invalid(format!(
                "schedule decay must be non-negative and finite, got {decay}"
            )));
        }
        if !(self.mini_batch_fraction > 0.0 && self.mini_batch_fraction <= 1.0) {
            return Err(RapmError::invalid(format!(
                "mini-batch fraction must be in (0, 1], got {}",
                self.mini_batch_fraction
            )));
        }
        if !(self.divergence_ratio.is_finite() && self.divergence_ratio > 1.0) {
            return Err(RapmError::invalid(format!(
                "divergence ratio must be finite and above 1, got {}",
                self.divergence_ratio
            )));
        }
        Ok(())
    }
}

pub fn validate_reg_param(reg_param: f64) -> RapmResult<()> {
    if reg_param.is_finite() && reg_param >= 0.0 {
        Ok(())
    } else {
        Err(RapmError::invalid(format!(
            "regularization strength must be finite and >= 0, got {reg_param}"
        )))
    }
}

/// Dense fitted coefficients, read-only once training returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights(Vec<f64>);

impl Weights {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn norm(&self) -> f64 {
        squared_norm(&self.0).sqrt()
    }
}

impl From<Vec<f64>> for Weights {
    fn from(values: Vec<f64>) -> Self {
        Weights(values)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub weights: Weights,
    pub reg_param: f64,
    pub iterations: usize,
    /// `J(w)` over the whole training set at the returned weights.
    pub final_objective: f64,
}

/// Full-dataset ridge objective. `NaN` on an empty slice.
pub fn objective(weights: &[f64], examples: &[Example], reg_param: f64) -> f64 {
    if examples.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = examples
        .iter()
        .map(|e| {
            let r = e.residual(weights);
            r * r
        })
        .sum();
    sse / examples.len() as f64 + reg_param * squared_norm(weights)
}

pub fn train(examples: &[Example], config: &RidgeConfig) -> RapmResult<TrainedModel> {
    config.validate()?;
    let Some(dim) = universe_dim(examples)? else {
        return Err(RapmError::invalid("training set is empty"));
    };

    let reg_param = config.reg_param;
    let full_batch = config.mini_batch_fraction >= 1.0;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut weights = vec![0.0_f64; dim];
    let mut grad = vec![0.0_f64; dim];
    let mut in_grad = vec![false; dim];
    let mut touched: Vec<usize> = Vec::new();

    let start_objective = objective(&weights, examples, reg_param);
    let limit = config.divergence_ratio * start_objective.max(f64::MIN_POSITIVE);

    for t in 1..=config.iterations {
        let eta = config.schedule.rate(config.step_size, t);

        let mut batch_n = 0usize;
        let mut sse = 0.0_f64;
        for example in examples {
            if !full_batch && !rng.gen_bool(config.mini_batch_fraction) {
                continue;
            }
            batch_n += 1;
            let r = example.residual(&weights);
            sse += r * r;
            for (j, x) in example.features.iter() {
                if !in_grad[j] {
                    in_grad[j] = true;
                    touched.push(j);
                }
                grad[j] += r * x;
            }
        }

        // Gradient is evaluated at the pre-update weights, so the L2 shrink and
        // the data step both read the old values.
        let shrink = 1.0 - 2.0 * eta * reg_param;
        let mut old_norm_sq = 0.0_f64;
        for w in weights.iter_mut() {
            old_norm_sq += *w * *w;
            *w *= shrink;
        }

        let batch_objective = if batch_n > 0 {
            sse / batch_n as f64 + reg_param * old_norm_sq
        } else {
            reg_param * old_norm_sq
        };
        if !batch_objective.is_finite() || batch_objective > limit {
            return Err(RapmError::diverged(
                reg_param,
                Stage::Training { iteration: t },
                format!("batch objective {batch_objective:e} (start {start_objective:e})"),
            ));
        }

        let scale = if batch_n > 0 {
            2.0 / batch_n as f64
        } else {
            0.0
        };
        for j in touched.drain(..) {
            weights[j] -= eta * scale * grad[j];
            grad[j] = 0.0;
            in_grad[j] = false;
        }

        if t % LOG_EVERY == 0 {
            log::debug!(
                "lambda={reg_param} iter={t} eta={eta:.5} batch={batch_n} obj={batch_objective:.6}"
            );
        }
    }

    if weights.iter().any(|w| !w.is_finite()) {
        return Err(RapmError::diverged(
            reg_param,
            Stage::Training {
                iteration: config.iterations,
            },
            "weights not finite",
        ));
    }
    let final_objective = objective(&weights, examples, reg_param);
    if !final_objective.is_finite() {
        return Err(RapmError::diverged(
            reg_param,
            Stage::Training {
                iteration: config.iterations,
            },
            "final objective not finite",
        ));
    }

    Ok(TrainedModel {
        weights: Weights(weights),
        reg_param,
        iterations: config.iterations,
        final_objective,
    })
}

fn squared_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_examples() -> Vec<Example> {
        vec![
            Example::dense(&[1.0, 0.0, 0.0], 5.0).unwrap(),
            Example::dense(&[0.0, 1.0, 0.0], 3.0).unwrap(),
            Example::dense(&[0.0, 0.0, 1.0], -2.0).unwrap(),
            Example::dense(&[1.0, 1.0, 1.0], 6.0).unwrap(),
        ]
    }

    #[test]
    fn schedules_decay_as_documented() {
        let inv = StepSchedule::InverseTime { decay: 0.5 };
        assert_eq!(inv.rate(1.0, 1), 1.0);
        assert_eq!(inv.rate(1.0, 3), 0.5);
        assert_eq!(StepSchedule::InverseSqrt.rate(2.0, 4), 1.0);
        assert_eq!(StepSchedule::Constant.rate(0.3, 999), 0.3);
    }

    #[test]
    fn recovers_known_weights_on_consistent_system() {
        let cfg = RidgeConfig::default()
            .with_reg_param(0.0)
            .with_step_size(0.1)
            .with_iterations(1000);
        let model = train(&four_examples(), &cfg).unwrap();
        let w = model.weights.as_slice();
        for (got, want) in w.iter().zip([5.0, 3.0, -2.0]) {
            assert!((got - want).abs() < 0.05, "got {w:?}");
        }
        assert!(model.final_objective < 1e-3);
    }

    #[test]
    fn training_is_deterministic() {
        let cfg = RidgeConfig::default()
            .with_reg_param(0.05)
            .with_mini_batch_fraction(0.5)
            .with_seed(11);
        let a = train(&four_examples(), &cfg).unwrap();
        let b = train(&four_examples(), &cfg).unwrap();
        assert_eq!(a.weights, b.weights);
    }

    #[test]
    fn zero_feature_example_still_counts_in_the_mean() {
        // With a lone all-zero example the best constant-free fit is w = 0 and
        // J(0) = y², so the objective must reflect the label.
        let examples = vec![Example::dense(&[0.0, 0.0], 4.0).unwrap()];
        let model = train(&examples, &RidgeConfig::default()).unwrap();
        assert_eq!(model.weights.as_slice(), &[0.0, 0.0]);
        assert_eq!(model.final_objective, 16.0);

        let short = RidgeConfig::default().with_iterations(5);
        let mut mixed = four_examples();
        mixed.push(Example::dense(&[0.0, 0.0, 0.0], 0.0).unwrap());
        let with_zero = train(&mixed, &short).unwrap();
        let without = train(&four_examples(), &short).unwrap();
        assert_ne!(with_zero.weights, without.weights);
    }

    #[test]
    fn huge_step_is_reported_as_divergence() {
        let examples = vec![
            Example::dense(&[10.0, 3.0], 40.0).unwrap(),
            Example::dense(&[4.0, 12.0], -25.0).unwrap(),
        ];
        let cfg = RidgeConfig::default().with_step_size(100.0);
        let err = train(&examples, &cfg).unwrap_err();
        assert!(err.is_divergence(), "{err}");
    }

    #[test]
    fn nan_label_is_invalid_input_not_divergence() {
        let examples = vec![Example::dense(&[1.0], f64::NAN).unwrap()];
        let err = train(&examples, &RidgeConfig::default()).unwrap_err();
        assert!(matches!(err, RapmError::InvalidConfig(_)), "{err:?}");
        assert!(!err.is_divergence());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let ex = four_examples();
        let bad = [
            RidgeConfig::default().with_reg_param(-1.0),
            RidgeConfig::default().with_reg_param(f64::NAN),
            RidgeConfig::default().with_iterations(0),
            RidgeConfig::default().with_step_size(0.0),
            RidgeConfig::default().with_mini_batch_fraction(0.0),
            RidgeConfig::default().with_schedule(StepSchedule::InverseTime { decay: -1.0 }),
        ];
        for cfg in bad {
            assert!(matches!(train(&ex, &cfg), Err(RapmError::InvalidConfig(_))));
        }
        assert!(matches!(
            train(&[], &RidgeConfig::default()),
            Err(RapmError::InvalidConfig(_))
        ));
    }
}
