use std::env;
use std::str::FromStr;

use crate::error::{RapmError, RapmResult};
use crate::search::Execution;
use crate::trainer::{
    DEFAULT_DECAY, DEFAULT_DIVERGENCE_RATIO, DEFAULT_ITERATIONS, RidgeConfig, StepSchedule,
    validate_reg_param,
};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;
pub const DEFAULT_STEP: f64 = 0.05;
pub const DEFAULT_LAMBDAS: [f64; 7] = [0.0, 0.001, 0.003, 0.01, 0.03, 0.1, 0.3];

/// Run configuration for a full fit.
#[derive(Debug, Clone, PartialEq)]
pub struct RapmConfig {
    pub seed: u64,
    pub train_ratio: f64,
    pub step_size: f64,
    pub decay: f64,
    pub iterations: usize,
    pub mini_batch_fraction: f64,
    pub lambdas: Vec<f64>,
    /// `1` runs candidates sequentially.
    pub parallelism: usize,
}

impl Default for RapmConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            train_ratio: DEFAULT_TRAIN_RATIO,
            step_size: DEFAULT_STEP,
            decay: DEFAULT_DECAY,
            iterations: DEFAULT_ITERATIONS,
            mini_batch_fraction: 1.0,
            lambdas: DEFAULT_LAMBDAS.to_vec(),
            parallelism: 1,
        }
    }
}

impl RapmConfig {
    /// Defaults overridden by `RAPM_*` environment variables.
    ///
    /// A variable that is set but does not parse is an error.
    pub fn from_env() -> RapmResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RapmResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = parsed(&lookup, "RAPM_SEED")? {
            cfg.seed = v;
        }
        if let Some(v) = parsed(&lookup, "RAPM_TRAIN_RATIO")? {
            cfg.train_ratio = v;
        }
        if let Some(v) = parsed(&lookup, "RAPM_STEP")? {
            cfg.step_size = v;
        }
        if let Some(v) = parsed(&lookup, "RAPM_DECAY")? {
            cfg.decay = v;
        }
        if let Some(v) = parsed(&lookup, "RAPM_ITERS")? {
            cfg.iterations = v;
        }
        if let Some(v) = parsed(&lookup, "RAPM_BATCH_FRACTION")? {
            cfg.mini_batch_fraction = v;
        }
        if let Some(raw) = lookup("RAPM_LAMBDAS") {
            cfg.lambdas = parse_lambdas(&raw)?;
        }
        if let Some(v) = parsed(&lookup, "RAPM_PARALLELISM")? {
            cfg.parallelism = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> RapmResult<()> {
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(RapmError::invalid(format!(
                "RAPM_TRAIN_RATIO must be in (0, 1), got {}",
                self.train_ratio
            )));
        }
        if self.lambdas.is_empty() {
            return Err(RapmError::invalid("RAPM_LAMBDAS is empty"));
        }
        for &lambda in &self.lambdas {
            validate_reg_param(lambda)?;
        }
        if self.parallelism == 0 {
            return Err(RapmError::invalid("RAPM_PARALLELISM must be at least 1"));
        }
        self.ridge().validate()
    }

    /// Base trainer settings; λ is filled in per candidate.
    pub fn ridge(&self) -> RidgeConfig {
        RidgeConfig {
            reg_param: 0.0,
            step_size: self.step_size,
            iterations: self.iterations,
            schedule: StepSchedule::InverseTime { decay: self.decay },
            mini_batch_fraction: self.mini_batch_fraction,
            seed: self.seed,
            divergence_ratio: DEFAULT_DIVERGENCE_RATIO,
        }
    }

    pub fn execution(&self) -> Execution {
        if self.parallelism > 1 {
            Execution::Parallel {
                threads: self.parallelism,
            }
        } else {
            Execution::Sequential
        }
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> RapmResult<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| RapmError::invalid(format!("{key}={raw:?} does not parse")))
}

/// Comma-separated λ list, e.g. `0,0.01,0.1`.
pub fn parse_lambdas(raw: &str) -> RapmResult<Vec<f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| RapmError::invalid(format!("lambda {s:?} does not parse")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_have_seven_candidates() {
        let cfg = RapmConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.lambdas.len(), 7);
        assert_eq!(cfg.execution(), Execution::Sequential);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = RapmConfig::from_lookup(lookup(&[
            ("RAPM_SEED", "7"),
            ("RAPM_LAMBDAS", "0, 0.5 ,2"),
            ("RAPM_PARALLELISM", "4"),
        ]))
        .unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.lambdas, vec![0.0, 0.5, 2.0]);
        assert_eq!(cfg.execution(), Execution::Parallel { threads: 4 });
        assert_eq!(cfg.ridge().seed, 7);
    }

    #[test]
    fn unparseable_values_are_not_defaulted() {
        assert!(RapmConfig::from_lookup(lookup(&[("RAPM_ITERS", "lots")])).is_err());
        assert!(RapmConfig::from_lookup(lookup(&[("RAPM_LAMBDAS", "0.1,x")])).is_err());
        assert!(RapmConfig::from_lookup(lookup(&[("RAPM_ITERS", "0")])).is_err());
        assert!(RapmConfig::from_lookup(lookup(&[("RAPM_LAMBDAS", ",")])).is_err());
        assert!(RapmConfig::from_lookup(lookup(&[("RAPM_LAMBDAS", "0.1,-1")])).is_err());
    }
}
