use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{RapmError, RapmResult};
use crate::sparse::Example;

/// Train/held-out partition of a dataset.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<Example>,
    pub held_out: Vec<Example>,
}

/// Seeded Bernoulli split: each example lands in `train` with probability `ratio`.
///
/// Input order is preserved inside both halves. The same seed and ratio always
/// produce the same partition. A non-finite label rejects the whole input.
pub fn random_split<I>(examples: I, ratio: f64, seed: u64) -> RapmResult<Split>
where
    I: IntoIterator<Item = Example>,
{
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(RapmError::invalid(format!(
            "split ratio must be in (0, 1), got {ratio}"
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut held_out = Vec::new();
    for (pos, example) in examples.into_iter().enumerate() {
        check_label(pos, &example)?;
        if rng.gen_bool(ratio) {
            train.push(example);
        } else {
            held_out.push(example);
        }
    }
    Ok(Split { train, held_out })
}

/// Dimension shared by every example, or `None` for an empty slice.
///
/// Mixed dimensions and non-finite labels are `InvalidConfig`.
pub fn universe_dim(examples: &[Example]) -> RapmResult<Option<usize>> {
    let Some(first) = examples.first() else {
        return Ok(None);
    };
    let dim = first.features.dim();
    for (pos, example) in examples.iter().enumerate() {
        if example.features.dim() != dim {
            return Err(RapmError::invalid(format!(
                "example {pos} has dimension {} (expected {dim})",
                example.features.dim()
            )));
        }
        check_label(pos, example)?;
    }
    Ok(Some(dim))
}

pub(crate) fn check_label(pos: usize, example: &Example) -> RapmResult<()> {
    if example.label.is_finite() {
        Ok(())
    } else {
        Err(RapmError::invalid(format!(
            "example {pos} has non-finite label {}",
            example.label
        )))
    }
}
