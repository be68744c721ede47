use crate::dataset::check_label;
use crate::error::{RapmError, RapmResult, Stage};
use crate::sparse::Example;
use crate::trainer::Weights;

/// Held-out root-mean-square error of `weights`.
///
/// `reg_param` only labels a divergence error; it does not enter the metric.
pub fn rmse(weights: &Weights, held_out: &[Example], reg_param: f64) -> RapmResult<f64> {
    if held_out.is_empty() {
        return Err(RapmError::EmptyEvaluation);
    }
    let mut sse = 0.0_f64;
    for (pos, example) in held_out.iter().enumerate() {
        check_label(pos, example)?;
        let r = predict(weights, example)? - example.label;
        sse += r * r;
    }
    let value = (sse / held_out.len() as f64).sqrt();
    if !value.is_finite() {
        return Err(RapmError::diverged(
            reg_param,
            Stage::Evaluation,
            format!("held-out rmse is {value}"),
        ));
    }
    Ok(value)
}

pub fn predict(weights: &Weights, example: &Example) -> RapmResult<f64> {
    let w = weights.as_slice();
    check_dim(example, w.len())?;
    Ok(example.features.dot(w))
}

fn check_dim(example: &Example, dim: usize) -> RapmResult<()> {
    if example.features.dim() != dim {
        return Err(RapmError::DimensionMismatch {
            index: example.features.dim().saturating_sub(1),
            dim,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmse_matches_hand_computation() {
        let w = Weights::from(vec![1.0, 2.0]);
        let held_out = vec![
            Example::dense(&[1.0, 0.0], 2.0).unwrap(), // r = -1
            Example::dense(&[0.0, 1.0], 5.0).unwrap(), // r = -3
        ];
        let got = rmse(&w, &held_out, 0.0).unwrap();
        assert!((got - 5.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_held_out_is_an_error_not_zero() {
        let w = Weights::from(vec![1.0]);
        assert_eq!(rmse(&w, &[], 0.1), Err(RapmError::EmptyEvaluation));
    }

    #[test]
    fn non_finite_weights_surface_as_divergence() {
        let w = Weights::from(vec![f64::INFINITY]);
        let held_out = vec![Example::dense(&[1.0], 0.0).unwrap()];
        let err = rmse(&w, &held_out, 3.0).unwrap_err();
        assert!(matches!(
            err,
            RapmError::Diverged {
                stage: Stage::Evaluation,
                ..
            }
        ));
    }

    #[test]
    fn nan_label_in_held_out_is_invalid_input() {
        let w = Weights::from(vec![1.0]);
        let held_out = vec![Example::dense(&[1.0], f64::NAN).unwrap()];
        assert!(matches!(
            rmse(&w, &held_out, 0.0),
            Err(RapmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let w = Weights::from(vec![1.0, 1.0]);
        let ex = Example::dense(&[1.0, 1.0, 1.0], 0.0).unwrap();
        assert!(matches!(
            predict(&w, &ex),
            Err(RapmError::DimensionMismatch { .. })
        ));
    }
}
