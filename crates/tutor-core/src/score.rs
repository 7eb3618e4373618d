use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Expected effort for a question, as authored alongside the target mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub expected_actions: u32,
    pub expected_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ScoreError {
    #[error("degenerate {factor} ratio: expected={expected}, actual={actual}")]
    Degenerate {
        factor: &'static str,
        expected: f64,
        actual: f64,
    },
}

/// `expected / actual`, capped to `0.0..=1.0`.
///
/// Zero, negative or non-finite inputs have no meaningful efficiency and are
/// reported as [`ScoreError::Degenerate`].
pub fn efficiency_ratio(
    factor: &'static str,
    expected: f64,
    actual: f64,
) -> Result<f64, ScoreError> {
    let degenerate = !expected.is_finite() || !actual.is_finite() || expected <= 0.0 || actual <= 0.0;
    if degenerate {
        return Err(ScoreError::Degenerate {
            factor,
            expected,
            actual,
        });
    }
    Ok((expected / actual).clamp(0.0, 1.0))
}

/// Product of the action and time efficiency ratios, scaled to 100.
pub fn score(
    expected_actions: u32,
    actual_actions: u32,
    expected_seconds: f64,
    actual_seconds: f64,
) -> Result<f64, ScoreError> {
    let actions = efficiency_ratio("actions", expected_actions as f64, actual_actions as f64)?;
    let time = efficiency_ratio("time", expected_seconds, actual_seconds)?;
    Ok(100.0 * actions * time)
}

/// Like [`score`], but a degenerate factor counts as fully efficient (1.0).
///
/// This is the variant used when reporting to the collector, which must never
/// receive NaN or infinity.
pub fn score_clamped(baseline: &Baseline, actual_actions: u32, actual_seconds: f64) -> f64 {
    let actions = clamp_degenerate(efficiency_ratio(
        "actions",
        baseline.expected_actions as f64,
        actual_actions as f64,
    ));
    let time = clamp_degenerate(efficiency_ratio(
        "time",
        baseline.expected_seconds,
        actual_seconds,
    ));
    100.0 * actions * time
}

fn clamp_degenerate(ratio: Result<f64, ScoreError>) -> f64 {
    match ratio {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "clamping degenerate score factor to 1.0");
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Baseline, ScoreError, efficiency_ratio, score, score_clamped};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn matching_baseline_scores_100() {
        assert_approx(score(10, 10, 60.0, 60.0).expect("valid inputs"), 100.0);
    }

    #[test]
    fn doubling_actions_halves_the_score() {
        assert_approx(score(10, 20, 60.0, 60.0).expect("valid inputs"), 50.0);
    }

    #[test]
    fn both_factors_multiply() {
        assert_approx(score(10, 20, 60.0, 120.0).expect("valid inputs"), 25.0);
    }

    #[test]
    fn beating_the_baseline_is_capped_at_100() {
        assert_approx(score(10, 5, 60.0, 30.0).expect("valid inputs"), 100.0);
    }

    #[test]
    fn zero_actual_values_are_degenerate() {
        assert!(matches!(
            score(10, 0, 60.0, 60.0),
            Err(ScoreError::Degenerate {
                factor: "actions",
                ..
            })
        ));
        assert!(matches!(
            score(10, 10, 60.0, 0.0),
            Err(ScoreError::Degenerate { factor: "time", .. })
        ));
        assert!(efficiency_ratio("time", 60.0, f64::NAN).is_err());
        assert!(efficiency_ratio("time", 0.0, 10.0).is_err());
    }

    #[test]
    fn clamped_score_treats_degenerate_factor_as_one() {
        let baseline = Baseline {
            expected_actions: 0,
            expected_seconds: 60.0,
        };
        let value = score_clamped(&baseline, 12, 120.0);
        assert_approx(value, 50.0);
        assert!(value.is_finite());

        let baseline = Baseline {
            expected_actions: 10,
            expected_seconds: 60.0,
        };
        assert_approx(score_clamped(&baseline, 0, 0.0), 100.0);
    }
}
