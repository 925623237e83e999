//! Wolfe line searches along a fixed search direction.
//!
//! Trial points are evaluated on the evaluator's current sample only, so every
//! trial of one search sees the same data. Once a step is accepted, an adaptive
//! evaluator is given one chance to grow its sample at the new point.

use crate::OptimizerError;
use crate::config::{InterpolationMethod, LineSearchKind, OptimizerConfig};
use crate::objective::ObjectiveAdapter;
use ndarray::Array1;

/// Armijo sufficient-decrease constant.
pub const C1: f64 = 1e-4;
/// Curvature constant for both the weak and the strong Wolfe condition.
pub const C2: f64 = 0.9;

/// Bracket width below which zoom gives up.
const MIN_BRACKET_WIDTH: f64 = 1e-12;
const GROWTH_FACTOR: f64 = 1.5;

/// Accepted step with the loss and gradient at the new point.
#[derive(Debug, Clone)]
pub struct LineSearchOutcome {
    pub step: f64,
    pub point: Array1<f64>,
    pub loss: f64,
    pub gradient: Array1<f64>,
    pub trials: usize,
    /// The trial budget ran out and the best Armijo point was returned instead.
    pub exhausted: bool,
}

/// Step length with the function value and directional derivative there.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub step: f64,
    pub value: f64,
    pub slope: f64,
}

struct Trial {
    step: f64,
    point: Array1<f64>,
    loss: f64,
    gradient: Array1<f64>,
}

/// Runs the search selected by `config.line_search`.
pub fn line_search<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    x: &Array1<f64>,
    f0: f64,
    g0: &Array1<f64>,
    direction: &Array1<f64>,
    config: &OptimizerConfig,
) -> Result<LineSearchOutcome, OptimizerError>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    match config.line_search {
        LineSearchKind::WeakWolfe => weak_wolfe(adapter, x, f0, g0, direction, config),
        LineSearchKind::StrongWolfe => strong_wolfe(adapter, x, f0, g0, direction, config),
    }
}

fn descent_slope(g0: &Array1<f64>, direction: &Array1<f64>) -> Result<f64, OptimizerError> {
    let slope = g0.dot(direction);
    if slope.is_finite() && slope < 0.0 {
        Ok(slope)
    } else {
        log::warn!(
            "[PHF Wolfe] Non-descent direction detected (gᵀd = {:.2e} >= 0).",
            slope
        );
        Err(OptimizerError::NotDescentDirection { slope })
    }
}

fn evaluate_trial<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    x: &Array1<f64>,
    direction: &Array1<f64>,
    step: f64,
) -> Trial
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    let point = x + &(direction * step);
    let (loss, gradient) = adapter.evaluate_on_current_subset(&point);
    Trial {
        step,
        point,
        loss,
        gradient,
    }
}

fn is_finite_trial(trial: &Trial) -> bool {
    trial.loss.is_finite() && trial.gradient.iter().all(|v| v.is_finite())
}

/// Lets an adaptive evaluator grow its sample at the accepted point.
fn accept<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    trial: Trial,
    trials: usize,
    exhausted: bool,
) -> LineSearchOutcome
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    let (loss, gradient) = match adapter.expand(&trial.point) {
        Some(expanded) => expanded,
        None => (trial.loss, trial.gradient),
    };
    LineSearchOutcome {
        step: trial.step,
        point: trial.point,
        loss,
        gradient,
        trials,
        exhausted,
    }
}

/// Next trial step inside the bracket spanned by `a` and `b` (in either order).
///
/// Falls back to bisection when the derivatives do not enclose a minimizer or
/// the fit is not finite, and clamps the result to `[lo + 0.01 w, lo + 0.9 w]`
/// where `lo` is the smaller step and `w` the bracket width.
pub fn interpolate(method: InterpolationMethod, a: &Endpoint, b: &Endpoint) -> f64 {
    let (left, right) = if a.step <= b.step { (a, b) } else { (b, a) };
    let width = right.step - left.step;
    let bisection = left.step + 0.5 * width;
    let enclosed = left.slope <= 0.0 && right.slope >= 0.0;
    let trial = match method {
        InterpolationMethod::Bisect => bisection,
        _ if !enclosed => bisection,
        InterpolationMethod::Taylor => {
            (right.value - left.value - right.slope * right.step + left.slope * left.step)
                / (left.slope - right.slope)
        }
        InterpolationMethod::Cubic => {
            let d1 = left.slope + right.slope
                - 3.0 * (left.value - right.value) / (left.step - right.step);
            let d2 = (d1 * d1 - left.slope * right.slope).sqrt();
            right.step - width * (right.slope + d2 - d1) / (right.slope - left.slope + 2.0 * d2)
        }
    };
    let trial = if trial.is_finite() { trial } else { bisection };
    trial.clamp(left.step + 0.01 * width, left.step + 0.9 * width)
}

/// Bracketing search on the weak Wolfe conditions.
///
/// The bracket `[left, right)` starts as `[0, inf)`. A trial failing Armijo
/// becomes the right edge; a trial passing Armijo but failing the curvature
/// condition (when `use_wolfe` is set) becomes the left edge. While the right
/// edge is infinite the step doubles, afterwards it is interpolated.
///
/// When the trial budget runs out, the largest step that passed Armijo is
/// returned with `exhausted` set; without one the search fails.
pub fn weak_wolfe<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    x: &Array1<f64>,
    f0: f64,
    g0: &Array1<f64>,
    direction: &Array1<f64>,
    config: &OptimizerConfig,
) -> Result<LineSearchOutcome, OptimizerError>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    let slope0 = descent_slope(g0, direction)?;
    let mut left = Endpoint {
        step: 0.0,
        value: f0,
        slope: slope0,
    };
    let mut right = Endpoint {
        step: f64::INFINITY,
        value: f64::INFINITY,
        slope: f64::NAN,
    };
    let mut best: Option<Trial> = None;
    let mut step = config.initial_line_search_step;

    for trials in 1..=config.max_line_search_iter {
        let trial = evaluate_trial(adapter, x, direction, step);
        if !is_finite_trial(&trial) {
            log::debug!(
                "[PHF Wolfe] Trial {}: non-finite loss at t = {:.3e}, halving.",
                trials,
                step
            );
            right = Endpoint {
                step,
                value: f64::INFINITY,
                slope: f64::NAN,
            };
            step = left.step + 0.5 * (step - left.step);
            continue;
        }

        let slope = trial.gradient.dot(direction);
        let current = Endpoint {
            step,
            value: trial.loss,
            slope,
        };
        if trial.loss > f0 + C1 * step * slope0 {
            log::debug!(
                "[PHF Wolfe] Trial {}: t = {:.3e} fails Armijo (f = {:.6e}).",
                trials,
                step,
                trial.loss
            );
            right = current;
        } else if config.use_wolfe && slope < C2 * slope0 {
            log::debug!(
                "[PHF Wolfe] Trial {}: t = {:.3e} fails curvature (gᵀd = {:.3e}).",
                trials,
                step,
                slope
            );
            left = current;
            best = Some(trial);
        } else {
            log::debug!("[PHF Wolfe] Accepted t = {:.3e} after {} trials.", step, trials);
            return Ok(accept(adapter, trial, trials, false));
        }

        step = if right.step.is_finite() {
            interpolate(config.ls_interp_method, &left, &right)
        } else {
            2.0 * step
        };
    }

    match best {
        Some(trial) => {
            log::warn!(
                "[PHF Wolfe] Trial budget of {} exhausted; returning best Armijo step t = {:.3e}.",
                config.max_line_search_iter,
                trial.step
            );
            Ok(accept(adapter, trial, config.max_line_search_iter, true))
        }
        None => Err(OptimizerError::LineSearchFailed {
            trials: config.max_line_search_iter,
        }),
    }
}

/// Strong Wolfe search with zoom (Nocedal & Wright, Algorithms 3.5 and 3.6).
///
/// The step grows by a factor 1.5 until a bracket is found, then zoom
/// interpolates inside it. Both phases share the `max_line_search_iter` trial
/// budget; running out of it is fatal.
pub fn strong_wolfe<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    x: &Array1<f64>,
    f0: f64,
    g0: &Array1<f64>,
    direction: &Array1<f64>,
    config: &OptimizerConfig,
) -> Result<LineSearchOutcome, OptimizerError>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    let slope0 = descent_slope(g0, direction)?;
    let max_trials = config.max_line_search_iter;
    let mut previous = Endpoint {
        step: 0.0,
        value: f0,
        slope: slope0,
    };
    let mut step = config.initial_line_search_step;
    let mut trials = 0;

    while trials < max_trials {
        let trial = evaluate_trial(adapter, x, direction, step);
        trials += 1;
        if !is_finite_trial(&trial) {
            log::debug!(
                "[PHF Wolfe] Non-finite loss at t = {:.3e}, halving.",
                step
            );
            step = previous.step + 0.5 * (step - previous.step);
            continue;
        }

        let current = Endpoint {
            step,
            value: trial.loss,
            slope: trial.gradient.dot(direction),
        };
        let armijo_fails = current.value > f0 + C1 * step * slope0;
        if armijo_fails || (trials > 1 && current.value >= previous.value) {
            return zoom(adapter, x, f0, slope0, direction, previous, current, trials, config);
        }
        if current.slope.abs() <= -C2 * slope0 {
            log::debug!("[PHF Wolfe] Strong Wolfe satisfied at t = {:.3e}.", step);
            return Ok(accept(adapter, trial, trials, false));
        }
        if current.slope >= 0.0 {
            return zoom(adapter, x, f0, slope0, direction, current, previous, trials, config);
        }
        previous = current;
        step *= GROWTH_FACTOR;
    }

    log::warn!(
        "[PHF Wolfe] No bracket found within {} trials.",
        max_trials
    );
    Err(OptimizerError::LineSearchFailed { trials })
}

#[allow(clippy::too_many_arguments)]
fn zoom<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    x: &Array1<f64>,
    f0: f64,
    slope0: f64,
    direction: &Array1<f64>,
    mut lo: Endpoint,
    mut hi: Endpoint,
    mut trials: usize,
    config: &OptimizerConfig,
) -> Result<LineSearchOutcome, OptimizerError>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    let method = match config.ls_interp_method {
        InterpolationMethod::Cubic => InterpolationMethod::Cubic,
        InterpolationMethod::Bisect | InterpolationMethod::Taylor => InterpolationMethod::Bisect,
    };

    while trials < config.max_line_search_iter {
        if (hi.step - lo.step).abs() < MIN_BRACKET_WIDTH {
            log::warn!(
                "[PHF Zoom] Bracket collapsed around t = {:.3e}.",
                lo.step
            );
            break;
        }
        let step = interpolate(method, &lo, &hi);
        let trial = evaluate_trial(adapter, x, direction, step);
        trials += 1;
        if !is_finite_trial(&trial) {
            log::debug!("[PHF Zoom] Non-finite loss at t = {:.3e}, shrinking.", step);
            hi = Endpoint {
                step,
                value: f64::INFINITY,
                slope: f64::NAN,
            };
            continue;
        }

        let current = Endpoint {
            step,
            value: trial.loss,
            slope: trial.gradient.dot(direction),
        };
        if current.value > f0 + C1 * step * slope0 || current.value >= lo.value {
            hi = current;
            continue;
        }
        if current.slope.abs() <= -C2 * slope0 {
            log::debug!(
                "[PHF Zoom] Strong Wolfe satisfied at t = {:.3e} after {} trials.",
                step,
                trials
            );
            return Ok(accept(adapter, trial, trials, false));
        }
        if current.slope * (hi.step - lo.step) >= 0.0 {
            hi = lo;
        }
        lo = current;
    }

    Err(OptimizerError::LineSearchFailed { trials })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{GaussNewtonFn, Objective};
    use ndarray::array;
    use spectral::prelude::*;

    const NDATA: usize = 100;

    type RangeFn = Box<dyn FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>)>;

    /// `0.5 ||x - b||^2`, split evenly over the records.
    fn quadratic(b: Array1<f64>) -> RangeFn {
        Box::new(move |x: &Array1<f64>, s: usize, e: usize| {
            let w = (e - s) as f64 / NDATA as f64;
            let r = x - &b;
            (0.5 * w * r.dot(&r), r * w)
        })
    }

    /// `0.5 (x - t_i)^2` per record in one dimension. The target is constant
    /// within each part of ten records and cycles through 0.8, 1.0, 1.2, 0.9, 1.1
    /// from part to part.
    fn part_varying_targets() -> RangeFn {
        Box::new(|x: &Array1<f64>, s: usize, e: usize| {
            let mut loss = 0.0;
            let mut grad = Array1::zeros(x.len());
            for i in s..e {
                let target = 0.8 + 0.1 * ((7 * (i / 10)) % 5) as f64;
                let r = x[0] - target;
                loss += 0.5 * r * r / NDATA as f64;
                grad[0] += r / NDATA as f64;
            }
            (loss, grad)
        })
    }

    fn full_adapter(
        objective: RangeFn,
        config: &OptimizerConfig,
    ) -> ObjectiveAdapter<RangeFn, GaussNewtonFn> {
        ObjectiveAdapter::full(Objective::gradient_only(objective), NDATA, config).unwrap()
    }

    fn full_config() -> OptimizerConfig {
        OptimizerConfig {
            parts: 10,
            subset_objective: false,
            ..OptimizerConfig::default()
        }
    }

    fn start() -> (Array1<f64>, f64, Array1<f64>) {
        let x = array![0.0, 0.0];
        let b = array![1.0, 2.0];
        let f0 = 0.5 * b.dot(&b);
        (x, f0, -b)
    }

    fn armijo_holds(
        outcome: &LineSearchOutcome,
        f0: f64,
        g0: &Array1<f64>,
        d: &Array1<f64>,
    ) -> bool {
        outcome.loss <= f0 + C1 * outcome.step * g0.dot(d)
    }

    #[test]
    fn cubic_interpolation_finds_quadratic_minimizer() {
        // phi(t) = (t - 0.3)^2 sampled at t = 0 and t = 1.
        let a = Endpoint {
            step: 0.0,
            value: 0.09,
            slope: -0.6,
        };
        let b = Endpoint {
            step: 1.0,
            value: 0.49,
            slope: 1.4,
        };
        assert_that!(&interpolate(InterpolationMethod::Cubic, &a, &b)).is_close_to(0.3, 1e-12);
        assert_that!(&interpolate(InterpolationMethod::Cubic, &b, &a)).is_close_to(0.3, 1e-12);
        assert_that!(&interpolate(InterpolationMethod::Taylor, &a, &b)).is_close_to(0.5, 1e-12);
        assert_that!(&interpolate(InterpolationMethod::Bisect, &a, &b)).is_close_to(0.5, 1e-12);
    }

    #[test]
    fn interpolation_is_clamped_and_bisects_without_enclosure() {
        // Both slopes negative: no minimizer enclosed, bisect.
        let a = Endpoint {
            step: 2.0,
            value: 1.0,
            slope: -1.0,
        };
        let b = Endpoint {
            step: 4.0,
            value: 2.0,
            slope: -0.5,
        };
        assert_that!(&interpolate(InterpolationMethod::Cubic, &a, &b)).is_close_to(3.0, 1e-12);

        // Minimizer extremely close to the left edge is pushed inside.
        let a = Endpoint {
            step: 0.0,
            value: 0.0,
            slope: -1e-9,
        };
        let b = Endpoint {
            step: 1.0,
            value: 1.0,
            slope: 2.0,
        };
        let t = interpolate(InterpolationMethod::Cubic, &a, &b);
        assert_that!(&t).is_close_to(0.01, 1e-12);

        let inf = Endpoint {
            step: 1.0,
            value: f64::INFINITY,
            slope: f64::NAN,
        };
        let t = interpolate(InterpolationMethod::Cubic, &a, &inf);
        assert_that!(&t).is_close_to(0.5, 1e-12);
    }

    #[test]
    fn weak_wolfe_accepts_unit_newton_step() {
        let config = full_config();
        let (x, f0, g0) = start();
        let d = -&g0;
        let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
        let outcome = weak_wolfe(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
        assert_that!(&outcome.step).is_close_to(1.0, 1e-15);
        assert_eq!(outcome.trials, 1);
        assert!(!outcome.exhausted);
        assert_that!(&outcome.loss).is_close_to(0.0, 1e-12);
    }

    #[test]
    fn weak_wolfe_shrinks_overlong_steps() {
        let config = full_config();
        let (x, f0, g0) = start();
        let d = &g0 * -10.0;
        let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
        let outcome = weak_wolfe(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
        assert!(outcome.step < 1.0);
        assert!(armijo_holds(&outcome, f0, &g0, &d));
    }

    #[test]
    fn weak_wolfe_extends_short_steps() {
        let config = full_config();
        let (x, f0, g0) = start();
        let d = &g0 * -0.01;
        let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
        let outcome = weak_wolfe(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
        assert!(outcome.step > 1.0);
        assert!(armijo_holds(&outcome, f0, &g0, &d));
        assert!(outcome.gradient.dot(&d) >= C2 * g0.dot(&d));
    }

    #[test]
    fn armijo_holds_for_every_interpolation_method() {
        for method in [
            InterpolationMethod::Bisect,
            InterpolationMethod::Taylor,
            InterpolationMethod::Cubic,
        ] {
            let config = OptimizerConfig {
                ls_interp_method: method,
                ..full_config()
            };
            let (x, f0, g0) = start();
            for scale in [0.3, 1.7, 25.0] {
                let d = &g0 * -scale;
                let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
                let outcome = weak_wolfe(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
                assert!(
                    armijo_holds(&outcome, f0, &g0, &d),
                    "Armijo violated for {method} at scale {scale}"
                );
            }
        }
    }

    #[test]
    fn weak_wolfe_halves_on_non_finite_values() {
        let config = full_config();
        let (x, f0, g0) = start();
        let d = &g0 * -4.0;
        let mut inner = quadratic(array![1.0, 2.0]);
        let guarded: RangeFn = Box::new(move |x: &Array1<f64>, s: usize, e: usize| {
            if x.dot(x) > 16.0 {
                (f64::INFINITY, Array1::from_elem(x.len(), f64::NAN))
            } else {
                inner(x, s, e)
            }
        });
        let mut adapter = full_adapter(guarded, &config);
        let outcome = weak_wolfe(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
        assert!(outcome.loss.is_finite());
        assert!(armijo_holds(&outcome, f0, &g0, &d));
    }

    #[test]
    fn weak_wolfe_returns_best_armijo_point_when_exhausted() {
        let config = OptimizerConfig {
            max_line_search_iter: 1,
            ..full_config()
        };
        let (x, f0, g0) = start();
        let d = &g0 * -0.001;
        let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
        let outcome = weak_wolfe(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
        assert!(outcome.exhausted);
        assert_that!(&outcome.step).is_close_to(1.0, 1e-15);
        assert!(armijo_holds(&outcome, f0, &g0, &d));
    }

    #[test]
    fn weak_wolfe_fails_without_any_armijo_point() {
        let config = full_config();
        let (x, f0, g0) = start();
        let d = -&g0;
        let nowhere_finite: RangeFn =
            Box::new(|x: &Array1<f64>, s: usize, e: usize| ((e - s) as f64 * f64::NAN, x.clone()));
        let mut adapter = full_adapter(nowhere_finite, &config);
        let result = weak_wolfe(&mut adapter, &x, f0, &g0, &d, &config);
        assert!(matches!(result, Err(OptimizerError::LineSearchFailed { trials: 8 })));
    }

    #[test]
    fn adaptive_subset_is_fixed_during_trials_and_grows_on_acceptance() {
        let config = OptimizerConfig {
            parts: 10,
            initial_line_search_step: 3.0,
            ..OptimizerConfig::default()
        };
        let mut adapter = ObjectiveAdapter::adaptive(
            Objective::gradient_only(part_varying_targets()),
            NDATA,
            &config,
        )
        .unwrap();
        let x = array![0.0];
        let (f0, g0) = adapter.evaluate(&x);
        assert_eq!(adapter.included_parts(), 4);
        assert_eq!(adapter.points_processed(), 40);
        assert_that!(&g0[0]).is_close_to(-0.975, 1e-12);

        let d = -&g0;
        let outcome = weak_wolfe(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
        // t = 3 overshoots; the cubic fit then lands on the minimizer of the
        // four-part estimate at t = 1.
        assert_eq!(outcome.trials, 2);
        assert_that!(&outcome.step).is_close_to(1.0, 1e-9);
        // Both trials ran on the same four parts. The accepted point added only
        // the six parts not yet cached there.
        assert_eq!(adapter.points_processed(), 40 + 2 * 40 + 6 * 10);
        assert_eq!(adapter.included_parts(), 10);
        assert_that!(&outcome.gradient[0]).is_close_to(-0.025, 1e-9);
    }

    #[test]
    fn non_descent_direction_is_rejected_without_evaluation() {
        let config = full_config();
        let (x, f0, g0) = start();
        let uphill = g0.clone();
        let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
        let weak = weak_wolfe(&mut adapter, &x, f0, &g0, &uphill, &config);
        assert!(matches!(weak, Err(OptimizerError::NotDescentDirection { slope }) if slope > 0.0));
        let strong = strong_wolfe(&mut adapter, &x, f0, &g0, &uphill, &config);
        assert!(matches!(strong, Err(OptimizerError::NotDescentDirection { .. })));
        assert_eq!(adapter.points_processed(), 0);
    }

    #[test]
    fn strong_wolfe_grows_until_curvature_holds() {
        let config = OptimizerConfig {
            line_search: LineSearchKind::StrongWolfe,
            ..full_config()
        };
        let (x, f0, g0) = start();
        let d = &g0 * -0.05;
        let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
        let outcome = line_search(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
        assert_that!(&outcome.step).is_close_to(2.25, 1e-12);
        assert_eq!(outcome.trials, 3);
        assert!(armijo_holds(&outcome, f0, &g0, &d));
        assert!(outcome.gradient.dot(&d).abs() <= -C2 * g0.dot(&d));
    }

    #[test]
    fn strong_wolfe_zooms_into_overshooting_bracket() {
        let config = OptimizerConfig {
            line_search: LineSearchKind::StrongWolfe,
            ..full_config()
        };
        let (x, f0, g0) = start();
        let d = &g0 * -8.0;
        let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
        let outcome = strong_wolfe(&mut adapter, &x, f0, &g0, &d, &config).unwrap();
        assert!(outcome.step < 1.0);
        assert!(armijo_holds(&outcome, f0, &g0, &d));
        assert!(outcome.gradient.dot(&d).abs() <= -C2 * g0.dot(&d));
    }

    #[test]
    fn strong_wolfe_exhaustion_is_fatal() {
        let config = OptimizerConfig {
            max_line_search_iter: 2,
            ..full_config()
        };
        let (x, f0, g0) = start();
        let d = &g0 * -0.001;
        let mut adapter = full_adapter(quadratic(array![1.0, 2.0]), &config);
        let result = strong_wolfe(&mut adapter, &x, f0, &g0, &d, &config);
        assert!(matches!(result, Err(OptimizerError::LineSearchFailed { trials: 2 })));
    }
}
