//! Search-direction computation for one outer iteration.
//!
//! Both strategies approximately solve the Newton system `H p = -g` with sampled
//! Hessian-vector products, starting from the outer L-BFGS step.

use crate::OptimizerError;
use crate::config::{InnerSolveVariant, OptimizerConfig};
use crate::curvature::CurvatureStore;
use crate::objective::ObjectiveAdapter;
use ndarray::Array1;

/// Relative residual below which an inner solve stops early.
const RESIDUAL_TOLERANCE: f64 = 1e-10;

/// Direction produced by an inner solve, with its bookkeeping.
#[derive(Debug, Clone)]
pub struct SearchDirection {
    pub direction: Array1<f64>,
    pub iterations: usize,
    /// Inner L-BFGS updates that kept `w` a descent direction.
    pub accepted_updates: usize,
    /// Inner L-BFGS updates rejected by the cosine test.
    pub skipped_updates: usize,
    /// Conjugate gradient ended on an ascent direction and the warm start was used.
    pub fell_back: bool,
}

fn l2_norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

fn iteration_budget(fraction: f64, parts: usize, divisor: f64) -> usize {
    let budget = (fraction * parts as f64 / divisor).ceil();
    if budget.is_finite() && budget >= 1.0 {
        budget as usize
    } else {
        1
    }
}

/// Dispatches on `config.inner_solve`.
pub fn search_direction<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    x: &Array1<f64>,
    g: &Array1<f64>,
    store: &CurvatureStore,
    config: &OptimizerConfig,
) -> Result<SearchDirection, OptimizerError>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    match config.inner_solve {
        InnerSolveVariant::Cg => Ok(conjugate_gradient(adapter, x, g, store, config)),
        InnerSolveVariant::Lbfgs => stochastic_lbfgs(adapter, x, g, store, config),
    }
}

/// Conjugate gradient on `H p = -g` against the curvature of one sampled part,
/// warm-started from the outer L-BFGS step.
///
/// Runs `ceil(solve_fraction * parts)` iterations at most, stopping early on a
/// tiny residual or on a non-positive curvature direction. The result is used
/// as is unless it fails to be a descent direction, in which case the warm start
/// is returned and `fell_back` is set.
pub fn conjugate_gradient<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    x: &Array1<f64>,
    g: &Array1<f64>,
    store: &CurvatureStore,
    config: &OptimizerConfig,
) -> SearchDirection
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    let warm_start = store.lbfgs_direction(g);
    let max_iter = iteration_budget(config.solve_fraction, adapter.partition().parts(), 1.0);
    let tolerance = RESIDUAL_TOLERANCE * l2_norm(g);

    let mut hv = adapter.hessian_vector_product(x);
    let mut p = warm_start.clone();
    let mut r = -g - hv.apply(&p);
    let mut d = r.clone();
    let mut rr = r.dot(&r);
    let mut iterations = 0;

    while iterations < max_iter && rr.sqrt() > tolerance {
        let ad = hv.apply(&d);
        let dad = d.dot(&ad);
        if !(dad.is_finite() && dad > 0.0) {
            log::debug!(
                "[PHF Inner] CG hit non-positive curvature (dᵀHd = {:.3e}) after {} iterations.",
                dad,
                iterations
            );
            break;
        }
        let alpha = rr / dad;
        p.scaled_add(alpha, &d);
        r.scaled_add(-alpha, &ad);
        let rr_next = r.dot(&r);
        d = &r + &(d * (rr_next / rr));
        rr = rr_next;
        iterations += 1;
    }

    let slope = p.dot(g);
    let fell_back = !(slope.is_finite() && slope < 0.0);
    if fell_back {
        log::warn!(
            "[PHF Inner] CG produced a non-descent direction (gᵀp = {:.3e}); using the L-BFGS step.",
            slope
        );
    } else {
        log::debug!(
            "[PHF Inner] CG finished after {} iterations, residual {:.3e}.",
            iterations,
            rr.sqrt()
        );
    }
    SearchDirection {
        direction: if fell_back { warm_start } else { p },
        iterations,
        accepted_updates: 0,
        skipped_updates: 0,
        fell_back,
    }
}

/// Stochastic L-BFGS minimization of the local model `0.5 wᵀHw + gᵀw`.
///
/// Each of the at most `ceil(solve_fraction * parts / 2)` steps draws a new part
/// for its curvature sample, moves along the two-loop direction of the model
/// residual with a damped exact step, and feeds `(p, Hp)` and `(w, Hw)` to a
/// private copy of the outer curvature store. A step is kept only if `w` stays a
/// descent direction for the outer gradient; the last kept `w` (or the suffix
/// average, with `inner_solve_average`) is returned.
pub fn stochastic_lbfgs<F, G>(
    adapter: &mut ObjectiveAdapter<F, G>,
    x: &Array1<f64>,
    g: &Array1<f64>,
    store: &CurvatureStore,
    config: &OptimizerConfig,
) -> Result<SearchDirection, OptimizerError>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    let max_iter = iteration_budget(config.solve_fraction, adapter.partition().parts(), 2.0);
    let g_norm = l2_norm(g);
    let tolerance = RESIDUAL_TOLERANCE * g_norm;

    let mut private = store.clone();
    let mut w = store.lbfgs_direction(g);
    let mut average = Array1::zeros(w.len());
    let mut averaged = 0usize;
    let mut accepted_updates = 0;
    let mut skipped_updates = 0;
    let mut iterations = 0;

    for i in 0..max_iter {
        let mut hv = adapter.hessian_vector_product(x);
        let hw = hv.apply(&w);
        let r = &hw + g;
        if l2_norm(&r) <= tolerance {
            log::debug!("[PHF Inner] Model residual negligible after {} steps.", i);
            break;
        }

        let p = private.lbfgs_direction(&r);
        let hp = hv.apply(&p);
        let curvature = p.dot(&hp);
        if curvature.is_nan() || curvature <= 0.0 {
            log::error!(
                "[PHF Inner] Sampled curvature pᵀHp = {:.3e} on part {:?} is not positive.",
                curvature,
                hv.range()
            );
            return Err(OptimizerError::IndefiniteHessianSample { curvature });
        }

        let step = config.inner_solve_step_factor * (-r.dot(&p)) / curvature;
        let candidate = &w + &(&p * step);
        private.try_push(p, hp);
        if w.dot(&hw) > 0.0 {
            private.try_push(w.clone(), hw);
        }

        let cosine = candidate.dot(g) / (l2_norm(&candidate) * g_norm);
        if cosine < 0.0 {
            w = candidate;
            accepted_updates += 1;
        } else {
            log::debug!(
                "[PHF Inner] Step {} skipped: cos(w, g) = {:.3e} is not negative.",
                i,
                cosine
            );
            skipped_updates += 1;
        }

        if config.inner_solve_average && 2 * i > max_iter {
            average += &w;
            averaged += 1;
        }
        iterations += 1;
    }

    log::debug!(
        "[PHF Inner] L-BFGS inner solve: {} steps, {} accepted, {} skipped.",
        iterations,
        accepted_updates,
        skipped_updates
    );
    let direction = if averaged > 0 {
        average / averaged as f64
    } else {
        w
    };
    Ok(SearchDirection {
        direction,
        iterations,
        accepted_updates,
        skipped_updates,
        fell_back: false,
    })
}
