//! Range-evaluable objectives and the adapters that evaluate them on the full
//! dataset or on an adaptively grown subset of it.
//!
//! The user objective is evaluated over half-open index ranges `[start, end)` of
//! the dataset. Partial-range results must be scaled so that the results of the
//! parts of a [`Partition`] sum to the full-range result.

use crate::OptimizerError;
use crate::config::OptimizerConfig;
use crate::partition::Partition;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;

/// Subset fraction bounds within which the adaptive evaluator may stop growing.
const MIN_SUBSET_FRACTION: f64 = 0.05;
const MAX_SUBSET_FRACTION: f64 = 0.8;
/// Parts that must be included before the standard error is trusted.
const MIN_PARTS_FOR_ERROR: usize = 4;

/// Signature of an exact Gauss-Newton curvature product over a range:
/// `(point, direction, start, end) -> product`.
pub type GaussNewtonFn = fn(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>;

/// A user objective, tagged by the curvature information it can provide.
///
/// `F` maps `(point, start, end)` to `(loss, gradient)` over `[start, end)`.
/// `G` maps `(point, direction, start, end)` to the Gauss-Newton product over
/// the same range. Without `G`, curvature products are estimated by finite
/// differences of the gradient.
pub enum Objective<F, G = GaussNewtonFn> {
    GradientOnly(F),
    GradientAndCurvature { evaluate: F, gauss_newton: G },
}

impl<F> Objective<F, GaussNewtonFn>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
{
    pub fn gradient_only(evaluate: F) -> Self {
        Objective::GradientOnly(evaluate)
    }
}

impl<F, G> Objective<F, G>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    pub fn with_gauss_newton(evaluate: F, gauss_newton: G) -> Self {
        Objective::GradientAndCurvature {
            evaluate,
            gauss_newton,
        }
    }

    pub fn has_curvature(&self) -> bool {
        matches!(self, Objective::GradientAndCurvature { .. })
    }

    fn evaluate_range(&mut self, x: &Array1<f64>, range: Range<usize>) -> (f64, Array1<f64>) {
        match self {
            Objective::GradientOnly(evaluate)
            | Objective::GradientAndCurvature { evaluate, .. } => {
                evaluate(x, range.start, range.end)
            }
        }
    }
}

/// Loss and gradient of one part at the cached point.
#[derive(Debug, Clone)]
struct PartValue {
    loss: f64,
    gradient: Array1<f64>,
}

/// Running statistics of per-part gradients, used to decide when a subset is
/// large enough.
#[derive(Debug, Clone)]
pub struct SubsetStatistics {
    count: usize,
    sum: Array1<f64>,
    sum_sq_norm: f64,
}

impl SubsetStatistics {
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            sum: Array1::zeros(dim),
            sum_sq_norm: 0.0,
        }
    }

    pub fn push(&mut self, gradient: &Array1<f64>) {
        self.count += 1;
        self.sum += gradient;
        self.sum_sq_norm += gradient.dot(gradient);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Sample standard error of the mean part gradient relative to the norm of
    /// that mean, with the finite-population correction
    /// `sqrt((total - count) / (total - 1))`.
    ///
    /// Returns infinity while fewer than two gradients have been seen or when the
    /// mean vanishes but the spread does not.
    pub fn relative_error(&self, total_parts: usize) -> f64 {
        if self.count < 2 {
            return f64::INFINITY;
        }
        let k = self.count as f64;
        let mean = &self.sum / k;
        let mean_norm_sq = mean.dot(&mean);
        let spread = (self.sum_sq_norm - k * mean_norm_sq).max(0.0);
        let variance = spread / (k - 1.0);
        let standard_error = (variance / k).sqrt();
        let correction = if total_parts > 1 {
            let remaining = total_parts.saturating_sub(self.count) as f64;
            (remaining / (total_parts as f64 - 1.0)).sqrt()
        } else {
            0.0
        };
        let corrected = standard_error * correction;
        if corrected == 0.0 {
            return 0.0;
        }
        let mean_norm = mean_norm_sq.sqrt();
        if mean_norm > 0.0 {
            corrected / mean_norm
        } else {
            f64::INFINITY
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sampling {
    Full,
    Adaptive { included: usize, error_bound: f64 },
}

/// Evaluates a range objective part by part, caching per-part results at the
/// most recent point and counting every data point touched.
pub struct ObjectiveAdapter<F, G = GaussNewtonFn> {
    objective: Objective<F, G>,
    partition: Partition,
    sampling: Sampling,
    cache_point: Option<Array1<f64>>,
    cache: Vec<Option<PartValue>>,
    points_processed: usize,
    fd_eps: f64,
    rng: StdRng,
    calls: usize,
}

impl<F, G> ObjectiveAdapter<F, G>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    /// Full evaluator: every call sums over all parts.
    pub fn full(
        objective: Objective<F, G>,
        ndata: usize,
        config: &OptimizerConfig,
    ) -> Result<Self, OptimizerError> {
        Self::build(objective, ndata, config, Sampling::Full)
    }

    /// Adaptive evaluator: calls grow a prefix of the parts until the gradient
    /// estimate is accurate enough.
    pub fn adaptive(
        objective: Objective<F, G>,
        ndata: usize,
        config: &OptimizerConfig,
    ) -> Result<Self, OptimizerError> {
        let sampling = Sampling::Adaptive {
            included: 0,
            error_bound: config.grad_rel_error_bound,
        };
        Self::build(objective, ndata, config, sampling)
    }

    /// Picks the full or adaptive evaluator according to `config.subset_objective`.
    pub fn from_config(
        objective: Objective<F, G>,
        ndata: usize,
        config: &OptimizerConfig,
    ) -> Result<Self, OptimizerError> {
        if config.subset_objective {
            Self::adaptive(objective, ndata, config)
        } else {
            Self::full(objective, ndata, config)
        }
    }

    fn build(
        objective: Objective<F, G>,
        ndata: usize,
        config: &OptimizerConfig,
        sampling: Sampling,
    ) -> Result<Self, OptimizerError> {
        if ndata == 0 {
            return Err(OptimizerError::InvalidConfiguration(
                "the dataset size must be positive".to_string(),
            ));
        }
        config.validate()?;
        let partition = Partition::new(ndata, config.parts);
        let parts = partition.parts();
        Ok(Self {
            objective,
            partition,
            sampling,
            cache_point: None,
            cache: vec![None; parts],
            points_processed: 0,
            fd_eps: config.fd_eps,
            rng: StdRng::seed_from_u64(config.seed),
            calls: 0,
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn points_processed(&self) -> usize {
        self.points_processed
    }

    /// Parts in the active sample (all parts for the full evaluator).
    pub fn included_parts(&self) -> usize {
        match self.sampling {
            Sampling::Full => self.partition.parts(),
            Sampling::Adaptive { included, .. } => included,
        }
    }

    /// Loss and gradient at `x`, estimating full-dataset values.
    pub fn evaluate(&mut self, x: &Array1<f64>) -> (f64, Array1<f64>) {
        match self.sampling {
            Sampling::Full => {
                self.sync_point(x);
                self.sum_prefix(x, self.partition.parts())
            }
            Sampling::Adaptive { .. } => self.grow_subset(x, 0),
        }
    }

    /// Evaluation on the current sample without growing it, so that trial points
    /// of one line search are compared on the same data.
    pub fn evaluate_on_current_subset(&mut self, x: &Array1<f64>) -> (f64, Array1<f64>) {
        match self.sampling {
            Sampling::Full => self.evaluate(x),
            Sampling::Adaptive { included: 0, .. } => self.grow_subset(x, 0),
            Sampling::Adaptive { included, .. } => {
                self.sync_point(x);
                self.sum_prefix(x, included)
            }
        }
    }

    /// Lets the sample grow at an accepted point, reusing the parts already
    /// evaluated there. `None` for the full evaluator.
    pub fn expand(&mut self, x: &Array1<f64>) -> Option<(f64, Array1<f64>)> {
        match self.sampling {
            Sampling::Full => None,
            Sampling::Adaptive { included, .. } => Some(self.grow_subset(x, included)),
        }
    }

    /// Curvature operator on one randomly chosen part of the active sample.
    pub fn hessian_vector_product(&mut self, x: &Array1<f64>) -> HessianVectorProduct<'_, F, G> {
        let pool = self.included_parts().clamp(1, self.partition.parts());
        let part = self.rng.random_range(0..pool);
        self.hessian_vector_product_for_part(x, part)
    }

    /// Curvature operator `v -> scale * H_part v` with `scale = ndata / |part|`.
    ///
    /// Without a Gauss-Newton product the operator differences the part gradient
    /// against its cached value at `x`; the cached value is computed here if it
    /// is missing.
    pub fn hessian_vector_product_for_part(
        &mut self,
        x: &Array1<f64>,
        part: usize,
    ) -> HessianVectorProduct<'_, F, G> {
        let range = self.partition.range(part);
        let scale = self.partition.ndata() as f64 / range.len() as f64;
        let (eps, base_gradient) = if self.objective.has_curvature() {
            (0.0, Array1::zeros(0))
        } else {
            self.sync_point(x);
            let base = self.part_value(x, part).gradient.clone();
            let g_inf = base.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            let eps = g_inf * self.fd_eps;
            let eps = if eps.is_finite() && eps > 0.0 {
                eps
            } else {
                self.fd_eps
            };
            (eps, base)
        };
        HessianVectorProduct {
            adapter: self,
            point: x.clone(),
            range,
            scale,
            eps,
            base_gradient,
        }
    }

    fn sync_point(&mut self, x: &Array1<f64>) {
        let same = self.cache_point.as_ref().is_some_and(|c| c == x);
        if !same {
            self.cache.iter_mut().for_each(|slot| *slot = None);
            self.cache_point = Some(x.clone());
        }
    }

    fn part_value(&mut self, x: &Array1<f64>, part: usize) -> &PartValue {
        let range = self.partition.range(part);
        let objective = &mut self.objective;
        let counter = &mut self.points_processed;
        self.cache[part].get_or_insert_with(|| {
            *counter += range.len();
            let (loss, gradient) = objective.evaluate_range(x, range);
            PartValue { loss, gradient }
        })
    }

    fn sum_prefix(&mut self, x: &Array1<f64>, count: usize) -> (f64, Array1<f64>) {
        let mut loss = 0.0;
        let mut gradient = Array1::zeros(x.len());
        for part in 0..count {
            let value = self.part_value(x, part);
            loss += value.loss;
            gradient += &value.gradient;
        }
        let points = self.partition.points_in_first(count);
        let scale = self.partition.ndata() as f64 / points as f64;
        (loss * scale, gradient * scale)
    }

    fn grow_subset(&mut self, x: &Array1<f64>, start: usize) -> (f64, Array1<f64>) {
        let error_bound = match self.sampling {
            Sampling::Adaptive { error_bound, .. } => error_bound,
            Sampling::Full => 0.0,
        };
        self.sync_point(x);
        let total = self.partition.parts();
        let start = start.min(total);
        let mut stats = SubsetStatistics::new(x.len());
        for part in 0..start {
            stats.push(&self.part_value(x, part).gradient);
        }

        let mut included = start;
        let mut rel_error = stats.relative_error(total);
        while included < total {
            let fraction = included as f64 / total as f64;
            let fraction_ok = (MIN_SUBSET_FRACTION..=MAX_SUBSET_FRACTION).contains(&fraction);
            if included >= MIN_PARTS_FOR_ERROR && fraction_ok && rel_error < error_bound {
                break;
            }
            stats.push(&self.part_value(x, included).gradient);
            included += 1;
            rel_error = stats.relative_error(total);
        }

        if let Sampling::Adaptive {
            included: ref mut current,
            ..
        } = self.sampling
        {
            *current = included;
        }
        let (loss, gradient) = self.sum_prefix(x, included);
        self.calls += 1;
        log::info!(
            "[PHF Subset] call {}: {}/{} parts (fraction {:.3}), rel. error {:.3e}, loss {:.6e}, ||g|| {:.3e}",
            self.calls,
            included,
            total,
            included as f64 / total as f64,
            rel_error,
            loss,
            gradient.dot(&gradient).sqrt()
        );
        (loss, gradient)
    }
}

/// Hessian-vector product restricted to one data part, rescaled to the full
/// dataset.
pub struct HessianVectorProduct<'a, F, G> {
    adapter: &'a mut ObjectiveAdapter<F, G>,
    point: Array1<f64>,
    range: Range<usize>,
    scale: f64,
    eps: f64,
    base_gradient: Array1<f64>,
}

impl<F, G> HessianVectorProduct<'_, F, G>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    /// Index range of the sampled part.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn apply(&mut self, v: &Array1<f64>) -> Array1<f64> {
        let (start, end) = (self.range.start, self.range.end);
        let hv = match &mut self.adapter.objective {
            Objective::GradientAndCurvature { gauss_newton, .. } => {
                self.adapter.points_processed += end - start;
                gauss_newton(&self.point, v, start, end)
            }
            Objective::GradientOnly(evaluate) => {
                // Difference along v / ||v||_inf so the shift stays eps-sized.
                let v_inf = v.iter().fold(0.0f64, |m, c| m.max(c.abs()));
                if v_inf == 0.0 {
                    return Array1::zeros(v.len());
                }
                self.adapter.points_processed += end - start;
                let shifted = &self.point + &(v * (self.eps / v_inf));
                let (_, gradient) = evaluate(&shifted, start, end);
                (gradient - &self.base_gradient) * (v_inf / self.eps)
            }
        };
        hv * self.scale
    }
}
