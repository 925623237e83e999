//! Subsampled Hessian-free quasi-Newton optimization for finite-sum objectives.
//!
//! The objective is a sum over `ndata` records that the caller can evaluate over
//! any index range `[start, end)`. Each outer iteration
//!
//! 1. computes a search direction by approximately solving the Newton system with
//!    Hessian-vector products sampled from one part of the data (conjugate
//!    gradient, or a stochastic L-BFGS inner loop),
//! 2. runs a Wolfe line search along it, evaluating trial points on a fixed
//!    sample of the data,
//! 3. stores the secant pair of the step in a bounded L-BFGS memory.
//!
//! With the adaptive evaluator (the default) the objective and gradient are
//! estimated on a prefix of the data parts that grows until the standard error of
//! the gradient estimate is small relative to its norm.
//!
//! # Features
//! - Exact Gauss-Newton curvature products when the objective provides them,
//!   finite-difference products of the gradient otherwise.
//! - Weak-Wolfe bracketing search (bisection, Taylor or cubic interpolation) and a
//!   strong-Wolfe search with zoom.
//! - Recoverable degeneracies are reported as [`Warning`]s on the [`Solution`];
//!   only unrecoverable ones are [`OptimizerError`]s.
//! - Every data point touched is counted, so runs can be compared in effective
//!   passes over the data.
//!
//! # Example
//!
//! Least squares where even records target the first coordinate and odd records the second.
//!
//! ```
//! use ndarray::{Array1, array};
//! use subsampled_hf::{Objective, Optimizer, OptimizerConfig};
//!
//! let targets = array![1.0, -3.0];
//! let ndata: usize = 1000;
//! let evaluate = move |x: &Array1<f64>, start: usize, end: usize| {
//!     let mut loss = 0.0;
//!     let mut grad = Array1::zeros(2);
//!     for i in start..end {
//!         let r = x[i % 2] - targets[i % 2];
//!         loss += 0.5 * r * r / ndata as f64;
//!         grad[i % 2] += r / ndata as f64;
//!     }
//!     (loss, grad)
//! };
//!
//! let solution = Optimizer::new(array![0.0, 0.0], ndata, Objective::gradient_only(evaluate))
//!     .with_tolerance(1e-6)
//!     .with_config(OptimizerConfig::newton_cg())
//!     .run()
//!     .expect("optimization failed");
//!
//! assert!(solution.converged);
//! assert!((solution.final_point[0] - 1.0).abs() < 1e-4);
//! assert!((solution.final_point[1] + 3.0).abs() < 1e-4);
//! println!(
//!     "f = {:.3e} after {} iterations ({:.1} passes over the data)",
//!     solution.final_value, solution.iterations, solution.effective_iterations
//! );
//! ```

pub mod config;
pub mod curvature;
pub mod inner_solve;
pub mod line_search;
pub mod objective;
pub mod partition;

pub use config::{InnerSolveVariant, InterpolationMethod, LineSearchKind, OptimizerConfig};
pub use curvature::{CurvaturePair, CurvatureStore};
pub use objective::{GaussNewtonFn, HessianVectorProduct, Objective, ObjectiveAdapter};
pub use partition::Partition;

use ndarray::Array1;
use std::fmt;

/// Unrecoverable failures of an optimization run.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    #[error("The objective is not finite at the starting point (f(x0) = {value}).")]
    InitialValueNotFinite { value: f64 },
    #[error(
        "The search direction is not a descent direction (gᵀd = {slope:.3e} >= 0); the line search cannot proceed."
    )]
    NotDescentDirection { slope: f64 },
    #[error(
        "The line search failed to find an acceptable step after {trials} trials. The objective may be badly scaled or non-smooth."
    )]
    LineSearchFailed { trials: usize },
    #[error(
        "A sampled Hessian is not positive definite (pᵀHp = {curvature:.3e}). For non-convex objectives supply an exact Gauss-Newton curvature product."
    )]
    IndefiniteHessianSample { curvature: f64 },
    #[error("Unsupported configuration: option '{key}' does not accept '{value}'.")]
    UnsupportedConfiguration { key: String, value: String },
    #[error("Invalid configuration: {0}.")]
    InvalidConfiguration(String),
    #[error(
        "The gradient norm was NaN or infinity at iteration {iteration}, indicating numerical instability."
    )]
    GradientIsNaN { iteration: usize },
}

/// A recoverable degeneracy met during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// `s·y <= 0` for the outer step; the pair was not stored.
    BadCurvature { iteration: usize, sy: f64 },
    /// The inner L-BFGS loop rejected every update and returned its start point.
    InnerSolveStalled { iteration: usize, skipped: usize },
    /// Conjugate gradient ended on an ascent direction; the L-BFGS step was used.
    ConjugateGradientFallback { iteration: usize },
    /// The weak-Wolfe trial budget ran out; the best Armijo step was taken.
    LineSearchExhausted { iteration: usize, step: f64 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::BadCurvature { iteration, sy } => {
                write!(f, "iteration {iteration}: bad curvature (sᵀy = {sy:.3e}), pair skipped")
            }
            Warning::InnerSolveStalled { iteration, skipped } => write!(
                f,
                "iteration {iteration}: inner solve rejected all {skipped} updates"
            ),
            Warning::ConjugateGradientFallback { iteration } => write!(
                f,
                "iteration {iteration}: CG direction was not descent, used the L-BFGS step"
            ),
            Warning::LineSearchExhausted { iteration, step } => write!(
                f,
                "iteration {iteration}: line search exhausted, took best Armijo step {step:.3e}"
            ),
        }
    }
}

/// A summary of a finished optimization run.
#[derive(Debug)]
pub struct Solution {
    /// The last accepted point.
    pub final_point: Array1<f64>,
    /// The (possibly subsampled) objective estimate at `final_point`.
    pub final_value: f64,
    pub final_gradient_norm: f64,
    /// The number of completed outer iterations.
    pub iterations: usize,
    /// Data points touched by evaluations and curvature products.
    pub points_processed: usize,
    /// `points_processed / ndata`.
    pub effective_iterations: f64,
    /// `false` when the iteration limit was reached first.
    pub converged: bool,
    pub warnings: Vec<Warning>,
}

/// Progress hook called with the point, loss, gradient and points processed so far,
/// once at the start and once after every iteration.
pub type Callback<'a> = Box<dyn FnMut(&Array1<f64>, f64, &Array1<f64>, usize) + 'a>;

/// A configurable subsampled Hessian-free optimizer.
pub struct Optimizer<'a, F, G = GaussNewtonFn> {
    x0: Array1<f64>,
    ndata: usize,
    objective: Objective<F, G>,
    tolerance: f64,
    max_iterations: usize,
    config: OptimizerConfig,
    callback: Option<Callback<'a>>,
}

fn l2_norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

impl<'a, F, G> Optimizer<'a, F, G>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    /// Creates an optimizer for a dataset of `ndata` records.
    ///
    /// # Arguments
    /// * `x0` - The starting point.
    /// * `ndata` - The number of records the objective sums over.
    /// * `objective` - The range-evaluable objective.
    pub fn new(x0: Array1<f64>, ndata: usize, objective: Objective<F, G>) -> Self {
        Self {
            x0,
            ndata,
            objective,
            tolerance: 1e-5,
            max_iterations: 100,
            config: OptimizerConfig::default(),
            callback: None,
        }
    }

    /// Sets the gradient-norm tolerance (default: 1e-5).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the maximum number of outer iterations (default: 100).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Replaces the whole configuration, seed included.
    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the seed of the part sampler (for reproducibility).
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Called as `callback(point, loss, gradient, points_processed)` after the
    /// initial evaluation and after every completed iteration.
    pub fn with_callback(
        mut self,
        callback: impl FnMut(&Array1<f64>, f64, &Array1<f64>, usize) + 'a,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Runs the optimization.
    pub fn run(self) -> Result<Solution, OptimizerError> {
        let Optimizer {
            x0,
            ndata,
            objective,
            tolerance,
            max_iterations,
            config,
            mut callback,
        } = self;
        config.validate()?;
        if x0.is_empty() {
            return Err(OptimizerError::InvalidConfiguration(
                "the starting point must not be empty".to_string(),
            ));
        }
        let mut adapter = ObjectiveAdapter::from_config(objective, ndata, &config)?;
        let mut store = CurvatureStore::new(config.lbfgs_memory);
        let mut warnings = Vec::new();
        let mut notify = |x: &Array1<f64>, f: f64, g: &Array1<f64>, points: usize| {
            if let Some(cb) = callback.as_mut() {
                cb(x, f, g, points);
            }
        };

        let mut x = x0;
        let (mut f, mut g) = adapter.evaluate(&x);
        if !f.is_finite() {
            log::error!("[PHF] Objective is not finite at the starting point (f = {f}).");
            return Err(OptimizerError::InitialValueNotFinite { value: f });
        }
        log::info!(
            "[PHF] Start: n = {}, ndata = {}, parts = {}, inner solve = {}, f = {:.6e}, ||g|| = {:.3e}",
            x.len(),
            ndata,
            adapter.partition().parts(),
            config.inner_solve,
            f,
            l2_norm(&g)
        );
        notify(&x, f, &g, adapter.points_processed());

        let mut iterations = 0;
        let mut converged = false;
        let mut g_norm = l2_norm(&g);
        loop {
            if !g_norm.is_finite() {
                log::warn!(
                    "[PHF] Non-finite gradient norm at iter {}: g_norm={:?}",
                    iterations,
                    g_norm
                );
                return Err(OptimizerError::GradientIsNaN {
                    iteration: iterations,
                });
            }
            if g_norm <= tolerance {
                converged = true;
                break;
            }
            if iterations >= max_iterations {
                break;
            }

            let direction =
                inner_solve::search_direction(&mut adapter, &x, &g, &store, &config)?;
            if direction.fell_back {
                warnings.push(Warning::ConjugateGradientFallback {
                    iteration: iterations,
                });
            }
            if direction.accepted_updates == 0 && direction.skipped_updates > 0 {
                log::warn!(
                    "[PHF] Inner solve accepted none of {} updates at iter {}.",
                    direction.skipped_updates,
                    iterations
                );
                warnings.push(Warning::InnerSolveStalled {
                    iteration: iterations,
                    skipped: direction.skipped_updates,
                });
            }

            let outcome =
                line_search::line_search(&mut adapter, &x, f, &g, &direction.direction, &config)?;
            if outcome.exhausted {
                warnings.push(Warning::LineSearchExhausted {
                    iteration: iterations,
                    step: outcome.step,
                });
            }

            let s = &outcome.point - &x;
            let y = &outcome.gradient - &g;
            let sy = s.dot(&y);
            if !store.try_push(s, y) {
                log::error!(
                    "[PHF] Bad curvature at iter {} (sᵀy = {:.3e}); pair not stored.",
                    iterations,
                    sy
                );
                warnings.push(Warning::BadCurvature {
                    iteration: iterations,
                    sy,
                });
            }

            x = outcome.point;
            f = outcome.loss;
            g = outcome.gradient;
            g_norm = l2_norm(&g);
            iterations += 1;
            log::info!(
                "[PHF] Iter {}: f = {:.6e}, ||g|| = {:.3e}, t = {:.3e}, effective iterations = {:.3}",
                iterations,
                f,
                g_norm,
                outcome.step,
                adapter.points_processed() as f64 / ndata as f64
            );
            notify(&x, f, &g, adapter.points_processed());
        }

        let points_processed = adapter.points_processed();
        let solution = Solution {
            final_point: x,
            final_value: f,
            final_gradient_norm: g_norm,
            iterations,
            points_processed,
            effective_iterations: points_processed as f64 / ndata as f64,
            converged,
            warnings,
        };
        if converged {
            log::info!(
                "[PHF] Converged by gradient: iters={}, f={:.6e}, ||g||={:.3e}, points={}",
                solution.iterations,
                solution.final_value,
                solution.final_gradient_norm,
                solution.points_processed
            );
        } else {
            log::info!(
                "[PHF] Max iterations reached: iters={}, f={:.6e}, ||g||={:.3e}, points={}",
                solution.iterations,
                solution.final_value,
                solution.final_gradient_norm,
                solution.points_processed
            );
        }
        Ok(solution)
    }
}

/// Minimizes `objective` from `x0` and returns the final point and loss.
///
/// Shorthand for [`Optimizer`] with a tolerance, an iteration limit, an optional
/// callback and a configuration; use the builder to see warnings.
pub fn optimize<'a, F, G>(
    objective: Objective<F, G>,
    x0: Array1<f64>,
    ndata: usize,
    gradient_tolerance: f64,
    max_iterations: usize,
    callback: Option<Callback<'a>>,
    config: OptimizerConfig,
) -> Result<(Array1<f64>, f64), OptimizerError>
where
    F: FnMut(&Array1<f64>, usize, usize) -> (f64, Array1<f64>),
    G: FnMut(&Array1<f64>, &Array1<f64>, usize, usize) -> Array1<f64>,
{
    let mut optimizer = Optimizer::new(x0, ndata, objective)
        .with_tolerance(gradient_tolerance)
        .with_max_iterations(max_iterations)
        .with_config(config);
    optimizer.callback = callback;
    let solution = optimizer.run()?;
    Ok((solution.final_point, solution.final_value))
}
