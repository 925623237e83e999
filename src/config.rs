//! Solver configuration.
//!
//! Every tunable of the optimizer lives in [`OptimizerConfig`] as a typed field with
//! its default. Options can also be applied from string key/value pairs using the
//! camelCase option names (`subsetVariant`, `lsInterpMethod`, ...); unknown keys and unparsable values
//! are rejected immediately rather than ignored.

use crate::OptimizerError;
use std::fmt;
use std::str::FromStr;

/// Strategy used to compute the search direction of each outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerSolveVariant {
    /// Stochastic limited-memory quasi-Newton inner loop.
    Lbfgs,
    /// Conjugate gradient against one sampled Hessian, warm-started from the L-BFGS step.
    Cg,
}

/// Interpolation used to pick the next trial step once the minimum is bracketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMethod {
    Bisect,
    /// Intersection of the two first-order Taylor models at the bracket ends.
    Taylor,
    /// Cubic Hermite fit through both ends (Nocedal & Wright, eq. 3.59).
    Cubic,
}

/// Which Wolfe line search the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearchKind {
    /// Bracketing search on the weak Wolfe conditions.
    WeakWolfe,
    /// Nocedal & Wright Algorithm 3.5 with zoom.
    StrongWolfe,
}

fn unsupported(key: &str, value: &str) -> OptimizerError {
    OptimizerError::UnsupportedConfiguration {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl FromStr for InnerSolveVariant {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lbfgs" => Ok(Self::Lbfgs),
            "cg" => Ok(Self::Cg),
            _ => Err(unsupported("subsetVariant", s)),
        }
    }
}

impl FromStr for InterpolationMethod {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bisect" => Ok(Self::Bisect),
            "taylor" => Ok(Self::Taylor),
            "cubic" => Ok(Self::Cubic),
            _ => Err(unsupported("lsInterpMethod", s)),
        }
    }
}

impl FromStr for LineSearchKind {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "weakwolfe" | "weak" => Ok(Self::WeakWolfe),
            "strongwolfe" | "strong" => Ok(Self::StrongWolfe),
            _ => Err(unsupported("lineSearch", s)),
        }
    }
}

impl fmt::Display for InnerSolveVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lbfgs => write!(f, "lbfgs"),
            Self::Cg => write!(f, "cg"),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bisect => write!(f, "bisect"),
            Self::Taylor => write!(f, "taylor"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

/// Tunables of the subsampled Hessian-free optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Number of contiguous parts the dataset is split into (default: 100).
    pub parts: usize,
    /// Inner solve strategy (default: [`InnerSolveVariant::Lbfgs`]).
    pub inner_solve: InnerSolveVariant,
    /// Inner-solve iteration budget as a fraction of one pass over all parts (default: 0.2).
    pub solve_fraction: f64,
    /// Evaluate on an adaptively sized subset instead of the full dataset (default: true).
    pub subset_objective: bool,
    /// Relative standard error of the subset gradient below which the subset stops growing (default: 0.1).
    pub grad_rel_error_bound: f64,
    /// Number of curvature pairs used by the two-loop recursion (default: 10).
    pub lbfgs_memory: usize,
    /// Finite-difference step as a fraction of the gradient max-norm (default: 1e-8).
    pub fd_eps: f64,
    /// Return the average of the second half of the inner L-BFGS iterates (default: false).
    pub inner_solve_average: bool,
    /// Damping applied to the exact quadratic step of the inner L-BFGS loop (default: 0.5).
    pub inner_solve_step_factor: f64,
    /// Maximum number of trial steps per line search (default: 8).
    pub max_line_search_iter: usize,
    /// First trial step of the line search (default: 1.0).
    pub initial_line_search_step: f64,
    /// Bracket interpolation (default: [`InterpolationMethod::Cubic`]).
    pub ls_interp_method: InterpolationMethod,
    /// Check the weak curvature condition in the weak-Wolfe search (default: true).
    pub use_wolfe: bool,
    /// Line search run by the driver (default: [`LineSearchKind::WeakWolfe`]).
    pub line_search: LineSearchKind,
    /// Seed of the pseudorandom part selector.
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            parts: 100,
            inner_solve: InnerSolveVariant::Lbfgs,
            solve_fraction: 0.2,
            subset_objective: true,
            grad_rel_error_bound: 0.1,
            lbfgs_memory: 10,
            fd_eps: 1e-8,
            inner_solve_average: false,
            inner_solve_step_factor: 0.5,
            max_line_search_iter: 8,
            initial_line_search_step: 1.0,
            ls_interp_method: InterpolationMethod::Cubic,
            use_wolfe: true,
            line_search: LineSearchKind::WeakWolfe,
            seed: 0x5EED_0F_C0FFEE,
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, OptimizerError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| unsupported(key, value))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, OptimizerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(unsupported(key, value)),
    }
}

impl OptimizerConfig {
    /// Preset of the alternate driver: conjugate-gradient inner solve on the full dataset.
    pub fn newton_cg() -> Self {
        Self {
            inner_solve: InnerSolveVariant::Cg,
            subset_objective: false,
            ..Self::default()
        }
    }

    /// Builds a configuration from string key/value pairs on top of the defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, OptimizerError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key.as_ref(), value.as_ref())?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets one option by its camelCase name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), OptimizerError> {
        match key {
            "parts" => self.parts = parse_value(key, value)?,
            "subsetVariant" => self.inner_solve = value.parse()?,
            "solveFraction" => self.solve_fraction = parse_value(key, value)?,
            "subsetObjective" => self.subset_objective = parse_flag(key, value)?,
            "gradRelErrorBound" => self.grad_rel_error_bound = parse_value(key, value)?,
            "lbfgsMemory" => self.lbfgs_memory = parse_value(key, value)?,
            "fdEps" => self.fd_eps = parse_value(key, value)?,
            "innerSolveAverage" => self.inner_solve_average = parse_flag(key, value)?,
            "innerSolveStepFactor" => self.inner_solve_step_factor = parse_value(key, value)?,
            "maxLineSearchIter" => self.max_line_search_iter = parse_value(key, value)?,
            "initialLineSearcht" => self.initial_line_search_step = parse_value(key, value)?,
            "lsInterpMethod" => self.ls_interp_method = value.parse()?,
            "useWolfe" => self.use_wolfe = parse_flag(key, value)?,
            "lineSearch" => self.line_search = value.parse()?,
            "seed" => self.seed = parse_value(key, value)?,
            _ => return Err(unsupported(key, value)),
        }
        Ok(())
    }

    /// Checks every option against its valid range.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        fn positive(name: &str, v: f64) -> Result<(), OptimizerError> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(OptimizerError::InvalidConfiguration(format!(
                    "{name} must be positive and finite, got {v}"
                )))
            }
        }
        if self.parts == 0 {
            return Err(OptimizerError::InvalidConfiguration(
                "parts must be at least 1".to_string(),
            ));
        }
        if self.lbfgs_memory == 0 {
            return Err(OptimizerError::InvalidConfiguration(
                "lbfgsMemory must be at least 1".to_string(),
            ));
        }
        if self.max_line_search_iter == 0 {
            return Err(OptimizerError::InvalidConfiguration(
                "maxLineSearchIter must be at least 1".to_string(),
            ));
        }
        positive("solveFraction", self.solve_fraction)?;
        positive("gradRelErrorBound", self.grad_rel_error_bound)?;
        positive("fdEps", self.fd_eps)?;
        positive("innerSolveStepFactor", self.inner_solve_step_factor)?;
        positive("initialLineSearcht", self.initial_line_search_step)?;
        Ok(())
    }
}
