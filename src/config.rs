//! Per-graph configuration.

/// Default relative pivot tolerance for LU-based inverse and determinant.
pub const DEFAULT_SINGULAR_TOLERANCE: f64 = 1e-12;

/// What a backward pass does with gradients left over from earlier passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradPolicy {
    /// Every pass starts from zero; repeated passes give identical gradients.
    #[default]
    Reset,
    /// Each pass adds its result onto the existing gradients.
    Accumulate,
}

/// Settings a [`Graph`](crate::Graph) is created with.
///
/// ```
/// use linalg_grad::{GradPolicy, GraphConfig};
/// let cfg = GraphConfig::default()
///     .with_singular_tolerance(1e-9)
///     .with_grad_policy(GradPolicy::Accumulate);
/// assert_eq!(cfg.grad_policy, GradPolicy::Accumulate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphConfig {
    /// A pivot `p` with `|p| <= singular_tolerance * max|X|` makes `X` singular
    /// for `inverse` and the `determinant` gradient.
    pub singular_tolerance: f64,
    /// Gradient reset behaviour between backward passes.
    pub grad_policy: GradPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            singular_tolerance: DEFAULT_SINGULAR_TOLERANCE,
            grad_policy: GradPolicy::default(),
        }
    }
}

impl GraphConfig {
    /// Overrides the singularity tolerance.
    #[must_use]
    pub const fn with_singular_tolerance(mut self, tolerance: f64) -> Self {
        self.singular_tolerance = tolerance;
        self
    }

    /// Overrides the gradient policy.
    #[must_use]
    pub const fn with_grad_policy(mut self, policy: GradPolicy) -> Self {
        self.grad_policy = policy;
        self
    }
}
