/*!
The user-model interface and the weight evaluators.

A model supplies four things: a prior sampler (whose first draw also fixes
the component structure of the run), a log-prior, a log-likelihood and the
ordered component names. The engine turns a model plus a candidate position
into a weight: `log_prior + log_like` when sampling, the bare objective when
optimizing, and `-inf` (or `+inf` when minimizing) outside the bounds.

Callback errors are not swallowed: they abort the run as
[`DemcError::Model`] with the offending parameter vector attached.
*/

use rand::Rng;

use crate::error::{DemcError, Result};
use crate::particle::{in_bounds, Theta};
use crate::value::ParamValue;

/// Error type user callbacks may return.
pub type ModelError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The four user callbacks driving a run.
///
/// Implementations must be cheap to share across threads (`&self` is used
/// from multiple chains at once when groups run in parallel).
pub trait Model {
    /// Draws an initial position from the prior. The first draw of a run
    /// fixes the component structure; later draws must match it.
    fn sample_prior<R: Rng>(&self, rng: &mut R) -> std::result::Result<Vec<ParamValue>, ModelError>;

    /// Log density of the prior at `theta`.
    fn prior_loglike(&self, theta: &[ParamValue]) -> std::result::Result<f64, ModelError>;

    /// Log likelihood (sampling) or objective value (optimization) at
    /// `theta`.
    fn loglike(&self, theta: &[ParamValue]) -> std::result::Result<f64, ModelError>;

    /// Ordered names of the top-level components, matching the shape of a
    /// prior draw.
    fn names(&self) -> Vec<String>;
}

/// Weight of a proposal in sampling mode: `log_prior + log_like` inside the
/// bounds, `-inf` outside. NaN results are kept as-is; the acceptance rule
/// rejects them.
pub(crate) fn compute_posterior<M: Model>(
    model: &M,
    theta: &Theta,
    bounds: &[(f64, f64)],
) -> Result<f64> {
    if !in_bounds(bounds, theta) {
        return Ok(f64::NEG_INFINITY);
    }
    let prior = model
        .prior_loglike(theta)
        .map_err(|e| DemcError::model("prior_loglike", theta, e))?;
    let like = model
        .loglike(theta)
        .map_err(|e| DemcError::model("loglike", theta, e))?;
    Ok(prior + like)
}

/// Weight of a proposal in optimization mode: the objective inside the
/// bounds, the hostile infinity outside.
pub(crate) fn evaluate_objective<M: Model>(
    model: &M,
    theta: &Theta,
    bounds: &[(f64, f64)],
    minimize: bool,
) -> Result<f64> {
    if !in_bounds(bounds, theta) {
        return Ok(if minimize {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        });
    }
    model
        .loglike(theta)
        .map_err(|e| DemcError::model("loglike", theta, e))
}
