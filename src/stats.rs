//! Convergence diagnostics for the evolving population and the stored
//! sample tensor.
//!
//! [`RhatMonitor`] watches the live population during a run; the progress
//! display reports its largest split R-hat. It accumulates per-chain sums
//! keyed by particle id, so migration cannot scramble which row belongs to
//! which chain. After a run, [`rhat`] and [`acceptance_rate`] read the same
//! diagnostics off the sample tensor.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;

use crate::population::Population;
use crate::sampler::SampleOutput;

/// Streaming potential-scale-reduction monitor over the running population.
///
/// Keeps one row of running sums and sums of squares per chain; feed it
/// with [`observe`](Self::observe) once per iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RhatMonitor {
    n: usize,
    sum: Array2<f64>,
    sum_sq: Array2<f64>,
}

impl RhatMonitor {
    /// Creates a monitor for `n_chains` chains of `n_params` flattened
    /// parameters each.
    pub fn new(n_chains: usize, n_params: usize) -> Self {
        Self {
            n: 0,
            sum: Array2::zeros((n_chains, n_params)),
            sum_sq: Array2::zeros((n_chains, n_params)),
        }
    }

    /// Records every particle's current position, keyed by particle id.
    pub fn observe(&mut self, pop: &Population) {
        self.n += 1;
        for p in pop.particles() {
            for (k, v) in p.theta.flatten().into_iter().enumerate() {
                self.sum[[p.id, k]] += v;
                self.sum_sq[[p.id, k]] += v * v;
            }
        }
    }

    /// Number of positions recorded per chain.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns `true` while nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Per-parameter R-hat over everything recorded so far. `None` until at
    /// least two observations from at least two chains exist.
    pub fn rhat(&self) -> Option<Array1<f64>> {
        if self.n < 2 {
            return None;
        }
        let n = self.n as f64;
        let means = &self.sum / n;
        let vars = (&self.sum_sq - &(means.pow2() * n)) / (n - 1.0);
        combine_chain_moments(&means, &vars, self.n)
    }

    /// Largest per-parameter R-hat.
    pub fn max_rhat(&self) -> Option<f64> {
        let all = self.rhat()?;
        all.max().ok().copied()
    }
}

/// Folds per-chain means and sample variances into the potential scale
/// reduction factor: with `W` the mean within-chain variance and `B` the
/// between-chain variance of the means, `rhat = sqrt((((n-1)W + B) / n) / W)`.
fn combine_chain_moments(
    means: &Array2<f64>,
    vars: &Array2<f64>,
    n: usize,
) -> Option<Array1<f64>> {
    let k = means.nrows();
    if n < 2 || k < 2 {
        return None;
    }
    let n = n as f64;
    let within = vars.mean_axis(Axis(0))?;
    let grand = means.mean_axis(Axis(0))?;
    let between = (means - &grand).pow2().sum_axis(Axis(0)) * (n / (k as f64 - 1.0));
    let var_plus = (within.clone() * (n - 1.0) + between) / n;
    Some((var_plus / within).sqrt())
}

/// Split R-hat per flattened model parameter, computed from the stored
/// post-burnin rows. `None` when fewer than two rows or two chains are
/// stored.
pub fn rhat(output: &SampleOutput) -> Option<Array1<f64>> {
    let post = output.post_burnin();
    let (rows, _, chains) = post.dim();
    let d = output.n_params();
    if rows < 2 || chains < 2 {
        return None;
    }
    let mut means = Array2::zeros((chains, d));
    let mut vars = Array2::zeros((chains, d));
    for chain in 0..chains {
        let draws = post.slice(s![.., ..d, chain]);
        means.row_mut(chain).assign(&draws.mean_axis(Axis(0))?);
        vars.row_mut(chain).assign(&draws.var_axis(Axis(0), 1.0));
    }
    combine_chain_moments(&means, &vars, rows)
}

/// Post-burnin acceptance rate per chain, read from the stored acceptance
/// column of the sample tensor.
pub fn acceptance_rate(output: &SampleOutput) -> Array1<f64> {
    let accept_col = output.names.len() - 2;
    let post = output.post_burnin();
    let n_rows = post.shape()[0] as f64;
    let n_chains = post.shape()[2];
    let mut rates = Array1::zeros(n_chains);
    for chain in 0..n_chains {
        let accepted: f64 = post.slice(s![.., accept_col, chain]).sum();
        rates[chain] = accepted / n_rows;
    }
    rates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::particle::{Particle, Theta};
    use crate::population::Population;
    use crate::value::ParamValue;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// One parameter per chain column, acceptance 1.0, lp derived from the
    /// draw.
    fn output_from_columns(columns: &[&[f64]]) -> SampleOutput {
        let rows = columns[0].len();
        let chains = columns.len();
        let mut samples = Array3::zeros((rows, 3, chains));
        for (chain, draws) in columns.iter().enumerate() {
            for (row, &v) in draws.iter().enumerate() {
                samples[[row, 0, chain]] = v;
                samples[[row, 1, chain]] = 1.0;
                samples[[row, 2, chain]] = -0.5 * v * v;
            }
        }
        SampleOutput {
            samples,
            names: vec![
                "x".to_string(),
                "acceptance".to_string(),
                "lp".to_string(),
            ],
            burnin: 0,
            n_initial: 0,
            status: RunStatus::Completed,
        }
    }

    #[test]
    fn test_rhat_matches_a_hand_computed_fixture() {
        // Two chains of three draws with unit within-chain variance and
        // means 2 and 4: W = 1, B = 3 * ((2-3)^2 + (4-3)^2) = 6,
        // var+ = (2 * 1 + 6) / 3 = 8/3, rhat = sqrt(8/3).
        let out = output_from_columns(&[&[1.0, 2.0, 3.0], &[3.0, 4.0, 5.0]]);
        let rhat = rhat(&out).unwrap();
        assert_abs_diff_eq!(rhat[0], (8.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_identical_chains_sit_below_one() {
        // With no between-chain spread, rhat collapses to sqrt((n-1)/n).
        let out = output_from_columns(&[&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]]);
        let rhat = rhat(&out).unwrap();
        assert_abs_diff_eq!(rhat[0], (2.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_monitor_agrees_with_the_stored_tensor() {
        let particles: Vec<Particle> = (0..4)
            .map(|id| {
                Particle::new(
                    id,
                    Theta(vec![ParamValue::Real(id as f64)]),
                    0.0,
                    SmallRng::seed_from_u64(id as u64),
                )
            })
            .collect();
        let mut pop = Population::partition(particles, 4);

        let mut monitor = RhatMonitor::new(4, 1);
        monitor.observe(&pop);
        for p in pop.particles_mut() {
            p.theta = Theta(vec![ParamValue::Real(p.id as f64 + 1.5)]);
        }
        monitor.observe(&pop);
        assert_eq!(monitor.len(), 2);

        // The same two positions per chain, laid out as a stored tensor.
        let out = output_from_columns(&[&[0.0, 1.5], &[1.0, 2.5], &[2.0, 3.5], &[3.0, 4.5]]);
        let live = monitor.rhat().unwrap();
        let stored = rhat(&out).unwrap();
        assert_abs_diff_eq!(live[0], stored[0], epsilon = 1e-12);
    }

    #[test]
    fn test_rhat_needs_two_chains_and_two_draws() {
        let single_chain = output_from_columns(&[&[1.0, 2.0, 3.0]]);
        assert!(rhat(&single_chain).is_none());

        let single_draw = output_from_columns(&[&[1.0], &[2.0]]);
        assert!(rhat(&single_draw).is_none());

        let empty = RhatMonitor::new(4, 1);
        assert!(empty.is_empty());
        assert!(empty.rhat().is_none());
        assert!(empty.max_rhat().is_none());
    }

    #[test]
    fn test_acceptance_rate_reads_the_stored_column() {
        let mut out = output_from_columns(&[&[1.0, 2.0], &[3.0, 4.0]]);
        out.samples[[0, 1, 1]] = 0.0;
        let rates = acceptance_rate(&out);
        assert_abs_diff_eq!(rates[0], 1.0);
        assert_abs_diff_eq!(rates[1], 0.5);
    }
}
