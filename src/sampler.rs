/*!
# Differential Evolution MCMC sampler

The driver that owns a run: it draws the initial population from the prior,
partitions it into groups, then repeats propose / accept / store / migrate
for a fixed number of iterations. All chains of one iteration depend only on
the previous iteration's state, so groups are stepped in parallel; each
chain carries its own RNG seeded `seed + id`, which keeps seeded runs
reproducible under parallel execution.

Sampling mode (`UpdateRule::MetropolisHastings`) produces a dense 3-D tensor
`[iteration, parameter, chain]` whose flattened parameter axis ends with the
two bookkeeping columns `"acceptance"` and `"lp"`. Optimization mode
(`UpdateRule::Maximize` / `Minimize`) reuses the same engine with greedy
replacement and returns the best particle instead of building chains.

## Example

```rust
use demc::config::DemcConfigBuilder;
use demc::model::{Model, ModelError};
use demc::sampler::DemcSampler;
use demc::value::ParamValue;
use rand::Rng;

// A standard normal target with a flat prior over the bounded interval.
struct StdNormal;

impl Model for StdNormal {
    fn sample_prior<R: Rng>(&self, rng: &mut R) -> Result<Vec<ParamValue>, ModelError> {
        Ok(vec![ParamValue::Real(rng.gen_range(-5.0..5.0))])
    }

    fn prior_loglike(&self, _theta: &[ParamValue]) -> Result<f64, ModelError> {
        Ok(0.0)
    }

    fn loglike(&self, theta: &[ParamValue]) -> Result<f64, ModelError> {
        let x = theta[0].as_real();
        Ok(-0.5 * x * x)
    }

    fn names(&self) -> Vec<String> {
        vec!["x".to_string()]
    }
}

let config = DemcConfigBuilder::new()
    .n_groups(2)
    .particles_per_group(4)
    .n_iter(100)
    .burnin(50)
    .bounds(vec![(-10.0, 10.0)])
    .seed(7)
    .build()?;
let mut sampler = DemcSampler::new(StdNormal, config)?;
let output = sampler.run()?;
assert_eq!(output.samples.shape(), &[100, 3, 8]);
assert_eq!(output.names, vec!["x", "acceptance", "lp"]);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use indicatif::ProgressBar;
use ndarray::{s, Array3, ArrayView3};
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};

use crate::config::{DemcConfig, UpdateRule};
use crate::core::{iteration_bar, CancelToken, RunStatus};
use crate::error::{DemcError, Result};
use crate::migration::migrate;
use crate::model::{compute_posterior, evaluate_objective, Model};
use crate::particle::{Particle, Theta};
use crate::population::Population;
use crate::stats::RhatMonitor;

/// Everything a sampling run produces.
#[derive(Debug, Clone)]
pub struct SampleOutput {
    /// Dense sample tensor `[iteration, parameter, chain]`. Rows before
    /// `burnin` (other than the warm-start rows) are left zeroed.
    pub samples: Array3<f64>,
    /// Flattened parameter names, arrays expanded column-major, with the
    /// trailing `"acceptance"` and `"lp"` columns.
    pub names: Vec<String>,
    /// Number of leading iterations excluded from the stored sample set.
    pub burnin: usize,
    /// Number of leading warm-start rows holding fresh prior draws.
    pub n_initial: usize,
    /// Whether the run completed or was cancelled.
    pub status: RunStatus,
}

impl SampleOutput {
    /// Number of flattened model parameters (the bookkeeping columns
    /// excluded).
    pub fn n_params(&self) -> usize {
        self.names.len() - 2
    }

    /// Number of chains.
    pub fn n_chains(&self) -> usize {
        self.samples.shape()[2]
    }

    /// View of the stored post-burnin rows.
    pub fn post_burnin(&self) -> ArrayView3<'_, f64> {
        let start = self.burnin.min(self.samples.shape()[0]);
        self.samples.slice(s![start.., .., ..])
    }
}

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct Optimum {
    /// The best position found.
    pub theta: Theta,
    /// Objective value at `theta`.
    pub weight: f64,
    /// Whether the run completed or was cancelled.
    pub status: RunStatus,
}

/// The population-based DE-MCMC sampler.
///
/// Construct with a [`Model`] and a validated [`DemcConfig`], then call
/// [`run`](Self::run) (sampling) or [`optimize`](Self::optimize)
/// (optimization), depending on the configured update rule.
pub struct DemcSampler<M> {
    model: M,
    config: DemcConfig,
    cancel: CancelToken,
}

impl<M: Model + Send + Sync> DemcSampler<M> {
    /// Creates a sampler, validating the configuration.
    pub fn new(model: M, config: DemcConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// The configuration this sampler runs with.
    pub fn config(&self) -> &DemcConfig {
        &self.config
    }

    /// A handle that cancels the run cooperatively; checked once per
    /// iteration.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs the sampler and returns the sample tensor.
    pub fn run(&mut self) -> Result<SampleOutput> {
        self.require_sampling("run")?;
        self.sample_inner(None)
    }

    /// Like [`run`](Self::run), with an indicatif progress bar that shows
    /// the largest split R-hat over the post-burnin population.
    pub fn run_with_progress(&mut self) -> Result<SampleOutput> {
        self.require_sampling("run_with_progress")?;
        let pb = iteration_bar(self.config.n_iter);
        let out = self.sample_inner(Some(&pb));
        pb.finish_with_message("done");
        out
    }

    /// Runs in optimization mode and returns the incumbent.
    pub fn optimize(&mut self) -> Result<Optimum> {
        self.require_optimizing("optimize")?;
        self.optimize_inner(None)
    }

    /// Like [`optimize`](Self::optimize), with a progress bar.
    pub fn optimize_with_progress(&mut self) -> Result<Optimum> {
        self.require_optimizing("optimize_with_progress")?;
        let pb = iteration_bar(self.config.n_iter);
        let out = self.optimize_inner(Some(&pb));
        pb.finish_with_message("done");
        out
    }

    fn require_sampling(&self, entry: &'static str) -> Result<()> {
        if self.config.update == UpdateRule::MetropolisHastings {
            Ok(())
        } else {
            Err(DemcError::WrongUpdateRule {
                entry,
                expected: "UpdateRule::MetropolisHastings",
            })
        }
    }

    fn require_optimizing(&self, entry: &'static str) -> Result<()> {
        if self.config.update == UpdateRule::MetropolisHastings {
            Err(DemcError::WrongUpdateRule {
                entry,
                expected: "UpdateRule::Maximize or UpdateRule::Minimize",
            })
        } else {
            Ok(())
        }
    }

    fn evaluate(&self, theta: &Theta) -> Result<f64> {
        match self.config.update {
            UpdateRule::MetropolisHastings => {
                compute_posterior(&self.model, theta, &self.config.bounds)
            }
            UpdateRule::Maximize => {
                evaluate_objective(&self.model, theta, &self.config.bounds, false)
            }
            UpdateRule::Minimize => {
                evaluate_objective(&self.model, theta, &self.config.bounds, true)
            }
        }
    }

    /// Draws the initial population and fixes the run's component
    /// structure. Returns the partitioned population, the flattened
    /// dimension and the flattened parameter names.
    fn init_population(&self, seed: u64) -> Result<(Population, usize, Vec<String>)> {
        let n_particles = self.config.n_particles();
        let mut particles = Vec::with_capacity(n_particles);
        let mut reference: Option<Theta> = None;
        for id in 0..n_particles {
            let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(id as u64));
            let draw = self.model.sample_prior(&mut rng).map_err(|e| DemcError::Model {
                callback: "sample_prior",
                theta: Vec::new(),
                source: e,
            })?;
            let theta = Theta(draw);
            match &reference {
                None => {
                    if theta.len() != self.config.bounds.len() {
                        return Err(DemcError::BoundsArityMismatch {
                            components: theta.len(),
                            bounds: self.config.bounds.len(),
                        });
                    }
                    let names = self.model.names();
                    if names.len() != theta.len() {
                        return Err(DemcError::NamesArityMismatch {
                            components: theta.len(),
                            names: names.len(),
                        });
                    }
                    reference = Some(theta.clone());
                }
                Some(first) => {
                    if !first.same_structure(&theta) {
                        return Err(DemcError::ShapeMismatch { particle: id });
                    }
                }
            }
            let weight = self.evaluate(&theta)?;
            particles.push(Particle::new(id, theta, weight, rng));
        }
        let reference = reference.expect("population is never empty");
        let d = reference.flat_len();
        if let Some(masks) = &self.config.blocking {
            for (index, mask) in masks.iter().enumerate() {
                if mask.len() != d {
                    return Err(DemcError::BlockingMaskMismatch {
                        index,
                        expected: d,
                        got: mask.len(),
                    });
                }
            }
        }
        let flat_names = reference.flat_names(&self.model.names());
        Ok((
            Population::partition(particles, self.config.particles_per_group),
            d,
            flat_names,
        ))
    }

    /// Replaces every particle with a fresh prior draw (warm-start rows).
    fn redraw_population(&self, pop: &mut Population) -> Result<()> {
        for p in pop.particles_mut() {
            let draw = self
                .model
                .sample_prior(&mut p.rng)
                .map_err(|e| DemcError::model("sample_prior", &p.theta, e))?;
            let theta = Theta(draw);
            if !p.theta.same_structure(&theta) {
                return Err(DemcError::ShapeMismatch { particle: p.id });
            }
            p.weight = self.evaluate(&theta)?;
            p.theta = theta;
        }
        Ok(())
    }

    fn sample_inner(&self, pb: Option<&ProgressBar>) -> Result<SampleOutput> {
        let cfg = &self.config;
        let seed = cfg.seed.unwrap_or_else(|| thread_rng().gen());
        let (mut pop, d, mut names) = self.init_population(seed)?;
        let n_particles = pop.n_particles();
        let rows = cfg.n_initial + cfg.n_iter;
        let mut driver_rng = SmallRng::seed_from_u64(seed.wrapping_add(n_particles as u64));
        let mut samples = Array3::<f64>::zeros((rows, d + 2, n_particles));
        names.push("acceptance".to_string());
        names.push("lp".to_string());

        // Warm-start rows hold fresh prior draws and are always written.
        for row in 0..cfg.n_initial {
            if row > 0 {
                self.redraw_population(&mut pop)?;
            }
            for p in pop.particles_mut() {
                p.accept.push(true);
                p.lp.push(p.weight);
            }
            for p in pop.particles() {
                write_row(&mut samples, row, p, d);
            }
        }

        let mut status = RunStatus::Completed;
        let mut tracker = pb.map(|_| RhatMonitor::new(n_particles, d));
        for row in cfg.n_initial..rows {
            if self.cancel.is_cancelled() {
                status = RunStatus::Cancelled { iteration: row };
                break;
            }
            let iter = row - cfg.n_initial;
            let block: Option<&[bool]> = cfg
                .blocking
                .as_ref()
                .map(|masks| masks[iter % masks.len()].as_slice());
            pop.step_groups(&self.model, cfg, d, block)?;
            // Migration is scheduled on the absolute iteration index,
            // warm-start rows included.
            if (row + 1) % cfg.migration_interval == 0
                && cfg.migration_prob > 0.0
                && driver_rng.gen::<f64>() < cfg.migration_prob
            {
                migrate(&mut pop, &mut driver_rng);
            }
            if row >= cfg.burnin {
                for p in pop.particles() {
                    write_row(&mut samples, row, p, d);
                }
            }
            if let Some(pb) = pb {
                pb.inc(1);
                if let Some(tracker) = tracker.as_mut() {
                    progress_tick(pb, tracker, &pop, row, cfg.burnin);
                }
            }
        }

        Ok(SampleOutput {
            samples,
            names,
            burnin: cfg.burnin,
            n_initial: cfg.n_initial,
            status,
        })
    }

    fn optimize_inner(&self, pb: Option<&ProgressBar>) -> Result<Optimum> {
        let cfg = &self.config;
        let seed = cfg.seed.unwrap_or_else(|| thread_rng().gen());
        let (mut pop, d, _names) = self.init_population(seed)?;
        let mut driver_rng =
            SmallRng::seed_from_u64(seed.wrapping_add(pop.n_particles() as u64));

        let mut status = RunStatus::Completed;
        for iter in 0..cfg.n_iter {
            if self.cancel.is_cancelled() {
                status = RunStatus::Cancelled { iteration: iter };
                break;
            }
            let block: Option<&[bool]> = cfg
                .blocking
                .as_ref()
                .map(|masks| masks[iter % masks.len()].as_slice());
            pop.step_groups(&self.model, cfg, d, block)?;
            // Optimization runs have no warm-start rows, so the loop index
            // is already the absolute iteration.
            if (iter + 1) % cfg.migration_interval == 0
                && cfg.migration_prob > 0.0
                && driver_rng.gen::<f64>() < cfg.migration_prob
            {
                migrate(&mut pop, &mut driver_rng);
            }
            if let Some(pb) = pb {
                pb.inc(1);
            }
        }

        let best = pop.best(cfg.update == UpdateRule::Minimize);
        Ok(Optimum {
            theta: best.theta.clone(),
            weight: best.weight,
            status,
        })
    }
}

/// Writes one particle's post-acceptance state into its tensor row.
fn write_row(samples: &mut Array3<f64>, row: usize, p: &Particle, d: usize) {
    for (k, v) in p.theta.flatten().iter().enumerate() {
        samples[[row, k, p.id]] = *v;
    }
    let accepted = p.accept.last().copied().unwrap_or(true);
    samples[[row, d, p.id]] = if accepted { 1.0 } else { 0.0 };
    samples[[row, d + 1, p.id]] = p.weight;
}

/// Feeds the R-hat monitor past burnin and refreshes the progress message
/// now and then.
fn progress_tick(
    pb: &ProgressBar,
    tracker: &mut RhatMonitor,
    pop: &Population,
    row: usize,
    burnin: usize,
) {
    if row < burnin {
        return;
    }
    tracker.observe(pop);
    if (row + 1) % 200 == 0 {
        if let Some(max) = tracker.max_rhat() {
            pb.set_message(format!("max rhat {max:.3}"));
        }
    }
}
