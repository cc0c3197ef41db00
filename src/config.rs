/*!
Configuration for the DE-MCMC sampler.

All knobs of the evolution engine live in [`DemcConfig`]; the fluent
[`DemcConfigBuilder`] validates them before a sampler is constructed, so
invalid setups fail before any model callback runs.

# Example

```rust
use demc::config::{DemcConfigBuilder, GammaPolicy};

let config = DemcConfigBuilder::new()
    .n_groups(3)
    .particles_per_group(8)
    .n_iter(1_000)
    .burnin(200)
    .bounds(vec![(-20.0, 20.0)])
    .gamma(GammaPolicy::Fixed)
    .snooker_prob(0.1)
    .seed(42)
    .build()
    .expect("valid configuration");
assert_eq!(config.n_particles(), 24);
```
*/

use crate::error::{DemcError, Result};

/// Policy for the scale factor on the differential mutation vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GammaPolicy {
    /// The classic constant `2.38 / sqrt(2 * d_eff)`, where `d_eff` counts
    /// the scalar entries currently being updated.
    #[default]
    Fixed,
    /// `Uniform(0.5, 1.0)` times the fixed value, drawn per proposal.
    Variable,
    /// A narrow symmetric spread around the fixed value, drawn per
    /// proposal (`Uniform(0.5, 1.5)` times the fixed value).
    Random,
}

/// How a proposal replaces the current particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateRule {
    /// Metropolis-Hastings acceptance; builds chains and traces.
    #[default]
    MetropolisHastings,
    /// Greedy replacement when strictly larger; tracks incumbents only.
    Maximize,
    /// Greedy replacement when strictly smaller; tracks incumbents only.
    Minimize,
}

/// Immutable configuration of one sampling or optimization run.
#[derive(Debug, Clone)]
pub struct DemcConfig {
    /// Number of groups the population is partitioned into.
    pub n_groups: usize,
    /// Particles per group (`Np`); at least 4.
    pub particles_per_group: usize,
    /// Number of main iterations.
    pub n_iter: usize,
    /// Leading warm-start slots filled with fresh prior draws.
    pub n_initial: usize,
    /// Iterations excluded from the stored sample set. Counted on the
    /// absolute row index, warm-start rows included.
    pub burnin: usize,
    /// One `(lo, hi)` pair per top-level component, checked element-wise
    /// for array components.
    pub bounds: Vec<(f64, f64)>,
    /// Scale-factor policy for differential mutation.
    pub gamma: GammaPolicy,
    /// Per-scalar probability of reverting a mutated entry to the current
    /// value.
    pub crossover_prob: f64,
    /// Probability that a step uses the snooker update instead of
    /// differential mutation.
    pub snooker_prob: f64,
    /// Probability that a scheduled migration actually runs.
    pub migration_prob: f64,
    /// Migration is considered every this many iterations.
    pub migration_interval: usize,
    /// Half-width of the uniform jitter added to differential proposals.
    pub jitter: f64,
    /// Optional per-scalar update masks, cycled across iterations.
    pub blocking: Option<Vec<Vec<bool>>>,
    /// Replacement rule: MH sampling or greedy optimization.
    pub update: UpdateRule,
    /// RNG seed; entropy-seeded when `None`.
    pub seed: Option<u64>,
}

impl Default for DemcConfig {
    fn default() -> Self {
        Self {
            n_groups: 4,
            particles_per_group: 8,
            n_iter: 1_000,
            n_initial: 0,
            burnin: 0,
            bounds: Vec::new(),
            gamma: GammaPolicy::default(),
            crossover_prob: 0.0,
            snooker_prob: 0.1,
            migration_prob: 0.05,
            migration_interval: 10,
            jitter: 1e-3,
            blocking: None,
            update: UpdateRule::default(),
            seed: None,
        }
    }
}

impl DemcConfig {
    /// Total population size, `n_groups * particles_per_group`.
    pub fn n_particles(&self) -> usize {
        self.n_groups * self.particles_per_group
    }

    /// Checks every invariant that can be verified without a prior draw.
    /// Blocking mask lengths depend on the flattened dimension and are
    /// checked when the population is initialized.
    pub fn validate(&self) -> Result<()> {
        if self.particles_per_group < 4 {
            return Err(DemcError::PopulationTooSmall {
                np: self.particles_per_group,
            });
        }
        if self.n_groups == 0 {
            return Err(DemcError::NoGroups);
        }
        if self.n_iter == 0 {
            return Err(DemcError::ZeroIterations);
        }
        if self.migration_interval == 0 {
            return Err(DemcError::InvalidMigrationInterval);
        }
        if self.bounds.is_empty() {
            return Err(DemcError::EmptyBounds);
        }
        for (index, &(lower, upper)) in self.bounds.iter().enumerate() {
            if !(lower <= upper) {
                return Err(DemcError::InvalidBounds {
                    index,
                    lower,
                    upper,
                });
            }
        }
        for (name, value) in [
            ("crossover_prob", self.crossover_prob),
            ("snooker_prob", self.snooker_prob),
            ("migration_prob", self.migration_prob),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DemcError::InvalidProbability { name, value });
            }
        }
        if !(self.jitter >= 0.0) {
            return Err(DemcError::InvalidJitter { value: self.jitter });
        }
        if self.migration_prob > 0.0 && self.n_groups < 2 {
            return Err(DemcError::MigrationNeedsGroups {
                n_groups: self.n_groups,
            });
        }
        if let Some(masks) = &self.blocking {
            for (index, mask) in masks.iter().enumerate() {
                if !mask.iter().any(|&b| b) {
                    return Err(DemcError::EmptyBlockingMask { index });
                }
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`DemcConfig`]; `build()` validates.
#[derive(Debug, Clone, Default)]
pub struct DemcConfigBuilder {
    cfg: DemcConfig,
}

impl DemcConfigBuilder {
    /// Creates a builder holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of groups.
    pub fn n_groups(mut self, v: usize) -> Self {
        self.cfg.n_groups = v;
        self
    }

    /// Sets the number of particles per group.
    pub fn particles_per_group(mut self, v: usize) -> Self {
        self.cfg.particles_per_group = v;
        self
    }

    /// Sets the number of main iterations.
    pub fn n_iter(mut self, v: usize) -> Self {
        self.cfg.n_iter = v;
        self
    }

    /// Sets the number of warm-start prior-draw slots.
    pub fn n_initial(mut self, v: usize) -> Self {
        self.cfg.n_initial = v;
        self
    }

    /// Sets the burnin iteration count.
    pub fn burnin(mut self, v: usize) -> Self {
        self.cfg.burnin = v;
        self
    }

    /// Sets the per-component bounds.
    pub fn bounds(mut self, v: Vec<(f64, f64)>) -> Self {
        self.cfg.bounds = v;
        self
    }

    /// Sets the gamma policy.
    pub fn gamma(mut self, v: GammaPolicy) -> Self {
        self.cfg.gamma = v;
        self
    }

    /// Sets the per-scalar crossover (revert) probability.
    pub fn crossover_prob(mut self, v: f64) -> Self {
        self.cfg.crossover_prob = v;
        self
    }

    /// Sets the snooker-step probability.
    pub fn snooker_prob(mut self, v: f64) -> Self {
        self.cfg.snooker_prob = v;
        self
    }

    /// Sets the migration probability.
    pub fn migration_prob(mut self, v: f64) -> Self {
        self.cfg.migration_prob = v;
        self
    }

    /// Sets the migration interval.
    pub fn migration_interval(mut self, v: usize) -> Self {
        self.cfg.migration_interval = v;
        self
    }

    /// Sets the jitter half-width.
    pub fn jitter(mut self, v: f64) -> Self {
        self.cfg.jitter = v;
        self
    }

    /// Sets the per-scalar blocking masks, cycled across iterations.
    pub fn blocking(mut self, v: Vec<Vec<bool>>) -> Self {
        self.cfg.blocking = Some(v);
        self
    }

    /// Sets the update rule.
    pub fn update(mut self, v: UpdateRule) -> Self {
        self.cfg.update = v;
        self
    }

    /// Sets the RNG seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.cfg.seed = Some(v);
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<DemcConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
