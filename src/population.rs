//! Groups of particles and the per-iteration group scheduler.
//!
//! The population is partitioned once, in id order, into `n_groups`
//! contiguous groups; the partition is stable for the whole run. Each
//! iteration every group steps all of its particles against a snapshot of
//! the group taken at the start of the iteration, so peer reads only ever
//! see state from the end of the previous iteration regardless of update
//! order or parallelism. Groups are independent within an iteration and are
//! stepped in parallel; they interact only through migration.

use rayon::prelude::*;

use crate::config::{DemcConfig, UpdateRule};
use crate::error::Result;
use crate::model::{compute_posterior, evaluate_objective, Model};
use crate::particle::{Particle, Theta};
use crate::proposal::propose;
use crate::update::{greedy_update, mh_update};

/// An ordered pool of particles that propose against each other.
#[derive(Debug, Clone)]
pub struct Group {
    /// The particles owned by this group, in slot order.
    pub particles: Vec<Particle>,
}

impl Group {
    /// Runs one iteration for every particle in this group.
    pub(crate) fn step<M: Model>(
        &mut self,
        model: &M,
        cfg: &DemcConfig,
        d: usize,
        block: Option<&[bool]>,
    ) -> Result<()> {
        // Peer draws must read the iteration-start state; updates below go
        // to the live particles.
        let snapshot: Vec<Theta> = self.particles.iter().map(|p| p.theta.clone()).collect();
        for (slot, particle) in self.particles.iter_mut().enumerate() {
            let proposal = propose(&snapshot, slot, d, block, cfg, &mut particle.rng);
            match cfg.update {
                UpdateRule::MetropolisHastings => {
                    let w = compute_posterior(model, &proposal.theta, &cfg.bounds)?;
                    mh_update(particle, proposal.theta, w, proposal.log_adj);
                }
                UpdateRule::Maximize => {
                    let w = evaluate_objective(model, &proposal.theta, &cfg.bounds, false)?;
                    greedy_update(particle, proposal.theta, w, false);
                }
                UpdateRule::Minimize => {
                    let w = evaluate_objective(model, &proposal.theta, &cfg.bounds, true)?;
                    greedy_update(particle, proposal.theta, w, true);
                }
            }
        }
        Ok(())
    }
}

/// The whole population, partitioned into groups.
#[derive(Debug, Clone)]
pub struct Population {
    /// The groups, in partition order.
    pub groups: Vec<Group>,
}

impl Population {
    /// Partitions `particles` (in id order) into contiguous groups of
    /// `per_group` particles each.
    pub(crate) fn partition(particles: Vec<Particle>, per_group: usize) -> Self {
        let mut groups = Vec::with_capacity(particles.len() / per_group);
        let mut particles = particles;
        while !particles.is_empty() {
            let rest = particles.split_off(per_group.min(particles.len()));
            groups.push(Group {
                particles,
            });
            particles = rest;
        }
        Self { groups }
    }

    /// Total number of particles across all groups.
    pub fn n_particles(&self) -> usize {
        self.groups.iter().map(|g| g.particles.len()).sum()
    }

    /// Iterates over every particle in every group.
    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.groups.iter().flat_map(|g| g.particles.iter())
    }

    /// Mutable iteration over every particle.
    pub(crate) fn particles_mut(&mut self) -> impl Iterator<Item = &mut Particle> {
        self.groups.iter_mut().flat_map(|g| g.particles.iter_mut())
    }

    /// Steps all groups for one iteration, in parallel. The first callback
    /// error aborts the iteration.
    pub(crate) fn step_groups<M: Model + Sync>(
        &mut self,
        model: &M,
        cfg: &DemcConfig,
        d: usize,
        block: Option<&[bool]>,
    ) -> Result<()> {
        self.groups
            .par_iter_mut()
            .map(|g| g.step(model, cfg, d, block))
            .collect()
    }

    /// The best particle under the configured comparator.
    pub(crate) fn best(&self, minimize: bool) -> &Particle {
        let better = |a: f64, b: f64| if minimize { a < b } else { a > b };
        let mut best = self
            .particles()
            .next()
            .expect("population is never empty");
        for p in self.particles() {
            if better(p.weight, best.weight) {
                best = p;
            }
        }
        best
    }
}
