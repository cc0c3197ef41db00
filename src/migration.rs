//! Cross-group migration.
//!
//! Every `migration_interval` iterations (with probability
//! `migration_prob`) a random subset of at least two groups exchanges one
//! particle each: within every selected group a particle is chosen with
//! probability proportional to `exp(-weight)`, so poorly supported states
//! are the likely emigrants, and the chosen particles are rotated right by
//! one position across the selected groups. Weights travel verbatim; the
//! receiving group never re-evaluates them.

use rand::Rng;

use crate::population::{Group, Population};

/// Runs one migration step over `pop`. No-op when fewer than two groups
/// exist.
pub(crate) fn migrate<R: Rng>(pop: &mut Population, rng: &mut R) {
    let n_groups = pop.groups.len();
    if n_groups < 2 {
        return;
    }
    let k = rng.gen_range(2..=n_groups);

    // k distinct groups, sampled without replacement.
    let mut group_ids: Vec<usize> = (0..n_groups).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n_groups);
        group_ids.swap(i, j);
    }
    let chosen = &group_ids[..k];

    let slots: Vec<usize> = chosen
        .iter()
        .map(|&g| select_emigrant(&pop.groups[g], rng))
        .collect();
    let copies: Vec<_> = chosen
        .iter()
        .zip(&slots)
        .map(|(&g, &s)| pop.groups[g].particles[s].clone())
        .collect();

    // Rotate right by one: the slot selected in group i receives the
    // particle exported by group i - 1.
    for (i, (&g, &s)) in chosen.iter().zip(&slots).enumerate() {
        pop.groups[g].particles[s] = copies[(i + k - 1) % k].clone();
    }
}

/// Picks the exported slot of a group: probability proportional to
/// `exp(-weight)`, so lower-weighted particles are exported more often.
/// If the softmax degenerates (non-finite mass or all-zero mass) the single
/// worst particle is exported.
fn select_emigrant<R: Rng>(group: &Group, rng: &mut R) -> usize {
    let masses: Vec<f64> = group.particles.iter().map(|p| (-p.weight).exp()).collect();
    let total: f64 = masses.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return worst_slot(group);
    }
    let mut t = rng.gen::<f64>() * total;
    for (slot, m) in masses.iter().enumerate() {
        t -= m;
        if t <= 0.0 {
            return slot;
        }
    }
    group.particles.len() - 1
}

/// Slot of the lowest-weighted particle.
fn worst_slot(group: &Group) -> usize {
    let mut worst = 0;
    for (slot, p) in group.particles.iter().enumerate() {
        if p.weight < group.particles[worst].weight {
            worst = slot;
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Particle, Theta};
    use crate::population::Population;
    use crate::value::ParamValue;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn make_population(n_groups: usize, per_group: usize) -> Population {
        let particles: Vec<Particle> = (0..n_groups * per_group)
            .map(|id| {
                Particle::new(
                    id,
                    Theta(vec![ParamValue::Real(id as f64)]),
                    -(id as f64),
                    SmallRng::seed_from_u64(1000 + id as u64),
                )
            })
            .collect();
        Population::partition(particles, per_group)
    }

    fn group_of(pop: &Population, id: usize) -> usize {
        pop.groups
            .iter()
            .position(|g| g.particles.iter().any(|p| p.id == id))
            .unwrap()
    }

    #[test]
    fn test_migration_preserves_the_population() {
        let mut pop = make_population(3, 4);
        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..20 {
            migrate(&mut pop, &mut rng);
        }
        assert_eq!(pop.n_particles(), 12);
        let mut ids: Vec<usize> = pop.particles().map(|p| p.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_migration_moves_at_least_one_particle() {
        let mut pop = make_population(3, 4);
        let before: Vec<usize> = (0..12).map(|id| group_of(&pop, id)).collect();
        let mut rng = SmallRng::seed_from_u64(4);
        migrate(&mut pop, &mut rng);
        let after: Vec<usize> = (0..12).map(|id| group_of(&pop, id)).collect();
        let moved = before.iter().zip(&after).filter(|(b, a)| b != a).count();
        assert!(moved >= 2, "a migration step must relocate particles");
    }

    #[test]
    fn test_weights_travel_verbatim() {
        let mut pop = make_population(2, 4);
        let mut weights_before: Vec<f64> = pop.particles().map(|p| p.weight).collect();
        let mut rng = SmallRng::seed_from_u64(2);
        migrate(&mut pop, &mut rng);
        let mut weights_after: Vec<f64> = pop.particles().map(|p| p.weight).collect();
        weights_before.sort_by(f64::total_cmp);
        weights_after.sort_by(f64::total_cmp);
        assert_eq!(weights_before, weights_after);
    }

    #[test]
    fn test_degenerate_softmax_exports_the_worst() {
        let mut pop = make_population(1, 4);
        // A -inf weight blows up exp(-w); selection must fall back to the
        // single worst particle.
        pop.groups[0].particles[2].weight = f64::NEG_INFINITY;
        let mut rng = SmallRng::seed_from_u64(2);
        let slot = select_emigrant(&pop.groups[0], &mut rng);
        assert_eq!(slot, 2);

        // All-NaN weights also fall back instead of panicking.
        for p in &mut pop.groups[0].particles {
            p.weight = f64::NAN;
        }
        let slot = select_emigrant(&pop.groups[0], &mut rng);
        assert_eq!(slot, 0);
    }
}
