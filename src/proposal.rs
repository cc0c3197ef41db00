/*!
Proposal operators of the evolution engine.

For a particle `x` in a group, one proposal is built from peers of the same
group, read from the snapshot taken at the start of the iteration:

- **Differential mutation** (the default move): `y = x + gamma * (a - b) + eps`
  with two distinct peers `a`, `b`, a scale factor `gamma` drawn by the
  configured [`GammaPolicy`], and a small uniform jitter `eps`. A crossover
  mask then reverts each scalar entry to the current value with probability
  `crossover_prob`, keeping at least one mutated entry.
- **Snooker update** (with probability `snooker_prob`): three distinct peers
  `z`, `a`, `b`; the peers are projected onto the direction `u = x - z` and
  the proposal `y = x + gamma_s * (a' - b')` moves along that line, with
  `gamma_s ~ Uniform(1.2, 2.2)`. The move carries the Jacobian-style
  log-adjustment `(d - 1) * (ln |y - z| - ln |x - z|)` into the acceptance
  step. A zero-length direction falls back to differential mutation.

When blocking masks are configured only the active scalar entries may
change; all others are copied back from `x` after the proposal is computed,
and `gamma` uses the active entry count as its effective dimension.
*/

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::config::{DemcConfig, GammaPolicy};
use crate::particle::{project, Theta};

/// A candidate position plus the log-adjustment entering MH acceptance.
pub(crate) struct Proposal {
    pub theta: Theta,
    pub log_adj: f64,
}

/// Builds one proposal for the particle at `own` against its group
/// snapshot. `d` is the total flattened scalar dimension.
pub(crate) fn propose<R: Rng>(
    snapshot: &[Theta],
    own: usize,
    d: usize,
    block: Option<&[bool]>,
    cfg: &DemcConfig,
    rng: &mut R,
) -> Proposal {
    let x = &snapshot[own];
    let active: Vec<usize> = match block {
        Some(mask) => mask
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b)
            .map(|(k, _)| k)
            .collect(),
        None => (0..d).collect(),
    };

    let snooker_move = if cfg.snooker_prob > 0.0 && rng.gen_bool(cfg.snooker_prob) {
        snooker(snapshot, own, rng)
    } else {
        None
    };

    let (mut y, snooker_z) = match snooker_move {
        Some((y, z)) => (y, Some(z)),
        None => (
            differential(snapshot, own, active.len(), cfg, rng),
            None,
        ),
    };

    if snooker_z.is_none() && cfg.crossover_prob > 0.0 {
        crossover(x, &mut y, &active, cfg.crossover_prob, rng);
    }

    if let Some(mask) = block {
        for (k, &keep) in mask.iter().enumerate() {
            if !keep {
                y.set_flat(k, x.get_flat(k));
            }
        }
    }

    // The adjustment uses the final proposal, after any blocking restore.
    let log_adj = match snooker_z {
        Some(z) => (d as f64 - 1.0) * ((&y - &z).norm().ln() - (x - &z).norm().ln()),
        None => 0.0,
    };

    Proposal { theta: y, log_adj }
}

/// Differential mutation: `x + gamma * (a - b) + eps`.
fn differential<R: Rng>(
    snapshot: &[Theta],
    own: usize,
    d_eff: usize,
    cfg: &DemcConfig,
    rng: &mut R,
) -> Theta {
    let peers = distinct_peers(own, 2, snapshot.len(), rng);
    let (a, b) = (&snapshot[peers[0]], &snapshot[peers[1]]);
    let g = gamma(cfg.gamma, d_eff, rng);
    let x = &snapshot[own];
    let mut y = x + &(&(a - b) * g);
    if cfg.jitter > 0.0 {
        let eps = Uniform::new(-cfg.jitter, cfg.jitter);
        y = y.map_scalars(|v| v + eps.sample(rng));
    }
    y
}

/// Snooker update. Returns the raw proposal and the anchor `z`, or `None`
/// when the direction `x - z` is degenerate.
fn snooker<R: Rng>(snapshot: &[Theta], own: usize, rng: &mut R) -> Option<(Theta, Theta)> {
    let peers = distinct_peers(own, 3, snapshot.len(), rng);
    let (z, a, b) = (&snapshot[peers[0]], &snapshot[peers[1]], &snapshot[peers[2]]);
    let x = &snapshot[own];
    let u = x - z;
    if u.norm() == 0.0 {
        return None;
    }
    // Project the peers onto the x - z line so the move stays on it; this
    // is what makes the (d - 1) log-adjustment exact.
    let a_p = project(a, &u);
    let b_p = project(b, &u);
    let gamma_s = rng.gen_range(1.2..2.2);
    let y = x + &(&(&a_p - &b_p) * gamma_s);
    Some((y, z.clone()))
}

/// Per-scalar crossover: revert each active entry to the current value with
/// probability `cr`, keeping at least one entry from the mutation.
fn crossover<R: Rng>(x: &Theta, y: &mut Theta, active: &[usize], cr: f64, rng: &mut R) {
    let mut revert: Vec<bool> = active.iter().map(|_| rng.gen::<f64>() < cr).collect();
    if revert.iter().all(|&r| r) {
        let forced = rng.gen_range(0..active.len());
        revert[forced] = false;
    }
    for (i, &k) in active.iter().enumerate() {
        if revert[i] {
            y.set_flat(k, x.get_flat(k));
        }
    }
}

/// Scale factor on the differential vector. `d_eff` is the number of scalar
/// entries currently being updated.
pub(crate) fn gamma<R: Rng>(policy: GammaPolicy, d_eff: usize, rng: &mut R) -> f64 {
    let fixed = 2.38 / (2.0 * d_eff as f64).sqrt();
    match policy {
        GammaPolicy::Fixed => fixed,
        GammaPolicy::Variable => rng.gen_range(0.5..1.0) * fixed,
        // Uniform(0.5, 1.5) times the fixed value: a narrow symmetric
        // multiplicative spread around the fixed step size.
        GammaPolicy::Random => rng.gen_range(0.5..1.5) * fixed,
    }
}

/// Draws `count` distinct indices from `0..pool`, never returning
/// `exclude`. Selection order is the draw order, so seeded runs are
/// reproducible.
pub(crate) fn distinct_peers<R: Rng + ?Sized>(
    exclude: usize,
    count: usize,
    pool: usize,
    rng: &mut R,
) -> Vec<usize> {
    debug_assert!(count <= pool.saturating_sub(1));
    let mut selected = Vec::with_capacity(count);
    while selected.len() < count {
        let idx = rng.gen_range(0..pool);
        if idx != exclude && !selected.contains(&idx) {
            selected.push(idx);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemcConfigBuilder;
    use crate::value::ParamValue;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn real_theta(values: &[f64]) -> Theta {
        Theta(values.iter().map(|&v| ParamValue::Real(v)).collect())
    }

    fn config() -> crate::config::DemcConfig {
        DemcConfigBuilder::new()
            .bounds(vec![(-100.0, 100.0); 3])
            .build()
            .unwrap()
    }

    #[test]
    fn test_distinct_peers_exclude_and_uniqueness() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..200 {
            let peers = distinct_peers(2, 3, 8, &mut rng);
            assert_eq!(peers.len(), 3);
            assert!(!peers.contains(&2));
            let mut sorted = peers.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 3, "duplicate peer in {peers:?}");
        }
    }

    #[test]
    fn test_gamma_fixed_formula() {
        let mut rng = SmallRng::seed_from_u64(3);
        let g = gamma(GammaPolicy::Fixed, 2, &mut rng);
        assert!((g - 2.38 / 2.0).abs() < 1e-12);

        for _ in 0..100 {
            let v = gamma(GammaPolicy::Variable, 2, &mut rng);
            assert!(v >= 0.5 * 2.38 / 2.0 && v < 2.38 / 2.0);
            let r = gamma(GammaPolicy::Random, 2, &mut rng);
            assert!(r >= 0.5 * 2.38 / 2.0 && r < 1.5 * 2.38 / 2.0);
        }
    }

    #[test]
    fn test_crossover_keeps_at_least_one_mutated_entry() {
        let x = real_theta(&[0.0, 0.0, 0.0]);
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..100 {
            let mut y = real_theta(&[1.0, 1.0, 1.0]);
            crossover(&x, &mut y, &[0, 1, 2], 1.0, &mut rng);
            let mutated = y.flatten().iter().filter(|&&v| v == 1.0).count();
            assert_eq!(mutated, 1, "exactly one entry survives full reversion");
        }
    }

    #[test]
    fn test_blocking_restores_inactive_entries() {
        let snapshot: Vec<Theta> = vec![
            real_theta(&[0.0, 10.0, 0.0]),
            real_theta(&[1.0, 20.0, 2.0]),
            real_theta(&[-1.0, 30.0, 1.0]),
            real_theta(&[2.0, 40.0, -2.0]),
        ];
        let mask = [true, false, true];
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..50 {
            let p = propose(&snapshot, 0, 3, Some(&mask), &config(), &mut rng);
            assert_eq!(p.theta.get_flat(1), 10.0, "inactive entry must not move");
        }
    }

    #[test]
    fn test_degenerate_snooker_falls_back_to_mutation() {
        // Every peer sits on the same point, so u = x - z is always zero.
        let snapshot: Vec<Theta> = (0..5).map(|_| real_theta(&[1.0, 2.0, 3.0])).collect();
        let mut cfg = config();
        cfg.snooker_prob = 1.0;
        let mut rng = SmallRng::seed_from_u64(5);
        let p = propose(&snapshot, 0, 3, None, &cfg, &mut rng);
        assert_eq!(p.log_adj, 0.0);
        // Differential part is zero, so only jitter remains.
        for (got, want) in p.theta.flatten().iter().zip([1.0, 2.0, 3.0]) {
            assert!((got - want).abs() <= cfg.jitter);
        }
    }

    #[test]
    fn test_snooker_moves_along_the_direction() {
        let snapshot: Vec<Theta> = vec![
            real_theta(&[1.0, 0.0, 0.0]),
            real_theta(&[0.0, 1.0, 0.5]),
            real_theta(&[0.0, -1.0, 2.0]),
            real_theta(&[0.5, 0.5, 1.0]),
            real_theta(&[-0.5, 1.5, 0.0]),
        ];
        let mut rng = SmallRng::seed_from_u64(17);
        for _ in 0..100 {
            let peers = distinct_peers(0, 3, snapshot.len(), &mut rng);
            let (z, a, b) = (&snapshot[peers[0]], &snapshot[peers[1]], &snapshot[peers[2]]);
            let x = &snapshot[0];
            let u = x - z;
            let step = &project(a, &u) - &project(b, &u);
            // The displacement is colinear with u: cross terms vanish.
            let cos = step.dot(&u).abs() / (step.norm() * u.norm());
            if step.norm() > 0.0 {
                assert!((cos - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_integer_components_stay_integer() {
        let snapshot: Vec<Theta> = vec![
            Theta(vec![ParamValue::Int(5), ParamValue::Real(0.5)]),
            Theta(vec![ParamValue::Int(9), ParamValue::Real(1.5)]),
            Theta(vec![ParamValue::Int(2), ParamValue::Real(-0.5)]),
            Theta(vec![ParamValue::Int(7), ParamValue::Real(0.0)]),
        ];
        let mut cfg = config();
        cfg.bounds = vec![(0.0, 20.0), (-5.0, 5.0)];
        cfg.snooker_prob = 0.5;
        let mut rng = SmallRng::seed_from_u64(23);
        for _ in 0..200 {
            let p = propose(&snapshot, 0, 2, None, &cfg, &mut rng);
            assert!(matches!(p.theta[0], ParamValue::Int(_)));
            assert!(matches!(p.theta[1], ParamValue::Real(_)));
        }
    }
}
