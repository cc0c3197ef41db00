//! Acceptance and replacement rules.
//!
//! Sampling mode uses Metropolis-Hastings acceptance and records the
//! per-iteration traces; optimization mode replaces greedily and keeps no
//! traces, the population simply carries the incumbents.

use rand::Rng;

use crate::particle::{Particle, Theta};

/// Metropolis-Hastings acceptance: `p = min(1, exp(w_new - w_cur + log_adj))`,
/// accept iff `u <= p` with `u ~ Uniform(0, 1)`. A NaN exponent rejects, and
/// a `-inf` exponent rejects outright so an out-of-bounds proposal can never
/// displace a finite-weighted state.
pub(crate) fn accept_step<R: Rng>(w_new: f64, w_cur: f64, log_adj: f64, rng: &mut R) -> bool {
    let log_ratio = w_new - w_cur + log_adj;
    if log_ratio.is_nan() || log_ratio == f64::NEG_INFINITY {
        return false;
    }
    let p = log_ratio.exp().min(1.0);
    rng.gen::<f64>() <= p
}

/// Applies one MH step to `current` and records its traces. `lp` stores the
/// post-update weight. Returns whether the proposal was accepted.
pub(crate) fn mh_update(
    current: &mut Particle,
    proposal: Theta,
    w_new: f64,
    log_adj: f64,
) -> bool {
    let w_cur = current.weight;
    let accepted = accept_step(w_new, w_cur, log_adj, &mut current.rng);
    if accepted {
        current.theta = proposal;
        current.weight = w_new;
    }
    current.accept.push(accepted);
    current.lp.push(current.weight);
    accepted
}

/// Greedy replacement: the proposal wins iff strictly better under the
/// configured direction. NaN weights compare false and never replace the
/// incumbent.
pub(crate) fn greedy_update(
    current: &mut Particle,
    proposal: Theta,
    w_new: f64,
    minimize: bool,
) -> bool {
    let better = if minimize {
        w_new < current.weight
    } else {
        w_new > current.weight
    };
    if better {
        current.theta = proposal;
        current.weight = w_new;
    }
    better
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ParamValue;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn particle(weight: f64) -> Particle {
        Particle::new(
            0,
            Theta(vec![ParamValue::Real(0.0)]),
            weight,
            SmallRng::seed_from_u64(1),
        )
    }

    #[test]
    fn test_equal_weights_always_accept() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(accept_step(-3.5, -3.5, 0.0, &mut rng));
        }
    }

    #[test]
    fn test_nan_and_neg_inf_reject() {
        let mut rng = SmallRng::seed_from_u64(7);
        assert!(!accept_step(f64::NAN, -1.0, 0.0, &mut rng));
        assert!(!accept_step(f64::NEG_INFINITY, -1.0, 0.0, &mut rng));
        // Both infinite: the exponent is NaN, which must reject.
        assert!(!accept_step(
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            0.0,
            &mut rng
        ));
    }

    #[test]
    fn test_escape_from_infinite_weight() {
        // A finite proposal always displaces a -inf current state.
        let mut rng = SmallRng::seed_from_u64(7);
        assert!(accept_step(-2.0, f64::NEG_INFINITY, 0.0, &mut rng));
    }

    #[test]
    fn test_mh_update_records_traces() {
        let mut p = particle(-10.0);
        let proposal = Theta(vec![ParamValue::Real(1.0)]);
        let accepted = mh_update(&mut p, proposal, -1.0, 0.0);
        assert!(accepted);
        assert_eq!(p.weight, -1.0);
        assert_eq!(p.accept, vec![true]);
        assert_eq!(p.lp, vec![-1.0]);

        // A hopeless proposal leaves the state alone but still records.
        let rejected = Theta(vec![ParamValue::Real(9.0)]);
        mh_update(&mut p, rejected, f64::NEG_INFINITY, 0.0);
        assert_eq!(p.weight, -1.0);
        assert_eq!(p.accept, vec![true, false]);
        assert_eq!(p.lp, vec![-1.0, -1.0]);
    }

    #[test]
    fn test_greedy_is_strict_and_keeps_no_traces() {
        let mut p = particle(-4.0);
        let same = Theta(vec![ParamValue::Real(2.0)]);
        assert!(!greedy_update(&mut p, same.clone(), -4.0, false));
        assert!(greedy_update(&mut p, same.clone(), -3.0, false));
        assert_eq!(p.weight, -3.0);
        assert!(!greedy_update(&mut p, same.clone(), f64::NAN, false));
        assert!(p.accept.is_empty());
        assert!(p.lp.is_empty());

        let mut q = particle(4.0);
        assert!(greedy_update(&mut q, same, 3.0, true));
        assert_eq!(q.weight, 3.0);
    }
}
