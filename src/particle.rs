/*!
Particles and the vector arithmetic behind the proposal operators.

A [`Theta`] is an ordered list of [`ParamValue`] components, one per named
parameter. It supports the element-wise operators the evolution engine is
built from (`&a + &b`, `&a - &b`, `&a * gamma`), all of which preserve
integer-typed components by rounding half away from zero. A [`Particle`] is
one Markov chain's state: a position, its weight, a stable id, per-iteration
acceptance and log-posterior traces, and a chain-specific RNG.

# Examples

```rust
use demc::particle::Theta;
use demc::value::ParamValue;

let a = Theta(vec![ParamValue::Real(1.0), ParamValue::Int(4)]);
let b = Theta(vec![ParamValue::Real(0.5), ParamValue::Int(1)]);
let y = &(&a - &b) * 0.7;
assert_eq!(y[0], ParamValue::Real(0.35));
assert_eq!(y[1], ParamValue::Int(2)); // 3 * 0.7 = 2.1 rounds to 2
```
*/

use std::ops::{Add, Deref, Mul, Sub};

use rand::rngs::SmallRng;

use crate::value::ParamValue;

/// A point in parameter space: one [`ParamValue`] per top-level component.
#[derive(Debug, Clone, PartialEq)]
pub struct Theta(pub Vec<ParamValue>);

impl Deref for Theta {
    type Target = [ParamValue];

    fn deref(&self) -> &[ParamValue] {
        &self.0
    }
}

impl Theta {
    /// Total number of scalar entries across all components.
    pub fn flat_len(&self) -> usize {
        self.0.iter().map(|v| v.flat_len()).sum()
    }

    /// All scalar entries in order, arrays expanded column-major.
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.flat_len());
        for v in &self.0 {
            v.flatten_into(&mut out);
        }
        out
    }

    /// Returns `true` if `other` has the same component variants and shapes.
    pub fn same_structure(&self, other: &Theta) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.same_structure(b))
    }

    /// Inner product over the flattened scalar entries.
    pub fn dot(&self, other: &Theta) -> f64 {
        self.flatten()
            .iter()
            .zip(other.flatten().iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Euclidean norm over the flattened scalar entries.
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Reads the scalar entry at flat offset `k`.
    pub(crate) fn get_flat(&self, k: usize) -> f64 {
        let (c, offset) = self.locate(k);
        self.0[c].get_flat(offset)
    }

    /// Writes the scalar entry at flat offset `k`, rounding when the target
    /// component is integer-typed.
    pub(crate) fn set_flat(&mut self, k: usize, v: f64) {
        let (c, offset) = self.locate(k);
        self.0[c].set_flat(offset, v);
    }

    fn locate(&self, k: usize) -> (usize, usize) {
        let mut rem = k;
        for (c, v) in self.0.iter().enumerate() {
            let len = v.flat_len();
            if rem < len {
                return (c, rem);
            }
            rem -= len;
        }
        panic!("flat index {k} out of range for theta of length {}", self.flat_len());
    }

    /// Applies `f` to every scalar entry, preserving integer components.
    pub(crate) fn map_scalars(&self, mut f: impl FnMut(f64) -> f64) -> Theta {
        Theta(self.0.iter().map(|v| v.map(&mut f)).collect())
    }

    /// Flattened parameter names: plain names for scalar components,
    /// `name[i,j,..]` with 1-based column-major indices for arrays.
    pub fn flat_names(&self, names: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(self.flat_len());
        for (v, name) in self.0.iter().zip(names) {
            v.push_flat_names(name, &mut out);
        }
        out
    }
}

impl Add<&Theta> for &Theta {
    type Output = Theta;

    fn add(self, rhs: &Theta) -> Theta {
        Theta(
            self.0
                .iter()
                .zip(rhs.0.iter())
                .map(|(a, b)| a.combine(b, |x, y| x + y))
                .collect(),
        )
    }
}

impl Sub<&Theta> for &Theta {
    type Output = Theta;

    fn sub(self, rhs: &Theta) -> Theta {
        Theta(
            self.0
                .iter()
                .zip(rhs.0.iter())
                .map(|(a, b)| a.combine(b, |x, y| x - y))
                .collect(),
        )
    }
}

impl Mul<f64> for &Theta {
    type Output = Theta;

    fn mul(self, rhs: f64) -> Theta {
        Theta(self.0.iter().map(|v| v.scale(rhs)).collect())
    }
}

/// Projection used by the snooker update: `p2` scaled by
/// `<p1, p2> / <p2, p2>`, where the inner product runs over all flattened
/// scalar entries.
pub fn project(p1: &Theta, p2: &Theta) -> Theta {
    p2 * (p1.dot(p2) / p2.dot(p2))
}

/// Returns `true` iff every scalar entry of every component lies within its
/// paired `[lo, hi]` interval.
pub fn in_bounds(bounds: &[(f64, f64)], theta: &Theta) -> bool {
    theta
        .iter()
        .zip(bounds.iter())
        .all(|(v, &(lo, hi))| v.in_bounds(lo, hi))
}

/// One Markov chain's state inside the population.
#[derive(Debug, Clone)]
pub struct Particle {
    /// Current position in parameter space.
    pub theta: Theta,
    /// Current weight: log posterior when sampling, objective value when
    /// optimizing. Non-finite values mark out-of-bounds positions.
    pub weight: f64,
    /// Stable identity in `[0, n_particles)`; indexes the sample tensor's
    /// third axis and survives migration.
    pub id: usize,
    /// Per-iteration acceptance trace (sampling mode only).
    pub accept: Vec<bool>,
    /// Per-iteration weight trace (sampling mode only).
    pub lp: Vec<f64>,
    /// Chain-specific RNG, seeded `global_seed + id` for reproducibility.
    pub(crate) rng: SmallRng,
}

impl Particle {
    pub(crate) fn new(id: usize, theta: Theta, weight: f64, rng: SmallRng) -> Self {
        Self {
            theta,
            weight,
            id,
            accept: Vec::new(),
            lp: Vec::new(),
            rng,
        }
    }
}
