/*!
Tagged parameter components and the type-preserving arithmetic that lets
continuous and discrete parameters share a single proposal vector.

Each top-level parameter component is a [`ParamValue`]: a scalar or an
n-dimensional array, real- or integer-valued. The component structure of a
run is fixed by the first prior draw. Arithmetic between components is
element-wise; whenever an integer component meets a real operand the result
is rounded back to an integer, so discrete parameters stay discrete through
differential mutation, jitter and snooker moves.

The flattened scalar view used by the sample storage enumerates array
entries in column-major order (first axis fastest), with 1-based bracket
suffixes on the expanded names (`"w[2,1]"`).

# Examples

```rust
use demc::value::ParamValue;

let k = ParamValue::Int(7);
// Multiplying an integer component by a real scalar rounds the result.
let scaled = k.scale(0.6);
assert_eq!(scaled, ParamValue::Int(4));
```
*/

use ndarray::{ArrayD, Dimension, IxDyn, Zip};

/// Rounds half away from zero (`0.5 -> 1`, `-0.5 -> -1`), which is exactly
/// what [`f64::round`] does. Every integer-preserving operation in the crate
/// uses this tie-break.
#[inline]
pub(crate) fn round_int(x: f64) -> i64 {
    x.round() as i64
}

/// One top-level parameter component: scalar or array, real or integer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A real-valued scalar.
    Real(f64),
    /// An integer-valued scalar.
    Int(i64),
    /// An n-dimensional real-valued array.
    RealArray(ArrayD<f64>),
    /// An n-dimensional integer-valued array.
    IntArray(ArrayD<i64>),
}

/// Maps a column-major flat offset to an ndarray index (first axis varies
/// fastest).
fn colmajor_index(shape: &[usize], k: usize) -> IxDyn {
    let mut ix = vec![0usize; shape.len()];
    let mut rem = k;
    for (axis, &len) in shape.iter().enumerate() {
        ix[axis] = rem % len;
        rem /= len;
    }
    IxDyn(&ix)
}

impl ParamValue {
    /// Number of scalar entries in this component.
    pub fn flat_len(&self) -> usize {
        match self {
            ParamValue::Real(_) | ParamValue::Int(_) => 1,
            ParamValue::RealArray(a) => a.len(),
            ParamValue::IntArray(a) => a.len(),
        }
    }

    /// Returns `true` for the integer-valued variants.
    pub fn is_integer(&self) -> bool {
        matches!(self, ParamValue::Int(_) | ParamValue::IntArray(_))
    }

    /// Returns `true` if `other` has the same variant and shape.
    pub fn same_structure(&self, other: &ParamValue) -> bool {
        match (self, other) {
            (ParamValue::Real(_), ParamValue::Real(_)) => true,
            (ParamValue::Int(_), ParamValue::Int(_)) => true,
            (ParamValue::RealArray(a), ParamValue::RealArray(b)) => a.shape() == b.shape(),
            (ParamValue::IntArray(a), ParamValue::IntArray(b)) => a.shape() == b.shape(),
            _ => false,
        }
    }

    /// The scalar value of this component as `f64`.
    ///
    /// # Panics
    ///
    /// Panics if the component is array-valued.
    pub fn as_real(&self) -> f64 {
        match self {
            ParamValue::Real(x) => *x,
            ParamValue::Int(x) => *x as f64,
            _ => panic!("as_real called on an array component"),
        }
    }

    /// The scalar value of this component as `i64`.
    ///
    /// # Panics
    ///
    /// Panics if the component is not an integer scalar.
    pub fn as_int(&self) -> i64 {
        match self {
            ParamValue::Int(x) => *x,
            _ => panic!("as_int called on a non-integer-scalar component"),
        }
    }

    /// Element-wise binary operation with type preservation: if either
    /// operand is integer-valued, the result is integer-valued, produced by
    /// rounding half away from zero.
    ///
    /// # Panics
    ///
    /// Panics if the operands differ in shape. The engine validates the
    /// component structure when particles are initialized, so this only
    /// fires on an internal bug.
    pub(crate) fn combine(&self, other: &ParamValue, f: impl Fn(f64, f64) -> f64) -> ParamValue {
        use ParamValue::*;
        match (self, other) {
            (Real(a), Real(b)) => Real(f(*a, *b)),
            (Int(a), Int(b)) => Int(round_int(f(*a as f64, *b as f64))),
            (Int(a), Real(b)) => Int(round_int(f(*a as f64, *b))),
            (Real(a), Int(b)) => Int(round_int(f(*a, *b as f64))),
            (RealArray(a), RealArray(b)) => {
                RealArray(Zip::from(a).and(b).map_collect(|&x, &y| f(x, y)))
            }
            (IntArray(a), IntArray(b)) => IntArray(
                Zip::from(a)
                    .and(b)
                    .map_collect(|&x, &y| round_int(f(x as f64, y as f64))),
            ),
            (IntArray(a), RealArray(b)) => IntArray(
                Zip::from(a)
                    .and(b)
                    .map_collect(|&x, &y| round_int(f(x as f64, y))),
            ),
            (RealArray(a), IntArray(b)) => IntArray(
                Zip::from(a)
                    .and(b)
                    .map_collect(|&x, &y| round_int(f(x, y as f64))),
            ),
            (a, b) => panic!("component structure mismatch: {a:?} vs {b:?}"),
        }
    }

    /// Element-wise unary operation with type preservation. Integer
    /// components are rounded after applying `f`.
    pub(crate) fn map(&self, mut f: impl FnMut(f64) -> f64) -> ParamValue {
        match self {
            ParamValue::Real(a) => ParamValue::Real(f(*a)),
            ParamValue::Int(a) => ParamValue::Int(round_int(f(*a as f64))),
            ParamValue::RealArray(a) => ParamValue::RealArray(a.mapv(|x| f(x))),
            ParamValue::IntArray(a) => ParamValue::IntArray(a.mapv(|x| round_int(f(x as f64)))),
        }
    }

    /// Multiplies every entry by `s`, rounding integer components.
    pub fn scale(&self, s: f64) -> ParamValue {
        self.map(|x| x * s)
    }

    /// Appends all scalar entries to `out` in column-major order.
    pub(crate) fn flatten_into(&self, out: &mut Vec<f64>) {
        match self {
            ParamValue::Real(x) => out.push(*x),
            ParamValue::Int(x) => out.push(*x as f64),
            ParamValue::RealArray(a) => {
                for k in 0..a.len() {
                    out.push(a[colmajor_index(a.shape(), k)]);
                }
            }
            ParamValue::IntArray(a) => {
                for k in 0..a.len() {
                    out.push(a[colmajor_index(a.shape(), k)] as f64);
                }
            }
        }
    }

    /// Reads the scalar entry at column-major offset `k`.
    pub(crate) fn get_flat(&self, k: usize) -> f64 {
        match self {
            ParamValue::Real(x) => *x,
            ParamValue::Int(x) => *x as f64,
            ParamValue::RealArray(a) => a[colmajor_index(a.shape(), k)],
            ParamValue::IntArray(a) => a[colmajor_index(a.shape(), k)] as f64,
        }
    }

    /// Writes the scalar entry at column-major offset `k`. Integer
    /// components round the incoming value.
    pub(crate) fn set_flat(&mut self, k: usize, v: f64) {
        match self {
            ParamValue::Real(x) => *x = v,
            ParamValue::Int(x) => *x = round_int(v),
            ParamValue::RealArray(a) => {
                let ix = colmajor_index(a.shape(), k);
                a[ix] = v;
            }
            ParamValue::IntArray(a) => {
                let ix = colmajor_index(a.shape(), k);
                a[ix] = round_int(v);
            }
        }
    }

    /// Returns `true` iff every scalar entry lies in `[lo, hi]`. NaN
    /// entries are out of bounds.
    pub(crate) fn in_bounds(&self, lo: f64, hi: f64) -> bool {
        match self {
            ParamValue::Real(x) => *x >= lo && *x <= hi,
            ParamValue::Int(x) => {
                let x = *x as f64;
                x >= lo && x <= hi
            }
            ParamValue::RealArray(a) => a.iter().all(|&x| x >= lo && x <= hi),
            ParamValue::IntArray(a) => a.iter().all(|&x| {
                let x = x as f64;
                x >= lo && x <= hi
            }),
        }
    }

    /// Appends the flattened names for this component: `base` for scalars,
    /// `base[i,j,..]` with 1-based column-major indices for arrays.
    pub(crate) fn push_flat_names(&self, base: &str, out: &mut Vec<String>) {
        match self {
            ParamValue::Real(_) | ParamValue::Int(_) => out.push(base.to_string()),
            ParamValue::RealArray(a) => push_array_names(base, a.shape(), out),
            ParamValue::IntArray(a) => push_array_names(base, a.shape(), out),
        }
    }
}

fn push_array_names(base: &str, shape: &[usize], out: &mut Vec<String>) {
    let len: usize = shape.iter().product();
    for k in 0..len {
        let ix = colmajor_index(shape, k);
        let suffix: Vec<String> = ix.slice().iter().map(|&i| (i + 1).to_string()).collect();
        out.push(format!("{base}[{}]", suffix.join(",")));
    }
}
