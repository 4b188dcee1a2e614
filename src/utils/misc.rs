use crate::utils::directional::DirectionalMatrix;
use crate::utils::mat::Matrix;
use std::ops::Shl;
use tracing::warn;

/// Logs and reports whether `x` holds NaN or infinite entries. Nothing is
/// repaired.
pub fn check_abnormal(name: &str, x: &Matrix) -> bool {
    let nan = x.as_slice().iter().filter(|v| v.is_nan()).count();
    let inf = x.as_slice().iter().filter(|v| v.is_infinite()).count();
    if nan + inf > 0 {
        warn!(tensor = name, nan, inf, "non-finite values");
        return true;
    }
    false
}

pub fn rand_next(seed: &mut u32) -> u32 {
    let lo = (std::num::Wrapping(16807) * std::num::Wrapping(*seed & 0xFFFF)).0;
    let hi = (std::num::Wrapping(16807) * std::num::Wrapping(*seed >> 16)).0;
    let val = (std::num::Wrapping(lo)
        + std::num::Wrapping(hi & 0x7FFF).shl(16)
        + std::num::Wrapping(hi >> 15))
    .0;

    *seed = if val > 0x7FFFFFFF {
        val - 0x7FFFFFFF
    } else {
        val
    };
    *seed
}

pub(crate) fn rand_unit(seed: &mut u32) -> f32 {
    (rand_next(seed) >> 8) as f32 / (1u32 << 23) as f32
}

/// Keeps the state inside `[1, 2^31 - 2]`; zero would lock the generator.
pub(crate) fn nonzero(seed: u32) -> u32 {
    let seed = seed % 0x7FFFFFFF;
    if seed == 0 {
        1
    } else {
        seed
    }
}

/// Uniform values in `[0, 1)`.
pub fn uniform(rows: usize, cols: usize, seed: u32) -> Matrix {
    let mut seed = nonzero(seed);
    let mut ret = Matrix::new(rows, cols);
    for i in 0..rows {
        for v in ret.row_mut(i) {
            *v = rand_unit(&mut seed);
        }
    }
    ret
}

/// Uniform directions in `[-1, 1)`.
pub fn uniform_directions(
    batch: usize,
    features: usize,
    directions: usize,
    seed: u32,
) -> DirectionalMatrix {
    let mut seed = nonzero(seed);
    let mut ret = DirectionalMatrix::new(batch, features, directions);
    for v in ret.as_mut_slice() {
        *v = 2.0 * rand_unit(&mut seed) - 1.0;
    }
    ret
}

/// One-hot rows for randomly drawn class labels.
pub fn classification_targets(batch: usize, classes: usize, seed: u32) -> Matrix {
    let mut seed = nonzero(seed);
    let mut ret = Matrix::new(batch, classes);
    if classes == 0 {
        return ret;
    }
    for i in 0..batch {
        let label = rand_next(&mut seed) as usize % classes;
        ret.set(i, label, 1.0);
    }
    ret
}

pub fn regression_targets(batch: usize, features: usize, seed: u32) -> Matrix {
    uniform(batch, features, seed)
}
