//! Missing-value convention and small numeric helpers.

/// Sentinel for a missing value. Never a legal physical value.
pub const MISSING: f32 = f32::NAN;

/// True if `value` is neither missing nor infinite.
#[inline]
pub fn is_valid(value: f32) -> bool {
    value.is_finite()
}

/// True if every value in the slice is valid.
#[inline]
pub fn all_valid(values: &[f32]) -> bool {
    values.iter().all(|&v| is_valid(v))
}

/// Maps the real line onto (0, 1).
pub fn inv_logit(x: f32) -> f32 {
    (1.0 / (1.0 + (-(x as f64)).exp())) as f32
}

/// Equality where two missing values compare equal.
#[inline]
pub fn same_value(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Element-wise [`same_value`] over two slices of equal length.
pub fn same_values(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| same_value(x, y))
}

/// Piecewise-linear interpolation of `x` through the curve `(xs, ys)`.
///
/// `xs` must be sorted ascending. Values beyond either end take the end value.
/// When `x` hits a run of equal breakpoints, the mean of the run's end values
/// is returned.
pub fn interpolate(x: f32, xs: &[f32], ys: &[f32]) -> f32 {
    if !is_valid(x) || xs.is_empty() || xs.len() != ys.len() {
        return MISSING;
    }
    let last = xs.len() - 1;
    if x > xs[last] {
        return ys[last];
    }
    if x < xs[0] {
        return ys[0];
    }

    // xs[0] <= x <= xs[last], so both searches stay in bounds
    let lower = xs.partition_point(|&v| v <= x) - 1;
    let upper = xs.partition_point(|&v| v < x);
    let (x0, x1) = (xs[lower], xs[upper]);
    let (y0, y1) = (ys[lower], ys[upper]);
    if x0 == x1 {
        (y0 + y1) / 2.0
    } else {
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}
