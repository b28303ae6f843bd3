//! Small fixed-size vector helpers shared by the integrator and the resolver.

/// In-plane dot product of the first two components.
#[inline]
pub fn dot2(a: &[f64], b: &[f64]) -> f64 {
    a[0] * b[0] + a[1] * b[1]
}

#[inline]
pub fn dot3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Squared magnitude of a 3-vector.
#[inline]
pub fn mag2(a: &[f64; 3]) -> f64 {
    dot3(a, a)
}

#[inline]
pub fn cross3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Mirror the in-plane part of `v` about the line with unit normal `n`.
///
/// The out-of-plane component is left untouched.
#[inline]
pub fn mirror2(v: &mut [f64; 3], n: [f64; 2]) {
    let vn = dot2(v, &n);
    v[0] -= 2.0 * vn * n[0];
    v[1] -= 2.0 * vn * n[1];
}

/// Normalize a 2-vector, returning `None` for a zero-length input.
#[inline]
pub fn unit2(a: [f64; 2]) -> Option<[f64; 2]> {
    let len = (a[0] * a[0] + a[1] * a[1]).sqrt();
    if len <= f64::EPSILON || !len.is_finite() {
        return None;
    }
    Some([a[0] / len, a[1] / len])
}

#[inline]
pub fn lerp2(a: [f64; 2], b: [f64; 2], t: f64) -> [f64; 2] {
    [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])]
}
