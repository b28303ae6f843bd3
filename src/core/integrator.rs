//! Velocity update: explicit Euler when the magnetic field vanishes, Boris rotation
//! otherwise.

use crate::core::vector::cross3;

/// Electric and magnetic field sampled at a particle location.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldSample {
    pub e: [f64; 3],
    pub b: [f64; 3],
}

impl FieldSample {
    pub fn new(e: [f64; 3], b: [f64; 3]) -> Self {
        Self { e, b }
    }

    /// True if every magnetic component is exactly zero.
    #[inline]
    pub fn is_unmagnetized(&self) -> bool {
        self.b.iter().all(|&c| c == 0.0)
    }
}

/// Advance `vel` over `dt` under `field` for a species with charge-to-mass ratio `q_over_m`.
///
/// `dt` may be negative; insertion uses a negative half step to stagger velocities
/// behind positions.
#[inline]
pub fn update_velocity(vel: &mut [f64; 3], field: &FieldSample, dt: f64, q_over_m: f64) {
    if field.is_unmagnetized() {
        push_euler(vel, &field.e, dt, q_over_m);
    } else {
        push_boris(vel, &field.e, &field.b, dt, q_over_m);
    }
}

/// `v += (q/m) E dt`
#[inline]
pub fn push_euler(vel: &mut [f64; 3], e: &[f64; 3], dt: f64, q_over_m: f64) {
    for (v, &ek) in vel.iter_mut().zip(e.iter()) {
        *v += q_over_m * ek * dt;
    }
}

/// Boris rotation. Operand order of both cross products matters: with `E = 0` the
/// scheme preserves |v|^2 to rounding for any `dt`.
pub fn push_boris(vel: &mut [f64; 3], e: &[f64; 3], b: &[f64; 3], dt: f64, q_over_m: f64) {
    let half = 0.5 * q_over_m * dt;

    let t = [half * b[0], half * b[1], half * b[2]];
    let t_mag2 = t[0] * t[0] + t[1] * t[1] + t[2] * t[2];
    let s = [
        2.0 * t[0] / (1.0 + t_mag2),
        2.0 * t[1] / (1.0 + t_mag2),
        2.0 * t[2] / (1.0 + t_mag2),
    ];

    let v_minus = [
        vel[0] + half * e[0],
        vel[1] + half * e[1],
        vel[2] + half * e[2],
    ];

    let vxt = cross3(&v_minus, &t);
    let v_prime = [v_minus[0] + vxt[0], v_minus[1] + vxt[1], v_minus[2] + vxt[2]];

    let vxs = cross3(&v_prime, &s);
    let v_plus = [v_minus[0] + vxs[0], v_minus[1] + vxs[1], v_minus[2] + vxs[2]];

    for k in 0..3 {
        vel[k] = v_plus[k] + half * e[k];
    }
}
