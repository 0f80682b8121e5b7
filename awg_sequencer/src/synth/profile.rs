//! Frequency-sweep profiles for moves.
//!
//! A move blends linear interpolation with a minimum-jerk trajectory:
//!
//! ```text
//! p(τ) = a·τ + (1 − a)·(10τ³ − 15τ⁴ + 6τ⁵)        τ ∈ [0, 1]
//! ```
//!
//! `p` is the normalised instantaneous frequency offset. The phase needs its
//! integral `P(τ) = a·τ²/2 + (1 − a)·(2.5τ⁴ − 3τ⁵ + τ⁶)`, with `P(1) = 1/2`
//! for every `a`.

/// Minimum-jerk interpolation: zero velocity and acceleration at both ends.
#[inline]
pub fn minimum_jerk(tau: f64) -> f64 {
    let t3 = tau * tau * tau;
    t3 * (10.0 - 15.0 * tau + 6.0 * tau * tau)
}

/// Blended profile `p(τ)` for hybridicity `a` (0 = minimum jerk, 1 = linear).
#[inline]
pub fn hybrid(a: f64, tau: f64) -> f64 {
    a * tau + (1.0 - a) * minimum_jerk(tau)
}

/// Integral of [`hybrid`] from 0 to `tau`.
#[inline]
pub fn hybrid_integral(a: f64, tau: f64) -> f64 {
    let t2 = tau * tau;
    let t4 = t2 * t2;
    a * t2 / 2.0 + (1.0 - a) * t4 * (2.5 - 3.0 * tau + t2)
}
