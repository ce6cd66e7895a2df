//! Levinson-Durbin recursion: autocorrelation → prediction + reflection coefficients.
//!
//! Sign convention: the prediction polynomial is
//! `A(z) = 1 + a[1] z^-1 + … + a[p] z^-p` and the synthesis filter is `1/A(z)`.
//! Stage `k` computes
//!
//! ```text
//! λ_k  = -(Σ_{j=0}^{k} a[j] φ[k+1-j]) / E
//! a'[n] = a[n] + λ_k a[k+1-n]        (symmetric butterfly)
//! E   *= 1 - λ_k²
//! ```
//!
//! Every `λ_k` is clamped strictly inside `±REFLECTION_LIMIT` *inside* the recursion, so the
//! prediction coefficients and the reflection coefficients always describe the
//! same minimum-phase filter and `E` never goes negative for a positive `φ[0]`.
//! Non-finite stages are zeroed and a non-positive error stops the recursion,
//! leaving the remaining stages at zero.

use alloc::vec;
use alloc::vec::Vec;

use crate::dsp::safe_sqrt;

/// Reflection coefficients stay strictly inside `(-REFLECTION_LIMIT, REFLECTION_LIMIT)`.
pub const REFLECTION_LIMIT: f64 = 0.999;

/// Largest magnitude [`clamp_reflection`] returns, just below the limit.
pub const REFLECTION_MAX: f64 = REFLECTION_LIMIT - f64::EPSILON;

/// Clamp one reflection coefficient into the open stable interval.
#[inline]
pub fn clamp_reflection(k: f64) -> f64 {
    if !k.is_finite() {
        0.0
    } else if k > REFLECTION_MAX {
        REFLECTION_MAX
    } else if k < -REFLECTION_MAX {
        -REFLECTION_MAX
    } else {
        k
    }
}

/// Levinson-Durbin solver with preallocated coefficient storage.
#[derive(Clone, Debug)]
pub struct LevinsonDurbin {
    a: Vec<f64>,
    k: Vec<f64>,
    order: usize,
    energy: f64,
}

impl LevinsonDurbin {
    pub fn new(max_order: usize) -> Self {
        let max_order = max_order.max(1);
        let mut a = vec![0.0; max_order + 1];
        a[0] = 1.0;
        Self { a, k: vec![0.0; max_order], order: 0, energy: 0.0 }
    }

    #[inline] pub fn max_order(&self) -> usize { self.k.len() }
    #[inline] pub fn order(&self) -> usize { self.order }

    /// Prediction coefficients `a[0..=order]`, `a[0] == 1`.
    #[inline] pub fn coefficients(&self) -> &[f64] { &self.a[..=self.order] }

    /// Reflection coefficients `k[0..order]`.
    #[inline] pub fn reflections(&self) -> &[f64] { &self.k[..self.order] }

    /// Final residual (prediction-error) energy.
    #[inline] pub fn energy(&self) -> f64 { self.energy }

    /// Excitation gain `G = sqrt(E)`; zero when `E` is not positive.
    #[inline] pub fn gain(&self) -> f64 { safe_sqrt(self.energy) }

    fn reset(&mut self, order: usize) {
        self.order = order;
        self.a[0] = 1.0;
        for v in &mut self.a[1..=order] {
            *v = 0.0;
        }
        for v in &mut self.k[..order] {
            *v = 0.0;
        }
    }

    /// Run the recursion on `phi[0..=order]` (`order = phi.len() - 1`, capped at
    /// `max_order`). Returns the residual energy.
    pub fn solve(&mut self, phi: &[f64]) -> f64 {
        let order = phi.len().saturating_sub(1).min(self.max_order());
        self.reset(order);
        let Some(&phi0) = phi.first() else {
            self.energy = 0.0;
            return 0.0;
        };

        let a = &mut self.a;
        let mut e = phi0;
        for k in 0..order {
            if !(e > 0.0 && e.is_finite()) {
                break;
            }
            let mut acc = 0.0;
            for j in 0..=k {
                acc += a[j] * phi[k + 1 - j];
            }
            let lambda = clamp_reflection(-acc / e);
            self.k[k] = lambda;

            let half = (k + 1) / 2;
            for n in 0..=half {
                let tmp = a[k + 1 - n] + lambda * a[n];
                a[n] += lambda * a[k + 1 - n];
                a[k + 1 - n] = tmp;
            }
            e *= 1.0 - lambda * lambda;
        }
        self.energy = e;
        e
    }
}

/// Step-up recursion: reflection coefficients → prediction coefficients.
///
/// `a` must hold at least `k.len() + 1` values; `a[0]` is set to 1.
pub fn step_up(k: &[f64], a: &mut [f64]) {
    let p = k.len();
    a[0] = 1.0;
    for v in &mut a[1..=p] {
        *v = 0.0;
    }
    for (m, &lambda) in k.iter().enumerate() {
        let half = (m + 1) / 2;
        for n in 0..=half {
            let tmp = a[m + 1 - n] + lambda * a[n];
            a[n] += lambda * a[m + 1 - n];
            a[m + 1 - n] = tmp;
        }
    }
}
