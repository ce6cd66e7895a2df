//! All-pole synthesis filters `1/A(z)`.
//!
//! Two realizations of the same transfer function:
//! - [`DirectForm`]  : recursive difference equation over a circular history of
//!   the last `order` outputs
//! - [`LatticeForm`] : reflection-coefficient lattice over `order` backward
//!   error states; stable for any `|k| < 1`
//!
//! Both copy their coefficients in via `load` (no allocation) and keep their own
//! per-channel state. Loading a model of a different order clears the state.

use alloc::vec;
use alloc::vec::Vec;

use crate::levinson::LevinsonDurbin;

/// Anything that can run an all-pole recursion one sample at a time.
pub trait AllPole {
    /// Copy the current prediction model into the filter.
    fn load(&mut self, model: &LevinsonDurbin);

    /// Clear the filter history.
    fn reset(&mut self);

    /// Filter one (already gain-scaled) excitation sample.
    fn tick(&mut self, x: f64) -> f64;

    /// `false` once any state value has overflowed or turned NaN.
    fn is_finite(&self) -> bool;
}

/// Which realization a channel synthesizes with.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FilterForm {
    #[default]
    Direct,
    Lattice,
}

// ---------------------------------- Direct form -----------------------------------

/// `y[n] = x[n] - Σ_{k=1}^{p} a[k] y[n-k]`
#[derive(Clone, Debug)]
pub struct DirectForm {
    a: Vec<f64>,
    hist: Vec<f64>,
    ptr: usize,
    order: usize,
}

impl DirectForm {
    pub fn new(max_order: usize) -> Self {
        let max_order = max_order.max(1);
        let mut a = vec![0.0; max_order + 1];
        a[0] = 1.0;
        Self { a, hist: vec![0.0; max_order], ptr: 0, order: 0 }
    }

    /// Load prediction coefficients `a[0..=order]` directly.
    pub fn load_coefficients(&mut self, coeffs: &[f64]) {
        let order = coeffs.len().saturating_sub(1).min(self.hist.len());
        if order != self.order {
            self.order = order;
            self.reset();
        }
        self.a[..=order].copy_from_slice(&coeffs[..=order]);
    }

    #[inline] pub fn order(&self) -> usize { self.order }
}

impl AllPole for DirectForm {
    fn load(&mut self, model: &LevinsonDurbin) {
        self.load_coefficients(model.coefficients());
    }

    fn reset(&mut self) {
        for h in &mut self.hist {
            *h = 0.0;
        }
        self.ptr = 0;
    }

    #[inline]
    fn tick(&mut self, x: f64) -> f64 {
        let p = self.order;
        if p == 0 {
            return x;
        }
        // hist[ptr] holds y[n-1], hist[ptr+1] holds y[n-2], …
        let mut y = x;
        for k in 0..p {
            let mut idx = self.ptr + k;
            if idx >= p {
                idx -= p;
            }
            y -= self.a[k + 1] * self.hist[idx];
        }
        self.ptr = if self.ptr == 0 { p - 1 } else { self.ptr - 1 };
        self.hist[self.ptr] = y;
        y
    }

    fn is_finite(&self) -> bool {
        self.hist[..self.order].iter().all(|h| h.is_finite())
    }
}

// ---------------------------------- Lattice form ----------------------------------

/// All-pole lattice. `b[i]` holds the stage-`i` backward error from the previous
/// sample; stages run from the top (`p-1`) down to 0.
#[derive(Clone, Debug)]
pub struct LatticeForm {
    k: Vec<f64>,
    b: Vec<f64>,
    order: usize,
}

impl LatticeForm {
    pub fn new(max_order: usize) -> Self {
        let max_order = max_order.max(1);
        Self { k: vec![0.0; max_order], b: vec![0.0; max_order], order: 0 }
    }

    /// Load reflection coefficients `k[0..order]` directly.
    pub fn load_reflections(&mut self, k: &[f64]) {
        let order = k.len().min(self.k.len());
        if order != self.order {
            self.order = order;
            self.reset();
        }
        self.k[..order].copy_from_slice(&k[..order]);
    }

    #[inline] pub fn order(&self) -> usize { self.order }
}

impl AllPole for LatticeForm {
    fn load(&mut self, model: &LevinsonDurbin) {
        self.load_reflections(model.reflections());
    }

    fn reset(&mut self) {
        for b in &mut self.b {
            *b = 0.0;
        }
    }

    #[inline]
    fn tick(&mut self, x: f64) -> f64 {
        let p = self.order;
        let mut f = x;
        for i in (0..p).rev() {
            let k = self.k[i];
            f -= k * self.b[i];
            if i + 1 < p {
                self.b[i + 1] = self.b[i] + k * f;
            }
        }
        if p > 0 {
            self.b[0] = f;
        }
        f
    }

    fn is_finite(&self) -> bool {
        self.b[..self.order].iter().all(|b| b.is_finite())
    }
}

// ----------------------------------- Selector -------------------------------------

/// Direct or lattice filter chosen at configuration time (static dispatch).
#[derive(Clone, Debug)]
pub enum SynthesisFilter {
    Direct(DirectForm),
    Lattice(LatticeForm),
}

impl SynthesisFilter {
    pub fn new(form: FilterForm, max_order: usize) -> Self {
        match form {
            FilterForm::Direct => Self::Direct(DirectForm::new(max_order)),
            FilterForm::Lattice => Self::Lattice(LatticeForm::new(max_order)),
        }
    }

    pub fn form(&self) -> FilterForm {
        match self {
            Self::Direct(_) => FilterForm::Direct,
            Self::Lattice(_) => FilterForm::Lattice,
        }
    }

    /// Reset the history if any state has blown up.
    #[inline]
    pub fn sanitize(&mut self) {
        if !self.is_finite() {
            self.reset();
        }
    }
}

impl AllPole for SynthesisFilter {
    #[inline]
    fn load(&mut self, model: &LevinsonDurbin) {
        match self {
            Self::Direct(f) => f.load(model),
            Self::Lattice(f) => f.load(model),
        }
    }

    #[inline]
    fn reset(&mut self) {
        match self {
            Self::Direct(f) => f.reset(),
            Self::Lattice(f) => f.reset(),
        }
    }

    #[inline]
    fn tick(&mut self, x: f64) -> f64 {
        match self {
            Self::Direct(f) => f.tick(x),
            Self::Lattice(f) => f.tick(x),
        }
    }

    #[inline]
    fn is_finite(&self) -> bool {
        match self {
            Self::Direct(f) => f.is_finite(),
            Self::Lattice(f) => f.is_finite(),
        }
    }
}
