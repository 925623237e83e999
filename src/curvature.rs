//! Secant-pair memory and the L-BFGS two-loop recursion.

use ndarray::Array1;
use std::collections::VecDeque;

/// One secant triple `(s, y, rho)` with `rho = 1 / (s·y)`.
#[derive(Debug, Clone)]
pub struct CurvaturePair {
    pub s: Array1<f64>,
    pub y: Array1<f64>,
    pub rho: f64,
}

/// Bounded memory of the most recent curvature pairs.
///
/// Pairs are kept in insertion order; once `capacity` pairs are stored the oldest
/// one is evicted, so the two-loop recursion always sees exactly the newest
/// `capacity` pairs.
#[derive(Debug, Clone)]
pub struct CurvatureStore {
    pairs: VecDeque<CurvaturePair>,
    capacity: usize,
    pushed: usize,
}

impl CurvatureStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            pairs: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            pushed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Total number of pairs ever accepted, evicted ones included.
    pub fn total_pushed(&self) -> usize {
        self.pushed
    }

    pub fn newest(&self) -> Option<&CurvaturePair> {
        self.pairs.back()
    }

    /// Appends `(s, y)` when `s·y` is positive and finite; returns `false` otherwise
    /// and leaves the store untouched.
    pub fn try_push(&mut self, s: Array1<f64>, y: Array1<f64>) -> bool {
        let sy = s.dot(&y);
        if !(sy.is_finite() && sy > 0.0) {
            return false;
        }
        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back(CurvaturePair { s, y, rho: 1.0 / sy });
        self.pushed += 1;
        true
    }

    /// Quasi-Newton direction `-H g` from the two-loop recursion, with initial
    /// scaling `gamma = (s·y)/(y·y)` taken from the newest pair.
    ///
    /// With no pairs stored this is the normalized steepest-descent direction
    /// `-g / ||g||_inf` (zero for a zero gradient).
    pub fn lbfgs_direction(&self, g: &Array1<f64>) -> Array1<f64> {
        let Some(newest) = self.pairs.back() else {
            let g_inf = g.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            if g_inf > 0.0 && g_inf.is_finite() {
                return g.mapv(|v| -v / g_inf);
            }
            return Array1::zeros(g.len());
        };

        let mut q = g.clone();
        let mut alphas = Vec::with_capacity(self.pairs.len());
        for pair in self.pairs.iter().rev() {
            let a = pair.rho * pair.s.dot(&q);
            q.scaled_add(-a, &pair.y);
            alphas.push(a);
        }

        let gamma = newest.s.dot(&newest.y) / newest.y.dot(&newest.y);
        let mut r = q * gamma;

        for (pair, a) in self.pairs.iter().zip(alphas.iter().rev()) {
            let beta = pair.rho * pair.y.dot(&r);
            r.scaled_add(a - beta, &pair.s);
        }
        -r
    }
}

#[cfg(test)]
mod tests {
    use super::CurvatureStore;
    use ndarray::{Array1, Array2, array};
    use spectral::prelude::*;

    #[test]
    fn empty_store_gives_normalized_steepest_descent() {
        let store = CurvatureStore::new(5);
        let g = array![2.0, -8.0, 4.0];
        let d = store.lbfgs_direction(&g);
        assert_eq!(d, array![-0.25, 1.0, -0.5]);
    }

    #[test]
    fn zero_gradient_gives_zero_direction() {
        let store = CurvatureStore::new(5);
        let d = store.lbfgs_direction(&Array1::zeros(3));
        assert_eq!(d, Array1::<f64>::zeros(3));
    }

    #[test]
    fn nonpositive_curvature_is_refused() {
        let mut store = CurvatureStore::new(3);
        assert!(!store.try_push(array![1.0, 0.0], array![-1.0, 0.0]));
        assert!(!store.try_push(array![1.0, 0.0], array![0.0, 1.0]));
        assert!(store.is_empty());
        assert!(store.try_push(array![1.0, 0.0], array![2.0, 0.0]));
        assert_eq!(store.len(), 1);
        assert_that!(&store.newest().unwrap().rho).is_close_to(0.5, 1e-15);
    }

    #[test]
    fn ring_buffer_keeps_only_newest_pairs() {
        let mut store = CurvatureStore::new(2);
        for k in 1..=5 {
            let v = k as f64;
            assert!(store.try_push(array![v, 0.0], array![v, 0.0]));
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_pushed(), 5);
        assert_eq!(store.newest().unwrap().s, array![5.0, 0.0]);
    }

    #[test]
    fn recursion_recovers_newton_step_on_diagonal_quadratic() {
        // Pairs along every coordinate axis of H = diag(1, 4, 9) pin down H exactly.
        let diag = array![1.0, 4.0, 9.0];
        let h = Array2::from_diag(&diag);
        let mut store = CurvatureStore::new(10);
        for i in 0..3 {
            let mut s = Array1::zeros(3);
            s[i] = 1.0;
            let y = h.dot(&s);
            assert!(store.try_push(s, y));
        }
        let g = array![1.0, 2.0, 3.0];
        let d = store.lbfgs_direction(&g);
        let expected = -(&g / &diag);
        for i in 0..3 {
            assert_that!(&d[i]).is_close_to(expected[i], 1e-12);
        }
    }

    #[test]
    fn direction_is_descent_for_positive_pairs() {
        let mut store = CurvatureStore::new(4);
        assert!(store.try_push(array![1.0, 1.0], array![3.0, 1.0]));
        assert!(store.try_push(array![0.5, -1.0], array![0.2, -2.0]));
        let g = array![0.3, -0.7];
        let d = store.lbfgs_direction(&g);
        assert_that!(&d.dot(&g)).is_less_than(0.0);
    }
}
