//! Banded solver for the asymmetric least squares baseline.

use crate::errors::{
    Result,
    SignalError,
};

/// Symmetric positive definite pentadiagonal matrix, stored by diagonals.
///
/// `diag[i] = A[i][i]`, `off1[i] = A[i][i+1]`, `off2[i] = A[i][i+2]`.
#[derive(Debug, Clone)]
pub struct Pentadiagonal {
    pub diag: Vec<f64>,
    pub off1: Vec<f64>,
    pub off2: Vec<f64>,
}

impl Pentadiagonal {
    /// `lambda * D^T D` where `D` is the second-difference operator.
    pub fn second_difference_penalty(n: usize, lambda: f64) -> Self {
        let mut diag = vec![0.0; n];
        let mut off1 = vec![0.0; n.saturating_sub(1)];
        let mut off2 = vec![0.0; n.saturating_sub(2)];
        // Each row of D is (1, -2, 1) starting at column r.
        for r in 0..n.saturating_sub(2) {
            let coefs = [1.0, -2.0, 1.0];
            for i in 0..3 {
                diag[r + i] += lambda * coefs[i] * coefs[i];
                if i < 2 {
                    off1[r + i] += lambda * coefs[i] * coefs[i + 1];
                }
            }
            off2[r] += lambda * coefs[0] * coefs[2];
        }
        Self { diag, off1, off2 }
    }

    pub fn len(&self) -> usize {
        self.diag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diag.is_empty()
    }

    /// Solves `(self + diag(extra)) x = rhs` with a banded LDL^T factorisation.
    pub fn solve_with_extra_diagonal(&self, extra: &[f64], rhs: &[f64]) -> Result<Vec<f64>> {
        let n = self.len();
        if extra.len() != n || rhs.len() != n {
            return Err(SignalError::ExpectedSlicesSameLength {
                expected: n,
                other: extra.len().min(rhs.len()),
                context: "Pentadiagonal::solve_with_extra_diagonal".to_string(),
            });
        }

        // L has unit diagonal and two sub-diagonals (l1, l2).
        let mut d = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];
        for i in 0..n {
            let mut di = self.diag[i] + extra[i];
            if i >= 1 {
                di -= l1[i] * l1[i] * d[i - 1];
            }
            if i >= 2 {
                di -= l2[i] * l2[i] * d[i - 2];
            }
            if !(di.is_finite() && di > 0.0) {
                return Err(SignalError::SingularSystem {
                    context: format!("non positive pivot {} at row {}", di, i),
                });
            }
            d[i] = di;
            if i + 2 < n {
                l2[i + 2] = self.off2[i] / di;
            }
            if i + 1 < n {
                let mut a = self.off1[i];
                if i >= 1 {
                    // l2[i + 1] was set on the previous row.
                    a -= l2[i + 1] * l1[i] * d[i - 1];
                }
                l1[i + 1] = a / di;
            }
        }

        let mut z = rhs.to_vec();
        for i in 0..n {
            if i >= 1 {
                z[i] -= l1[i] * z[i - 1];
            }
            if i >= 2 {
                z[i] -= l2[i] * z[i - 2];
            }
        }
        for i in 0..n {
            z[i] /= d[i];
        }
        for i in (0..n).rev() {
            if i + 1 < n {
                z[i] -= l1[i + 1] * z[i + 1];
            }
            if i + 2 < n {
                z[i] -= l2[i + 2] * z[i + 2];
            }
        }
        Ok(z)
    }
}
