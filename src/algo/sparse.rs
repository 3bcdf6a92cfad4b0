//! Sparse matrices and a conjugate gradient solver.
//!
//! This module provides a lightweight sparse matrix (CSR format) and a
//! Jacobi-preconditioned conjugate gradient solver for the symmetric positive
//! definite systems assembled by smoothing, fairing and parameterization.

use nalgebra::DVector;
use rayon::prelude::*;

use crate::error::{MeshError, Result};

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` indexes the entries of row i.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from (row, col, value) triplets.
    ///
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            debug_assert!(row < rows && col < cols, "triplet ({}, {}) out of bounds", row, col);
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v += val;
                }
                continue;
            }
            col_idx.push(col);
            values.push(val);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }

        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// The diagonal entries (zero where no entry is stored).
    pub fn diagonal(&self) -> DVector<f64> {
        let mut d = DVector::zeros(self.rows.min(self.cols));
        for i in 0..d.len() {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                if self.col_idx[k] == i {
                    d[i] = self.values[k];
                }
            }
        }
        d
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");

        let mut y = DVector::zeros(self.rows);
        for i in 0..self.rows {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            y[i] = sum;
        }
        y
    }

    /// Check structural and numerical symmetry up to `tolerance`.
    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        if self.rows != self.cols {
            return false;
        }
        for i in 0..self.rows {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_idx[k];
                if (self.get(j, i) - self.values[k]).abs() > tolerance {
                    return false;
                }
            }
        }
        true
    }

    /// Entry (i, j), zero if not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let row = &self.col_idx[self.row_ptr[i]..self.row_ptr[i + 1]];
        match row.binary_search(&j) {
            Ok(k) => self.values[self.row_ptr[i] + k],
            Err(_) => 0.0,
        }
    }
}

/// Iteration limits for the conjugate gradient solver.
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    /// Maximum number of CG iterations.
    pub max_iterations: usize,
    /// Relative residual tolerance.
    pub tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-10,
        }
    }
}

impl SolverOptions {
    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative residual tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Solve A*x = b with the Jacobi-preconditioned Conjugate Gradient method.
///
/// Requires A to be symmetric positive definite.
///
/// # Arguments
///
/// * `a` - The system matrix (must be symmetric positive definite)
/// * `b` - The right-hand side vector
/// * `x0` - Optional initial guess (zeros if None)
/// * `max_iter` - Maximum number of iterations
/// * `tolerance` - Convergence tolerance (relative residual norm)
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> Result<DVector<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(MeshError::precondition(format!(
            "system is {}x{} but right-hand side has {} entries",
            a.nrows(),
            a.ncols(),
            n
        )));
    }

    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => DVector::zeros(n),
    };

    let b_norm = b.norm();
    if b_norm < 1e-15 {
        return Ok(DVector::zeros(n));
    }

    let inv_diag = a.diagonal().map(|d| if d.abs() > 1e-300 { 1.0 / d } else { 1.0 });

    let mut r = b - a.mul_vec(&x);
    if r.norm() / b_norm < tolerance {
        return Ok(x);
    }
    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for _ in 0..max_iter {
        let ap = a.mul_vec(&p);
        let p_ap = p.dot(&ap);
        if p_ap.abs() < 1e-300 {
            break;
        }
        let alpha = rz / p_ap;

        x += alpha * &p;
        r -= alpha * &ap;

        if r.norm() / b_norm < tolerance {
            return Ok(x);
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        p = &z + beta * &p;
        rz = rz_new;
    }

    // Accept a slightly looser residual before giving up
    if r.norm() / b_norm < tolerance.sqrt() {
        log::warn!(
            "conjugate gradient stopped at relative residual {:.3e}",
            r.norm() / b_norm
        );
        return Ok(x);
    }

    Err(MeshError::ConvergenceFailed {
        iterations: max_iter,
    })
}

/// Solve A*x = b for several right-hand sides sharing one matrix.
///
/// With `parallel` the columns are solved on the rayon pool; the result does
/// not depend on scheduling since each column is solved independently.
pub fn solve_columns(
    a: &CsrMatrix,
    rhs: &[DVector<f64>],
    guesses: Option<&[DVector<f64>]>,
    options: SolverOptions,
    parallel: bool,
) -> Result<Vec<DVector<f64>>> {
    let solve = |i: usize| {
        conjugate_gradient(
            a,
            &rhs[i],
            guesses.map(|g| &g[i]),
            options.max_iterations,
            options.tolerance,
        )
    };
    if parallel {
        (0..rhs.len()).into_par_iter().map(solve).collect()
    } else {
        (0..rhs.len()).map(solve).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd_2x2() -> CsrMatrix {
        // [ 4  1 ]
        // [ 1  3 ]
        CsrMatrix::from_triplets(2, 2, vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)])
    }

    #[test]
    fn test_csr_from_triplets_with_duplicates() {
        let triplets = vec![
            (1, 1, 3.0),
            (0, 0, 2.0),
            (0, 1, 1.0),
            (0, 0, 2.0),
            (1, 0, 1.0),
        ];
        let a = CsrMatrix::from_triplets(2, 2, triplets);
        assert_eq!(a.nnz(), 4);
        assert_eq!(a.get(0, 0), 4.0);
        assert_eq!(a.diagonal(), DVector::from_vec(vec![4.0, 3.0]));
        assert!(a.is_symmetric(1e-12));
    }

    #[test]
    fn test_csr_empty_rows() {
        let a = CsrMatrix::from_triplets(4, 4, vec![(2, 2, 1.0)]);
        let y = a.mul_vec(&DVector::from_element(4, 1.0));
        assert_eq!(y.as_slice(), &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_cg_simple() {
        // Solution: x = 1/11, y = 7/11
        let a = spd_2x2();
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let x = conjugate_gradient(&a, &b, None, 100, 1e-12).unwrap();
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-9);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_cg_larger_system() {
        let triplets = vec![
            (0, 0, 10.0),
            (0, 1, 1.0),
            (0, 2, 2.0),
            (1, 0, 1.0),
            (1, 1, 10.0),
            (1, 2, 1.0),
            (2, 0, 2.0),
            (2, 1, 1.0),
            (2, 2, 10.0),
            (2, 3, 1.0),
            (3, 2, 1.0),
            (3, 3, 10.0),
        ];
        let a = CsrMatrix::from_triplets(4, 4, triplets);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let x = conjugate_gradient(&a, &b, None, 100, 1e-12).unwrap();
        assert!((a.mul_vec(&x) - &b).norm() < 1e-8);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let a = spd_2x2();
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(conjugate_gradient(&a, &b, None, 10, 1e-10).is_err());
    }

    #[test]
    fn test_solve_columns_parallel_matches_sequential() {
        let a = spd_2x2();
        let rhs = vec![
            DVector::from_vec(vec![1.0, 2.0]),
            DVector::from_vec(vec![-3.0, 0.5]),
            DVector::from_vec(vec![0.0, 7.0]),
        ];
        let opts = SolverOptions::default();
        let par = solve_columns(&a, &rhs, None, opts, true).unwrap();
        let seq = solve_columns(&a, &rhs, None, opts, false).unwrap();
        for (p, s) in par.iter().zip(&seq) {
            assert_eq!(p, s);
        }
    }
}
