//! Minimal owning wrapper over the `klu_l_*` routines of SuiteSparse.
//!
//! The wrapper keeps its own copy of the column pointers and row indices
//! handed to [`KluSolver::analyze`], so numeric factorizations only need the
//! value array of a matrix with the same pattern.
#![allow(non_snake_case)]

use gridflow_klu_sys::*;
use thiserror::Error;

const KLU_OK: i32 = 0;
const KLU_SINGULAR: i32 = 1;

/// Failure reported by a KLU routine, carrying `common.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KluError {
    #[error("klu_l_analyze failed with status {0}")]
    Analyze(i32),
    #[error("klu_l_factor failed with status {0}")]
    Factor(i32),
    #[error("klu_l_refactor failed with status {0}")]
    Refactor(i32),
    #[error("klu_l_solve failed with status {0}")]
    Solve(i32),
    #[error("matrix is singular")]
    Singular,
    #[error("symbolic analysis missing")]
    NotAnalyzed,
    #[error("numeric factorization missing")]
    NotFactored,
}

pub struct KluSolver {
    common: Box<klu_l_common>,
    symbolic: *mut klu_l_symbolic,
    numeric: *mut klu_l_numeric,
    n: i64,
    ap: Vec<i64>,
    ai: Vec<i64>,
}

impl Default for KluSolver {
    fn default() -> Self {
        let mut common = Box::new(klu_l_common::default());
        unsafe {
            klu_l_defaults(common.as_mut());
        }
        KluSolver {
            common,
            symbolic: std::ptr::null_mut(),
            numeric: std::ptr::null_mut(),
            n: 0,
            ap: Vec::new(),
            ai: Vec::new(),
        }
    }
}

impl Drop for KluSolver {
    fn drop(&mut self) {
        self.free();
    }
}

impl KluSolver {
    fn status(&self) -> i32 {
        self.common.status as i32
    }

    fn free(&mut self) {
        unsafe {
            if !self.numeric.is_null() {
                klu_l_free_numeric(&mut self.numeric, self.common.as_mut());
            }
            if !self.symbolic.is_null() {
                klu_l_free_symbolic(&mut self.symbolic, self.common.as_mut());
            }
        }
        self.numeric = std::ptr::null_mut();
        self.symbolic = std::ptr::null_mut();
    }

    /// Ordering and symbolic analysis of an `n x n` CSC pattern.
    pub fn analyze(&mut self, n: usize, col_ptr: &[usize], row_idx: &[usize]) -> Result<(), KluError> {
        self.free();
        self.n = n as i64;
        self.ap = col_ptr.iter().map(|&p| p as i64).collect();
        self.ai = row_idx.iter().map(|&i| i as i64).collect();
        self.symbolic = unsafe {
            klu_l_analyze(
                self.n,
                self.ap.as_mut_ptr(),
                self.ai.as_mut_ptr(),
                self.common.as_mut(),
            )
        };
        if self.symbolic.is_null() || self.status() != KLU_OK {
            return Err(KluError::Analyze(self.status()));
        }
        Ok(())
    }

    /// Full numeric factorization with pivoting.
    pub fn factor(&mut self, values: &mut [f64]) -> Result<(), KluError> {
        if self.symbolic.is_null() {
            return Err(KluError::NotAnalyzed);
        }
        unsafe {
            if !self.numeric.is_null() {
                klu_l_free_numeric(&mut self.numeric, self.common.as_mut());
            }
            self.numeric = klu_l_factor(
                self.ap.as_mut_ptr(),
                self.ai.as_mut_ptr(),
                values.as_mut_ptr(),
                self.symbolic,
                self.common.as_mut(),
            );
        }
        match self.status() {
            KLU_OK if !self.numeric.is_null() => Ok(()),
            KLU_SINGULAR => Err(KluError::Singular),
            s => Err(KluError::Factor(s)),
        }
    }

    /// Numeric refactorization reusing the pivot sequence of the last [`factor`](Self::factor).
    pub fn refactor(&mut self, values: &mut [f64]) -> Result<(), KluError> {
        if self.numeric.is_null() {
            return Err(KluError::NotFactored);
        }
        unsafe {
            klu_l_refactor(
                self.ap.as_mut_ptr(),
                self.ai.as_mut_ptr(),
                values.as_mut_ptr(),
                self.symbolic,
                self.numeric,
                self.common.as_mut(),
            );
        }
        match self.status() {
            KLU_OK => Ok(()),
            KLU_SINGULAR => Err(KluError::Singular),
            s => Err(KluError::Refactor(s)),
        }
    }

    /// Overwrites `b` with the solution of `A x = b`.
    pub fn solve(&mut self, b: &mut [f64]) -> Result<(), KluError> {
        if self.numeric.is_null() {
            return Err(KluError::NotFactored);
        }
        unsafe {
            klu_l_solve(
                self.symbolic,
                self.numeric,
                self.n,
                1,
                b.as_mut_ptr(),
                self.common.as_mut(),
            );
        }
        match self.status() {
            KLU_OK => Ok(()),
            s => Err(KluError::Solve(s)),
        }
    }

    pub fn reset(&mut self) {
        self.free();
        *self.common = klu_l_common::default();
        unsafe {
            klu_l_defaults(self.common.as_mut());
        }
        self.n = 0;
        self.ap.clear();
        self.ai.clear();
    }
}

// The raw handles are owned exclusively by this value and KLU keeps no
// thread-local state, so moving the solver across threads is sound.
unsafe impl Send for KluSolver {}
