use nalgebra_sparse::{CscMatrix, pattern::SparsityPattern};

/// Concatenates CSC matrices left to right. All blocks must have the same row count.
pub fn csc_hstack<T: Clone>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    assert!(!matrices.is_empty(), "nothing to stack");
    let nrows = matrices[0].nrows();
    let ncols: usize = matrices.iter().map(|m| m.ncols()).sum();
    let nnz: usize = matrices.iter().map(|m| m.nnz()).sum();

    let mut col_offsets = Vec::with_capacity(ncols + 1);
    let mut row_indices = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    for mat in matrices {
        assert_eq!(
            mat.nrows(),
            nrows,
            "All matrices must have the same number of rows"
        );
        let base = values.len();
        col_offsets.extend(mat.col_offsets()[..mat.ncols()].iter().map(|o| o + base));
        row_indices.extend_from_slice(mat.row_indices());
        values.extend_from_slice(mat.values());
    }
    col_offsets.push(nnz);
    assemble(nrows, ncols, col_offsets, row_indices, values)
}

/// Concatenates CSC matrices top to bottom. All blocks must have the same column count.
pub fn csc_vstack<T: Clone>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    assert!(!matrices.is_empty(), "nothing to stack");
    let ncols = matrices[0].ncols();
    let nrows: usize = matrices.iter().map(|m| m.nrows()).sum();
    let nnz: usize = matrices.iter().map(|m| m.nnz()).sum();
    for mat in matrices {
        assert_eq!(
            mat.ncols(),
            ncols,
            "All matrices must have the same number of columns"
        );
    }

    let mut col_offsets = Vec::with_capacity(ncols + 1);
    let mut row_indices = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    col_offsets.push(0);
    for col in 0..ncols {
        let mut row_base = 0;
        for mat in matrices {
            let lane = mat.col(col);
            row_indices.extend(lane.row_indices().iter().map(|r| r + row_base));
            values.extend_from_slice(lane.values());
            row_base += mat.nrows();
        }
        col_offsets.push(values.len());
    }
    assemble(nrows, ncols, col_offsets, row_indices, values)
}

#[inline]
fn assemble<T>(
    nrows: usize,
    ncols: usize,
    col_offsets: Vec<usize>,
    row_indices: Vec<usize>,
    values: Vec<T>,
) -> CscMatrix<T> {
    // Offsets are monotone and row indices sorted within each column by construction.
    let pattern = unsafe {
        SparsityPattern::from_offset_and_indices_unchecked(ncols, nrows, col_offsets, row_indices)
    };
    CscMatrix::try_from_pattern_and_values(pattern, values)
        .expect("pattern and values have equal length")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    #[test]
    fn test_csc_hstack() {
        let mut mat1 = CooMatrix::new(3, 2);
        mat1.push(2, 1, 3);

        let mut mat2 = CooMatrix::new(3, 3);
        mat2.push(0, 0, 2);
        mat2.push(1, 1, 4);
        mat2.push(2, 2, 6);

        let mut mat3 = CooMatrix::new(3, 5);
        mat3.push(2, 1, 3);
        mat3.push(0, 2, 2);
        mat3.push(1, 3, 4);
        mat3.push(2, 4, 6);

        let a = csc_hstack(&[&CscMatrix::from(&mat1), &CscMatrix::from(&mat2)]);
        assert!(a == CscMatrix::from(&mat3), "matrices do not match!")
    }

    #[test]
    fn test_csc_vstack() {
        let mut mat1 = CooMatrix::new(2, 3);
        mat1.push(1, 2, 3);

        let mut mat2 = CooMatrix::new(3, 3);
        mat2.push(0, 0, 2);
        mat2.push(1, 1, 4);
        mat2.push(2, 2, 6);

        let mut mat3 = CooMatrix::new(5, 3);
        mat3.push(1, 2, 3);
        mat3.push(2, 0, 2);
        mat3.push(3, 1, 4);
        mat3.push(4, 2, 6);

        let a = csc_vstack(&[&CscMatrix::from(&mat1), &CscMatrix::from(&mat2)]);
        assert!(a == CscMatrix::from(&mat3), "matrices do not match!")
    }

    #[test]
    fn test_stack_with_empty_blocks() {
        let a: CscMatrix<f64> = CscMatrix::identity(2);
        let no_cols = CscMatrix::<f64>::zeros(2, 0);
        let no_rows = CscMatrix::<f64>::zeros(0, 2);
        let h = csc_hstack(&[&a, &no_cols]);
        let v = csc_vstack(&[&no_rows, &a]);
        assert!(h == a && v == a, "empty blocks must not change the result");
    }
}
