use nalgebra_sparse::CscMatrix;

/// Copies the block starting at `start = (row, col)` with the given `shape`.
///
/// Row indices stay sorted and explicit zeros are preserved, so slicing
/// matrices with equal patterns yields blocks with equal patterns.
pub fn slice_csc_block<T: Clone>(
    mat: &CscMatrix<T>,
    start: (usize, usize),
    shape: (usize, usize),
) -> CscMatrix<T> {
    let (start_row, start_col) = start;
    let (end_row, end_col) = (start_row + shape.0, start_col + shape.1);
    assert!(
        end_row <= mat.nrows() && end_col <= mat.ncols(),
        "block {:?}+{:?} out of bounds for {}x{}",
        start,
        shape,
        mat.nrows(),
        mat.ncols()
    );

    let mut col_offsets = Vec::with_capacity(shape.1 + 1);
    let mut row_indices = Vec::new();
    let mut values = Vec::new();
    col_offsets.push(0);
    for col in start_col..end_col {
        let lane = mat.col(col);
        for (&r, v) in lane.row_indices().iter().zip(lane.values()) {
            if r >= start_row && r < end_row {
                row_indices.push(r - start_row);
                values.push(v.clone());
            }
        }
        col_offsets.push(row_indices.len());
    }
    CscMatrix::try_from_csc_data(shape.0, shape.1, col_offsets, row_indices, values)
        .expect("sliced block keeps a valid CSC layout")
}

/// Block view helpers used when carving Jacobian sub-matrices.
pub trait Slice {
    type Mat;
    fn block(&self, start_pos: (usize, usize), shape: (usize, usize)) -> Self::Mat;
}

impl<T: Clone> Slice for CscMatrix<T> {
    type Mat = CscMatrix<T>;
    #[inline(always)]
    fn block(&self, start_pos: (usize, usize), shape: (usize, usize)) -> Self::Mat {
        slice_csc_block(self, start_pos, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use nalgebra_sparse::CooMatrix;

    #[test]
    fn test_block_matches_dense() {
        let mut coo = CooMatrix::new(4, 4);
        for (r, c, v) in [(0, 0, 1.0), (1, 1, 2.0), (2, 1, 3.0), (3, 2, 4.0), (1, 3, 5.0), (3, 3, 0.0)] {
            coo.push(r, c, v);
        }
        let a = CscMatrix::from(&coo);
        let b = a.block((1, 1), (3, 3));
        let dense = DMatrix::from(&a);
        assert!(
            DMatrix::from(&b) == dense.view((1, 1), (3, 3)).into_owned(),
            "matrices do not match!"
        );
        // explicit zero at (3,3) survives as (2,2)
        assert_eq!(b.nnz(), 5);
    }

    #[test]
    fn test_empty_block() {
        let a: CscMatrix<f64> = CscMatrix::identity(3);
        let b = a.block((3, 0), (0, 3));
        assert_eq!((b.nrows(), b.ncols(), b.nnz()), (0, 3, 0));
        let c = a.block((0, 1), (3, 0));
        assert_eq!((c.nrows(), c.ncols(), c.nnz()), (3, 0, 0));
    }
}
