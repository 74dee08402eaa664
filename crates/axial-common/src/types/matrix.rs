//! Column-major dense matrices.

use super::{ArrayData, Dtype, Value};
use crate::utils::error::{Error, QueryError, QueryErrorKind, Result};
use serde::{Deserialize, Serialize};

/// A dense, owned, typed matrix in column-major layout.
///
/// Element `(row, column)` lives at flat index `column * rows + row`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixData {
    data: ArrayData,
    rows: usize,
    columns: usize,
}

impl MatrixData {
    /// Wraps flat column-major data into a matrix.
    ///
    /// Fails with `ShapeMismatch` when `data.len() != rows * columns`.
    pub fn new(data: ArrayData, rows: usize, columns: usize) -> Result<MatrixData> {
        if data.len() != rows * columns {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::ShapeMismatch,
                format!(
                    "{} elements do not fill a {rows} x {columns} matrix",
                    data.len()
                ),
            )));
        }
        Ok(MatrixData {
            data,
            rows,
            columns,
        })
    }

    /// A `rows` x `columns` matrix of default elements.
    #[must_use]
    pub fn new_default(dtype: Dtype, rows: usize, columns: usize) -> MatrixData {
        MatrixData {
            data: ArrayData::new_default(dtype, rows * columns),
            rows,
            columns,
        }
    }

    /// A matrix filled with copies of `value`.
    pub fn new_filled(dtype: Dtype, rows: usize, columns: usize, value: &Value) -> Result<MatrixData> {
        Ok(MatrixData {
            data: ArrayData::new_filled(dtype, rows * columns, value)?,
            rows,
            columns,
        })
    }

    /// Builds a matrix from row-major values, transposing into the
    /// column-major layout. Convenient for literals in tests.
    pub fn from_rows(dtype: Dtype, rows: usize, columns: usize, row_major: &[Value]) -> Result<MatrixData> {
        if row_major.len() != rows * columns {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::ShapeMismatch,
                format!(
                    "{} elements do not fill a {rows} x {columns} matrix",
                    row_major.len()
                ),
            )));
        }
        let mut matrix = MatrixData::new_default(dtype, rows, columns);
        for row in 0..rows {
            for column in 0..columns {
                matrix.data.set(column * rows + row, &row_major[row * columns + column])?;
            }
        }
        Ok(matrix)
    }

    /// The element type.
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    /// The number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The number of columns.
    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// The element at `(row, column)`, widened to a [`Value`].
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Value {
        assert!(row < self.rows && column < self.columns);
        self.data.value(column * self.rows + row)
    }

    /// Stores a value at `(row, column)`, narrowing to the matrix dtype.
    pub fn set(&mut self, row: usize, column: usize, value: &Value) -> Result<()> {
        assert!(row < self.rows && column < self.columns);
        self.data.set(column * self.rows + row, value)
    }

    /// Copies out one column as an array.
    #[must_use]
    pub fn column(&self, column: usize) -> ArrayData {
        let indices: Vec<usize> = (0..self.rows).map(|row| column * self.rows + row).collect();
        self.data.gather(&indices)
    }

    /// Copies out one row as an array (strided gather).
    #[must_use]
    pub fn row(&self, row: usize) -> ArrayData {
        let indices: Vec<usize> = (0..self.columns)
            .map(|column| column * self.rows + row)
            .collect();
        self.data.gather(&indices)
    }

    /// Copies out the submatrix at the given row and column indices.
    #[must_use]
    pub fn gather(&self, row_indices: &[usize], column_indices: &[usize]) -> MatrixData {
        let mut flat = Vec::with_capacity(row_indices.len() * column_indices.len());
        for &column in column_indices {
            for &row in row_indices {
                flat.push(column * self.rows + row);
            }
        }
        MatrixData {
            data: self.data.gather(&flat),
            rows: row_indices.len(),
            columns: column_indices.len(),
        }
    }

    /// A new matrix with rows and columns swapped.
    #[must_use]
    pub fn transposed(&self) -> MatrixData {
        let order = flat_transpose_order(self.rows, self.columns);
        MatrixData {
            data: self.data.gather(&order),
            rows: self.columns,
            columns: self.rows,
        }
    }

    /// The flat column-major data.
    #[must_use]
    pub fn flat(&self) -> &ArrayData {
        &self.data
    }
}

/// Source indices that produce the transposed matrix, in the transposed
/// matrix's column-major order.
fn flat_transpose_order(rows: usize, columns: usize) -> Vec<usize> {
    // The transposed matrix has `columns` rows; its column r holds the
    // original row r.
    let mut order = Vec::with_capacity(rows * columns);
    for row in 0..rows {
        for column in 0..columns {
            order.push(column * rows + row);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn umis() -> MatrixData {
        // 4 x 2:
        //   1 2
        //   3 4
        //   5 6
        //   7 8
        MatrixData::from_rows(
            Dtype::I32,
            4,
            2,
            &[1, 2, 3, 4, 5, 6, 7, 8].map(Value::Int),
        )
        .unwrap()
    }

    #[test]
    fn test_layout_is_column_major() {
        let matrix = umis();
        assert_eq!(matrix.flat(), &ArrayData::I32(vec![1, 3, 5, 7, 2, 4, 6, 8]));
        assert_eq!(matrix.get(2, 1), Value::Int(6));
    }

    #[test]
    fn test_row_and_column_access() {
        let matrix = umis();
        assert_eq!(matrix.column(0), ArrayData::I32(vec![1, 3, 5, 7]));
        assert_eq!(matrix.row(1), ArrayData::I32(vec![3, 4]));
    }

    #[test]
    fn test_gather_submatrix() {
        let matrix = umis();
        let sub = matrix.gather(&[0, 3], &[1]);
        assert_eq!(sub.rows(), 2);
        assert_eq!(sub.columns(), 1);
        assert_eq!(sub.get(0, 0), Value::Int(2));
        assert_eq!(sub.get(1, 0), Value::Int(8));
    }

    #[test]
    fn test_transposed() {
        let matrix = umis();
        let transposed = matrix.transposed();
        assert_eq!(transposed.rows(), 2);
        assert_eq!(transposed.columns(), 4);
        for row in 0..4 {
            for column in 0..2 {
                assert_eq!(matrix.get(row, column), transposed.get(column, row));
            }
        }
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(MatrixData::new(ArrayData::I32(vec![1, 2, 3]), 2, 2).is_err());
    }
}
