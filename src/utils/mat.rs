use crate::error::{Error, Result};
use crate::utils::misc::{nonzero, rand_unit};
use rayon::prelude::*;
use std::f32::consts::PI;
use std::fmt::Formatter;

/// Dense row-major `f32` matrix. Rows are batch samples, columns are features.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f32>,
    row: usize,
    col: usize,
}

impl Matrix {
    pub fn new(n: usize, m: usize) -> Self {
        Matrix {
            data: vec![0.0; n * m],
            row: n,
            col: m,
        }
    }

    pub fn from_vec(n: usize, m: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != n * m {
            return Err(Error::ShapeMismatch {
                op: "Matrix::from_vec",
                expected: vec![n * m],
                got: vec![data.len()],
            });
        }
        Ok(Matrix { data, row: n, col: m })
    }

    /// Builds a matrix from equally sized rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let n = rows.len();
        let m = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(n * m);
        for r in rows {
            if r.len() != m {
                return Err(Error::ShapeMismatch {
                    op: "Matrix::from_rows",
                    expected: vec![m],
                    got: vec![r.len()],
                });
            }
            data.extend_from_slice(r);
        }
        Ok(Matrix { data, row: n, col: m })
    }

    /// Fills with `N(0, 1 / col)` samples (Box-Muller over `rand_next`).
    pub fn normal_init(&mut self, seed: u32) {
        let scale = 1.0 / (self.col.max(1) as f32).sqrt();
        let mut seed = nonzero(seed);
        for v in self.data.iter_mut() {
            let u1 = 1.0 - rand_unit(&mut seed);
            let u2 = rand_unit(&mut seed);
            *v = scale * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        if i >= self.row {
            panic!("matrix visit row over bound");
        }
        &self.data[i * self.col..(i + 1) * self.col]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        if i >= self.row {
            panic!("matrix visit row over bound");
        }
        &mut self.data[i * self.col..(i + 1) * self.col]
    }

    /// Parallel iterator over mutable rows. The matrix must have columns.
    pub fn par_rows_mut(&mut self) -> rayon::slice::ChunksMut<'_, f32> {
        self.data.par_chunks_mut(self.col)
    }

    pub fn at(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.col + j]
    }

    pub fn set(&mut self, i: usize, j: usize, val: f32) {
        self.data[i * self.col + j] = val;
    }

    fn check_same_shape(&self, rhs: &Matrix, op: &'static str) -> Result<()> {
        if self.shape() != rhs.shape() {
            return Err(Error::ShapeMismatch {
                op,
                expected: vec![self.row, self.col],
                got: vec![rhs.row, rhs.col],
            });
        }
        Ok(())
    }

    /// Element-wise combination of two equally shaped matrices.
    pub fn zip_map<F>(&self, rhs: &Matrix, op: &'static str, f: F) -> Result<Matrix>
    where
        F: Fn(f32, f32) -> f32 + Sync,
    {
        self.check_same_shape(rhs, op)?;
        let data = self
            .data
            .par_iter()
            .zip(rhs.data.par_iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Matrix {
            data,
            row: self.row,
            col: self.col,
        })
    }

    pub fn map<F>(&self, f: F) -> Matrix
    where
        F: Fn(f32) -> f32 + Sync,
    {
        Matrix {
            data: self.data.par_iter().map(|&a| f(a)).collect(),
            row: self.row,
            col: self.col,
        }
    }

    pub fn add(&self, rhs: &Matrix) -> Result<Matrix> {
        self.zip_map(rhs, "add", |a, b| a + b)
    }

    pub fn hadamard(&self, rhs: &Matrix) -> Result<Matrix> {
        self.zip_map(rhs, "hadamard", |a, b| a * b)
    }

    pub fn mul_with_numeric(&self, rhs: f32) -> Matrix {
        self.map(|a| a * rhs)
    }

    /// Adds a `(1, col)` row vector to every row.
    pub fn add_with_vector(&self, rhs: &Matrix) -> Result<Matrix> {
        if rhs.row != 1 || self.col != rhs.col {
            return Err(Error::ShapeMismatch {
                op: "add_with_vector",
                expected: vec![1, self.col],
                got: vec![rhs.row, rhs.col],
            });
        }
        let mut ret = self.clone();
        if self.col == 0 {
            return Ok(ret);
        }
        ret.data.par_chunks_mut(self.col).for_each(|dst| {
            dst.iter_mut().zip(rhs.data.iter()).for_each(|(d, b)| *d += b);
        });
        Ok(ret)
    }

    pub fn mul(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.col != rhs.row {
            return Err(Error::ShapeMismatch {
                op: "mul",
                expected: vec![self.col, rhs.col],
                got: vec![rhs.row, rhs.col],
            });
        }
        let mut ret = Matrix::new(self.row, rhs.col);
        if rhs.col == 0 {
            return Ok(ret);
        }
        ret.data
            .par_chunks_mut(rhs.col)
            .enumerate()
            .for_each(|(i, dst)| {
                for k in 0..self.col {
                    let a = self.at(i, k);
                    for (d, b) in dst.iter_mut().zip(rhs.row(k)) {
                        *d += a * b;
                    }
                }
            });
        Ok(ret)
    }

    #[allow(non_snake_case)]
    pub fn T(&self) -> Matrix {
        let mut ret = Matrix::new(self.col, self.row);
        if self.row == 0 {
            return ret;
        }
        ret.data
            .par_chunks_mut(self.row)
            .enumerate()
            .for_each(|(y, dst)| {
                for (x, d) in dst.iter_mut().enumerate() {
                    *d = self.at(x, y);
                }
            });
        ret
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            0.0
        } else {
            self.sum() / self.data.len() as f32
        }
    }
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Matrix Sized [{}, {}]\n", self.row, self.col))?;
        for i in 0..self.row {
            for j in 0..self.col {
                f.write_fmt(format_args!("{:.2}", self.at(i, j)))?;
                if j + 1 == self.col {
                    f.write_str("\n")?;
                } else {
                    f.write_str(" ")?;
                }
            }
        }
        std::fmt::Result::Ok(())
    }
}
