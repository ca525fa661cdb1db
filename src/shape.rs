//! Dimension and stride metadata for dense n-d array views.
//!
//! A [`Shape`] pairs an ordered tuple of dimension sizes with per-dimension
//! element strides. Freshly constructed shapes are contiguous row-major;
//! broadcasting and permutation derive new shapes with adjusted strides over
//! the same underlying buffer. A stride of 0 marks a broadcast dimension
//! where every index reads the same element.

use crate::{Error, Result};

/// Dimension sizes plus derived stride/size metadata.
///
/// Immutable once constructed: reshaping, broadcasting, and transposition
/// all produce a new `Shape` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    dims: Vec<usize>,
    strides: Vec<isize>,
    size: usize,
}

impl Shape {
    /// Create a shape with contiguous row-major strides.
    pub fn new(dims: Vec<usize>) -> Self {
        let strides = row_major_strides(&dims);
        let size = dims.iter().product();
        Self {
            dims,
            strides,
            size,
        }
    }

    /// The 0-dimensional scalar shape (size 1, no axes).
    pub fn scalar() -> Self {
        Self::new(Vec::new())
    }

    /// Create a shape with explicit strides, as used for views.
    ///
    /// # Errors
    /// Returns [`Error::StrideLengthMismatch`] if `strides.len() != dims.len()`.
    pub fn with_strides(dims: Vec<usize>, strides: Vec<isize>) -> Result<Self> {
        if strides.len() != dims.len() {
            return Err(Error::StrideLengthMismatch);
        }
        let size = dims.iter().product();
        Ok(Self {
            dims,
            strides,
            size,
        })
    }

    /// Validate signed dimension sizes as handed around by host layers.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if any entry is negative.
    pub fn from_signed(dims: &[i64]) -> Result<Self> {
        let mut out = Vec::with_capacity(dims.len());
        for &d in dims {
            if d < 0 {
                return Err(Error::InvalidArgument("negative dimension size"));
            }
            out.push(d as usize);
        }
        Ok(Self::new(out))
    }

    /// Dimension sizes.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Element strides, one per dimension.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements (0 if any dimension is 0, 1 for scalars).
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of dimension `i`.
    #[inline]
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// Stride of dimension `i`.
    #[inline]
    pub fn stride(&self, i: usize) -> isize {
        self.strides[i]
    }

    /// True for 0-dimensional shapes.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// True if any dimension is walked with stride 0 (a broadcast view).
    pub fn has_zero_stride(&self) -> bool {
        self.dims
            .iter()
            .zip(&self.strides)
            .any(|(&d, &s)| d > 1 && s == 0)
    }

    /// Reorder dimensions and strides together.
    ///
    /// `axes` must be a permutation of `0..ndim`; transposition of a matrix
    /// view is `permuted(&[1, 0])`.
    pub fn permuted(&self, axes: &[usize]) -> Result<Self> {
        let nd = self.ndim();
        if axes.len() != nd {
            return Err(Error::InvalidArgument("permutation length != ndim"));
        }
        let mut seen = vec![false; nd];
        for &a in axes {
            if a >= nd || seen[a] {
                return Err(Error::InvalidArgument("axes are not a permutation"));
            }
            seen[a] = true;
        }
        let dims = axes.iter().map(|&a| self.dims[a]).collect();
        let strides = axes.iter().map(|&a| self.strides[a]).collect();
        Self::with_strides(dims, strides)
    }

    /// Flat element offset of `index` relative to `base`.
    #[inline]
    pub(crate) fn linear_offset(&self, index: &[usize], base: usize) -> usize {
        debug_assert_eq!(index.len(), self.dims.len());
        let mut off = base as isize;
        for (i, &ix) in index.iter().enumerate() {
            off += ix as isize * self.strides[i];
        }
        off as usize
    }
}

/// Contiguous row-major strides for the given dimensions.
pub(crate) fn row_major_strides(dims: &[usize]) -> Vec<isize> {
    let mut strides = vec![1isize; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1].max(1) as isize;
    }
    strides
}

/// Advance a row-major odometer index; the last axis moves fastest.
#[inline]
pub(crate) fn advance_index(index: &mut [usize], dims: &[usize]) {
    for i in (0..dims.len()).rev() {
        index[i] += 1;
        if index[i] < dims[i] {
            return;
        }
        index[i] = 0;
    }
}
