//! Reference-counted element buffers and the logical views over them.
//!
//! A [`Buffer`] owns a flat, typed element array behind an `Arc`; a
//! [`Storage`] is one logical view into such a buffer: a typecode, a
//! [`Shape`] (dimensions plus strides), and a starting element offset.
//! Broadcasting, reshaping, and transposition all produce new `Storage`
//! values aliasing the same buffer; the buffer is released when the last
//! view referencing it drops.
//!
//! Writes are a checked precondition, not an implicit hazard: mutable access
//! requires the buffer to be exclusively owned and the view to be free of
//! stride-0 broadcast dimensions, so a write can never silently fan out
//! through aliases. Callers that need a writable copy materialize one with
//! [`Storage::clone_data`] first.

use std::sync::Arc;

use crate::element::{dispatch_typecode, Element};
use crate::shape::{advance_index, Shape};
use crate::typecode::Typecode;
use crate::{Error, Result};

/// A flat, shared element buffer; one variant per supported typecode.
#[derive(Debug, Clone)]
pub enum Buffer {
    Bool(Arc<Vec<bool>>),
    U8(Arc<Vec<u8>>),
    I16(Arc<Vec<i16>>),
    I32(Arc<Vec<i32>>),
    I64(Arc<Vec<i64>>),
    F32(Arc<Vec<f32>>),
    F64(Arc<Vec<f64>>),
}

impl Buffer {
    /// The element type stored in this buffer.
    pub fn typecode(&self) -> Typecode {
        match self {
            Buffer::Bool(_) => Typecode::Bool,
            Buffer::U8(_) => Typecode::U8,
            Buffer::I16(_) => Typecode::I16,
            Buffer::I32(_) => Typecode::I32,
            Buffer::I64(_) => Typecode::I64,
            Buffer::F32(_) => Typecode::F32,
            Buffer::F64(_) => Typecode::F64,
        }
    }

    /// Number of physical elements.
    pub fn len(&self) -> usize {
        match self {
            Buffer::Bool(d) => d.len(),
            Buffer::U8(d) => d.len(),
            Buffer::I16(d) => d.len(),
            Buffer::I32(d) => d.len(),
            Buffer::I64(d) => d.len(),
            Buffer::F32(d) => d.len(),
            Buffer::F64(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when no other view shares this buffer.
    pub fn is_exclusive(&self) -> bool {
        match self {
            Buffer::Bool(d) => Arc::strong_count(d) == 1,
            Buffer::U8(d) => Arc::strong_count(d) == 1,
            Buffer::I16(d) => Arc::strong_count(d) == 1,
            Buffer::I32(d) => Arc::strong_count(d) == 1,
            Buffer::I64(d) => Arc::strong_count(d) == 1,
            Buffer::F32(d) => Arc::strong_count(d) == 1,
            Buffer::F64(d) => Arc::strong_count(d) == 1,
        }
    }
}

/// One logical array: a typed buffer plus the view describing how to walk it.
#[derive(Debug, Clone)]
pub struct Storage {
    shape: Shape,
    offset: usize,
    buffer: Buffer,
}

impl Storage {
    /// Wrap an owned element vector; the vector length must match the shape.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: Shape) -> Result<Self> {
        if data.len() != shape.size() {
            return Err(Error::InvalidArgument(
                "element count does not match shape size",
            ));
        }
        Ok(Self {
            shape,
            offset: 0,
            buffer: T::buffer_from_vec(data),
        })
    }

    /// A 0-dimensional array holding a single value.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self {
            shape: Shape::scalar(),
            offset: 0,
            buffer: T::buffer_from_vec(vec![value]),
        }
    }

    /// A zero-filled contiguous array of the given typecode and shape.
    pub fn zeros(typecode: Typecode, shape: Shape) -> Self {
        let size = shape.size();
        dispatch_typecode!(typecode, T => Self {
            shape,
            offset: 0,
            buffer: <T as Element>::buffer_from_vec(vec![<T as Element>::zero(); size]),
        })
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn typecode(&self) -> Typecode {
        self.buffer.typecode()
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// True when this view is the only one referencing its buffer.
    pub fn is_exclusive(&self) -> bool {
        self.buffer.is_exclusive()
    }

    /// A new view over the same buffer with a different shape.
    ///
    /// The buffer is never copied; the new shape's strides and the current
    /// offset must keep every addressable element inside the buffer.
    pub fn alias(&self, shape: Shape) -> Result<Self> {
        validate_bounds(self.buffer.len(), &shape, self.offset)?;
        Ok(Self {
            shape,
            offset: self.offset,
            buffer: self.buffer.clone(),
        })
    }

    /// A view over the same buffer with both a new shape and a new offset,
    /// used when stepping into sub-arrays.
    pub(crate) fn alias_at(&self, shape: Shape, offset: usize) -> Result<Self> {
        validate_bounds(self.buffer.len(), &shape, offset)?;
        Ok(Self {
            shape,
            offset,
            buffer: self.buffer.clone(),
        })
    }

    /// Materialize this view into an exclusively owned, contiguous,
    /// row-major copy with the same dimensions.
    ///
    /// Collapses stride-0 broadcast dimensions by duplicating the aliased
    /// elements, so the copy is safe to write through.
    pub fn clone_data(&self) -> Result<Self> {
        dispatch_typecode!(self.typecode(), T => {
            let gathered = gather::<T>(self)?;
            Self::from_vec(gathered, Shape::new(self.shape.dims().to_vec()))
        })
    }

    /// Borrow the physical buffer as a typed slice.
    pub fn slice<T: Element>(&self) -> Result<&[T]> {
        T::buffer_slice(&self.buffer).ok_or(Error::TypeMismatch {
            expected: T::TYPECODE,
            got: self.typecode(),
        })
    }

    /// Mutably borrow the physical buffer as a typed slice.
    ///
    /// Fails with [`Error::SharedBufferWrite`] when another view still
    /// references the buffer, and with [`Error::BroadcastWrite`] when this
    /// view walks any dimension with stride 0.
    pub fn slice_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        if self.typecode() != T::TYPECODE {
            return Err(Error::TypeMismatch {
                expected: T::TYPECODE,
                got: self.typecode(),
            });
        }
        if self.shape.has_zero_stride() {
            return Err(Error::BroadcastWrite);
        }
        T::buffer_slice_mut(&mut self.buffer).ok_or(Error::SharedBufferWrite)
    }

    /// Check the write preconditions without borrowing the data.
    pub fn ensure_writable(&self) -> Result<()> {
        if self.shape.has_zero_stride() {
            return Err(Error::BroadcastWrite);
        }
        if !self.buffer.is_exclusive() {
            return Err(Error::SharedBufferWrite);
        }
        Ok(())
    }

    /// Read one element through the view.
    pub fn get<T: Element>(&self, index: &[usize]) -> Result<T> {
        if index.len() != self.shape.ndim() {
            return Err(Error::InvalidArgument("index rank does not match shape"));
        }
        for (i, &ix) in index.iter().enumerate() {
            if ix >= self.shape.dim(i) {
                return Err(Error::InvalidArgument("index out of bounds"));
            }
        }
        let data = self.slice::<T>()?;
        Ok(data[self.shape.linear_offset(index, self.offset)])
    }

    /// All logical elements in row-major order; mostly a test convenience.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        gather(self)
    }
}

/// Collect every logical element of a view in row-major order.
fn gather<T: Element>(storage: &Storage) -> Result<Vec<T>> {
    let data = storage.slice::<T>()?;
    let shape = storage.shape();
    let total = shape.size();
    let mut out = Vec::with_capacity(total);
    let mut index = vec![0usize; shape.ndim()];
    for _ in 0..total {
        out.push(data[shape.linear_offset(&index, storage.offset())]);
        advance_index(&mut index, shape.dims());
    }
    Ok(out)
}

/// Reject views whose extreme offsets fall outside the physical buffer.
fn validate_bounds(buffer_len: usize, shape: &Shape, offset: usize) -> Result<()> {
    if shape.size() == 0 {
        return Ok(());
    }
    let mut lo = offset as isize;
    let mut hi = offset as isize;
    for (i, &d) in shape.dims().iter().enumerate() {
        let span = (d as isize - 1) * shape.stride(i);
        if span >= 0 {
            hi += span;
        } else {
            lo += span;
        }
    }
    if lo < 0 || hi >= buffer_len as isize {
        return Err(Error::InvalidArgument("view exceeds buffer bounds"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::broadcast_view;

    #[test]
    fn from_vec_checks_length() {
        let err = Storage::from_vec(vec![1.0f64; 5], Shape::new(vec![2, 3])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn alias_shares_the_buffer() {
        let a = Storage::from_vec((0..6).collect::<Vec<i32>>(), Shape::new(vec![2, 3])).unwrap();
        let t = a.alias(a.shape().permuted(&[1, 0]).unwrap()).unwrap();
        assert!(!a.is_exclusive());
        assert_eq!(t.get::<i32>(&[2, 1]).unwrap(), a.get::<i32>(&[1, 2]).unwrap());
    }

    #[test]
    fn alias_round_trips_through_broadcast() {
        let a = Storage::from_vec(vec![1i64, 2, 3], Shape::new(vec![1, 3])).unwrap();
        let view = broadcast_view(a.shape(), &Shape::new(vec![4, 3])).unwrap();
        let b = a.alias(view).unwrap();
        for row in 0..4 {
            for col in 0..3 {
                assert_eq!(
                    b.get::<i64>(&[row, col]).unwrap(),
                    a.get::<i64>(&[0, col]).unwrap()
                );
            }
        }
    }

    #[test]
    fn alias_rejects_out_of_bounds_views() {
        let a = Storage::from_vec(vec![0.0f32; 6], Shape::new(vec![2, 3])).unwrap();
        let err = a.alias(Shape::new(vec![7])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn clone_data_collapses_broadcast_views() {
        let a = Storage::from_vec(vec![5i32, 7], Shape::new(vec![2, 1])).unwrap();
        let view = broadcast_view(a.shape(), &Shape::new(vec![2, 3])).unwrap();
        let dense = a.alias(view).unwrap().clone_data().unwrap();
        assert!(dense.is_exclusive());
        assert_eq!(dense.shape().dims(), &[2, 3]);
        assert!(!dense.shape().has_zero_stride());
        assert_eq!(dense.to_vec::<i32>().unwrap(), vec![5, 5, 5, 7, 7, 7]);
    }

    #[test]
    fn writes_through_shared_buffers_are_rejected() {
        let mut a = Storage::from_vec(vec![0u8; 4], Shape::new(vec![4])).unwrap();
        let _alias = a.alias(Shape::new(vec![4])).unwrap();
        assert!(matches!(
            a.slice_mut::<u8>().unwrap_err(),
            Error::SharedBufferWrite
        ));
    }

    #[test]
    fn writes_through_broadcast_views_are_rejected() {
        let a = Storage::from_vec(vec![1.0f64], Shape::new(vec![1])).unwrap();
        let view = broadcast_view(a.shape(), &Shape::new(vec![8])).unwrap();
        let mut b = Storage {
            shape: view,
            offset: 0,
            buffer: a.buffer.clone(),
        };
        drop(a);
        assert!(matches!(
            b.slice_mut::<f64>().unwrap_err(),
            Error::BroadcastWrite
        ));
    }

    #[test]
    fn typed_access_checks_the_typecode() {
        let a = Storage::from_vec(vec![1i32, 2], Shape::new(vec![2])).unwrap();
        assert!(matches!(
            a.slice::<f64>().unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn zeros_has_the_requested_typecode() {
        let z = Storage::zeros(Typecode::I16, Shape::new(vec![3, 2]));
        assert_eq!(z.typecode(), Typecode::I16);
        assert_eq!(z.to_vec::<i16>().unwrap(), vec![0i16; 6]);
    }
}
