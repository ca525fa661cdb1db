//! Sum reductions.
//!
//! Accumulation stays in the array's own element type; callers wanting a
//! wider accumulator cast first. Booleans reduce with `or`, so a boolean
//! sum is an "any" test.

use crate::element::{dispatch_typecode, Element};
use crate::shape::{advance_index, Shape};
use crate::storage::Storage;
use crate::{Error, Result};

/// Sum every element into a 0-dimensional array.
pub fn sum(a: &Storage) -> Result<Storage> {
    dispatch_typecode!(a.typecode(), T => {
        let total = sum_all::<T>(a)?;
        Ok(Storage::scalar(total))
    })
}

/// Sum along one axis; the result drops that axis from the shape.
pub fn sum_axis(a: &Storage, axis: usize) -> Result<Storage> {
    let ndim = a.shape().ndim();
    if axis >= ndim {
        return Err(Error::InvalidAxis { axis, ndim });
    }
    dispatch_typecode!(a.typecode(), T => sum_axis_typed::<T>(a, axis))
}

fn sum_all<T: Element>(a: &Storage) -> Result<T> {
    let data = a.slice::<T>()?;
    let shape = a.shape();
    let mut acc = T::zero();
    let mut index = vec![0usize; shape.ndim()];
    for _ in 0..shape.size() {
        acc = acc.add(data[shape.linear_offset(&index, a.offset())]);
        advance_index(&mut index, shape.dims());
    }
    Ok(acc)
}

fn sum_axis_typed<T: Element>(a: &Storage, axis: usize) -> Result<Storage> {
    let shape = a.shape();
    let out_dims: Vec<usize> = shape
        .dims()
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != axis)
        .map(|(_, &d)| d)
        .collect();
    let out_shape = Shape::new(out_dims);
    let mut out = vec![T::zero(); out_shape.size()];

    // Per-source-dimension stride into the output; the reduced axis
    // contributes nothing.
    let mut out_map = vec![0isize; shape.ndim()];
    let mut j = 0;
    for i in 0..shape.ndim() {
        if i == axis {
            continue;
        }
        out_map[i] = out_shape.stride(j);
        j += 1;
    }

    let data = a.slice::<T>()?;
    let mut index = vec![0usize; shape.ndim()];
    for _ in 0..shape.size() {
        let mut out_lin = 0isize;
        for (i, &ix) in index.iter().enumerate() {
            out_lin += ix as isize * out_map[i];
        }
        let slot = &mut out[out_lin as usize];
        *slot = slot.add(data[shape.linear_offset(&index, a.offset())]);
        advance_index(&mut index, shape.dims());
    }

    Storage::from_vec(out, out_shape)
}
