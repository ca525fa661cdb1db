//! NumPy-rule shape broadcasting.
//!
//! Two shapes broadcast by aligning their dimensions at the trailing axis;
//! missing leading dimensions behave as size 1, and a size-1 dimension
//! stretches to match any size by walking the same memory with stride 0.
//! [`resolve_shape`] computes the common output shape, [`broadcast_view`]
//! derives the stride-0 view of one input over that output, and
//! [`broadcast_many`] combines the two.

use crate::shape::Shape;
use crate::{Error, Result};

/// Size of `shape`'s dimension at output position `i`, right-aligned to
/// `nd` total dimensions. Missing leading positions read as 1.
#[inline]
fn aligned_dim(shape: &Shape, i: usize, nd: usize) -> usize {
    let lead = nd - shape.ndim();
    if i < lead {
        1
    } else {
        shape.dim(i - lead)
    }
}

/// A shape broadcasting rules treat as a plain scalar: rank 0, or rank 1
/// with a single element.
#[inline]
fn is_scalar_like(shape: &Shape) -> bool {
    shape.is_scalar() || (shape.ndim() == 1 && shape.dim(0) == 1)
}

/// Compute the common output shape for two or more input shapes.
///
/// Per output dimension, right-aligned: sizes of 1 (explicit or implicit
/// leading) are compatible with anything; the first concrete size becomes
/// the candidate, and any later concrete size must match it. Two shapes
/// that are already identical, or a scalar paired with anything, short-cut
/// without re-deriving the result.
///
/// The returned shape always carries fresh contiguous strides: it describes
/// a result allocation, never a view.
///
/// # Errors
/// [`Error::ShapeMismatch`] when two concrete non-1 sizes disagree;
/// [`Error::InvalidArgument`] for an empty input list.
pub fn resolve_shape(shapes: &[&Shape]) -> Result<Shape> {
    match shapes {
        [] => Err(Error::InvalidArgument(
            "resolve_shape needs at least one shape",
        )),
        [only] => Ok((*only).clone()),
        [left, right] => {
            if left == right {
                return Ok((*left).clone());
            }
            if is_scalar_like(left) {
                return Ok((*right).clone());
            }
            if is_scalar_like(right) {
                return Ok((*left).clone());
            }
            resolve_general(shapes)
        }
        _ => resolve_general(shapes),
    }
}

fn resolve_general(shapes: &[&Shape]) -> Result<Shape> {
    let nd = shapes.iter().map(|s| s.ndim()).max().unwrap_or(0);
    let mut out = vec![1usize; nd];
    for (i, slot) in out.iter_mut().enumerate() {
        for shape in shapes {
            let d = aligned_dim(shape, i, nd);
            if d == 1 {
                continue;
            }
            if *slot == 1 {
                *slot = d;
            } else if *slot != d {
                return Err(Error::ShapeMismatch(
                    shapes[0].dims().to_vec(),
                    shape.dims().to_vec(),
                ));
            }
        }
    }
    Ok(Shape::new(out))
}

/// Derive the view of `shape` walked as if it already had `target`'s shape.
///
/// Right-aligned per dimension: a dimension whose size equals the target's
/// keeps its stride; a dimension that is implicit (prepended) or has size 1
/// against a larger target size takes the target size with stride 0, so
/// every index along that axis reads the same element. No data moves.
///
/// # Errors
/// [`Error::ShapeMismatch`] when `shape` has more dimensions than `target`
/// or a concrete non-1 size disagrees with the target.
pub fn broadcast_view(shape: &Shape, target: &Shape) -> Result<Shape> {
    if shape.ndim() > target.ndim() {
        return Err(Error::ShapeMismatch(
            shape.dims().to_vec(),
            target.dims().to_vec(),
        ));
    }
    if shape.dims() == target.dims() {
        // Identity broadcast keeps the original strides untouched.
        return Ok(shape.clone());
    }
    let nd = target.ndim();
    let lead = nd - shape.ndim();
    let mut strides = Vec::with_capacity(nd);
    for i in 0..nd {
        if i < lead {
            strides.push(0);
            continue;
        }
        let d = shape.dim(i - lead);
        if d == target.dim(i) {
            strides.push(shape.stride(i - lead));
        } else if d == 1 {
            strides.push(0);
        } else {
            return Err(Error::ShapeMismatch(
                shape.dims().to_vec(),
                target.dims().to_vec(),
            ));
        }
    }
    Shape::with_strides(target.dims().to_vec(), strides)
}

/// Resolve the common shape of all inputs, then broadcast each input to it.
///
/// Returns one view shape per input, positionally matching `shapes`.
pub fn broadcast_many(shapes: &[&Shape]) -> Result<Vec<Shape>> {
    let target = resolve_shape(shapes)?;
    shapes
        .iter()
        .map(|shape| broadcast_view(shape, &target))
        .collect()
}
