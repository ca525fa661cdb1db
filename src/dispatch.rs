//! Typecode-directed kernel selection.
//!
//! Every numeric operation runs as a monomorphic loop over native element
//! types. Selection walks the runtime typecodes once — result, then left,
//! then right — and hands back a function pointer to the loop instantiated
//! for exactly that combination, so no per-element virtual dispatch remains.
//! Operands are converted to the result's native type with [`CastFrom`]
//! before they are combined; accumulation happens in the result type.
//!
//! The dispatch cube covers the full closed typecode set. Combinations that
//! are deliberately not registered (boolean division, boolean matmul
//! accumulators) fail with [`Error::UnsupportedKernel`]; there is no
//! fallback loop and no silent truncation.

use crate::element::{dispatch_typecode, CastFrom, Element};
use crate::shape::advance_index;
use crate::storage::Storage;
use crate::typecode::Typecode;
use crate::{Error, Result};

/// Identity of an elementwise binary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "subtract",
            BinaryOp::Mul => "multiply",
            BinaryOp::Div => "divide",
        }
    }

    #[inline(always)]
    fn apply<T: Element>(self, a: T, b: T) -> T {
        match self {
            BinaryOp::Add => a.add(b),
            BinaryOp::Sub => a.sub(b),
            BinaryOp::Mul => a.mul(b),
            BinaryOp::Div => a.div(b),
        }
    }
}

// ============================================================================
// Elementwise binary kernels
// ============================================================================

type BinaryFn = fn(BinaryOp, &mut Storage, &Storage, &Storage) -> Result<()>;

/// A concrete elementwise loop for one (result, left, right) type triple.
#[derive(Clone, Copy, Debug)]
pub struct BinaryKernel {
    f: BinaryFn,
}

impl BinaryKernel {
    /// Apply the loop. All three views must already share the same
    /// dimensions; the left/right views may carry stride-0 broadcast axes.
    pub fn run(
        &self,
        op: BinaryOp,
        dest: &mut Storage,
        left: &Storage,
        right: &Storage,
    ) -> Result<()> {
        (self.f)(op, dest, left, right)
    }
}

/// Select the elementwise loop for an operation and typecode triple.
///
/// # Errors
/// [`Error::UnsupportedKernel`] for division involving booleans; that
/// combination has no registered loop.
pub fn select_kernel(
    op: BinaryOp,
    result: Typecode,
    left: Typecode,
    right: Typecode,
) -> Result<BinaryKernel> {
    if op == BinaryOp::Div
        && (result == Typecode::Bool || left == Typecode::Bool || right == Typecode::Bool)
    {
        return Err(Error::UnsupportedKernel {
            op: op.name(),
            result,
            left,
            right,
        });
    }
    Ok(dispatch_typecode!(result, R =>
        dispatch_typecode!(left, L =>
            dispatch_typecode!(right, Rt => BinaryKernel {
                f: binary_loop::<R, L, Rt>,
            }))))
}

fn binary_loop<R, L, Rt>(
    op: BinaryOp,
    dest: &mut Storage,
    left: &Storage,
    right: &Storage,
) -> Result<()>
where
    R: Element + CastFrom<L> + CastFrom<Rt>,
    L: Element,
    Rt: Element,
{
    let dims = dest.shape().dims().to_vec();
    debug_assert_eq!(left.shape().dims(), &dims[..]);
    debug_assert_eq!(right.shape().dims(), &dims[..]);

    let total = dest.shape().size();
    let dest_shape = dest.shape().clone();
    let dest_offset = dest.offset();
    let left_shape = left.shape();
    let right_shape = right.shape();

    let l_data = left.slice::<L>()?;
    let r_data = right.slice::<Rt>()?;
    let d_data = dest.slice_mut::<R>()?;

    let mut index = vec![0usize; dims.len()];
    for _ in 0..total {
        let lv = R::cast_from(l_data[left_shape.linear_offset(&index, left.offset())]);
        let rv = R::cast_from(r_data[right_shape.linear_offset(&index, right.offset())]);
        d_data[dest_shape.linear_offset(&index, dest_offset)] = op.apply(lv, rv);
        advance_index(&mut index, &dims);
    }
    Ok(())
}

// ============================================================================
// Matrix-product kernels
// ============================================================================

/// One (m, k) x (k, n) panel within possibly larger operands: element
/// offsets of each matrix start plus row/column strides.
#[derive(Debug, Clone, Copy)]
pub struct GemmPanel {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub dest_offset: usize,
    pub left_offset: usize,
    pub right_offset: usize,
    pub dest_rs: isize,
    pub dest_cs: isize,
    pub left_rs: isize,
    pub left_cs: isize,
    pub right_rs: isize,
    pub right_cs: isize,
}

type GemmFn = fn(&mut Storage, &Storage, &Storage, &GemmPanel) -> Result<()>;

/// A concrete matrix-product loop for one (result, left, right) type triple.
#[derive(Clone, Copy, Debug)]
pub struct GemmKernel {
    f: GemmFn,
}

impl GemmKernel {
    /// Run the panel product. The destination cells must be reachable
    /// through the panel's offsets and strides within each buffer.
    pub fn run(
        &self,
        dest: &mut Storage,
        left: &Storage,
        right: &Storage,
        panel: &GemmPanel,
    ) -> Result<()> {
        (self.f)(dest, left, right, panel)
    }
}

/// Select the matrix-product loop for a typecode triple.
///
/// Each output cell is the dot product of a left row and a right column,
/// accumulated in the result's native type.
///
/// # Errors
/// [`Error::UnsupportedKernel`] for a boolean accumulator; a sum over
/// products has no meaningful boolean reading.
pub fn select_gemm(result: Typecode, left: Typecode, right: Typecode) -> Result<GemmKernel> {
    if result == Typecode::Bool {
        return Err(Error::UnsupportedKernel {
            op: "matmul",
            result,
            left,
            right,
        });
    }
    Ok(dispatch_typecode!(result, R =>
        dispatch_typecode!(left, L =>
            dispatch_typecode!(right, Rt => GemmKernel {
                f: gemm_loop::<R, L, Rt>,
            }))))
}

#[inline(always)]
fn panel_offset(base: usize, i: usize, i_stride: isize, j: usize, j_stride: isize) -> usize {
    (base as isize + i as isize * i_stride + j as isize * j_stride) as usize
}

fn gemm_loop<R, L, Rt>(
    dest: &mut Storage,
    left: &Storage,
    right: &Storage,
    p: &GemmPanel,
) -> Result<()>
where
    R: Element + CastFrom<L> + CastFrom<Rt>,
    L: Element,
    Rt: Element,
{
    let l_data = left.slice::<L>()?;
    let r_data = right.slice::<Rt>()?;
    let d_data = dest.slice_mut::<R>()?;

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        // Rows of a contiguous output panel are disjoint chunks, so the row
        // loop can fan out without touching the strided general case.
        if p.n > 0
            && p.dest_cs == 1
            && p.dest_rs == p.n as isize
            && p.m * p.n * p.k.max(1) >= crate::MIN_PARALLEL_LEN
        {
            d_data[p.dest_offset..p.dest_offset + p.m * p.n]
                .par_chunks_mut(p.n)
                .enumerate()
                .for_each(|(row, out_row)| {
                    for (col, out) in out_row.iter_mut().enumerate() {
                        let mut acc = R::zero();
                        for i in 0..p.k {
                            let lv = R::cast_from(
                                l_data[panel_offset(p.left_offset, row, p.left_rs, i, p.left_cs)],
                            );
                            let rv = R::cast_from(
                                r_data[panel_offset(p.right_offset, i, p.right_rs, col, p.right_cs)],
                            );
                            acc = acc.add(lv.mul(rv));
                        }
                        *out = acc;
                    }
                });
            return Ok(());
        }
    }

    for row in 0..p.m {
        for col in 0..p.n {
            let mut acc = R::zero();
            for i in 0..p.k {
                let lv =
                    R::cast_from(l_data[panel_offset(p.left_offset, row, p.left_rs, i, p.left_cs)]);
                let rv = R::cast_from(
                    r_data[panel_offset(p.right_offset, i, p.right_rs, col, p.right_cs)],
                );
                acc = acc.add(lv.mul(rv));
            }
            d_data[panel_offset(p.dest_offset, row, p.dest_rs, col, p.dest_cs)] = acc;
        }
    }
    Ok(())
}

// ============================================================================
// Cast kernels
// ============================================================================

type CastFn = fn(&mut Storage, &Storage) -> Result<()>;

/// A concrete element-conversion loop for one (destination, source) pair.
#[derive(Clone, Copy)]
pub struct CastKernel {
    f: CastFn,
}

impl CastKernel {
    /// Convert every logical element of `src` into `dest`. Both views must
    /// share the same dimensions; `dest` is walked through its own strides.
    pub fn run(&self, dest: &mut Storage, src: &Storage) -> Result<()> {
        (self.f)(dest, src)
    }
}

/// Select the conversion loop for a (destination, source) typecode pair.
/// The pair square is fully covered for the closed typecode set.
pub fn select_cast(dst: Typecode, src: Typecode) -> Result<CastKernel> {
    Ok(dispatch_typecode!(dst, D =>
        dispatch_typecode!(src, S => CastKernel {
            f: cast_loop::<D, S>,
        })))
}

fn cast_loop<D, S>(dest: &mut Storage, src: &Storage) -> Result<()>
where
    D: Element + CastFrom<S>,
    S: Element,
{
    if dest.shape().dims() != src.shape().dims() {
        return Err(Error::ShapeMismatch(
            dest.shape().dims().to_vec(),
            src.shape().dims().to_vec(),
        ));
    }
    let dims = src.shape().dims().to_vec();
    let total = src.shape().size();
    let dest_shape = dest.shape().clone();
    let dest_offset = dest.offset();
    let src_shape = src.shape();

    let s_data = src.slice::<S>()?;
    let d_data = dest.slice_mut::<D>()?;

    let mut index = vec![0usize; dims.len()];
    for _ in 0..total {
        d_data[dest_shape.linear_offset(&index, dest_offset)] =
            D::cast_from(s_data[src_shape.linear_offset(&index, src.offset())]);
        advance_index(&mut index, &dims);
    }
    Ok(())
}
