//! Elementwise binary operations over broadcastable arrays.
//!
//! Orchestration only: the common shape comes from the broadcast resolver,
//! each operand is re-viewed with stride-0 axes, the result type from the
//! promotion order, and the typed loop from the kernel dispatcher.

use crate::broadcast::{broadcast_view, resolve_shape};
use crate::dispatch::{select_kernel, BinaryOp};
use crate::shape::Shape;
use crate::storage::Storage;
use crate::typecode::Typecode;
use crate::Result;

/// Elementwise sum of two arrays, broadcasting as needed.
pub fn add(left: &Storage, right: &Storage) -> Result<Storage> {
    binary(BinaryOp::Add, left, right)
}

/// Elementwise difference of two arrays, broadcasting as needed.
pub fn subtract(left: &Storage, right: &Storage) -> Result<Storage> {
    binary(BinaryOp::Sub, left, right)
}

/// Elementwise product of two arrays, broadcasting as needed.
pub fn multiply(left: &Storage, right: &Storage) -> Result<Storage> {
    binary(BinaryOp::Mul, left, right)
}

/// Elementwise quotient of two arrays, broadcasting as needed.
pub fn divide(left: &Storage, right: &Storage) -> Result<Storage> {
    binary(BinaryOp::Div, left, right)
}

/// Run a binary operation into a freshly allocated array.
///
/// The result's shape is the broadcast of both operand shapes and its
/// typecode the promoted common type of the operand typecodes.
pub fn binary(op: BinaryOp, left: &Storage, right: &Storage) -> Result<Storage> {
    let target = resolve_shape(&[left.shape(), right.shape()])?;
    let result_tc = Typecode::common_type(left.typecode(), right.typecode());
    let mut out = Storage::zeros(result_tc, Shape::new(target.dims().to_vec()));
    run(op, &mut out, left, right)?;
    Ok(out)
}

/// Run a binary operation into a caller-provided output array.
///
/// The output's dimensions must equal the broadcast shape exactly, and its
/// buffer must be exclusively owned and free of stride-0 axes. Operands are
/// converted to the output's typecode, whatever it is within the closed set.
pub fn binary_into(
    op: BinaryOp,
    out: &mut Storage,
    left: &Storage,
    right: &Storage,
) -> Result<()> {
    let target = resolve_shape(&[left.shape(), right.shape()])?;
    if out.shape().dims() != target.dims() {
        return Err(crate::Error::ShapeMismatch(
            out.shape().dims().to_vec(),
            target.dims().to_vec(),
        ));
    }
    out.ensure_writable()?;
    run(op, out, left, right)
}

fn run(op: BinaryOp, out: &mut Storage, left: &Storage, right: &Storage) -> Result<()> {
    let target = out.shape().clone();
    let lv = left.alias(broadcast_view(left.shape(), &target)?)?;
    let rv = right.alias(broadcast_view(right.shape(), &target)?)?;
    let kernel = select_kernel(op, out.typecode(), left.typecode(), right.typecode())?;
    kernel.run(op, out, &lv, &rv)
}
