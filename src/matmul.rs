//! Matrix multiply and dot product orchestration.
//!
//! `dot` classifies its operands by rank and routes to one of a fixed set of
//! terminal behaviors:
//!
//! 1. both 0-d: elementwise multiply;
//! 2. one 0-d: elementwise multiply with the scalar broadcast;
//! 3. both 1-d: inner product, accumulated in the promoted common type;
//! 4. both 2-d: classic matrix product, `(m, k) x (k, n) -> (m, n)`;
//! 5. both >= 2-d with at least one above 2: batched matrix product — the
//!    trailing two axes are matrices, all leading axes broadcast together
//!    and the rank-2 product runs once per leading coordinate, in
//!    row-major order.
//!
//! An n-d left against a 1-d right is a sum product over the trailing axes.
//! A 1-d left against a higher-rank right has no sound contraction-axis
//! reading here and fails rather than guessing one.

use crate::broadcast::{broadcast_view, resolve_shape};
use crate::dispatch::{select_cast, select_gemm, GemmPanel};
use crate::ops;
use crate::reduce::sum_axis;
use crate::shape::{advance_index, Shape};
use crate::storage::Storage;
use crate::typecode::Typecode;
use crate::{Error, Result};

/// Dot product of two arrays, allocating the result.
///
/// The result typecode is the promoted common type of the operands.
pub fn dot(left: &Storage, right: &Storage) -> Result<Storage> {
    let lnd = left.shape().ndim();
    let rnd = right.shape().ndim();

    if lnd == 0 || rnd == 0 {
        return ops::multiply(left, right);
    }
    if lnd == 1 && rnd == 1 {
        let mut dest = Storage::zeros(
            Typecode::common_type(left.typecode(), right.typecode()),
            Shape::scalar(),
        );
        run_vector_dot(&mut dest, left, right)?;
        return Ok(dest);
    }
    if lnd == 2 && rnd == 2 {
        let (m, n) = check_inner_dims(left, right)?;
        let mut dest = Storage::zeros(
            Typecode::common_type(left.typecode(), right.typecode()),
            Shape::new(vec![m, n]),
        );
        run_matmul2(&mut dest, left, right)?;
        return Ok(dest);
    }
    if rnd == 1 {
        // Sum product over the trailing axes of both operands.
        if left.shape().dim(lnd - 1) != right.shape().dim(0) {
            return Err(Error::ShapeMismatch(
                left.shape().dims().to_vec(),
                right.shape().dims().to_vec(),
            ));
        }
        let prod = ops::multiply(left, right)?;
        let last = prod.shape().ndim() - 1;
        return sum_axis(&prod, last);
    }
    if lnd == 1 {
        return Err(Error::UnsupportedRank {
            op: "dot",
            left_ndim: lnd,
            right_ndim: rnd,
        });
    }

    let plan = BatchPlan::new(left, right)?;
    let mut dest = Storage::zeros(
        Typecode::common_type(left.typecode(), right.typecode()),
        Shape::new(plan.out_dims.clone()),
    );
    plan.run(&mut dest, left, right)?;
    Ok(dest)
}

/// Matrix product of two arrays; identical rank dispatch to [`dot`].
pub fn matmul(left: &Storage, right: &Storage) -> Result<Storage> {
    dot(left, right)
}

/// Dot product written into a caller-provided output array.
///
/// The output's dimensions must match the result exactly; its buffer must
/// be exclusively owned and stride-0-free. Accumulation happens in the
/// output's native type, whatever its typecode within the closed set.
pub fn dot_into(left: &Storage, right: &Storage, out: &mut Storage) -> Result<()> {
    let lnd = left.shape().ndim();
    let rnd = right.shape().ndim();

    if lnd == 0 || rnd == 0 {
        return ops::binary_into(crate::dispatch::BinaryOp::Mul, out, left, right);
    }
    if lnd == 1 && rnd == 1 {
        if !out.shape().is_scalar() {
            return Err(Error::ShapeMismatch(out.shape().dims().to_vec(), vec![]));
        }
        out.ensure_writable()?;
        return run_vector_dot(out, left, right);
    }
    if lnd == 2 && rnd == 2 {
        let (m, n) = check_inner_dims(left, right)?;
        if out.shape().dims() != [m, n] {
            return Err(Error::ShapeMismatch(
                out.shape().dims().to_vec(),
                vec![m, n],
            ));
        }
        out.ensure_writable()?;
        return run_matmul2(out, left, right);
    }
    if rnd == 1 {
        let expected = &left.shape().dims()[..lnd - 1];
        if out.shape().dims() != expected {
            return Err(Error::ShapeMismatch(
                out.shape().dims().to_vec(),
                expected.to_vec(),
            ));
        }
        out.ensure_writable()?;
        let result = dot(left, right)?;
        let kernel = select_cast(out.typecode(), result.typecode())?;
        return kernel.run(out, &result);
    }
    if lnd == 1 {
        return Err(Error::UnsupportedRank {
            op: "dot",
            left_ndim: lnd,
            right_ndim: rnd,
        });
    }

    let plan = BatchPlan::new(left, right)?;
    if out.shape().dims() != plan.out_dims {
        return Err(Error::ShapeMismatch(
            out.shape().dims().to_vec(),
            plan.out_dims.clone(),
        ));
    }
    out.ensure_writable()?;
    plan.run(out, left, right)
}

/// Validate the `(m, k) x (k, n)` inner dimensions of two rank-2 operands.
fn check_inner_dims(left: &Storage, right: &Storage) -> Result<(usize, usize)> {
    let k = left.shape().dim(1);
    if k != right.shape().dim(0) {
        return Err(Error::ShapeMismatch(
            left.shape().dims().to_vec(),
            right.shape().dims().to_vec(),
        ));
    }
    Ok((left.shape().dim(0), right.shape().dim(1)))
}

fn run_vector_dot(dest: &mut Storage, left: &Storage, right: &Storage) -> Result<()> {
    let k = left.shape().dim(0);
    if k != right.shape().dim(0) {
        return Err(Error::ShapeMismatch(
            left.shape().dims().to_vec(),
            right.shape().dims().to_vec(),
        ));
    }
    let kernel = select_gemm(dest.typecode(), left.typecode(), right.typecode())?;
    let panel = GemmPanel {
        m: 1,
        k,
        n: 1,
        dest_offset: dest.offset(),
        left_offset: left.offset(),
        right_offset: right.offset(),
        dest_rs: 0,
        dest_cs: 0,
        left_rs: 0,
        left_cs: left.shape().stride(0),
        right_rs: right.shape().stride(0),
        right_cs: 0,
    };
    kernel.run(dest, left, right, &panel)
}

fn run_matmul2(dest: &mut Storage, left: &Storage, right: &Storage) -> Result<()> {
    let kernel = select_gemm(dest.typecode(), left.typecode(), right.typecode())?;
    let panel = GemmPanel {
        m: left.shape().dim(0),
        k: left.shape().dim(1),
        n: right.shape().dim(1),
        dest_offset: dest.offset(),
        left_offset: left.offset(),
        right_offset: right.offset(),
        dest_rs: dest.shape().stride(0),
        dest_cs: dest.shape().stride(1),
        left_rs: left.shape().stride(0),
        left_cs: left.shape().stride(1),
        right_rs: right.shape().stride(0),
        right_cs: right.shape().stride(1),
    };
    kernel.run(dest, left, right, &panel)
}

/// Broadcast plan for the batched case: leading axes resolved to a common
/// shape, trailing two axes left as matrices.
struct BatchPlan {
    lead: Shape,
    left_lead_view: Shape,
    right_lead_view: Shape,
    out_dims: Vec<usize>,
    m: usize,
    k: usize,
    n: usize,
}

impl BatchPlan {
    fn new(left: &Storage, right: &Storage) -> Result<Self> {
        let lnd = left.shape().ndim();
        let rnd = right.shape().ndim();
        let (m, k) = (left.shape().dim(lnd - 2), left.shape().dim(lnd - 1));
        let (k2, n) = (right.shape().dim(rnd - 2), right.shape().dim(rnd - 1));
        if k != k2 {
            return Err(Error::ShapeMismatch(
                left.shape().dims().to_vec(),
                right.shape().dims().to_vec(),
            ));
        }

        let left_lead = Shape::with_strides(
            left.shape().dims()[..lnd - 2].to_vec(),
            left.shape().strides()[..lnd - 2].to_vec(),
        )?;
        let right_lead = Shape::with_strides(
            right.shape().dims()[..rnd - 2].to_vec(),
            right.shape().strides()[..rnd - 2].to_vec(),
        )?;
        let lead = resolve_shape(&[&left_lead, &right_lead])?;
        let left_lead_view = broadcast_view(&left_lead, &lead)?;
        let right_lead_view = broadcast_view(&right_lead, &lead)?;

        let mut out_dims = lead.dims().to_vec();
        out_dims.push(m);
        out_dims.push(n);

        Ok(Self {
            lead,
            left_lead_view,
            right_lead_view,
            out_dims,
            m,
            k,
            n,
        })
    }

    /// Run the rank-2 product once per leading coordinate, row-major.
    fn run(&self, dest: &mut Storage, left: &Storage, right: &Storage) -> Result<()> {
        let kernel = select_gemm(dest.typecode(), left.typecode(), right.typecode())?;
        let lnd = left.shape().ndim();
        let rnd = right.shape().ndim();
        let lead_nd = self.lead.ndim();
        let dest_shape = dest.shape().clone();

        let mut coord = vec![0usize; lead_nd];
        for _ in 0..self.lead.size() {
            let panel = GemmPanel {
                m: self.m,
                k: self.k,
                n: self.n,
                dest_offset: offset_at(dest.offset(), &coord, &dest_shape.strides()[..lead_nd]),
                left_offset: offset_at(left.offset(), &coord, self.left_lead_view.strides()),
                right_offset: offset_at(right.offset(), &coord, self.right_lead_view.strides()),
                dest_rs: dest_shape.stride(lead_nd),
                dest_cs: dest_shape.stride(lead_nd + 1),
                left_rs: left.shape().stride(lnd - 2),
                left_cs: left.shape().stride(lnd - 1),
                right_rs: right.shape().stride(rnd - 2),
                right_cs: right.shape().stride(rnd - 1),
            };
            kernel.run(dest, left, right, &panel)?;
            advance_index(&mut coord, self.lead.dims());
        }
        Ok(())
    }
}

#[inline]
fn offset_at(base: usize, coord: &[usize], strides: &[isize]) -> usize {
    let mut off = base as isize;
    for (&c, &s) in coord.iter().zip(strides) {
        off += c as isize * s;
    }
    off as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_f64(values: &[f64], dims: &[usize]) -> Storage {
        Storage::from_vec(values.to_vec(), Shape::new(dims.to_vec())).unwrap()
    }

    #[test]
    fn scalar_cases_multiply() {
        let s = Storage::scalar(3.0f64);
        let t = Storage::scalar(4.0f64);
        assert_eq!(dot(&s, &t).unwrap().get::<f64>(&[]).unwrap(), 12.0);

        let a = storage_f64(&[1.0, 2.0, 3.0], &[3]);
        let scaled = dot(&s, &a).unwrap();
        assert_eq!(scaled.shape().dims(), &[3]);
        assert_eq!(scaled.to_vec::<f64>().unwrap(), vec![3.0, 6.0, 9.0]);
    }

    #[test]
    fn vector_dot() {
        let a = storage_f64(&[1.0, 2.0, 3.0, 4.0], &[4]);
        let b = storage_f64(&[5.0, 6.0, 7.0, 8.0], &[4]);
        let d = dot(&a, &b).unwrap();
        assert!(d.shape().is_scalar());
        assert_eq!(d.get::<f64>(&[]).unwrap(), 70.0);
    }

    #[test]
    fn vector_dot_length_mismatch() {
        let a = Storage::zeros(Typecode::F64, Shape::new(vec![4]));
        let b = Storage::zeros(Typecode::F64, Shape::new(vec![5]));
        assert!(matches!(
            dot(&a, &b).unwrap_err(),
            Error::ShapeMismatch(_, _)
        ));
    }

    #[test]
    fn rank2_matmul_values() {
        // (2x3) . (3x4)
        let a = storage_f64(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = storage_f64(
            &[
                1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0,
            ],
            &[3, 4],
        );
        let c = dot(&a, &b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 4]);
        assert_eq!(
            c.to_vec::<f64>().unwrap(),
            vec![38.0, 44.0, 50.0, 56.0, 83.0, 98.0, 113.0, 128.0]
        );
    }

    #[test]
    fn rank2_inner_dim_mismatch() {
        let a = Storage::zeros(Typecode::F64, Shape::new(vec![2, 3]));
        let b = Storage::zeros(Typecode::F64, Shape::new(vec![4, 2]));
        assert!(matches!(
            dot(&a, &b).unwrap_err(),
            Error::ShapeMismatch(_, _)
        ));
    }

    #[test]
    fn rank2_promotes_mixed_typecodes() {
        let a = Storage::from_vec(vec![1i32, 2, 3, 4], Shape::new(vec![2, 2])).unwrap();
        let b = storage_f64(&[0.5, 0.0, 0.0, 0.5], &[2, 2]);
        let c = dot(&a, &b).unwrap();
        assert_eq!(c.typecode(), Typecode::F64);
        assert_eq!(c.to_vec::<f64>().unwrap(), vec![0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn transposed_operand_multiplies_through_its_strides() {
        let a = storage_f64(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let at = a.alias(a.shape().permuted(&[1, 0]).unwrap()).unwrap();
        let b = storage_f64(&[1.0, 0.0, 0.0, 1.0], &[2, 2]);
        let c = dot(&at, &b).unwrap();
        assert_eq!(c.to_vec::<f64>().unwrap(), vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn nd_times_vector_is_a_trailing_sum_product() {
        let a = storage_f64(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let v = storage_f64(&[1.0, 10.0, 100.0], &[3]);
        let out = dot(&a, &v).unwrap();
        assert_eq!(out.shape().dims(), &[2]);
        assert_eq!(out.to_vec::<f64>().unwrap(), vec![321.0, 654.0]);
    }

    #[test]
    fn vector_times_matrix_is_unsupported() {
        let v = Storage::zeros(Typecode::F64, Shape::new(vec![3]));
        let m = Storage::zeros(Typecode::F64, Shape::new(vec![3, 2]));
        assert!(matches!(
            dot(&v, &m).unwrap_err(),
            Error::UnsupportedRank { .. }
        ));
    }

    #[test]
    fn batched_matmul_broadcasts_leading_dims() {
        let left = Storage::zeros(Typecode::F64, Shape::new(vec![2, 1, 3, 4]));
        let right = Storage::zeros(Typecode::F64, Shape::new(vec![1, 5, 4, 6]));
        let out = dot(&left, &right).unwrap();
        assert_eq!(out.shape().dims(), &[2, 5, 3, 6]);
    }

    #[test]
    fn batched_matmul_matches_per_batch_rank2_products() {
        // left: [2, 2, 3], right: [2, 3, 2] -> out [2, 2, 2]; each batch b
        // must equal the plain rank-2 product of its panels.
        let left_data: Vec<f64> = (0..12).map(f64::from).collect();
        let right_data: Vec<f64> = (0..12).map(|v| f64::from(v) * 0.5).collect();
        let left = storage_f64(&left_data, &[2, 2, 3]);
        let right = storage_f64(&right_data, &[2, 3, 2]);
        let out = dot(&left, &right).unwrap();

        for b in 0..2 {
            let lp = left
                .alias_at(
                    Shape::with_strides(vec![2, 3], vec![3, 1]).unwrap(),
                    b * 6,
                )
                .unwrap();
            let rp = right
                .alias_at(
                    Shape::with_strides(vec![3, 2], vec![2, 1]).unwrap(),
                    b * 6,
                )
                .unwrap();
            let expected = dot(&lp, &rp).unwrap();
            for i in 0..2 {
                for j in 0..2 {
                    assert_eq!(
                        out.get::<f64>(&[b, i, j]).unwrap(),
                        expected.get::<f64>(&[i, j]).unwrap()
                    );
                }
            }
        }
    }

    #[test]
    fn batched_inner_dim_mismatch_reports_full_shapes() {
        let left = Storage::zeros(Typecode::F64, Shape::new(vec![2, 3, 4]));
        let right = Storage::zeros(Typecode::F64, Shape::new(vec![2, 5, 6]));
        match dot(&left, &right).unwrap_err() {
            Error::ShapeMismatch(l, r) => {
                assert_eq!(l, vec![2, 3, 4]);
                assert_eq!(r, vec![2, 5, 6]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn dot_into_uses_the_output_typecode_as_accumulator() {
        let a = Storage::from_vec(vec![100i16, 100, 100, 100], Shape::new(vec![2, 2])).unwrap();
        let b = Storage::from_vec(vec![100i16, 100, 100, 100], Shape::new(vec![2, 2])).unwrap();
        let mut out = Storage::zeros(Typecode::I64, Shape::new(vec![2, 2]));
        dot_into(&a, &b, &mut out).unwrap();
        assert_eq!(out.to_vec::<i64>().unwrap(), vec![20_000i64; 4]);
    }

    #[test]
    fn dot_into_validates_the_output_shape() {
        let a = Storage::zeros(Typecode::F64, Shape::new(vec![2, 3]));
        let b = Storage::zeros(Typecode::F64, Shape::new(vec![3, 4]));
        let mut out = Storage::zeros(Typecode::F64, Shape::new(vec![2, 5]));
        assert!(matches!(
            dot_into(&a, &b, &mut out).unwrap_err(),
            Error::ShapeMismatch(_, _)
        ));
    }

    #[test]
    fn dot_into_rejects_shared_outputs() {
        let a = Storage::zeros(Typecode::F64, Shape::new(vec![2, 2]));
        let b = Storage::zeros(Typecode::F64, Shape::new(vec![2, 2]));
        let mut out = Storage::zeros(Typecode::F64, Shape::new(vec![2, 2]));
        let _held = out.alias(out.shape().clone()).unwrap();
        assert!(matches!(
            dot_into(&a, &b, &mut out).unwrap_err(),
            Error::SharedBufferWrite
        ));
    }
}
