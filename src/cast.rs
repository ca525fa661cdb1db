//! Whole-array element type conversion.

use crate::dispatch::select_cast;
use crate::shape::Shape;
use crate::storage::Storage;
use crate::typecode::Typecode;
use crate::Result;

/// Convert an array to the given typecode.
///
/// Always materializes: the result is a contiguous, exclusively owned copy
/// with the source's dimensions, so casting a broadcast or transposed view
/// also densifies it. A same-typecode cast is equivalent to
/// [`Storage::clone_data`].
pub fn cast(src: &Storage, typecode: Typecode) -> Result<Storage> {
    let mut out = Storage::zeros(typecode, Shape::new(src.shape().dims().to_vec()));
    let kernel = select_cast(typecode, src.typecode())?;
    kernel.run(&mut out, src)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::broadcast_view;

    #[test]
    fn float_to_int_truncates() {
        let a = Storage::from_vec(vec![1.9f64, -2.7, 0.2], Shape::new(vec![3])).unwrap();
        let b = cast(&a, Typecode::I32).unwrap();
        assert_eq!(b.typecode(), Typecode::I32);
        assert_eq!(b.to_vec::<i32>().unwrap(), vec![1, -2, 0]);
    }

    #[test]
    fn int_to_float_is_exact_for_small_values() {
        let a = Storage::from_vec(vec![-4i16, 0, 9], Shape::new(vec![3])).unwrap();
        let b = cast(&a, Typecode::F32).unwrap();
        assert_eq!(b.to_vec::<f32>().unwrap(), vec![-4.0, 0.0, 9.0]);
    }

    #[test]
    fn numeric_to_bool_tests_nonzero() {
        let a = Storage::from_vec(vec![0i64, 3, -1], Shape::new(vec![3])).unwrap();
        let b = cast(&a, Typecode::Bool).unwrap();
        assert_eq!(b.to_vec::<bool>().unwrap(), vec![false, true, true]);
    }

    #[test]
    fn same_typecode_cast_densifies_views() {
        let a = Storage::from_vec(vec![7u8, 8], Shape::new(vec![2, 1])).unwrap();
        let view = broadcast_view(a.shape(), &Shape::new(vec![2, 2])).unwrap();
        let dense = cast(&a.alias(view).unwrap(), Typecode::U8).unwrap();
        assert!(dense.is_exclusive());
        assert!(!dense.shape().has_zero_stride());
        assert_eq!(dense.to_vec::<u8>().unwrap(), vec![7, 7, 8, 8]);
    }
}
