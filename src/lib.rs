//! Dense n-d array kernels: NumPy-rule broadcasting, runtime typecode
//! promotion, and statically dispatched numeric loops.
//!
//! The crate provides the engine underneath a NumPy-style array library:
//! shape-based views over flat, reference-counted buffers, automatic
//! broadcasting between mismatched shapes, and element-type-polymorphic
//! arithmetic routed to monomorphic loops without per-element virtual
//! dispatch.
//!
//! # Core Types
//!
//! - [`Shape`]: dimension sizes plus strides; stride-0 axes mark broadcast
//!   views that re-read the same memory
//! - [`Storage`] / [`Buffer`]: a logical view (typecode + shape + offset)
//!   over a shared physical element buffer
//! - [`Typecode`]: the closed element-type universe and its promotion order
//!
//! # Primary API
//!
//! ## Broadcasting
//!
//! - [`resolve_shape`]: common output shape for two or more inputs
//! - [`broadcast_view`]: stride-0 view of one shape over a target
//! - [`broadcast_many`]: both of the above for every input at once
//!
//! ## Typed kernels
//!
//! - [`select_kernel`], [`select_gemm`], [`select_cast`]: runtime typecode
//!   triple/pair to monomorphic loop
//! - [`add`], [`subtract`], [`multiply`], [`divide`], [`binary_into`]:
//!   elementwise arithmetic with broadcasting and type promotion
//! - [`dot`], [`matmul`], [`dot_into`]: rank-dispatched inner, matrix, and
//!   batched matrix products
//! - [`cast`]: whole-array element conversion
//! - [`sum`], [`sum_axis`]: additive reductions
//!
//! # Example
//!
//! ```rust
//! use ndkernel::{add, dot, Shape, Storage, Typecode};
//!
//! // [2, 3] + [3] broadcasts the row vector across both rows.
//! let a = Storage::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], Shape::new(vec![2, 3]))?;
//! let b = Storage::from_vec(vec![10.0f64, 20.0, 30.0], Shape::new(vec![3]))?;
//! let sum = add(&a, &b)?;
//! assert_eq!(sum.to_vec::<f64>()?, vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
//!
//! // Mixed element types promote: i32 . f64 accumulates in f64.
//! let m = Storage::from_vec(vec![1i32, 2, 3, 4], Shape::new(vec![2, 2]))?;
//! let v = Storage::from_vec(vec![0.5f64, 0.5], Shape::new(vec![2]))?;
//! assert_eq!(dot(&m, &v)?.typecode(), Typecode::F64);
//! # Ok::<(), ndkernel::Error>(())
//! ```

mod broadcast;
mod cast;
mod dispatch;
mod element;
mod matmul;
mod ops;
mod reduce;
mod shape;
mod storage;
mod typecode;

// ============================================================================
// Shapes and broadcasting
// ============================================================================
pub use broadcast::{broadcast_many, broadcast_view, resolve_shape};
pub use shape::Shape;

// ============================================================================
// Element types and storage
// ============================================================================
pub use element::{CastFrom, Element};
pub use storage::{Buffer, Storage};
pub use typecode::Typecode;

// ============================================================================
// Kernel dispatch
// ============================================================================
pub use dispatch::{
    select_cast, select_gemm, select_kernel, BinaryKernel, BinaryOp, CastKernel, GemmKernel,
    GemmPanel,
};

// ============================================================================
// Numeric operations
// ============================================================================
pub use cast::cast;
pub use matmul::{dot, dot_into, matmul};
pub use ops::{add, binary, binary_into, divide, multiply, subtract};
pub use reduce::{sum, sum_axis};

// ============================================================================
// Constants
// ============================================================================

/// Minimum number of scalar multiply-adds before a matrix-product loop is
/// handed to the thread pool. Below this, fan-out overhead dominates.
#[cfg(feature = "parallel")]
pub const MIN_PARALLEL_LEN: usize = 32 * 1024;

// ============================================================================
// Error types
// ============================================================================

/// Errors reported by the array engine.
///
/// All failures are synchronous and non-retryable: an operation either
/// returns a complete result or fails without mutating anything beyond a
/// caller-provided output buffer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operand shapes cannot be broadcast or contracted together.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// No kernel is registered for this operation and typecode combination.
    #[error("no {op} kernel for result {result:?} with operands {left:?}, {right:?}")]
    UnsupportedKernel {
        op: &'static str,
        result: Typecode,
        left: Typecode,
        right: Typecode,
    },

    /// The operand rank combination is deliberately out of scope.
    #[error("{op} not supported for operand ranks {left_ndim} and {right_ndim}")]
    UnsupportedRank {
        op: &'static str,
        left_ndim: usize,
        right_ndim: usize,
    },

    /// Invalid axis index for the array's rank.
    #[error("invalid axis {axis} for rank {ndim}")]
    InvalidAxis { axis: usize, ndim: usize },

    /// Stride array length doesn't match the dimension count.
    #[error("stride and dims length mismatch")]
    StrideLengthMismatch,

    /// A typed accessor was used against a buffer of a different typecode.
    #[error("type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch { expected: Typecode, got: Typecode },

    /// A write targeted a buffer still referenced by another view.
    #[error("cannot write through a shared buffer; materialize with clone_data first")]
    SharedBufferWrite,

    /// A write targeted a stride-0 broadcast view, which would fan out to
    /// every aliased position.
    #[error("cannot write through a stride-0 broadcast view; materialize with clone_data first")]
    BroadcastWrite,

    /// A structurally invalid input.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Result type for array engine operations.
pub type Result<T> = std::result::Result<T, Error>;
