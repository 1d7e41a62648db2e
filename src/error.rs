//! Allocator error types.

use thiserror::Error;

/// Errors reported by the buddy engines and the region layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
  /// The region cannot hold the control structure plus one block.
  #[error("region of {size} bytes is too small, need at least {required}")]
  RegionTooSmall {
    /// Size handed to `create`.
    size: usize,
    /// Smallest size the engine accepts.
    required: usize,
  },

  /// The engine needs a power-of-two region.
  #[error("region size {0} is not a power of two")]
  NotPowerOfTwo(usize),

  /// The region start cannot hold the control structure.
  #[error("region at {addr:#x} is not aligned to {align} bytes")]
  Misaligned {
    /// Region start address.
    addr: usize,
    /// Alignment the control structure needs.
    align: usize,
  },

  /// Zero-byte requests are never served.
  #[error("zero-sized allocation")]
  ZeroSize,

  /// The rounded request is larger than the largest block the engine hands out.
  #[error("requested {requested} bytes exceeds maximum block size {max}")]
  Oversized {
    /// Requested byte count.
    requested: usize,
    /// Largest block size.
    max: usize,
  },

  /// No free block large enough is left.
  #[error("no free block for {requested} bytes")]
  OutOfMemory {
    /// Requested byte count.
    requested: usize,
  },

  /// The tree engine ran out of node descriptors while splitting.
  #[error("node metadata region exhausted")]
  MetadataExhausted,

  /// `mmap` refused to hand out a region.
  #[error("mapping {0} bytes failed")]
  MapFailed(usize),

  /// Engine name not recognised by [`crate::Engine`]'s parser.
  #[error("unknown engine {0:?}")]
  UnknownEngine(String),
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;
