//! Size classes of the free-list engine.
//!
//! ```text
//!   class:   0    1    2    3    4     5
//!   size:   32   64  128  256  512  1024   (64 bit targets)
//! ```
//!
//! The smallest class is the smallest power of two able to hold a free
//! [`Block`] header, the largest is [`MAX_BLOCK_SIZE`].

use std::mem;

use crate::{AllocError, AllocResult, align::round_up_power_of_two, block::Block};

/// Smallest block the free-list engine hands out.
pub const MIN_BLOCK_SIZE: usize = mem::size_of::<Block>().next_power_of_two();

/// Largest block the free-list engine hands out.
pub const MAX_BLOCK_SIZE: usize = 1 << 10;

/// Number of free lists.
pub const NUM_SIZE_CLASSES: usize =
  (MAX_BLOCK_SIZE.trailing_zeros() - MIN_BLOCK_SIZE.trailing_zeros() + 1) as usize;

/// Block size of `class`.
pub const fn class_size(class: usize) -> usize {
  MIN_BLOCK_SIZE << class
}

/// Class index of a power-of-two block size within range.
pub const fn class_index(size: usize) -> usize {
  (size.trailing_zeros() - MIN_BLOCK_SIZE.trailing_zeros()) as usize
}

/// Smallest class whose block holds `size` bytes.
pub fn class_for(size: usize) -> AllocResult<usize> {
  if size == 0 {
    return Err(AllocError::ZeroSize);
  }

  match round_up_power_of_two(size) {
    Some(rounded) if rounded <= MAX_BLOCK_SIZE => Ok(class_index(rounded.max(MIN_BLOCK_SIZE))),
    _ => Err(AllocError::Oversized {
      requested: size,
      max: MAX_BLOCK_SIZE,
    }),
  }
}
