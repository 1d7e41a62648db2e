//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::{ops::RangeInclusive, ptr::NonNull};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use rbuddy::{AllocError, ArenaAllocator};

/// A live allocation: pointer and the block size it was rounded to.
#[derive(Debug, Clone, Copy)]
pub struct Live {
  pub ptr: NonNull<u8>,
  pub size: usize,
}

/// Panics if any two live blocks overlap.
pub fn assert_disjoint(live: &[Live]) {
  let mut ranges: Vec<(usize, usize)> = live
    .iter()
    .map(|l| (l.ptr.as_ptr() as usize, l.ptr.as_ptr() as usize + l.size))
    .collect();
  ranges.sort_unstable();

  for pair in ranges.windows(2) {
    assert!(
      pair[0].1 <= pair[1].0,
      "blocks {:#x?} and {:#x?} overlap",
      pair[0],
      pair[1]
    );
  }
}

/// Fills each block with a byte derived from its index, then checks none of
/// the patterns were clobbered.
pub fn assert_payloads_independent(live: &[Live]) {
  unsafe {
    for (i, l) in live.iter().enumerate() {
      std::ptr::write_bytes(l.ptr.as_ptr(), i as u8, l.size);
    }

    for (i, l) in live.iter().enumerate() {
      let bytes = std::slice::from_raw_parts(l.ptr.as_ptr(), l.size);
      assert!(bytes.iter().all(|&b| b == i as u8), "block {} was overwritten", i);
    }
  }
}

/// Allocates random sizes from `sizes` until the allocator refuses, returning
/// every live block and the final error.
pub fn fill_randomly<A: ArenaAllocator>(
  allocator: &mut A,
  sizes: RangeInclusive<usize>,
  min_block: usize,
  seed: u64,
) -> (Vec<Live>, AllocError) {
  use rand::Rng;

  let mut rng = StdRng::seed_from_u64(seed);
  let mut live = Vec::new();

  loop {
    let request = rng.gen_range(sizes.clone());

    match allocator.allocate(request) {
      Ok(ptr) => live.push(Live {
        ptr,
        size: request.next_power_of_two().max(min_block),
      }),
      Err(err) => return (live, err),
    }
  }
}

/// Releases every block in a shuffled order.
pub fn release_shuffled<A: ArenaAllocator>(
  allocator: &mut A,
  mut live: Vec<Live>,
  seed: u64,
) {
  live.shuffle(&mut StdRng::seed_from_u64(seed));

  for l in live {
    unsafe { allocator.release(l.ptr) };
  }
}
