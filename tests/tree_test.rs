//! Integration tests for the tree engine.

mod common;

use common::{assert_disjoint, assert_payloads_independent, fill_randomly, release_shuffled};
use rbuddy::{
  AllocError, ArenaAllocator, TREE_MIN_REGION, TreeAllocator,
  region::{self, DEFAULT_REGION_SIZE},
};

fn create() -> TreeAllocator {
  let memory = region::map(DEFAULT_REGION_SIZE).unwrap();
  unsafe { TreeAllocator::create(memory, DEFAULT_REGION_SIZE) }.unwrap()
}

fn destroy(allocator: TreeAllocator) {
  unsafe { allocator.destroy(DEFAULT_REGION_SIZE) };
}

#[test]
fn test_rejects_non_power_of_two() {
  let memory = region::map(DEFAULT_REGION_SIZE).unwrap();

  unsafe {
    assert_eq!(
      TreeAllocator::create(memory, 4000).err(),
      Some(AllocError::NotPowerOfTwo(4000))
    );
    assert_eq!(
      TreeAllocator::create(memory, 0).err(),
      Some(AllocError::NotPowerOfTwo(0))
    );
    region::unmap(memory, DEFAULT_REGION_SIZE);
  }
}

#[test]
fn test_minimum_viable_region() {
  let smallest = TREE_MIN_REGION.next_power_of_two();
  let memory = region::map(DEFAULT_REGION_SIZE).unwrap();

  assert_eq!(
    unsafe { TreeAllocator::create(memory, smallest / 2) }.err(),
    Some(AllocError::RegionTooSmall {
      size: smallest / 2,
      required: TREE_MIN_REGION,
    })
  );

  let mut allocator = unsafe { TreeAllocator::create(memory, smallest) }.unwrap();
  assert!(allocator.capacity() >= 1);
  assert!(allocator.allocate(allocator.capacity()).is_ok());

  destroy(allocator);
}

#[test]
fn test_reuses_released_block() {
  let mut allocator = create();

  let a = allocator.allocate(64).unwrap();
  let b = allocator.allocate(64).unwrap();
  assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 64);

  unsafe { allocator.release(a) };
  let used = allocator.nodes_used();

  assert_eq!(allocator.allocate(64).unwrap(), a);
  assert_eq!(allocator.nodes_used(), used);

  unsafe {
    allocator.release(a);
    allocator.release(b);
  }
  assert_eq!(allocator.stats().free_blocks, vec![(allocator.capacity(), 1)]);

  destroy(allocator);
}

#[test]
fn test_round_trip_in_random_order() {
  for seed in 0..16 {
    let mut allocator = create();
    let initial = allocator.stats();

    // Requests of 32 bytes and up stay within the descriptor budget for most
    // of the tree.
    let (live, err) = fill_randomly(&mut allocator, 32..=300, 1, seed);
    assert!(
      matches!(err, AllocError::OutOfMemory { .. } | AllocError::MetadataExhausted),
      "{:?}",
      err
    );

    let used: usize = live.iter().map(|l| l.size).sum();
    assert!(!live.is_empty());
    assert_eq!(allocator.stats().used_bytes, used);

    assert_disjoint(&live);
    assert_payloads_independent(&live);

    release_shuffled(&mut allocator, live, seed);
    assert_eq!(allocator.stats(), initial);

    destroy(allocator);
  }
}

#[test]
fn test_buddies_merge_in_either_order() {
  for reverse in [false, true] {
    let mut allocator = create();
    let quarter = allocator.capacity() / 4;

    let half = allocator.allocate(quarter * 2).unwrap();
    let a = allocator.allocate(quarter).unwrap();
    let b = allocator.allocate(quarter).unwrap();

    assert_eq!(
      allocator.allocate(quarter * 2),
      Err(AllocError::OutOfMemory {
        requested: quarter * 2
      })
    );

    unsafe {
      if reverse {
        allocator.release(b);
        allocator.release(a);
      } else {
        allocator.release(a);
        allocator.release(b);
      }
    }

    assert_eq!(allocator.allocate(quarter * 2).unwrap(), a.min(b));

    unsafe {
      allocator.release(a.min(b));
      allocator.release(half);
    }
    assert_eq!(allocator.stats().used_bytes, 0);

    destroy(allocator);
  }
}

#[test]
fn test_oversized_request_fails_on_fresh_arena() {
  let mut allocator = create();
  let capacity = allocator.capacity();

  assert_eq!(
    allocator.allocate(capacity + 1),
    Err(AllocError::Oversized {
      requested: capacity + 1,
      max: capacity,
    })
  );
  assert_eq!(allocator.allocate(0), Err(AllocError::ZeroSize));
  assert!(allocator.allocate(capacity).is_ok());

  destroy(allocator);
}

#[test]
fn test_metadata_exhaustion_is_reported() {
  let mut allocator = create();

  // A one-byte block needs a far deeper tree than the metadata region holds.
  assert_eq!(allocator.allocate(1), Err(AllocError::MetadataExhausted));
  assert_eq!(allocator.stats().free_bytes, allocator.capacity());
  assert!(allocator.nodes_used() <= allocator.node_capacity());

  destroy(allocator);
}
