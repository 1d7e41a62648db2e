//! Tree buddy engine.
//!
//! Allocation state lives in [`Node`] descriptors kept in a metadata region
//! between the control structure and the payload arena. The arena itself
//! only ever holds caller data:
//!
//! ```text
//!   region (power of two)
//!   ┌─────────┬───────────────────────────────┬──────────────────────────────┐
//!   │ Control │ nodes[0] nodes[1] ... [cap-1] │ arena (`arena_size` bytes)   │
//!   └─────────┴───────────────────────────────┴──────────────────────────────┘
//!                                              ▲
//!                                              └── memory
//! ```
//!
//! Node `i` has children `2i + 1` and `2i + 2`, so a split only needs room for
//! the right child's slot. Slots are handed out once and never reclaimed;
//! merging only flips states back to [`NodeState::Free`].

use std::{mem, ptr::NonNull};

use log::{debug, error, trace, warn};

use crate::{
  AllocError, AllocResult, ArenaAllocator, BuddyStats,
  align::{largest_power_of_two, round_up_power_of_two},
  node::{self, Node, NodeState, left, parent, right},
  region,
};

#[repr(C)]
struct Control {
  nodes: NonNull<Node>,
  /// Node slots the metadata region holds.
  capacity: usize,
  /// One past the highest slot ever written.
  cursor: usize,
  memory: NonNull<u8>,
  arena_size: usize,
}

/// Bytes reserved at the start of the region for the control structure.
pub const TREE_OVERHEAD: usize = crate::align!(mem::size_of::<Control>());

/// Smallest byte count that fits the control structure, the root descriptor
/// and a one-byte arena. Region sizes must also be powers of two.
pub const TREE_MIN_REGION: usize = TREE_OVERHEAD + mem::size_of::<Node>() + 1;

/// Why a subtree could not serve a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Miss {
  NoFit,
  Metadata,
}

/// Buddy allocator tracking blocks in a binary tree of descriptors.
pub struct TreeAllocator {
  control: NonNull<Control>,
}

impl Control {
  fn node(
    &self,
    index: usize,
  ) -> &Node {
    debug_assert!(index < self.cursor);
    unsafe { &*self.nodes.as_ptr().add(index) }
  }

  fn node_mut(
    &mut self,
    index: usize,
  ) -> &mut Node {
    debug_assert!(index < self.cursor);
    unsafe { &mut *self.nodes.as_ptr().add(index) }
  }

  fn split(
    &mut self,
    index: usize,
  ) -> Result<(), Miss> {
    let (left, right) = (left(index), right(index));

    if right >= self.capacity {
      trace!("no descriptor slots left to split node {}", index);
      return Err(Miss::Metadata);
    }

    let half = self.node(index).size / 2;
    unsafe {
      self.nodes.as_ptr().add(left).write(Node::new(half));
      self.nodes.as_ptr().add(right).write(Node::new(half));
    }
    self.cursor = self.cursor.max(right + 1);
    self.node_mut(index).state = NodeState::Split;

    trace!("split node {} into two {} byte halves", index, half);
    Ok(())
  }

  /// Depth-first search for a free node of exactly `want` bytes, splitting
  /// on the way down.
  fn find(
    &mut self,
    index: usize,
    want: usize,
  ) -> Result<usize, Miss> {
    let node = *self.node(index);

    if node.size < want {
      return Err(Miss::NoFit);
    }

    match node.state {
      NodeState::Allocated => Err(Miss::NoFit),
      NodeState::Free if node.size == want => {
        self.node_mut(index).state = NodeState::Allocated;
        Ok(index)
      }
      NodeState::Free => {
        self.split(index)?;

        let found = self.descend(index, want);
        if found.is_err() {
          self.node_mut(index).state = NodeState::Free;
        }
        found
      }
      NodeState::Split if node.size == want => Err(Miss::NoFit),
      NodeState::Split => self.descend(index, want),
    }
  }

  fn descend(
    &mut self,
    index: usize,
    want: usize,
  ) -> Result<usize, Miss> {
    match self.find(left(index), want) {
      Ok(found) => Ok(found),
      Err(miss) => self.find(right(index), want).map_err(|other| miss.max(other)),
    }
  }

  fn allocate(
    &mut self,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    if size == 0 {
      warn!("allocation refused: zero-sized request");
      return Err(AllocError::ZeroSize);
    }

    let Some(want) = round_up_power_of_two(size).filter(|&want| want <= self.arena_size) else {
      warn!(
        "allocation refused: {} bytes exceeds the {} byte arena",
        size, self.arena_size
      );
      return Err(AllocError::Oversized {
        requested: size,
        max: self.arena_size,
      });
    };

    match self.find(0, want) {
      Ok(index) => {
        let offset = node::offset(index, want);
        trace!(
          "allocated node {} ({} bytes at offset {:#x}) for a {} byte request",
          index, want, offset, size
        );
        Ok(unsafe { self.memory.add(offset) })
      }
      Err(Miss::NoFit) => {
        warn!("no free node for {} bytes", size);
        Err(AllocError::OutOfMemory { requested: size })
      }
      Err(Miss::Metadata) => {
        warn!(
          "no free node for {} bytes: {} descriptor slots exhausted",
          size, self.capacity
        );
        Err(AllocError::MetadataExhausted)
      }
    }
  }

  fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    let Some(offset) = (ptr.as_ptr() as usize)
      .checked_sub(self.memory.as_ptr() as usize)
      .filter(|&offset| offset < self.arena_size)
    else {
      error!(
        "release of {:?} outside arena {:?}..+{:#x}",
        ptr, self.memory, self.arena_size
      );
      return;
    };

    let mut index = 0;
    let mut base = 0;

    loop {
      let node = *self.node(index);

      match node.state {
        NodeState::Split => {
          let half = node.size / 2;
          if offset < base + half {
            index = left(index);
          } else {
            index = right(index);
            base += half;
          }
        }
        NodeState::Allocated if base == offset => break,
        _ => {
          error!("release of {:?}, which is not an allocated block", ptr);
          return;
        }
      }
    }

    self.node_mut(index).state = NodeState::Free;

    while index != 0 {
      let up = parent(index);

      if !(self.node(left(up)).is_free() && self.node(right(up)).is_free()) {
        break;
      }

      self.node_mut(up).state = NodeState::Free;
      trace!("merged children of node {} ({} bytes)", up, self.node(up).size);
      index = up;
    }
  }

  fn stats(&self) -> BuddyStats {
    let mut stats = BuddyStats::new(self.arena_size);
    let mut pending = vec![0];

    while let Some(index) = pending.pop() {
      let node = self.node(index);

      match node.state {
        NodeState::Free => stats.add_free(node.size, 1),
        NodeState::Split => pending.extend([left(index), right(index)]),
        NodeState::Allocated => {}
      }
    }

    stats.finish()
  }
}

impl TreeAllocator {
  fn control(&self) -> &Control {
    unsafe { self.control.as_ref() }
  }

  fn control_mut(&mut self) -> &mut Control {
    unsafe { self.control.as_mut() }
  }

  /// Start of the payload arena.
  pub fn arena_base(&self) -> NonNull<u8> {
    self.control().memory
  }

  /// Descriptor slots in the metadata region.
  pub fn node_capacity(&self) -> usize {
    self.control().capacity
  }

  /// Descriptor slots written so far.
  pub fn nodes_used(&self) -> usize {
    self.control().cursor
  }
}

impl ArenaAllocator for TreeAllocator {
  unsafe fn create(
    region: NonNull<u8>,
    size: usize,
  ) -> AllocResult<Self> {
    if !size.is_power_of_two() {
      warn!("tree region of {} bytes is not a power of two", size);
      return Err(AllocError::NotPowerOfTwo(size));
    }

    let addr = region.as_ptr() as usize;
    let align = mem::align_of::<Control>();

    if addr % align != 0 {
      warn!("tree region at {:#x} is misaligned", addr);
      return Err(AllocError::Misaligned { addr, align });
    }

    if size < TREE_MIN_REGION {
      warn!(
        "tree region of {} bytes is below the minimum of {}",
        size, TREE_MIN_REGION
      );
      return Err(AllocError::RegionTooSmall {
        size,
        required: TREE_MIN_REGION,
      });
    }

    let available = size - TREE_OVERHEAD;
    let arena_size = largest_power_of_two(available - mem::size_of::<Node>());
    let capacity = (available - arena_size) / mem::size_of::<Node>();
    let control = region.cast::<Control>();

    unsafe {
      let nodes = region.add(TREE_OVERHEAD).cast::<Node>();
      let memory = region.add(size - arena_size);

      nodes.as_ptr().write(Node::new(arena_size));
      control.as_ptr().write(Control {
        nodes,
        capacity,
        cursor: 1,
        memory,
        arena_size,
      });
    }

    debug!(
      "tree allocator over {} bytes at {:#x}: {} byte arena, {} descriptor slots",
      size, addr, arena_size, capacity
    );

    Ok(Self { control })
  }

  fn allocate(
    &mut self,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    self.control_mut().allocate(size)
  }

  unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    self.control_mut().release(ptr)
  }

  unsafe fn destroy(
    self,
    size: usize,
  ) {
    debug!(
      "destroying tree allocator at {:?} ({} of {} descriptor slots used)",
      self.control,
      self.nodes_used(),
      self.node_capacity()
    );
    unsafe { region::unmap(self.control.cast(), size) }
  }

  fn capacity(&self) -> usize {
    self.control().arena_size
  }

  fn stats(&self) -> BuddyStats {
    self.control().stats()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::region::{DEFAULT_REGION_SIZE, map};

  fn with_allocator(test: impl FnOnce(&mut TreeAllocator)) {
    let region = map(DEFAULT_REGION_SIZE).unwrap();
    let mut allocator = unsafe { TreeAllocator::create(region, DEFAULT_REGION_SIZE) }.unwrap();
    test(&mut allocator);
    unsafe { allocator.destroy(DEFAULT_REGION_SIZE) };
  }

  #[test]
  fn test_layout() {
    with_allocator(|allocator| {
      let region_end = allocator.control.as_ptr() as usize + DEFAULT_REGION_SIZE;
      let arena = allocator.arena_base().as_ptr() as usize;

      assert_eq!(allocator.capacity(), DEFAULT_REGION_SIZE / 2);
      assert_eq!(arena + allocator.capacity(), region_end);
      assert_eq!(arena % allocator.capacity(), 0);
      assert!(
        allocator.control.as_ptr() as usize + TREE_OVERHEAD + allocator.node_capacity() * mem::size_of::<Node>()
          <= arena
      );
      assert_eq!(allocator.nodes_used(), 1);
    });
  }

  #[test]
  fn test_left_child_first() {
    with_allocator(|allocator| {
      let half = allocator.capacity() / 2;
      let base = allocator.arena_base().as_ptr() as usize;

      let a = allocator.allocate(half).unwrap();
      let b = allocator.allocate(half).unwrap();

      assert_eq!(a.as_ptr() as usize, base);
      assert_eq!(b.as_ptr() as usize, base + half);
      assert_eq!(allocator.nodes_used(), 3);
      assert_eq!(
        allocator.allocate(1),
        Err(AllocError::OutOfMemory { requested: 1 })
      );
    });
  }

  #[test]
  fn test_split_node_is_searched_after_partial_use() {
    with_allocator(|allocator| {
      let quarter = allocator.capacity() / 4;

      let a = allocator.allocate(quarter).unwrap();
      let b = allocator.allocate(quarter).unwrap();
      let c = allocator.allocate(quarter * 2).unwrap();

      assert_ne!(a, b);
      assert_eq!(allocator.stats().free_bytes, 0);
      unsafe { allocator.release(c) };
      assert_eq!(allocator.stats().free_count(quarter * 2), 1);
    });
  }

  #[test]
  fn test_release_climbs_to_root() {
    with_allocator(|allocator| {
      let ptr = allocator.allocate(32).unwrap();
      assert!(allocator.stats().free_blocks.len() > 1);

      unsafe { allocator.release(ptr) };

      let stats = allocator.stats();
      assert_eq!(stats.free_blocks, vec![(allocator.capacity(), 1)]);
      assert_eq!(stats.used_bytes, 0);
    });
  }

  #[test]
  fn test_failed_descent_undoes_split() {
    with_allocator(|allocator| {
      let used = allocator.nodes_used();
      let before = allocator.stats();

      assert_eq!(allocator.allocate(1), Err(AllocError::MetadataExhausted));
      assert_eq!(allocator.stats(), before);
      assert!(allocator.nodes_used() > used);
    });
  }

  #[test]
  fn test_release_of_unallocated_pointer_is_ignored() {
    with_allocator(|allocator| {
      let ptr = allocator.allocate(64).unwrap();
      let before = allocator.stats();

      unsafe {
        allocator.release(ptr.byte_add(64));
        allocator.release(ptr.byte_add(1));
      }

      assert_eq!(allocator.stats(), before);
    });
  }
}
