//! Free-list buddy engine.
//!
//! Blocks live in place inside the arena. A free block's first bytes hold its
//! [`Block`] header, which doubles as its node in the free list of its size
//! class:
//!
//! ```text
//!   region
//!   ┌──────────────────────┬──────────────────────────────────────┬─────────┐
//!   │ Control              │ arena (one block of `arena_size`)    │ unused  │
//!   │  lists[class]        │ ┌──────┬──────┬────────────┬─────── │         │
//!   │  classes[slot]       │ │ hdr  │ hdr  │    hdr     │        │         │
//!   │  memory, arena_size  │ └──────┴──────┴────────────┴─────── │         │
//!   └──────────────────────┴──────────────────────────────────────┴─────────┘
//! ```
//!
//! Two blocks of size `s` are buddies iff their arena offsets satisfy
//! `a ^ b == s`. Releasing a block merges it with its buddy for as long as the
//! buddy sits in the same class's free list.
//!
//! The class of every handed-out block is recorded in `classes`, one byte per
//! minimum-size slot, so release never trusts bytes the caller owns.

use std::{mem, ptr::NonNull};

use log::{debug, error, trace, warn};

use crate::{
  AllocError, AllocResult, ArenaAllocator, BuddyStats,
  align::largest_power_of_two,
  block::{Block, FreeList},
  region,
  size_class::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, NUM_SIZE_CLASSES, class_for, class_index, class_size},
};

const SLOTS: usize = MAX_BLOCK_SIZE / MIN_BLOCK_SIZE;

#[repr(C)]
struct Control {
  lists: [FreeList; NUM_SIZE_CLASSES],
  /// `class + 1` at the first slot of an allocated block, 0 elsewhere.
  classes: [u8; SLOTS],
  memory: NonNull<u8>,
  arena_size: usize,
}

/// Bytes reserved at the start of the region for the control structure.
pub const FREE_LIST_OVERHEAD: usize = crate::align!(mem::size_of::<Control>());

/// Smallest region [`FreeListAllocator::create`] accepts.
pub const FREE_LIST_MIN_REGION: usize = FREE_LIST_OVERHEAD + MIN_BLOCK_SIZE;

/// Buddy allocator keeping one intrusive free list per size class.
///
/// The handle is a pointer to the control structure inside the region it
/// manages, so it is neither `Send` nor `Sync`.
pub struct FreeListAllocator {
  control: NonNull<Control>,
}

impl Control {
  fn block_at(
    &self,
    offset: usize,
  ) -> *mut Block {
    self.memory.as_ptr().wrapping_add(offset).cast()
  }

  /// Arena offset of `ptr` if it can start a block.
  fn offset_of(
    &self,
    ptr: *mut u8,
  ) -> Option<usize> {
    let offset = (ptr as usize).checked_sub(self.memory.as_ptr() as usize)?;
    (offset < self.arena_size && offset % MIN_BLOCK_SIZE == 0).then_some(offset)
  }

  /// Halves the head block of `class` into two blocks of `class - 1`.
  unsafe fn split(
    &mut self,
    class: usize,
  ) {
    unsafe {
      let Some(block) = self.lists[class].pop_front() else {
        return;
      };

      let half = class_size(class - 1);
      let upper = block.byte_add(half);

      // Lower half ends up at the head, so allocations fill the arena bottom-up.
      self.lists[class - 1].push_front(upper, half);
      self.lists[class - 1].push_front(block, half);

      trace!(
        "split {} byte block at offset {:#x}",
        half * 2,
        block as usize - self.memory.as_ptr() as usize
      );
    }
  }

  fn allocate(
    &mut self,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    let class = class_for(size).inspect_err(|err| warn!("allocation refused: {}", err))?;

    let Some(mut current) = (class..NUM_SIZE_CLASSES).find(|&c| !self.lists[c].is_empty()) else {
      warn!(
        "no free block for {} bytes ({} byte class)",
        size,
        class_size(class)
      );
      return Err(AllocError::OutOfMemory { requested: size });
    };

    while current > class {
      unsafe { self.split(current) };
      current -= 1;
    }

    let block = unsafe { self.lists[class].pop_front() }
      .and_then(|block| NonNull::new(block.cast::<u8>()))
      .ok_or(AllocError::OutOfMemory { requested: size })?;

    let offset = block.as_ptr() as usize - self.memory.as_ptr() as usize;
    self.classes[offset / MIN_BLOCK_SIZE] = class as u8 + 1;

    trace!(
      "allocated {} bytes at offset {:#x} for a {} byte request",
      class_size(class),
      offset,
      size
    );
    Ok(block)
  }

  unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    let Some(mut offset) = self.offset_of(ptr.as_ptr()) else {
      error!(
        "release of {:?} outside arena {:?}..+{:#x}",
        ptr, self.memory, self.arena_size
      );
      return;
    };

    let slot = offset / MIN_BLOCK_SIZE;
    let Some(mut class) = (self.classes[slot] as usize).checked_sub(1) else {
      error!("release of {:?}, which is not an allocated block", ptr);
      return;
    };
    self.classes[slot] = 0;

    let mut size = class_size(class);
    let block = self.block_at(offset);
    unsafe { self.lists[class].push_front(block, size) };

    while size < self.arena_size {
      let buddy_offset = offset ^ size;
      let buddy = self.block_at(buddy_offset);

      if !unsafe { self.lists[class].contains(buddy) } {
        break;
      }
      debug_assert_eq!(unsafe { (*buddy).size }, size);

      let block = self.block_at(offset);
      unsafe {
        self.lists[class].remove(buddy);
        self.lists[class].remove(block);
      }

      offset = offset.min(buddy_offset);
      size <<= 1;
      class += 1;

      let merged = self.block_at(offset);
      unsafe { self.lists[class].push_front(merged, size) };

      trace!("merged into {} byte block at offset {:#x}", size, offset);
    }
  }

  fn stats(&self) -> BuddyStats {
    let mut stats = BuddyStats::new(self.arena_size);

    for (class, list) in self.lists.iter().enumerate() {
      stats.add_free(class_size(class), list.len());
    }

    stats.finish()
  }
}

impl FreeListAllocator {
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
}

impl ArenaAllocator for FreeListAllocator {
  unsafe fn create(
    region: NonNull<u8>,
    size: usize,
  ) -> AllocResult<Self> {
    let addr = region.as_ptr() as usize;
    let align = mem::align_of::<Control>();

    if addr % align != 0 {
      warn!("free-list region at {:#x} is misaligned", addr);
      return Err(AllocError::Misaligned { addr, align });
    }

    if size < FREE_LIST_MIN_REGION {
      warn!(
        "free-list region of {} bytes is below the minimum of {}",
        size, FREE_LIST_MIN_REGION
      );
      return Err(AllocError::RegionTooSmall {
        size,
        required: FREE_LIST_MIN_REGION,
      });
    }

    let arena_size = largest_power_of_two((size - FREE_LIST_OVERHEAD).min(MAX_BLOCK_SIZE));
    let control = region.cast::<Control>();

    unsafe {
      let memory = region.add(FREE_LIST_OVERHEAD);

      control.as_ptr().write(Control {
        lists: [const { FreeList::new() }; NUM_SIZE_CLASSES],
        classes: [0; SLOTS],
        memory,
        arena_size,
      });

      (*control.as_ptr()).lists[class_index(arena_size)].push_front(memory.as_ptr().cast(), arena_size);
    }

    debug!(
      "free-list allocator over {} bytes at {:#x}: {} byte arena",
      size, addr, arena_size
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
    unsafe { self.control_mut().release(ptr) }
  }

  unsafe fn destroy(
    self,
    size: usize,
  ) {
    debug!("destroying free-list allocator at {:?}", self.control);
    unsafe { region::unmap(self.control.cast(), size) }
  }

  fn capacity(&self) -> usize {
    self.control().arena_size
  }

  fn stats(&self) -> BuddyStats {
    self.control().stats()
  }
}
