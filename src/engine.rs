//! The four-operation contract both engines implement, and run-time selection
//! between them.

use std::{env, fmt, ptr::NonNull, str::FromStr};

use log::debug;

use crate::{AllocError, AllocResult, BuddyStats, FreeListAllocator, TreeAllocator};

/// Environment variable read by [`Engine::from_env`].
pub const ENGINE_ENV: &str = "RBUDDY_ENGINE";

/// An allocator managing one caller-supplied region.
///
/// Instances are single-threaded: every call runs to completion and nothing
/// is locked.
pub trait ArenaAllocator: Sized {
  /// Builds an allocator whose control structure sits at the start of
  /// `region`.
  ///
  /// On failure nothing has been written that the caller has to undo, and
  /// the region still belongs to the caller.
  ///
  /// # Safety
  ///
  /// `region` must be valid for reads and writes of `size` bytes, come from
  /// an anonymous mapping [`ArenaAllocator::destroy`] may unmap, and must not
  /// be accessed through any other pointer while the allocator lives.
  unsafe fn create(
    region: NonNull<u8>,
    size: usize,
  ) -> AllocResult<Self>;

  /// Hands out a block of at least `size` bytes.
  ///
  /// Failures are plain values: the error tells an oversized request apart
  /// from an exhausted arena.
  fn allocate(
    &mut self,
    size: usize,
  ) -> AllocResult<NonNull<u8>>;

  /// Returns a block to the allocator.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by [`ArenaAllocator::allocate`] on this
  /// instance and not released since. Releasing anything else is undefined;
  /// pointers outside the arena are logged and ignored, but ownership of
  /// pointers inside it is not tracked.
  unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
  );

  /// Unmaps the whole region, control structure included. Aborts the
  /// process if the unmap fails.
  ///
  /// # Safety
  ///
  /// `size` must be the size of the mapping the instance was created over,
  /// and no pointer handed out by the instance may be used afterwards.
  unsafe fn destroy(
    self,
    size: usize,
  );

  /// Payload bytes under management.
  fn capacity(&self) -> usize;

  /// Free/used snapshot.
  fn stats(&self) -> BuddyStats;
}

/// Available engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Engine {
  /// Intrusive free lists per size class, see [`FreeListAllocator`].
  #[default]
  FreeList,
  /// Binary tree of node descriptors, see [`TreeAllocator`].
  Tree,
}

impl Engine {
  /// Engine named by `RBUDDY_ENGINE`, or the default when unset.
  pub fn from_env() -> AllocResult<Self> {
    match env::var(ENGINE_ENV) {
      Ok(name) => name.parse(),
      Err(_) => Ok(Self::default()),
    }
  }
}

impl FromStr for Engine {
  type Err = AllocError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "free-list" | "freelist" | "blocks" => Ok(Self::FreeList),
      "tree" | "buddy" => Ok(Self::Tree),
      _ => Err(AllocError::UnknownEngine(s.to_owned())),
    }
  }
}

impl fmt::Display for Engine {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::FreeList => f.write_str("free-list"),
      Self::Tree => f.write_str("tree"),
    }
  }
}

/// Either engine behind the same contract.
pub enum Allocator {
  FreeList(FreeListAllocator),
  Tree(TreeAllocator),
}

impl Allocator {
  /// Builds the chosen engine over `region`.
  ///
  /// # Safety
  ///
  /// Same contract as [`ArenaAllocator::create`].
  pub unsafe fn create(
    engine: Engine,
    region: NonNull<u8>,
    size: usize,
  ) -> AllocResult<Self> {
    debug!("creating {} allocator over {} bytes", engine, size);

    unsafe {
      match engine {
        Engine::FreeList => FreeListAllocator::create(region, size).map(Self::FreeList),
        Engine::Tree => TreeAllocator::create(region, size).map(Self::Tree),
      }
    }
  }

  pub fn engine(&self) -> Engine {
    match self {
      Self::FreeList(_) => Engine::FreeList,
      Self::Tree(_) => Engine::Tree,
    }
  }

  pub fn allocate(
    &mut self,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    match self {
      Self::FreeList(inner) => inner.allocate(size),
      Self::Tree(inner) => inner.allocate(size),
    }
  }

  /// # Safety
  ///
  /// Same contract as [`ArenaAllocator::release`].
  pub unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    unsafe {
      match self {
        Self::FreeList(inner) => inner.release(ptr),
        Self::Tree(inner) => inner.release(ptr),
      }
    }
  }

  /// # Safety
  ///
  /// Same contract as [`ArenaAllocator::destroy`].
  pub unsafe fn destroy(
    self,
    size: usize,
  ) {
    unsafe {
      match self {
        Self::FreeList(inner) => inner.destroy(size),
        Self::Tree(inner) => inner.destroy(size),
      }
    }
  }

  pub fn capacity(&self) -> usize {
    match self {
      Self::FreeList(inner) => inner.capacity(),
      Self::Tree(inner) => inner.capacity(),
    }
  }

  pub fn stats(&self) -> BuddyStats {
    match self {
      Self::FreeList(inner) => inner.stats(),
      Self::Tree(inner) => inner.stats(),
    }
  }
}
