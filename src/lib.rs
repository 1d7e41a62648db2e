//! # rbuddy - Buddy Allocators over a Fixed Arena
//!
//! This crate provides two **buddy system** allocators that serve
//! variable-size allocations out of one memory region obtained once with
//! `mmap(2)`, without any further system calls until the region is unmapped.
//!
//! ## Overview
//!
//! A buddy allocator only hands out power-of-two blocks. A request is rounded
//! up to the next power of two; a larger free block is halved repeatedly
//! until it fits, and a released block is merged back with its *buddy* (the
//! other half of the block it was split from) whenever the buddy is free:
//!
//! ```text
//!   Splitting a 1024 byte block for a 100 byte request:
//!
//!   ┌───────────────────────────────────────────────────────────────┐
//!   │                            1024                               │
//!   ├───────────────────────────────┬───────────────────────────────┤
//!   │              512              │              512 (free)       │
//!   ├───────────────┬───────────────┼───────────────────────────────┘
//!   │      256      │   256 (free)  │
//!   ├───────┬───────┼───────────────┘
//!   │  128  │  128  │
//!   │ (used)│ (free)│
//!   └───────┴───────┘
//!
//!   Buddies of size s sit at arena offsets a and b with a ^ b == s.
//! ```
//!
//! ## Engines
//!
//! ```text
//!   rbuddy
//!   ├── align       - Alignment macro and power-of-two helpers
//!   ├── block       - Intrusive free block header and list (internal)
//!   ├── size_class  - Size classes of the free-list engine (internal)
//!   ├── free_list   - FreeListAllocator
//!   ├── node        - Tree node descriptors (internal)
//!   ├── tree        - TreeAllocator
//!   ├── engine      - ArenaAllocator contract, Engine selection, Allocator
//!   ├── region      - mmap/munmap of the backing region
//!   └── stats       - BuddyStats snapshot
//! ```
//!
//! - [`FreeListAllocator`] keeps blocks in place inside the arena. Every free
//!   block starts with a header linking it into the free list of its size
//!   class, and buddies are found with offset arithmetic.
//! - [`TreeAllocator`] keeps a binary tree of node descriptors in a separate
//!   metadata region. The arena holds nothing but caller data, and buddies
//!   are tree siblings.
//!
//! Both implement [`ArenaAllocator`] (`create`, `allocate`, `release`,
//! `destroy`), and [`Allocator`] picks one at run time from an [`Engine`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rbuddy::{Allocator, Engine, region};
//!
//! fn main() -> rbuddy::AllocResult {
//!     let size = region::DEFAULT_REGION_SIZE;
//!     let memory = region::map(size)?;
//!
//!     unsafe {
//!         let mut allocator = Allocator::create(Engine::from_env()?, memory, size)?;
//!
//!         let ptr = allocator.allocate(64)?;
//!         ptr.as_ptr().write(42);
//!         allocator.release(ptr);
//!
//!         // Unmaps the region, control structure included.
//!         allocator.destroy(size);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: handles are neither `Send` nor `Sync`
//! - **Fixed size**: the arena never grows after `create`
//! - **Power-of-two blocks**: no alignment guarantee beyond block sizing
//! - **Unix-only**: requires `libc` for `mmap`/`munmap`
//!
//! ## Safety
//!
//! The allocators hand out raw pointers into memory they do not track the
//! provenance of. Releasing a foreign pointer, releasing twice, or using a
//! pointer after `destroy` is undefined behaviour; `create`, `release` and
//! `destroy` are `unsafe` for that reason.

pub mod align;
mod block;
mod engine;
mod error;
mod free_list;
mod node;
pub mod region;
mod size_class;
mod stats;
mod tree;

pub use engine::{Allocator, ArenaAllocator, ENGINE_ENV, Engine};
pub use error::{AllocError, AllocResult};
pub use free_list::{FREE_LIST_MIN_REGION, FREE_LIST_OVERHEAD, FreeListAllocator};
pub use size_class::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, NUM_SIZE_CLASSES};
pub use stats::BuddyStats;
pub use tree::{TREE_MIN_REGION, TREE_OVERHEAD, TreeAllocator};
