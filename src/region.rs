//! Backing memory: one anonymous mapping per allocator instance.

use std::{io, ptr, ptr::NonNull};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};
use log::{debug, error};

use crate::{AllocError, AllocResult};

/// Default region size handed to an engine.
pub const DEFAULT_REGION_SIZE: usize = 0x1000;

/// Maps `size` bytes of private anonymous memory.
///
/// The mapping is page aligned and zero filled.
pub fn map(size: usize) -> AllocResult<NonNull<u8>> {
  if size == 0 {
    return Err(AllocError::ZeroSize);
  }

  let addr = unsafe {
    mmap(
      ptr::null_mut(),
      size,
      PROT_READ | PROT_WRITE,
      MAP_PRIVATE | MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if addr == MAP_FAILED {
    error!("mmap of {} bytes failed: {}", size, io::Error::last_os_error());
    return Err(AllocError::MapFailed(size));
  }

  debug!("mapped {} bytes at {:?}", size, addr);
  NonNull::new(addr.cast::<u8>()).ok_or(AllocError::MapFailed(size))
}

/// Unmaps a region obtained from [`map`].
///
/// A failed unmap aborts the process: the allocator's control state lives in
/// the region, so there is nothing left to fall back on.
///
/// # Safety
///
/// `region` must come from [`map`] (or an equivalent `mmap`) covering `size`
/// bytes, and nothing may touch the region afterwards.
pub unsafe fn unmap(
  region: NonNull<u8>,
  size: usize,
) {
  let rc = unsafe { munmap(region.as_ptr().cast::<c_void>(), size) };

  if rc == -1 {
    error!(
      "munmap of {} bytes at {:?} failed: {}",
      size,
      region,
      io::Error::last_os_error()
    );
    std::process::abort();
  }

  debug!("unmapped {} bytes at {:?}", size, region);
}
