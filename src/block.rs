use std::ptr;

/// Header written at the start of every free block.
///
/// Only free blocks carry a live header: once a block is handed out its bytes
/// belong to the caller.
#[repr(C)]
pub struct Block {
  pub next: *mut Block,
  pub prev: *mut Block,
  pub size: usize,
}

impl Block {
  pub fn new(
    size: usize,
    next: *mut Block,
    prev: *mut Block,
  ) -> Self {
    Self { next, prev, size }
  }
}

/// Intrusive doubly linked list of free blocks of one size class.
pub struct FreeList {
  head: *mut Block,
  len: usize,
}

impl FreeList {
  pub const fn new() -> Self {
    Self {
      head: ptr::null_mut(),
      len: 0,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Writes a fresh header at `block` and links it in as the new head.
  ///
  /// # Safety
  ///
  /// `block` must point to at least `size_of::<Block>()` writable, aligned
  /// bytes that are not already linked into any list.
  pub unsafe fn push_front(
    &mut self,
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      block.write(Block::new(size, self.head, ptr::null_mut()));

      if !self.head.is_null() {
        (*self.head).prev = block;
      }
      self.head = block;
      self.len += 1;
    }
  }

  /// Unlinks and returns the head block.
  ///
  /// # Safety
  ///
  /// Every linked block must still hold a valid header.
  pub unsafe fn pop_front(&mut self) -> Option<*mut Block> {
    if self.head.is_null() {
      return None;
    }

    let block = self.head;
    unsafe { self.remove(block) };
    Some(block)
  }

  /// Unlinks `block` from the list.
  ///
  /// # Safety
  ///
  /// `block` must currently be linked into this list.
  pub unsafe fn remove(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let prev = (*block).prev;
      let next = (*block).next;

      if prev.is_null() {
        self.head = next;
      } else {
        (*prev).next = next;
      }

      if !next.is_null() {
        (*next).prev = prev;
      }

      (*block).next = ptr::null_mut();
      (*block).prev = ptr::null_mut();
      self.len -= 1;
    }
  }

  /// Linear scan for `block`.
  ///
  /// # Safety
  ///
  /// Every linked block must still hold a valid header.
  pub unsafe fn contains(
    &self,
    block: *mut Block,
  ) -> bool {
    unsafe {
      let mut current = self.head;

      while !current.is_null() {
        if current == block {
          return true;
        }
        current = (*current).next;
      }

      false
    }
  }
}
