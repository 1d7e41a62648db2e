//! Usage snapshot shared by both engines.

/// Point-in-time view of an arena.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuddyStats {
  /// Payload bytes the engine manages.
  pub total_bytes: usize,
  /// Bytes sitting in free blocks.
  pub free_bytes: usize,
  /// Bytes handed out (rounded to block sizes).
  pub used_bytes: usize,
  /// `(block size, count)` of free blocks, largest size first.
  pub free_blocks: Vec<(usize, usize)>,
}

impl BuddyStats {
  pub fn new(total_bytes: usize) -> Self {
    Self {
      total_bytes,
      ..Self::default()
    }
  }

  /// Accounts `count` free blocks of `size` bytes.
  pub fn add_free(
    &mut self,
    size: usize,
    count: usize,
  ) {
    if count == 0 {
      return;
    }

    self.free_bytes += size * count;

    match self.free_blocks.iter_mut().find(|(s, _)| *s == size) {
      Some((_, n)) => *n += count,
      None => {
        self.free_blocks.push((size, count));
        self.free_blocks.sort_unstable_by(|a, b| b.0.cmp(&a.0));
      }
    }
  }

  /// Fills `used_bytes` once all free blocks are accounted.
  pub fn finish(mut self) -> Self {
    self.used_bytes = self.total_bytes - self.free_bytes;
    self
  }

  /// Number of free blocks of exactly `size` bytes.
  pub fn free_count(
    &self,
    size: usize,
  ) -> usize {
    self
      .free_blocks
      .iter()
      .find(|(s, _)| *s == size)
      .map_or(0, |(_, n)| *n)
  }
}
