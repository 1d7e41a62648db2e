/// Allocation state of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
  /// Unsplit and not handed out.
  Free,
  /// Has two children, each covering half of this node.
  Split,
  /// Handed out as a whole.
  Allocated,
}

/// Descriptor of one block in the tree engine's metadata region.
///
/// Nodes sit in an array: the children of node `i` are `2i + 1` and `2i + 2`.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Node {
  pub size: usize,
  pub state: NodeState,
}

impl Node {
  pub fn new(size: usize) -> Self {
    Self {
      size,
      state: NodeState::Free,
    }
  }

  pub fn is_free(&self) -> bool {
    self.state == NodeState::Free
  }
}

pub const fn left(index: usize) -> usize {
  2 * index + 1
}

pub const fn right(index: usize) -> usize {
  2 * index + 2
}

pub const fn parent(index: usize) -> usize {
  (index - 1) / 2
}

/// Arena offset of node `index` whose blocks at that depth are `size` bytes.
pub const fn offset(
  index: usize,
  size: usize,
) -> usize {
  let first_at_depth = 1 << (index + 1).ilog2();
  (index + 1 - first_at_depth) * size
}
