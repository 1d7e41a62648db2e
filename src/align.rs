/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use rbuddy::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Largest power of two that is `<= n`. Returns 0 for `n == 0`.
pub const fn largest_power_of_two(n: usize) -> usize {
  if n == 0 {
    0
  } else {
    1 << n.ilog2()
  }
}

/// Rounds `n` up to a power of two, `None` on overflow or for `n == 0`.
pub const fn round_up_power_of_two(n: usize) -> Option<usize> {
  if n == 0 {
    None
  } else {
    n.checked_next_power_of_two()
  }
}
