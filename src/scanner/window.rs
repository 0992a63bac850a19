use alloy::primitives::BlockNumber;
use std::ops::RangeInclusive;

/// Splits `[start, end]` into contiguous windows of at most `window_size` blocks.
///
/// Empty if `start > end`. The last window is shorter when the range is not a multiple of
/// `window_size`.
///
/// # Panics
///
/// Panics if `window_size` is 0.
pub(crate) fn block_windows(
    start: BlockNumber,
    end: BlockNumber,
    window_size: u64,
) -> impl Iterator<Item = RangeInclusive<BlockNumber>> {
    assert!(window_size >= 1, "window_size must be at least 1");
    let step = usize::try_from(window_size).unwrap_or(usize::MAX);
    (start..=end)
        .step_by(step)
        .map(move |first| first..=first.saturating_add(window_size - 1).min(end))
}
