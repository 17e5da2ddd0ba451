//! Common strategies for property-based testing
//!
//! Every proptest strategy which cannot be handled by an `Arbitrary` impl
//! or a function that is only used by a single module is centralized here.

use crate::bitmap::BitmapIndex;
use proptest::collection::SizeRange;
use std::ops::Range;

/// Generate a [`BitmapIndex`] that is small enough for bitmap tests to run
/// quickly, but large enough to span several storage words
pub(crate) fn bitmap_index() -> BitmapIndexStrategy {
    0..SizeRange::default().end_excl()
}

/// Strategy emitted by [`bitmap_index()`]
pub(crate) type BitmapIndexStrategy = Range<BitmapIndex>;
