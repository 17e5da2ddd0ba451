//! NUMA node sets

#[cfg(doc)]
use crate::bitmap::Bitmap;
use crate::impl_bitmap_newtype;

impl_bitmap_newtype!(
    /// A `NodeSet` is a [`Bitmap`] whose bits are set according to NUMA memory
    /// node physical OS indexes.
    ///
    /// When a machine does not expose any NUMA node, its single main memory
    /// bank is considered as NUMA node #0.
    NodeSet
);
