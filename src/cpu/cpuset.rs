//! CPU sets
//!
//! These specialized bitmaps represent sets of logical CPU cores, as exposed by
//! the underlying operating system. The logical cores may map into either
//! full-blown hardware CPU cores or SMT threads thereof
//! (aka "hyper-threads") depending on the underlying hardware and OS
//! configuration.

#[cfg(doc)]
use crate::bitmap::Bitmap;
use crate::impl_bitmap_newtype;

/// # CpuSet-specific API
impl CpuSet {
    /// Keep only the `count` lowest CPUs of this set
    ///
    /// If the set has `count` CPUs or less, it is returned unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::cpu::cpuset::CpuSet;
    ///
    /// let set = [2, 4, 6, 8].iter().collect::<CpuSet>();
    /// assert_eq!(set.lowest(2).to_string(), "2,4");
    /// assert_eq!(set.lowest(12), set);
    /// ```
    pub fn lowest(&self, count: usize) -> Self {
        self.iter_set().take(count).collect()
    }
}

impl_bitmap_newtype!(
    /// [`Bitmap`] whose bits are set according to CPU physical OS indexes
    ///
    /// A `CpuSet` represents a set of logical CPU cores, as exposed by the
    /// underlying operating system. These logical cores may map into either
    /// complete hardware CPU cores or SMT threads thereof
    /// (aka "hyper-threads") depending on the underlying hardware and OS
    /// configuration.
    CpuSet
);
