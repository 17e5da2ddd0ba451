//! Facilities for manipulating bitmaps
//!
//! # Bitmaps
//!
//! This crate extensively uses bitmaps to model sets of logical CPUs that
//! interrupts and processes can be steered to, and sets of NUMA nodes.
//!
//! The generic [`Bitmap`] type is exposed here, but the rest of the crate
//! does not directly accept or emit it. Instead it uses the specialized
//! [`CpuSet`] and [`NodeSet`] variants, which are trivial wrappers around
//! [`Bitmap`] with the same API. They provide improved type safety: you
//! cannot use a [`NodeSet`] where a [`CpuSet`] is expected, nor mistakenly
//! mix CPU indices with NUMA node indices.
//!
//! # Text format
//!
//! Bitmaps are displayed and parsed using the "list" syntax of the Linux
//! kernel, where set indices are given in ascending order and consecutive
//! runs are collapsed into ranges, e.g. `0-3,8,10-11`. This is the format of
//! sysfs files like `/sys/devices/system/node/node0/cpulist`.
//!
//! [`CpuSet`]: crate::cpu::cpuset::CpuSet
//! [`NodeSet`]: crate::memory::nodeset::NodeSet

mod newtypes;

#[cfg(any(test, feature = "proptest"))]
use proptest::prelude::*;
use std::{
    borrow::Borrow,
    fmt::{self, Debug, Display, Formatter},
    iter::FusedIterator,
    ops::{
        BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Bound, RangeBounds, Shl,
        Sub, SubAssign,
    },
    str::FromStr,
};
use thiserror::Error;

/// Index of a bit within a [`Bitmap`]
pub type BitmapIndex = usize;

/// Largest index accepted in index lists
///
/// This is far above the CPU and NUMA node counts that Linux supports, and
/// keeps hostile lists from exhausting memory.
pub const MAX_LIST_INDEX: BitmapIndex = (1 << 16) - 1;

/// Number of bits in a storage word
const WORD_BITS: usize = u64::BITS as usize;

/// A finite set of small nonnegative integers
///
/// Bitmaps are used by this crate to represent sets of logical CPUs, via the
/// [`CpuSet`] newtype, and sets of NUMA nodes, via the [`NodeSet`] newtype.
/// Both are indexed by OS physical number.
///
/// Storage grows with the largest set index, so bitmaps are meant for the
/// small index ranges of CPU and node identifiers, not for arbitrary integers.
///
/// [`CpuSet`]: crate::cpu::cpuset::CpuSet
/// [`NodeSet`]: crate::memory::nodeset::NodeSet
//
// --- Implementation details ---
//
// As a type invariant, `words` never ends with a zero word, so that the
// derived equality and hash only depend on the set contents.
#[derive(Clone, Default, Eq, Hash, PartialEq)]
pub struct Bitmap {
    /// Bit `i` of the set lives at bit `i % 64` of word `i / 64`
    words: Vec<u64>,
}

impl Bitmap {
    // === Constructors ===

    /// Creates an empty `Bitmap`
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// let empty = Bitmap::new();
    /// assert!(empty.is_empty());
    /// ```
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Creates a new `Bitmap` with the given range of indices set
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// let bitmap = Bitmap::from_range(12..=34);
    /// assert_eq!(format!("{bitmap}"), "12-34");
    /// ```
    ///
    /// # Panics
    ///
    /// If `range` is unbounded above, since bitmaps are finite.
    pub fn from_range(range: impl RangeBounds<BitmapIndex>) -> Self {
        let mut bitmap = Self::new();
        bitmap.set_range(range);
        bitmap
    }

    // === Getters and setters ===

    /// Turn this `Bitmap` into a copy of another `Bitmap`
    pub fn copy_from(&mut self, other: &Self) {
        self.words.clear();
        self.words.extend_from_slice(&other.words);
    }

    /// Clear all indices
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Clear all indices except for `idx`, which is set
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// let mut bitmap = Bitmap::from_range(12..=34);
    /// bitmap.set_only(42);
    /// assert_eq!(format!("{bitmap}"), "42");
    /// ```
    pub fn set_only(&mut self, idx: BitmapIndex) {
        self.clear();
        self.set(idx);
    }

    /// Set index `idx`
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// let mut bitmap = Bitmap::new();
    /// bitmap.set(42);
    /// assert_eq!(format!("{bitmap}"), "42");
    /// ```
    pub fn set(&mut self, idx: BitmapIndex) {
        let (word, bit) = Self::locate(idx);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= bit;
    }

    /// Set indices covered by `range`
    ///
    /// # Panics
    ///
    /// If `range` is unbounded above, since bitmaps are finite.
    pub fn set_range(&mut self, range: impl RangeBounds<BitmapIndex>) {
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => match start.checked_add(1) {
                Some(start) => start,
                None => return,
            },
            Bound::Unbounded => 0,
        };
        let last = match range.end_bound() {
            Bound::Included(&end) => end,
            Bound::Excluded(&end) => match end.checked_sub(1) {
                Some(last) => last,
                None => return,
            },
            Bound::Unbounded => panic!("Bitmaps are finite, cannot set an unbounded range"),
        };
        for idx in start..=last {
            self.set(idx);
        }
    }

    /// Clear index `idx`
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// let mut bitmap = Bitmap::from_range(1..=3);
    /// bitmap.unset(2);
    /// assert_eq!(format!("{bitmap}"), "1,3");
    /// ```
    pub fn unset(&mut self, idx: BitmapIndex) {
        let (word, bit) = Self::locate(idx);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !bit;
            self.normalize();
        }
    }

    /// Check if index `idx` is set
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// let bitmap = Bitmap::from_range(12..=34);
    /// assert!((0..12).all(|idx| !bitmap.is_set(idx)));
    /// assert!((12..=34).all(|idx| bitmap.is_set(idx)));
    /// assert!(!bitmap.is_set(35));
    /// ```
    pub fn is_set(&self, idx: BitmapIndex) -> bool {
        let (word, bit) = Self::locate(idx);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// Check if all indices are unset
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Check the first set index, if any
    ///
    /// You can iterate over set indices with [`Bitmap::iter_set()`].
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// assert_eq!(Bitmap::new().first_set(), None);
    /// assert_eq!(Bitmap::from_range(12..=34).first_set(), Some(12));
    /// ```
    pub fn first_set(&self) -> Option<BitmapIndex> {
        self.next_set(None)
    }

    /// Iterate over set indices in ascending order
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// let bitmap = Bitmap::from_range(12..=21);
    /// let indices = bitmap.iter_set().collect::<Vec<_>>();
    /// assert_eq!(indices, &[12, 13, 14, 15, 16, 17, 18, 19, 20, 21]);
    /// ```
    pub fn iter_set(&self) -> Iter<&Self> {
        Iter::new(self)
    }

    /// Check the last set index, if any
    pub fn last_set(&self) -> Option<BitmapIndex> {
        let last_word = self.words.last()?;
        let top_bit = WORD_BITS - 1 - last_word.leading_zeros() as usize;
        Some((self.words.len() - 1) * WORD_BITS + top_bit)
    }

    /// The number of indices that are set in the bitmap
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// assert_eq!(Bitmap::new().weight(), 0);
    /// assert_eq!(Bitmap::from_range(12..34).weight(), 34 - 12);
    /// ```
    pub fn weight(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Truth that `self` and `rhs` have some set indices in common
    pub fn intersects(&self, rhs: &Self) -> bool {
        self.words.iter().zip(&rhs.words).any(|(l, r)| l & r != 0)
    }

    /// Truth that the indices set in `inner` are a subset of those set in
    /// `self`
    ///
    /// The empty bitmap is considered included in any other bitmap.
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::bitmap::Bitmap;
    ///
    /// let outer = Bitmap::from_range(0..8);
    /// assert!(outer.includes(&Bitmap::from_range(2..4)));
    /// assert!(!outer.includes(&Bitmap::from_range(6..10)));
    /// assert!(outer.includes(&Bitmap::new()));
    /// ```
    pub fn includes(&self, inner: &Self) -> bool {
        inner.words.len() <= self.words.len()
            && inner
                .words
                .iter()
                .zip(&self.words)
                .all(|(i, o)| i & !o == 0)
    }

    // === Implementation details ===

    /// Word index and bit mask of a bitmap index
    fn locate(idx: BitmapIndex) -> (usize, u64) {
        (idx / WORD_BITS, 1 << (idx % WORD_BITS))
    }

    /// Restore the "no trailing zero word" type invariant
    fn normalize(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    /// First set index strictly after `prev`, or from the start if `None`
    fn next_set(&self, prev: Option<BitmapIndex>) -> Option<BitmapIndex> {
        let start = match prev {
            Some(prev) => prev.checked_add(1)?,
            None => 0,
        };
        let (mut word_idx, _) = Self::locate(start);
        let mut word = *self.words.get(word_idx)?;
        word &= u64::MAX << (start % WORD_BITS);
        loop {
            if word != 0 {
                return Some(word_idx * WORD_BITS + word.trailing_zeros() as usize);
            }
            word_idx += 1;
            word = *self.words.get(word_idx)?;
        }
    }

    /// Apply a binary word-wise operation in place
    fn combine_assign(&mut self, rhs: &Self, op: impl Fn(u64, u64) -> u64) {
        if self.words.len() < rhs.words.len() {
            self.words.resize(rhs.words.len(), 0);
        }
        for (idx, word) in self.words.iter_mut().enumerate() {
            *word = op(*word, rhs.words.get(idx).copied().unwrap_or(0));
        }
        self.normalize();
    }
}

#[cfg(any(test, feature = "proptest"))]
impl Arbitrary for Bitmap {
    type Parameters = ();
    type Strategy = prop::strategy::Map<
        prop::strategy::TupleUnion<(
            prop::strategy::WA<Just<Vec<BitmapIndex>>>,
            prop::strategy::WA<
                prop::collection::VecStrategy<crate::strategies::BitmapIndexStrategy>,
            >,
        )>,
        fn(Vec<BitmapIndex>) -> Self,
    >;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        use crate::strategies::bitmap_index;
        let index_vec = prop_oneof![
            // Bias towards generating more empty bitmaps, they are an edge
            // case of many algorithms
            1 => Just(Vec::new()),
            4 => prop::collection::vec(bitmap_index(), 0..32),
        ];
        index_vec.prop_map(|indices| indices.into_iter().collect::<Self>())
    }
}

impl<B: Borrow<Bitmap>> BitAnd<B> for &Bitmap {
    type Output = Bitmap;

    fn bitand(self, rhs: B) -> Bitmap {
        let mut result = self.clone();
        result &= rhs;
        result
    }
}

impl<B: Borrow<Self>> BitAnd<B> for Bitmap {
    type Output = Self;

    fn bitand(mut self, rhs: B) -> Self {
        self &= rhs.borrow();
        self
    }
}

impl<B: Borrow<Self>> BitAndAssign<B> for Bitmap {
    fn bitand_assign(&mut self, rhs: B) {
        let rhs = rhs.borrow();
        self.words.truncate(rhs.words.len());
        self.combine_assign(rhs, |l, r| l & r);
    }
}

impl<B: Borrow<Bitmap>> BitOr<B> for &Bitmap {
    type Output = Bitmap;

    fn bitor(self, rhs: B) -> Bitmap {
        let mut result = self.clone();
        result |= rhs;
        result
    }
}

impl<B: Borrow<Self>> BitOr<B> for Bitmap {
    type Output = Self;

    fn bitor(mut self, rhs: B) -> Self {
        self |= rhs.borrow();
        self
    }
}

impl<B: Borrow<Self>> BitOrAssign<B> for Bitmap {
    fn bitor_assign(&mut self, rhs: B) {
        self.combine_assign(rhs.borrow(), |l, r| l | r);
    }
}

impl<B: Borrow<Bitmap>> BitXor<B> for &Bitmap {
    type Output = Bitmap;

    fn bitxor(self, rhs: B) -> Bitmap {
        let mut result = self.clone();
        result ^= rhs;
        result
    }
}

impl<B: Borrow<Self>> BitXor<B> for Bitmap {
    type Output = Self;

    fn bitxor(mut self, rhs: B) -> Self {
        self ^= rhs.borrow();
        self
    }
}

impl<B: Borrow<Self>> BitXorAssign<B> for Bitmap {
    fn bitxor_assign(&mut self, rhs: B) {
        self.combine_assign(rhs.borrow(), |l, r| l ^ r);
    }
}

impl Debug for Bitmap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{self}]")
    }
}

impl Display for Bitmap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut iter = self.iter_set().peekable();
        let mut first = true;
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

impl<BI: Borrow<BitmapIndex>> Extend<BI> for Bitmap {
    fn extend<T: IntoIterator<Item = BI>>(&mut self, iter: T) {
        for i in iter {
            self.set(*i.borrow());
        }
    }
}

impl From<BitmapIndex> for Bitmap {
    fn from(value: BitmapIndex) -> Self {
        let mut result = Self::new();
        result.set(value);
        result
    }
}

impl<BI: Borrow<BitmapIndex>> FromIterator<BI> for Bitmap {
    fn from_iter<I: IntoIterator<Item = BI>>(iter: I) -> Self {
        let mut bitmap = Self::new();
        bitmap.extend(iter);
        bitmap
    }
}

impl FromStr for Bitmap {
    type Err = ParseBitmapError;

    /// Parse the `0-3,8,10-11` list syntax
    ///
    /// Surrounding whitespace is ignored and an empty string is an empty
    /// bitmap, as found in sysfs files of CPU-less NUMA nodes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseBitmapError(s.to_owned());
        let parse_index = |idx: &str| {
            idx.trim()
                .parse::<BitmapIndex>()
                .ok()
                .filter(|&idx| idx <= MAX_LIST_INDEX)
                .ok_or_else(error)
        };
        let mut bitmap = Self::new();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(bitmap);
        }
        for item in trimmed.split(',') {
            match item.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (parse_index(start)?, parse_index(end)?);
                    if start > end {
                        return Err(error());
                    }
                    bitmap.set_range(start..=end);
                }
                None => bitmap.set(parse_index(item)?),
            }
        }
        Ok(bitmap)
    }
}

/// Error returned when a string is not a valid bitmap list
#[derive(Clone, Debug, Default, Eq, Error, Hash, PartialEq)]
#[error("{0:?} is not a valid index list like \"0-3,8\"")]
pub struct ParseBitmapError(pub String);

/// Iterator over set [`Bitmap`] indices
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Iter<B> {
    /// Bitmap over which we're iterating
    bitmap: B,

    /// Last explored index
    prev: Option<BitmapIndex>,

    /// Truth that the end of the bitmap was reached
    done: bool,
}
//
impl<B> Iter<B> {
    /// Set up a bitmap iterator
    fn new(bitmap: B) -> Self {
        Self {
            bitmap,
            prev: None,
            done: false,
        }
    }
}
//
impl<B: Borrow<Bitmap>> Iterator for Iter<B> {
    type Item = BitmapIndex;

    fn next(&mut self) -> Option<BitmapIndex> {
        if self.done {
            return None;
        }
        let next = self.bitmap.borrow().next_set(self.prev);
        match next {
            Some(idx) => self.prev = Some(idx),
            None => self.done = true,
        }
        next
    }
}
//
impl<B: Borrow<Bitmap>> FusedIterator for Iter<B> {}
//
impl<'bitmap> IntoIterator for &'bitmap Bitmap {
    type Item = BitmapIndex;
    type IntoIter = Iter<Self>;

    fn into_iter(self) -> Self::IntoIter {
        Iter::new(self)
    }
}
//
impl IntoIterator for Bitmap {
    type Item = BitmapIndex;
    type IntoIter = Iter<Self>;

    fn into_iter(self) -> Self::IntoIter {
        Iter::new(self)
    }
}

impl Shl<usize> for &Bitmap {
    type Output = Bitmap;

    /// Shift all set indices up by `rhs`
    fn shl(self, rhs: usize) -> Bitmap {
        self.iter_set().map(|idx| idx + rhs).collect()
    }
}

impl Shl<usize> for Bitmap {
    type Output = Self;

    fn shl(self, rhs: usize) -> Self {
        &self << rhs
    }
}

impl<B: Borrow<Bitmap>> Sub<B> for &Bitmap {
    type Output = Bitmap;

    fn sub(self, rhs: B) -> Bitmap {
        let mut result = self.clone();
        result -= rhs;
        result
    }
}

impl<B: Borrow<Self>> Sub<B> for Bitmap {
    type Output = Self;

    fn sub(mut self, rhs: B) -> Self {
        self -= rhs.borrow();
        self
    }
}

impl<B: Borrow<Self>> SubAssign<B> for Bitmap {
    fn sub_assign(&mut self, rhs: B) {
        self.combine_assign(rhs.borrow(), |l, r| l & !r);
    }
}
