//! Implementation of bitmap newtypes ([`CpuSet`] and [`NodeSet`])

#[cfg(doc)]
use super::Bitmap;
#[cfg(doc)]
use crate::{cpu::cpuset::CpuSet, memory::nodeset::NodeSet};

/// Implement a specialized bitmap
///
/// The newtype derefs to [`Bitmap`] for queries and in-place updates, and
/// reimplements set operators so that combining two specialized bitmaps
/// yields a specialized bitmap of the same kind.
#[macro_export]
#[doc(hidden)]
macro_rules! impl_bitmap_newtype {
    (
        $(#[$attr:meta])*
        $newtype:ident
    ) => {
        $(#[$attr])*
        #[derive(
            derive_more::AsMut,
            derive_more::AsRef,
            Clone,
            Default,
            derive_more::Deref,
            derive_more::DerefMut,
            Eq,
            derive_more::From,
            Hash,
            derive_more::Into,
            derive_more::IntoIterator,
            PartialEq,
        )]
        #[into_iterator(owned, ref)]
        #[repr(transparent)]
        pub struct $newtype($crate::bitmap::Bitmap);

        impl $newtype {
            /// Creates an empty set
            pub fn new() -> Self {
                Self($crate::bitmap::Bitmap::new())
            }

            /// Creates a set with the given range of indices set
            ///
            /// # Panics
            ///
            /// If `range` is unbounded above, since sets are finite.
            pub fn from_range(
                range: impl std::ops::RangeBounds<$crate::bitmap::BitmapIndex>,
            ) -> Self {
                Self($crate::bitmap::Bitmap::from_range(range))
            }
        }

        #[cfg(any(test, feature = "proptest"))]
        impl proptest::arbitrary::Arbitrary for $newtype {
            type Parameters = ();
            type Strategy = proptest::strategy::Map<
                <$crate::bitmap::Bitmap as proptest::arbitrary::Arbitrary>::Strategy,
                fn($crate::bitmap::Bitmap) -> Self,
            >;

            fn arbitrary_with(args: ()) -> Self::Strategy {
                use proptest::strategy::Strategy;
                <$crate::bitmap::Bitmap as proptest::arbitrary::Arbitrary>::arbitrary_with(args)
                    .prop_map($newtype)
            }
        }

        impl<B: std::borrow::Borrow<$newtype>> std::ops::BitAnd<B> for &$newtype {
            type Output = $newtype;

            fn bitand(self, rhs: B) -> $newtype {
                $newtype(&self.0 & &rhs.borrow().0)
            }
        }

        impl<B: std::borrow::Borrow<Self>> std::ops::BitAnd<B> for $newtype {
            type Output = Self;

            fn bitand(mut self, rhs: B) -> Self {
                self.0 &= &rhs.borrow().0;
                self
            }
        }

        impl<B: std::borrow::Borrow<Self>> std::ops::BitAndAssign<B> for $newtype {
            fn bitand_assign(&mut self, rhs: B) {
                self.0 &= &rhs.borrow().0;
            }
        }

        impl<B: std::borrow::Borrow<$newtype>> std::ops::BitOr<B> for &$newtype {
            type Output = $newtype;

            fn bitor(self, rhs: B) -> $newtype {
                $newtype(&self.0 | &rhs.borrow().0)
            }
        }

        impl<B: std::borrow::Borrow<Self>> std::ops::BitOr<B> for $newtype {
            type Output = Self;

            fn bitor(mut self, rhs: B) -> Self {
                self.0 |= &rhs.borrow().0;
                self
            }
        }

        impl<B: std::borrow::Borrow<Self>> std::ops::BitOrAssign<B> for $newtype {
            fn bitor_assign(&mut self, rhs: B) {
                self.0 |= &rhs.borrow().0;
            }
        }

        impl<B: std::borrow::Borrow<$newtype>> std::ops::Sub<B> for &$newtype {
            type Output = $newtype;

            fn sub(self, rhs: B) -> $newtype {
                $newtype(&self.0 - &rhs.borrow().0)
            }
        }

        impl<B: std::borrow::Borrow<Self>> std::ops::Sub<B> for $newtype {
            type Output = Self;

            fn sub(mut self, rhs: B) -> Self {
                self.0 -= &rhs.borrow().0;
                self
            }
        }

        impl<B: std::borrow::Borrow<Self>> std::ops::SubAssign<B> for $newtype {
            fn sub_assign(&mut self, rhs: B) {
                self.0 -= &rhs.borrow().0;
            }
        }

        impl std::ops::Shl<usize> for &$newtype {
            type Output = $newtype;

            fn shl(self, rhs: usize) -> $newtype {
                $newtype(&self.0 << rhs)
            }
        }

        impl std::fmt::Debug for $newtype {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:?})", stringify!($newtype), self.0)
            }
        }

        impl std::fmt::Display for $newtype {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl<BI: std::borrow::Borrow<$crate::bitmap::BitmapIndex>> Extend<BI> for $newtype {
            fn extend<T: IntoIterator<Item = BI>>(&mut self, iter: T) {
                self.0.extend(iter)
            }
        }

        impl From<$crate::bitmap::BitmapIndex> for $newtype {
            fn from(idx: $crate::bitmap::BitmapIndex) -> Self {
                Self($crate::bitmap::Bitmap::from(idx))
            }
        }

        impl<BI: std::borrow::Borrow<$crate::bitmap::BitmapIndex>> FromIterator<BI> for $newtype {
            fn from_iter<I: IntoIterator<Item = BI>>(iter: I) -> Self {
                Self($crate::bitmap::Bitmap::from_iter(iter))
            }
        }

        impl std::str::FromStr for $newtype {
            type Err = $crate::bitmap::ParseBitmapError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}
