//! A small inline vector for `Copy` elements, modeled on <https://docs.rs/arrayvec/>.
//!
//! The macro implements the vector operations on a user-declared struct with two fields,
//! `xs: [T; N]` and `len: L`, so the struct keeps full control over its own derives and
//! visibility. Elements past `len` are always `T::default()`.

use std::fmt;

/// Returned by fallible insertions when the vector is full. Carries the rejected element.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CapacityError<T>(pub T);

impl<T> CapacityError<T> {
    pub fn element(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for CapacityError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CapacityError: insufficient capacity")
    }
}

impl<T> fmt::Display for CapacityError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("insufficient capacity")
    }
}

impl<T> std::error::Error for CapacityError<T> {}

#[macro_export]
macro_rules! arrayvec {
    ($name:ident, $ty:ty, $len_ty:ty) => {
        #[allow(unused)]
        impl $name {
            pub fn new() -> Self {
                Self {
                    xs: ::core::array::from_fn(|_| <$ty as ::core::default::Default>::default()),
                    len: 0,
                }
            }

            /// Builds a vector from `data`, failing if it does not fit.
            pub fn from_slice(data: &[$ty]) -> Result<Self, $crate::CapacityError<()>> {
                let mut vec = Self::new();
                vec.try_extend_from_slice(data)?;
                Ok(vec)
            }

            #[inline(always)]
            pub fn len(&self) -> usize {
                self.len as usize
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.len == 0
            }

            #[inline]
            pub fn is_full(&self) -> bool {
                self.len() == self.capacity()
            }

            #[inline(always)]
            pub fn capacity(&self) -> usize {
                self.xs.len()
            }

            #[inline]
            pub fn remaining_capacity(&self) -> usize {
                self.capacity() - self.len()
            }

            pub fn try_push(&mut self, element: $ty) -> Result<(), $crate::CapacityError<$ty>> {
                if self.is_full() {
                    return Err($crate::CapacityError(element));
                }
                self.xs[self.len()] = element;
                self.len += 1;
                Ok(())
            }

            /// Panics when the vector is full.
            pub fn push(&mut self, element: $ty) {
                assert!(self.len() < self.capacity());
                self.xs[self.len()] = element;
                self.len += 1;
            }

            pub fn pop(&mut self) -> Option<$ty> {
                if self.is_empty() {
                    return None;
                }
                self.len -= 1;
                Some(::core::mem::take(&mut self.xs[self.len()]))
            }

            pub fn clear(&mut self) {
                let len = self.len();
                self.xs[..len].fill(<$ty as ::core::default::Default>::default());
                self.len = 0;
            }

            pub fn remove(&mut self, index: usize) -> $ty {
                assert!(index < self.len());
                let element = self.xs[index];
                let len = self.len();
                // shift index+1..len back by one
                self.xs.copy_within(index + 1..len, index);
                self.len -= 1;
                self.xs[self.len()] = <$ty as ::core::default::Default>::default();
                element
            }

            pub fn insert(&mut self, index: usize, element: $ty) {
                assert!(self.len() < self.capacity());
                let len = self.len();
                assert!(index <= len);
                // shift index..len forward by one
                self.xs.copy_within(index..len, index + 1);
                self.len += 1;
                self.xs[index] = element;
            }

            #[inline]
            pub fn as_slice(&self) -> &[$ty] {
                &self.xs[..self.len()]
            }

            #[inline]
            pub fn as_mut_slice(&mut self) -> &mut [$ty] {
                let len = self.len();
                &mut self.xs[..len]
            }

            pub fn try_extend_from_slice(
                &mut self,
                data: &[$ty],
            ) -> Result<(), $crate::CapacityError<()>> {
                if data.len() > self.remaining_capacity() {
                    return Err($crate::CapacityError(()));
                }
                let offset = self.len();
                self.xs[offset..offset + data.len()].copy_from_slice(data);
                self.len += data.len() as $len_ty;
                Ok(())
            }
        }

        impl ::core::default::Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::core::ops::Deref for $name {
            type Target = [$ty];

            #[inline]
            fn deref(&self) -> &Self::Target {
                self.as_slice()
            }
        }

        impl ::core::ops::DerefMut for $name {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                self.as_mut_slice()
            }
        }

        impl ::core::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.as_slice() == other.as_slice()
            }
        }

        impl ::core::cmp::Eq for $name {}

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_list().entries(self.as_slice()).finish()
            }
        }
    };
}
