//! Index types for mesh elements.
//!
//! Type-safe wrappers around `u32` slots for vertices, triangles and
//! tetrahedra. Each carries an `INVALID` sentinel used for missing
//! neighbors across an open boundary.

use std::fmt::{self, Debug};

const INVALID: u32 = u32::MAX;

/// A type-safe vertex index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertexId(u32);

/// A type-safe triangle index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceId(u32);

/// A type-safe tetrahedron index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TetId(u32);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl $name {
            /// Create a new index from a raw value.
            ///
            /// # Panics
            /// Panics in debug builds if the value does not fit in 32 bits.
            #[inline]
            pub fn new(index: usize) -> Self {
                debug_assert!(index < INVALID as usize, "index {} too large", index);
                Self(index as u32)
            }

            /// Create an invalid/null index.
            #[inline]
            pub const fn invalid() -> Self {
                Self(INVALID)
            }

            /// Get the raw index value.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Check if this is a valid (non-null) index.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0 != INVALID
            }

            /// The index as an `Option`, `None` for the sentinel.
            #[inline]
            pub fn get(self) -> Option<usize> {
                self.is_valid().then_some(self.0 as usize)
            }

            /// Signed form used by solver file formats (`-1` for the sentinel).
            #[inline]
            pub fn to_signed(self) -> i64 {
                if self.is_valid() {
                    self.0 as i64
                } else {
                    -1
                }
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $display, self.index())
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertexId, "V");
impl_index_type!(FaceId, "F");
impl_index_type!(TetId, "T");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_id() {
        let v = VertexId::new(42);
        assert_eq!(v.index(), 42);
        assert!(v.is_valid());
        assert_eq!(v.get(), Some(42));

        let invalid = VertexId::invalid();
        assert!(!invalid.is_valid());
        assert_eq!(invalid.get(), None);
    }

    #[test]
    fn test_signed_sentinel() {
        assert_eq!(TetId::new(7).to_signed(), 7);
        assert_eq!(TetId::invalid().to_signed(), -1);
        assert_eq!(FaceId::default(), FaceId::invalid());
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", FaceId::new(3)), "F(3)");
        assert_eq!(format!("{:?}", VertexId::invalid()), "V(INVALID)");
    }
}
