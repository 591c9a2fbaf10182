//! Fixed-width bit-pattern boxes.
//!
//! [`Value32`] and [`Value64`] store raw little-endian bytes. Constructors copy
//! bit patterns and zero-fill unused bytes; accessors reinterpret the same
//! bytes as another type of equal or smaller width. Nothing here performs a
//! numeric conversion, so `Value32::from_f32(1.0).as_u32()` is `0x3F80_0000`.
//!
//! Equality and hashing compare raw bytes. Two values of different source
//! types with identical bit patterns are the same dictionary entry.

use crate::error::{BitError, BitResult};

macro_rules! fixed_value {
    ($name:ident, $len:literal, $uint:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Width of the box in bytes.
            pub const WIDTH: usize = $len;

            /// The all-zero pattern.
            pub const ZERO: Self = Self([0; $len]);

            /// Wraps raw little-endian bytes.
            #[must_use]
            pub const fn from_le_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw little-endian bytes.
            #[must_use]
            pub const fn to_le_bytes(self) -> [u8; $len] {
                self.0
            }

            /// Copies up to the box width from `bytes`, zero-filling the rest.
            ///
            /// # Errors
            ///
            /// Returns [`BitError::InvalidBitCount`] if `bytes` is wider than the box.
            pub fn from_slice(bytes: &[u8]) -> BitResult<Self> {
                if bytes.len() > $len {
                    return Err(BitError::InvalidBitCount {
                        bits: (bytes.len() * 8) as u32,
                        max_bits: $len * 8,
                    });
                }
                let mut out = [0u8; $len];
                out[..bytes.len()].copy_from_slice(bytes);
                Ok(Self(out))
            }

            /// Returns the first `width` bytes of the pattern.
            #[must_use]
            pub fn bytes(&self, width: usize) -> &[u8] {
                &self.0[..width.min($len)]
            }

            /// Zeroes every byte past `width`.
            #[must_use]
            pub fn truncated(self, width: usize) -> Self {
                let mut out = self.0;
                for byte in out.iter_mut().skip(width) {
                    *byte = 0;
                }
                Self(out)
            }

            /// Returns `true` if every byte is zero.
            #[must_use]
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }

            /// Wraps an unsigned integer of the box width.
            #[must_use]
            pub const fn from_bits(value: $uint) -> Self {
                Self(value.to_le_bytes())
            }

            /// Reads the pattern as an unsigned integer of the box width.
            #[must_use]
            pub const fn to_bits(self) -> $uint {
                <$uint>::from_le_bytes(self.0)
            }

            /// Stores a `u8` bit pattern.
            #[must_use]
            pub fn from_u8(value: u8) -> Self {
                Self::from_prefix(&[value])
            }

            /// Stores an `i8` bit pattern.
            #[must_use]
            pub fn from_i8(value: i8) -> Self {
                Self::from_prefix(&value.to_le_bytes())
            }

            /// Stores a `u16` bit pattern.
            #[must_use]
            pub fn from_u16(value: u16) -> Self {
                Self::from_prefix(&value.to_le_bytes())
            }

            /// Stores an `i16` bit pattern.
            #[must_use]
            pub fn from_i16(value: i16) -> Self {
                Self::from_prefix(&value.to_le_bytes())
            }

            /// Stores a `u32` bit pattern.
            #[must_use]
            pub fn from_u32(value: u32) -> Self {
                Self::from_prefix(&value.to_le_bytes())
            }

            /// Stores an `i32` bit pattern.
            #[must_use]
            pub fn from_i32(value: i32) -> Self {
                Self::from_prefix(&value.to_le_bytes())
            }

            /// Stores an `f32` bit pattern.
            #[must_use]
            pub fn from_f32(value: f32) -> Self {
                Self::from_prefix(&value.to_le_bytes())
            }

            /// Low byte.
            #[must_use]
            pub const fn as_u8(self) -> u8 {
                self.0[0]
            }

            /// Low byte as `i8`.
            #[must_use]
            pub const fn as_i8(self) -> i8 {
                i8::from_le_bytes([self.0[0]])
            }

            /// Low two bytes as `u16`.
            #[must_use]
            pub const fn as_u16(self) -> u16 {
                u16::from_le_bytes([self.0[0], self.0[1]])
            }

            /// Low two bytes as `i16`.
            #[must_use]
            pub const fn as_i16(self) -> i16 {
                i16::from_le_bytes([self.0[0], self.0[1]])
            }

            /// Low four bytes as `u32`.
            #[must_use]
            pub const fn as_u32(self) -> u32 {
                u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
            }

            /// Low four bytes as `i32`.
            #[must_use]
            pub const fn as_i32(self) -> i32 {
                i32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
            }

            /// Low four bytes as `f32`.
            #[must_use]
            pub fn as_f32(self) -> f32 {
                f32::from_bits(self.as_u32())
            }

            fn from_prefix(bytes: &[u8]) -> Self {
                let mut out = [0u8; $len];
                out[..bytes.len()].copy_from_slice(bytes);
                Self(out)
            }
        }
    };
}

fixed_value!(Value32, 4, u32, "A 4-byte bit-pattern box.");
fixed_value!(Value64, 8, u64, "An 8-byte bit-pattern box.");

impl Value64 {
    /// Stores a `u64` bit pattern.
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self::from_bits(value)
    }

    /// Stores an `i64` bit pattern.
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        Self(value.to_le_bytes())
    }

    /// All eight bytes as `u64`.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.to_bits()
    }

    /// All eight bytes as `i64`.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        i64::from_le_bytes(self.0)
    }

    /// The low four bytes as a [`Value32`].
    #[must_use]
    pub const fn low32(self) -> Value32 {
        Value32::from_bits(self.as_u32())
    }
}

impl From<Value32> for Value64 {
    fn from(value: Value32) -> Self {
        Self::from_u32(value.as_u32())
    }
}
