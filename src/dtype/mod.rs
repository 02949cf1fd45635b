//! Element type tags for kernel operands
//!
//! `DType` is the runtime element type of a tensor view. Only a subset of these
//! can live in a WGSL storage buffer; the rest exist so the host engine can hand
//! any tensor to a kernel factory and get a typed rejection back.

use std::fmt;

/// Element types a tensor view may carry
///
/// # Discriminant Values
///
/// - Floats: 0-9 (F64=0, F32=1, F16=2)
/// - Signed ints: 10-19 (I64=10, I32=11, I8=13)
/// - Unsigned ints: 20-29 (U64=20, U32=21, U8=23)
/// - Bool: 30
/// - String: 50
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
#[repr(u8)]
pub enum DType {
    /// 64-bit floating point
    F64 = 0,
    /// 32-bit floating point
    F32 = 1,
    /// 16-bit floating point (IEEE 754)
    F16 = 2,
    /// 64-bit signed integer
    I64 = 10,
    /// 32-bit signed integer
    I32 = 11,
    /// 8-bit signed integer
    I8 = 13,
    /// 64-bit unsigned integer
    U64 = 20,
    /// 32-bit unsigned integer
    U32 = 21,
    /// 8-bit unsigned integer
    U8 = 23,
    /// Boolean, one byte per element
    Bool = 30,
    /// Variable-length string; never storable on the device
    String = 50,
}

impl DType {
    /// Size of one element in bytes, `None` for variable-length types
    #[inline]
    pub const fn size_in_bytes(self) -> Option<usize> {
        match self {
            Self::F64 | Self::I64 | Self::U64 => Some(8),
            Self::F32 | Self::I32 | Self::U32 => Some(4),
            Self::F16 => Some(2),
            Self::I8 | Self::U8 | Self::Bool => Some(1),
            Self::String => None,
        }
    }

    /// Short name for display and cache keys (e.g., "f32", "bool")
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::I8 => "i8",
            Self::U64 => "u64",
            Self::U32 => "u32",
            Self::U8 => "u8",
            Self::Bool => "bool",
            Self::String => "string",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Set of dtypes for type constraints
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DTypeSet {
    bits: u64,
}

impl DTypeSet {
    /// Floating point types a WGSL kernel can store
    #[cfg(feature = "f16")]
    pub const WGSL_FLOATS: Self = Self {
        bits: (1 << DType::F32 as u8) | (1 << DType::F16 as u8),
    };

    /// Floating point types a WGSL kernel can store
    #[cfg(not(feature = "f16"))]
    pub const WGSL_FLOATS: Self = Self {
        bits: 1 << DType::F32 as u8,
    };

    /// Integer types a WGSL kernel can store
    pub const WGSL_INTS: Self = Self {
        bits: (1 << DType::I32 as u8) | (1 << DType::U32 as u8),
    };

    /// Signed types a WGSL kernel can store
    pub const WGSL_SIGNED: Self = Self {
        bits: Self::WGSL_FLOATS.bits | (1 << DType::I32 as u8),
    };

    /// Every numeric type a WGSL kernel can store
    pub const WGSL_NUMERIC: Self = Self {
        bits: Self::WGSL_FLOATS.bits | Self::WGSL_INTS.bits,
    };

    /// Create a set containing a single dtype
    #[inline]
    pub const fn single(dtype: DType) -> Self {
        Self {
            bits: 1 << dtype as u8,
        }
    }

    /// Check if the set contains a dtype
    #[inline]
    pub const fn contains(self, dtype: DType) -> bool {
        self.bits & (1 << dtype as u8) != 0
    }

    /// Union of two sets
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Intersection of two sets
    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self {
            bits: self.bits & other.bits,
        }
    }

    /// Check if set is empty
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }
}
