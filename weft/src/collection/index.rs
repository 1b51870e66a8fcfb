//! Typed dense indices for collections.

use std::fmt::Debug;
use std::hash::Hash;

use weft_serde::{BitReader, BitWrite, Serde, SerdeErr};

/// A multidimensional index over a bounded range of the same type. The
/// range value holds the extent in every dimension; linearization is
/// column-major (first dimension slowest).
pub trait CollIndex: Copy + Eq + Hash + Debug + Serde + 'static {
    /// Position in `[0, Self::size(range))`.
    fn linearize(&self, range: &Self) -> u64;

    fn size(range: &Self) -> u64;

    fn from_linear(range: &Self, linear: u64) -> Self;

    fn in_range(&self, range: &Self) -> bool {
        self.linearize(range) < Self::size(range)
    }
}

/// One-dimensional index.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Index1D(pub u32);

impl Index1D {
    pub fn x(&self) -> u32 {
        self.0
    }
}

impl Serde for Index1D {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Index1D(u32::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

impl CollIndex for Index1D {
    fn linearize(&self, _range: &Self) -> u64 {
        u64::from(self.0)
    }

    fn size(range: &Self) -> u64 {
        u64::from(range.0)
    }

    fn from_linear(_range: &Self, linear: u64) -> Self {
        Index1D(linear as u32)
    }

    fn in_range(&self, range: &Self) -> bool {
        self.0 < range.0
    }
}

/// Two-dimensional index.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Index2D(pub u32, pub u32);

impl Index2D {
    pub fn x(&self) -> u32 {
        self.0
    }

    pub fn y(&self) -> u32 {
        self.1
    }
}

impl Serde for Index2D {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
        self.1.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Index2D(u32::de(reader)?, u32::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        64
    }
}

impl CollIndex for Index2D {
    fn linearize(&self, range: &Self) -> u64 {
        u64::from(self.0) * u64::from(range.1) + u64::from(self.1)
    }

    fn size(range: &Self) -> u64 {
        u64::from(range.0) * u64::from(range.1)
    }

    fn from_linear(range: &Self, linear: u64) -> Self {
        let y = u64::from(range.1).max(1);
        Index2D((linear / y) as u32, (linear % y) as u32)
    }

    fn in_range(&self, range: &Self) -> bool {
        self.0 < range.0 && self.1 < range.1
    }
}

/// Three-dimensional index.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Index3D(pub u32, pub u32, pub u32);

impl Index3D {
    pub fn x(&self) -> u32 {
        self.0
    }

    pub fn y(&self) -> u32 {
        self.1
    }

    pub fn z(&self) -> u32 {
        self.2
    }
}

impl Serde for Index3D {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
        self.1.ser(writer);
        self.2.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Index3D(u32::de(reader)?, u32::de(reader)?, u32::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        96
    }
}

impl CollIndex for Index3D {
    fn linearize(&self, range: &Self) -> u64 {
        (u64::from(self.0) * u64::from(range.1) + u64::from(self.1)) * u64::from(range.2)
            + u64::from(self.2)
    }

    fn size(range: &Self) -> u64 {
        u64::from(range.0) * u64::from(range.1) * u64::from(range.2)
    }

    fn from_linear(range: &Self, linear: u64) -> Self {
        let z = u64::from(range.2).max(1);
        let y = u64::from(range.1).max(1);
        let xy = linear / z;
        Index3D((xy / y) as u32, (xy % y) as u32, (linear % z) as u32)
    }

    fn in_range(&self, range: &Self) -> bool {
        self.0 < range.0 && self.1 < range.1 && self.2 < range.2
    }
}
