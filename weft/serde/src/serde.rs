use crate::{BitCounter, BitReader, BitWrite, BitWriter, SerdeErr};

/// A type with a deterministic bit-level wire encoding.
pub trait Serde: Sized {
    fn ser(&self, writer: &mut dyn BitWrite);

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr>;

    fn bit_length(&self) -> u32;

    /// Serialize into a fresh padded byte buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        self.ser(&mut writer);
        writer.to_bytes()
    }

    /// Deserialize from a buffer produced by [`Serde::to_bytes`].
    fn from_bytes(bytes: &[u8]) -> Result<Self, SerdeErr> {
        let mut reader = BitReader::new(bytes);
        Self::de(&mut reader)
    }

    /// Encoded size in whole bytes.
    fn byte_length(&self) -> usize {
        let mut counter = BitCounter::new();
        self.ser(&mut counter);
        counter.bytes()
    }
}

/// Types whose encoded size is the same for every value.
pub trait ConstBitLength {
    const BIT_LENGTH: u32;
}
