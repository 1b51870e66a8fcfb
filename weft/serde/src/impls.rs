use crate::{
    BitReader, BitWrite, ConstBitLength, Serde, SerdeErr, UnsignedVariableInteger,
};

// Collection lengths are written as variable integers so short payloads do
// not pay for a full usize.
fn ser_length(length: usize, writer: &mut dyn BitWrite) {
    UnsignedVariableInteger::<6>::new(length as i128).ser(writer);
}

fn de_length(reader: &mut BitReader) -> Result<usize, SerdeErr> {
    Ok(UnsignedVariableInteger::<6>::de(reader)?.as_usize())
}

fn length_bits(length: usize) -> u32 {
    UnsignedVariableInteger::<6>::new(length as i128).bit_length()
}

impl Serde for bool {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_bit(*self);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        reader.read_bit()
    }

    fn bit_length(&self) -> u32 {
        1
    }
}

impl ConstBitLength for bool {
    const BIT_LENGTH: u32 = 1;
}

impl Serde for () {
    fn ser(&self, _writer: &mut dyn BitWrite) {}

    fn de(_reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(())
    }

    fn bit_length(&self) -> u32 {
        0
    }
}

impl ConstBitLength for () {
    const BIT_LENGTH: u32 = 0;
}

macro_rules! impl_serde_for_uint {
    ($type:ty, $bytes:expr) => {
        impl Serde for $type {
            fn ser(&self, writer: &mut dyn BitWrite) {
                for byte in self.to_le_bytes() {
                    writer.write_byte(byte);
                }
            }

            fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
                let mut bytes = [0u8; $bytes];
                for byte in bytes.iter_mut() {
                    *byte = reader.read_byte()?;
                }
                Ok(<$type>::from_le_bytes(bytes))
            }

            fn bit_length(&self) -> u32 {
                $bytes * 8
            }
        }

        impl ConstBitLength for $type {
            const BIT_LENGTH: u32 = $bytes * 8;
        }
    };
}

impl_serde_for_uint!(u8, 1);
impl_serde_for_uint!(u16, 2);
impl_serde_for_uint!(u32, 4);
impl_serde_for_uint!(u64, 8);
impl_serde_for_uint!(i8, 1);
impl_serde_for_uint!(i16, 2);
impl_serde_for_uint!(i32, 4);
impl_serde_for_uint!(i64, 8);

impl Serde for f32 {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.to_bits().ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(f32::from_bits(u32::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

impl Serde for f64 {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.to_bits().ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(f64::from_bits(u64::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        64
    }
}

impl<T: Serde> Serde for Option<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            Some(value) => {
                writer.write_bit(true);
                value.ser(writer);
            }
            None => writer.write_bit(false),
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if reader.read_bit()? {
            Ok(Some(T::de(reader)?))
        } else {
            Ok(None)
        }
    }

    fn bit_length(&self) -> u32 {
        match self {
            Some(value) => 1 + value.bit_length(),
            None => 1,
        }
    }
}

impl<T: Serde> Serde for Vec<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        ser_length(self.len(), writer);
        for item in self {
            item.ser(writer);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = de_length(reader)?;
        let mut output = Vec::with_capacity(length);
        for _ in 0..length {
            output.push(T::de(reader)?);
        }
        Ok(output)
    }

    fn bit_length(&self) -> u32 {
        let mut output = length_bits(self.len());
        for item in self {
            output += item.bit_length();
        }
        output
    }
}

impl Serde for String {
    fn ser(&self, writer: &mut dyn BitWrite) {
        ser_length(self.len(), writer);
        for byte in self.as_bytes() {
            writer.write_byte(*byte);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = de_length(reader)?;
        let mut bytes = Vec::with_capacity(length);
        for _ in 0..length {
            bytes.push(reader.read_byte()?);
        }
        String::from_utf8(bytes).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        length_bits(self.len()) + self.len() as u32 * 8
    }
}

impl<A: Serde, B: Serde> Serde for (A, B) {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
        self.1.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok((A::de(reader)?, B::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        self.0.bit_length() + self.1.bit_length()
    }
}

impl<A: Serde, B: Serde, C: Serde> Serde for (A, B, C) {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
        self.1.ser(writer);
        self.2.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok((A::de(reader)?, B::de(reader)?, C::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        self.0.bit_length() + self.1.bit_length() + self.2.bit_length()
    }
}

#[cfg(test)]
mod tests {
    use crate::Serde;

    #[test]
    fn primitive_round_trips() {
        assert_eq!(u32::from_bytes(&0xDEAD_BEEFu32.to_bytes()).unwrap(), 0xDEAD_BEEF);
        assert_eq!(i64::from_bytes(&(-77i64).to_bytes()).unwrap(), -77);
        assert_eq!(f64::from_bytes(&3.25f64.to_bytes()).unwrap(), 3.25);
    }

    #[test]
    fn container_round_trips() {
        let v = vec![1u16, 2, 3, 500];
        assert_eq!(Vec::<u16>::from_bytes(&v.to_bytes()).unwrap(), v);

        let s = "weft".to_string();
        assert_eq!(String::from_bytes(&s.to_bytes()).unwrap(), s);

        let o: Option<u8> = Some(9);
        assert_eq!(Option::<u8>::from_bytes(&o.to_bytes()).unwrap(), o);
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        // Vec<u8> and String share the length-then-bytes layout, so this
        // decodes as a 2-byte string of invalid continuation bytes.
        let bytes = vec![0xFFu8, 0xFE].to_bytes();
        assert!(String::from_bytes(&bytes).is_err());
    }
}
