//! Bit-level serialization for the weft runtime.
//!
//! Wire types implement [`Serde`] and are written through a [`BitWrite`]
//! sink: a growable [`BitWriter`], or a [`BitCounter`] when only the encoded
//! size is needed (the messenger sizes a payload before choosing the eager
//! or rendezvous path).

mod bit_counter;
mod bit_reader;
mod bit_writer;
mod error;
mod impls;
mod integer;
mod serde;

pub use bit_counter::BitCounter;
pub use bit_reader::BitReader;
pub use bit_writer::{BitWrite, BitWriter};
pub use error::SerdeErr;
pub use integer::{
    SignedInteger, SignedVariableInteger, UnsignedInteger, UnsignedVariableInteger,
};
pub use serde::{ConstBitLength, Serde};
