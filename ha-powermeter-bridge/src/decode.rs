//! Register value decoding.
//!
//! Every decoder reads a fixed-width big-endian byte sequence. Widths are
//! fixed by the catalog, so a slice of the wrong length is a programming error
//! and panics; the bus reader checks response lengths before decoding.

use powermeter_common::MeasurementValue;

/// Binary encoding of a register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoder {
    /// Unsigned 16-bit integer, one register.
    U16,
    /// Unsigned 32-bit integer, two registers, high word first.
    U32,
    /// IEEE-754 single-precision float, two registers, high word first.
    F32,
    /// Unsigned 16-bit fixed-point value divided by the given divisor.
    U16Scaled(u32),
    /// Unsigned 32-bit fixed-point value divided by the given divisor.
    U32Scaled(u32),
}

impl Decoder {
    /// Number of 16-bit registers this decoder consumes.
    pub fn words(&self) -> u16 {
        match self {
            Decoder::U16 | Decoder::U16Scaled(_) => 1,
            Decoder::U32 | Decoder::F32 | Decoder::U32Scaled(_) => 2,
        }
    }

    /// Number of bytes this decoder consumes.
    pub fn byte_len(&self) -> usize {
        usize::from(self.words()) * 2
    }

    /// Decode a register value.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not exactly [`byte_len`](Self::byte_len) long.
    pub fn decode(&self, bytes: &[u8]) -> MeasurementValue {
        match *self {
            Decoder::U16 => MeasurementValue::U16(decode_u16(bytes)),
            Decoder::U32 => MeasurementValue::U32(decode_u32(bytes)),
            Decoder::F32 => MeasurementValue::F32(decode_f32(bytes)),
            Decoder::U16Scaled(divisor) => {
                MeasurementValue::F64(scale(f64::from(decode_u16(bytes)), divisor))
            }
            Decoder::U32Scaled(divisor) => {
                MeasurementValue::F64(scale(f64::from(decode_u32(bytes)), divisor))
            }
        }
    }
}

/// Decode a big-endian `u16`.
pub fn decode_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes(fixed(bytes))
}

/// Decode a big-endian `u32`.
pub fn decode_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(fixed(bytes))
}

/// Decode a big-endian IEEE-754 single-precision float.
pub fn decode_f32(bytes: &[u8]) -> f32 {
    f32::from_be_bytes(fixed(bytes))
}

fn scale(raw: f64, divisor: u32) -> f64 {
    raw / f64::from(divisor)
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    match bytes.try_into() {
        Ok(array) => array,
        Err(_) => panic!("decoder expects {} bytes, got {}", N, bytes.len()),
    }
}
