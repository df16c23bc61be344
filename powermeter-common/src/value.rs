use std::fmt;

/// A decoded register value.
///
/// The variant is fixed by the decoder that produced it: raw integer
/// registers stay integers, IEEE registers stay single precision and
/// fixed-point registers are scaled into double precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementValue {
    /// Unsigned 16-bit register.
    U16(u16),

    /// Unsigned 32-bit register pair.
    U32(u32),

    /// IEEE-754 single-precision register pair.
    F32(f32),

    /// Fixed-point register scaled by its divisor.
    F64(f64),
}

impl MeasurementValue {
    /// Textual payload published to the state topic.
    pub fn to_payload(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementValue::U16(v) => write!(f, "{}", v),
            MeasurementValue::U32(v) => write!(f, "{}", v),
            MeasurementValue::F32(v) => write!(f, "{}", v),
            MeasurementValue::F64(v) => write!(f, "{}", v),
        }
    }
}
