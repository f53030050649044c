//! Fixed-point decoding of GATT sensor payloads.
//!
//! Sensor characteristics carry a single integer of fixed width. The reading is that integer
//! multiplied by a per-characteristic scale factor. Some sensors report fault conditions as
//! out-of-range magnitudes, so a decode spec may carry an upper bound above which the reading is
//! discarded.

/// Byte order of a multi-byte integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Integer layout of a sensor payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Int8,
    UInt8,
    Int16(ByteOrder),
    UInt16(ByteOrder),
}

impl WireFormat {
    /// Number of bytes a payload in this format must have.
    pub const fn width(self) -> usize {
        match self {
            WireFormat::Int8 | WireFormat::UInt8 => 1,
            WireFormat::Int16(_) | WireFormat::UInt16(_) => 2,
        }
    }
}

/// How to turn a raw payload into a reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeSpec {
    pub format: WireFormat,
    pub scale: f64,
    /// Readings strictly greater than this are discarded.
    pub max: Option<f64>,
}

impl DecodeSpec {
    pub const fn new(format: WireFormat, scale: f64) -> Self {
        Self {
            format,
            scale,
            max: None,
        }
    }

    pub const fn with_max(self, max: f64) -> Self {
        Self {
            max: Some(max),
            ..self
        }
    }

    /// Decode a payload.
    ///
    /// Returns `Ok(None)` when the scaled value is above the configured maximum.
    pub fn decode(&self, payload: &[u8]) -> Result<Option<f64>, DecodeError> {
        let raw = read_integer(self.format, payload)?;
        let value = raw as f64 * self.scale;

        match self.max {
            Some(max) if value > max => Ok(None),
            _ => Ok(Some(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected} byte(s), got {actual}")]
    Length { expected: usize, actual: usize },
}

fn read_integer(format: WireFormat, payload: &[u8]) -> Result<i64, DecodeError> {
    let length_error = || DecodeError::Length {
        expected: format.width(),
        actual: payload.len(),
    };

    match format {
        WireFormat::Int8 | WireFormat::UInt8 => {
            let [byte]: [u8; 1] = payload.try_into().map_err(|_| length_error())?;
            Ok(match format {
                WireFormat::Int8 => i64::from(byte as i8),
                _ => i64::from(byte),
            })
        }
        WireFormat::Int16(order) => {
            let bytes: [u8; 2] = payload.try_into().map_err(|_| length_error())?;
            Ok(i64::from(match order {
                ByteOrder::Big => i16::from_be_bytes(bytes),
                ByteOrder::Little => i16::from_le_bytes(bytes),
            }))
        }
        WireFormat::UInt16(order) => {
            let bytes: [u8; 2] = payload.try_into().map_err(|_| length_error())?;
            Ok(i64::from(match order {
                ByteOrder::Big => u16::from_be_bytes(bytes),
                ByteOrder::Little => u16::from_le_bytes(bytes),
            }))
        }
    }
}
