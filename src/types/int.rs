use alloc::vec::Vec;

use crate::types::TooLargeToEncode;

/// MQTT's variable byte integer encoding, used for the remaining length of every packet.
///
/// Use its `TryFrom<u32>`, `TryFrom<usize>`, `From<u16>` and `From<u8>` implementations to construct a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VarByteInt(u32);

impl VarByteInt {
    /// The maximum encodable value using the variable byte integer encoding.
    pub const MAX_ENCODABLE: u32 = 268_435_455;

    /// Returns the inner value.
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns `Self::value() as usize`
    pub const fn size(&self) -> usize {
        self.0 as usize
    }

    /// The number of bytes the encoding occupies.
    pub const fn encoded_len(&self) -> usize {
        match self.0 {
            0..=127 => 1,
            128..=16_383 => 2,
            16_384..=2_097_151 => 3,
            _ => 4,
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        let mut x = self.0;

        loop {
            let mut encoded_byte = (x % 128) as u8;
            x /= 128;

            if x > 0 {
                encoded_byte |= 128;
            }
            out.push(encoded_byte);

            if x == 0 {
                return;
            }
        }
    }

    /// Decodes a variable byte integer from a slice.
    ///
    /// # Invariants
    /// The slice must contain a correctly encoded variable byte integer and has
    /// exactly the length of that encoding.
    pub(crate) fn from_slice_unchecked(slice: &[u8]) -> Self {
        debug_assert!(
            !slice.is_empty() && slice.len() <= 4,
            "encodings are always 1..=4 bytes long, {} is invalid",
            slice.len()
        );

        let mut multiplier = 1;
        let mut value = 0;

        for b in slice {
            value += (b & 0x7F) as u32 * multiplier;
            multiplier *= 128;
        }

        Self(value)
    }
}

impl From<u8> for VarByteInt {
    fn from(value: u8) -> Self {
        Self(value as u32)
    }
}

impl From<u16> for VarByteInt {
    fn from(value: u16) -> Self {
        Self(value as u32)
    }
}

impl TryFrom<u32> for VarByteInt {
    type Error = TooLargeToEncode;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > Self::MAX_ENCODABLE {
            Err(TooLargeToEncode)
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<usize> for VarByteInt {
    type Error = TooLargeToEncode;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map_err(|_| TooLargeToEncode)
            .and_then(Self::try_from)
    }
}
