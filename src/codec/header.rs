use crate::{
    codec::FramingError,
    fmt::trace,
    header::{FixedHeader, PacketType},
    types::VarByteInt,
};

/// Incremental reader of a fixed header. Holds at most the 5 bytes a header can span.
#[derive(Debug, Default)]
pub(crate) struct HeaderState {
    buffer: [u8; 5],
    read: u8,
}

impl HeaderState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attempts to complete the header with a single byte.
    ///
    /// Resets the state before returning a header or an error.
    pub(crate) fn push(&mut self, byte: u8) -> Result<Option<FixedHeader>, FramingError> {
        let i = self.read as usize;
        debug_assert!(i <= 4, "`self.read` gets reset to 0 when reaching 5");

        self.buffer[i] = byte;
        self.read += 1;

        trace!("received byte {} of header", i);

        if i == 0 {
            return if PacketType::from_type_and_flags(byte).is_err() {
                self.read = 0;
                Err(FramingError::MalformedPacket)
            } else {
                Ok(None)
            };
        }

        let is_continuation_byte = byte >= 128;

        if is_continuation_byte {
            if i == 4 {
                self.read = 0;
                Err(FramingError::MalformedPacket)
            } else {
                Ok(None)
            }
        } else {
            let slice = &self.buffer[1..=i];

            // Invariant: We checked that the slice is within the valid length range and
            // that the last byte matches the end condition of the variable byte integer encoding
            let remaining_len = VarByteInt::from_slice_unchecked(slice);

            self.read = 0;
            Ok(Some(FixedHeader {
                type_and_flags: self.buffer[0],
                remaining_len,
            }))
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.read == 0
    }
}
