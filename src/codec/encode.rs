use alloc::vec::Vec;

use crate::{
    header::FixedHeader,
    packet::TxPacket,
    types::{TooLargeToEncode, VarByteInt},
};

/// Appends the wire form of `packet` to `out`. A streamed payload is left out: it follows the
/// returned bytes on the wire.
///
/// Nothing is written if the remaining length exceeds [`VarByteInt::MAX_ENCODABLE`].
pub fn encode<P: TxPacket>(packet: &P, out: &mut Vec<u8>) -> Result<(), TooLargeToEncode> {
    let remaining_len = VarByteInt::try_from(packet.remaining_len())?;

    let body_len = remaining_len.size() - packet.streamed_len();
    out.reserve(1 + remaining_len.encoded_len() + body_len);
    FixedHeader::new(packet.packet_type(), packet.flags(), remaining_len).encode(out);

    let body_start = out.len();
    packet.write_body(out);
    debug_assert_eq!(
        out.len() - body_start,
        body_len,
        "body length must match the remaining length"
    );

    Ok(())
}
