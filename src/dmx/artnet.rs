// Copyright (c) 2024 Stagecraft Systems
// Licence: GNU GPLv3
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Art-Net ArtDMX packet construction: an 18-byte header followed by a
//! 512-byte DMX payload.

use std::io::Write as _;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use super::DMX_MAX;

const ART_NET_ID: &[u8; 8] = b"Art-Net\0";
const OP_CODE_DMX: u16 = 0x5000;
const PROTOCOL_VERSION: u16 = 14;

/// The total size in bytes of one ArtDMX packet (18-byte header + 512 channels).
pub const PACKET_LEN: usize = 18 + DMX_MAX as usize;

/// Build one ArtDMX packet for `universe` (1-indexed) carrying `channels`
/// (exactly 512 bytes), stamped with the given sequence number.
///
/// Byte layout matches the Art-Net 4 specification's ArtDmx packet exactly:
/// Id, OpCode (little-endian 0x5000), ProtVer (big-endian 14), Sequence,
/// Physical (always 0), SubUni/Net (the zero-indexed universe split into
/// low/high bytes), Length (big-endian 512), then the channel data.
pub fn encode(universe: u32, channels: &[u8; 512], sequence: u8) -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    let mut header = &mut packet[0..18];

    header.write_all(ART_NET_ID).expect("fixed-size buffer");
    header.write_u16::<LittleEndian>(OP_CODE_DMX).expect("fixed-size buffer");
    header.write_u16::<BigEndian>(PROTOCOL_VERSION).expect("fixed-size buffer");
    header.write_u8(sequence).expect("fixed-size buffer");
    header.write_u8(0).expect("fixed-size buffer"); // Physical
    let zero_indexed_universe = universe.saturating_sub(1);
    header.write_u8((zero_indexed_universe & 0xFF) as u8).expect("fixed-size buffer"); // SubUni
    header
        .write_u8(((zero_indexed_universe >> 8) & 0xFF) as u8)
        .expect("fixed-size buffer"); // Net
    header.write_u16::<BigEndian>(DMX_MAX as u16).expect("fixed-size buffer"); // Length

    packet[18..18 + DMX_MAX as usize].copy_from_slice(channels);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matches_specification_byte_for_byte() {
        let channels = [7u8; 512];
        let packet = encode(3, &channels, 42);

        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x50]); // OpCode LE 0x5000
        assert_eq!(&packet[10..12], &[0x00, 0x0E]); // ProtVer BE 14
        assert_eq!(packet[12], 42); // Sequence
        assert_eq!(packet[13], 0); // Physical
        assert_eq!(packet[14], 2); // SubUni = low byte of (3 - 1)
        assert_eq!(packet[15], 0); // Net = high byte of (3 - 1)
        assert_eq!(&packet[16..18], &[0x02, 0x00]); // Length BE 512
        assert_eq!(packet.len(), 530);
    }

    #[test]
    fn payload_channel_i_lands_at_offset_17_plus_i() {
        let mut channels = [0u8; 512];
        channels[0] = 128;
        channels[511] = 9;
        let packet = encode(1, &channels, 0);

        assert_eq!(packet[18], 128);
        assert_eq!(packet[18 + 511], 9);
    }

    #[test]
    fn universe_above_256_splits_across_subuni_and_net() {
        let channels = [0u8; 512];
        // universe 257 -> zero-indexed 256 -> SubUni 0, Net 1
        let packet = encode(257, &channels, 0);
        assert_eq!(packet[14], 0);
        assert_eq!(packet[15], 1);
    }
}
