/// Bytes per FIFO packet: X, Y, Z as big-endian i16.
pub const PACKET_LEN: usize = 6;

/// One X/Y/Z measurement in raw sensor counts.
///
/// Never holds `i16::MIN`, see [`condition`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl ChannelSample {
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        condition([x, y, z])
    }

    /// Decodes one big-endian packet and conditions it.
    pub fn from_be_packet(packet: &[u8; PACKET_LEN]) -> Self {
        condition([
            i16::from_be_bytes([packet[0], packet[1]]),
            i16::from_be_bytes([packet[2], packet[3]]),
            i16::from_be_bytes([packet[4], packet[5]]),
        ])
    }

    pub fn to_array(self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }
}

/// Clips `i16::MIN` one count up so every axis can be negated.
pub fn condition(raw: [i16; 3]) -> ChannelSample {
    let clip = |v: i16| v.max(-i16::MAX);
    ChannelSample {
        x: clip(raw[0]),
        y: clip(raw[1]),
        z: clip(raw[2]),
    }
}

/// Splits a burst into packets. A trailing partial packet is ignored.
pub fn packets(burst: &[u8]) -> impl Iterator<Item = ChannelSample> + '_ {
    burst.chunks_exact(PACKET_LEN).map(|chunk| {
        // chunks_exact only yields full chunks
        let mut packet = [0u8; PACKET_LEN];
        packet.copy_from_slice(chunk);
        ChannelSample::from_be_packet(&packet)
    })
}
