use crate::regulator::Mode;
use crate::state::RemoteCommand;

pub const CRSF_SYNC: u8 = 0xC8;
pub const CRSF_FRAMETYPE_RC_CHANNELS_PACKED: u8 = 0x16;

/// Stick centre and half-travel in CRSF channel units (172..=1811).
const CHANNEL_CENTER: f32 = 992.0;
const CHANNEL_HALF_RANGE: f32 = 820.0;
const CHANNEL_MIN: f32 = 172.0;
const CHANNEL_MAX: f32 = 1811.0;

// Channel assignment (AETR)
const CH_STEER: usize = 0;
const CH_ELEVATOR: usize = 1;
const CH_THRUST: usize = 2;
const CH_MODE: usize = 4;

/// Mode switch thresholds for a three-position switch.
const MODE_LOW_MAX: u16 = 600;
const MODE_MID_MAX: u16 = 1400;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RcChannels {
    pub channels: [u16; 16], // 11-bit values (0-2047)
}

impl RcChannels {
    /// Sticks to actuator units: thrust `[0, 1]`, steer and elevator `[-1, 1]`.
    pub fn remote_command(&self) -> RemoteCommand {
        let thrust = ((self.channels[CH_THRUST] as f32 - CHANNEL_MIN) / (CHANNEL_MAX - CHANNEL_MIN))
            .clamp(0.0, 1.0);
        RemoteCommand::new(
            thrust,
            crsf_to_unit(self.channels[CH_STEER]),
            crsf_to_unit(self.channels[CH_ELEVATOR]),
        )
    }

    /// Low: off, middle: remote control, high: track.
    pub fn mode(&self) -> Mode {
        match self.channels[CH_MODE] {
            v if v <= MODE_LOW_MAX => Mode::Off,
            v if v <= MODE_MID_MAX => Mode::RemoteControl,
            _ => Mode::Track,
        }
    }
}

pub fn crsf_to_unit(ch_value: u16) -> f32 {
    ((ch_value as f32 - CHANNEL_CENTER) / CHANNEL_HALF_RANGE).clamp(-1.0, 1.0)
}

/// Byte-at-a-time decoder for `[Sync] [Len] [Type] [Payload...] [CRC]` frames.
/// Only RC channel frames are surfaced.
pub struct CrsfParser {
    buffer: heapless::Vec<u8, 64>,
}

impl CrsfParser {
    pub fn new() -> Self {
        Self {
            buffer: heapless::Vec::new(),
        }
    }

    pub fn push_byte(&mut self, b: u8) -> Option<RcChannels> {
        if self.buffer.is_empty() {
            if b == CRSF_SYNC {
                let _ = self.buffer.push(b);
            }
            return None;
        }

        if self.buffer.len() == 1 {
            // Len covers Type + Payload + CRC
            if !(2..=62).contains(&b) {
                self.buffer.clear();
                if b == CRSF_SYNC {
                    let _ = self.buffer.push(b);
                }
                return None;
            }
            let _ = self.buffer.push(b);
            return None;
        }

        let total_size = 2 + self.buffer[1] as usize;
        if self.buffer.len() < total_size {
            let _ = self.buffer.push(b);
        }
        if self.buffer.len() < total_size {
            return None;
        }

        let frame = self.buffer.as_slice();
        let received_crc = frame[total_size - 1];
        let mut parsed = None;
        if calc_crc8(&frame[2..total_size - 1]) == received_crc
            && frame[2] == CRSF_FRAMETYPE_RC_CHANNELS_PACKED
        {
            parsed = parse_channels(&frame[3..total_size - 1]);
        }
        self.buffer.clear();
        parsed
    }

    /// Feeds a chunk and returns the last complete channel frame in it.
    pub fn push_bytes(&mut self, data: &[u8]) -> Option<RcChannels> {
        data.iter().fold(None, |last, &b| self.push_byte(b).or(last))
    }
}

impl Default for CrsfParser {
    fn default() -> Self {
        Self::new()
    }
}

fn calc_crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &b in data {
        crc ^= b;
        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ 0xD5;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// 16 channels of 11 bits, packed LSB first into 22 bytes.
fn parse_channels(payload: &[u8]) -> Option<RcChannels> {
    if payload.len() != 22 {
        return None;
    }
    let mut ch = [0u16; 16];
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut idx = 0;
    for &byte in payload {
        acc |= (byte as u32) << bits;
        bits += 8;
        while bits >= 11 && idx < ch.len() {
            ch[idx] = (acc & 0x07FF) as u16;
            acc >>= 11;
            bits -= 11;
            idx += 1;
        }
    }
    Some(RcChannels { channels: ch })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(channels: &[u16; 16]) -> [u8; 22] {
        let mut out = [0u8; 22];
        for (i, &v) in channels.iter().enumerate() {
            for bit in 0..11 {
                if v & (1 << bit) != 0 {
                    let pos = i * 11 + bit;
                    out[pos / 8] |= 1 << (pos % 8);
                }
            }
        }
        out
    }

    fn frame(channels: &[u16; 16]) -> heapless::Vec<u8, 64> {
        let mut f = heapless::Vec::new();
        f.extend_from_slice(&[CRSF_SYNC, 24, CRSF_FRAMETYPE_RC_CHANNELS_PACKED]).unwrap();
        f.extend_from_slice(&pack(channels)).unwrap();
        let crc = calc_crc8(&f[2..]);
        f.push(crc).unwrap();
        f
    }

    #[test]
    fn test_decodes_channel_frame() {
        let mut channels = [992u16; 16];
        channels[CH_THRUST] = 172;
        channels[CH_MODE] = 1811;
        channels[15] = 2047;
        let mut parser = CrsfParser::new();
        let rc = parser.push_bytes(&frame(&channels)).unwrap();
        assert_eq!(rc.channels, channels);
    }

    #[test]
    fn test_bad_crc_is_dropped_and_parser_recovers() {
        let channels = [1500u16; 16];
        let mut bad = frame(&channels);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let mut parser = CrsfParser::new();
        assert_eq!(parser.push_bytes(&bad), None);
        assert!(parser.push_bytes(&frame(&channels)).is_some());
    }

    #[test]
    fn test_garbage_before_sync_is_skipped() {
        let channels = [300u16; 16];
        let mut parser = CrsfParser::new();
        assert_eq!(parser.push_bytes(&[0x00, 0x13, 0x37]), None);
        assert_eq!(parser.push_bytes(&frame(&channels)).unwrap().channels, channels);
    }

    #[test]
    fn test_sticks_map_to_remote_command() {
        let mut rc = RcChannels { channels: [992; 16] };
        rc.channels[CH_THRUST] = 1811;
        rc.channels[CH_STEER] = 172;
        let cmd = rc.remote_command();
        assert_eq!(cmd.thrust, 1.0);
        assert_eq!(cmd.steer, -1.0);
        assert_eq!(cmd.elevator, 0.0);
    }

    #[test]
    fn test_mode_switch_positions() {
        let mut rc = RcChannels::default();
        rc.channels[CH_MODE] = 172;
        assert_eq!(rc.mode(), Mode::Off);
        rc.channels[CH_MODE] = 992;
        assert_eq!(rc.mode(), Mode::RemoteControl);
        rc.channels[CH_MODE] = 1811;
        assert_eq!(rc.mode(), Mode::Track);
    }
}
