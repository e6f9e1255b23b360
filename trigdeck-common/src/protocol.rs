//! Command protocol wire definitions
//!
//! Byte framing and CRC belong to the packet transport. This module covers
//! what travels inside a frame: a command identifier and a bounded payload.
//!
//! # Payload conventions
//!
//! - Channel numbers are 1-based (`0` is always rejected)
//! - Multi-byte integers are little-endian
//! - Channel volume is a `u16`, linear gain × 100, clamped to 500 (5.0)
//! - Output (speakers/headphone) volume is an `i16`, dB × 10

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum payload carried by one packet
pub const MAX_PAYLOAD: usize = 255;

/// Maximum file path length accepted by the play-file command
pub const MAX_PATH_LEN: usize = 254;

/// Channel volume fixed-point scale
pub const CHANNEL_VOLUME_SCALE: f32 = 100.0;

/// Largest raw channel volume accepted (5.0 linear gain)
pub const MAX_CHANNEL_VOLUME_RAW: u16 = 500;

/// Output volume fixed-point scale (tenths of dB)
pub const OUTPUT_VOLUME_SCALE: f32 = 10.0;

/// Command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Hello = 0x01,
    Version = 0x02,
    PlayFile = 0x10,
    PlayChannel = 0x11,
    Stop = 0x12,
    StopAll = 0x13,
    Pause = 0x14,
    PauseAll = 0x15,
    Resume = 0x16,
    ResumeAll = 0x17,
    ChannelStatus = 0x20,
    ChannelsStatus = 0x21,
    GetChannelVolume = 0x30,
    SetChannelVolume = 0x31,
    GetSpeakersVolume = 0x32,
    SetSpeakersVolume = 0x33,
    GetHeadphoneVolume = 0x34,
    SetHeadphoneVolume = 0x35,
}

impl Command {
    /// All known commands, in id order
    pub const ALL: [Command; 18] = [
        Command::Hello,
        Command::Version,
        Command::PlayFile,
        Command::PlayChannel,
        Command::Stop,
        Command::StopAll,
        Command::Pause,
        Command::PauseAll,
        Command::Resume,
        Command::ResumeAll,
        Command::ChannelStatus,
        Command::ChannelsStatus,
        Command::GetChannelVolume,
        Command::SetChannelVolume,
        Command::GetSpeakersVolume,
        Command::SetSpeakersVolume,
        Command::GetHeadphoneVolume,
        Command::SetHeadphoneVolume,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Look up a command by name (as used on the diagnostic console)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase().replace(['-', '_'], "");
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| format!("{:?}", cmd).to_ascii_lowercase() == name)
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.id() == id)
            .ok_or_else(|| Error::InvalidInput(format!("unknown command id 0x{:02x}", id)))
    }
}

/// Error codes reported through the transport's error channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    InvalidChannel = 0x01,
    InvalidLength = 0x02,
    InvalidMode = 0x03,
    InvalidFileLength = 0x04,
    Playing = 0x05,
    Internal = 0x06,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorCode::InvalidChannel => "invalid channel",
            ErrorCode::InvalidLength => "invalid payload length",
            ErrorCode::InvalidMode => "invalid mode value",
            ErrorCode::InvalidFileLength => "invalid file length",
            ErrorCode::Playing => "playback start failure",
            ErrorCode::Internal => "internal error",
        };
        write!(f, "{} (0x{:02x})", text, self.code())
    }
}

/// Playback mode requested when opening a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    #[default]
    Normal,
    Loop,
}

impl PlayMode {
    /// Decode the wire representation (0 = normal, 1 = loop)
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(PlayMode::Normal),
            1 => Some(PlayMode::Loop),
            _ => None,
        }
    }
}

/// One request or response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    cmd: u8,
    data: Vec<u8>,
}

impl Packet {
    /// Build a packet, rejecting payloads larger than [`MAX_PAYLOAD`]
    pub fn new(cmd: u8, data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD {
            return Err(Error::InvalidInput(format!(
                "payload of {} bytes exceeds {} byte limit",
                data.len(),
                MAX_PAYLOAD
            )));
        }
        Ok(Self { cmd, data })
    }

    /// Packet with an empty payload
    pub fn empty(cmd: u8) -> Self {
        Self { cmd, data: Vec::new() }
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replace the payload in place (response written over request)
    ///
    /// Anything beyond [`MAX_PAYLOAD`] is dropped.
    pub fn set_payload(&mut self, data: &[u8]) {
        self.data.clear();
        self.data
            .extend_from_slice(&data[..data.len().min(MAX_PAYLOAD)]);
    }

    /// Shorten the payload, keeping the leading bytes
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }
}

/// Encode a linear channel volume as the wire `u16` (× 100)
pub fn encode_channel_volume(volume: f32) -> [u8; 2] {
    let raw = (volume.max(0.0) * CHANNEL_VOLUME_SCALE).round() as u16;
    raw.to_le_bytes()
}

/// Decode a wire channel volume, clamping to [`MAX_CHANNEL_VOLUME_RAW`]
pub fn decode_channel_volume(bytes: [u8; 2]) -> f32 {
    let raw = u16::from_le_bytes(bytes).min(MAX_CHANNEL_VOLUME_RAW);
    raw as f32 / CHANNEL_VOLUME_SCALE
}

/// Encode an output volume in dB as the wire `i16` (× 10)
pub fn encode_output_volume(db: f32) -> [u8; 2] {
    let raw = (db * OUTPUT_VOLUME_SCALE).round() as i16;
    raw.to_le_bytes()
}

/// Decode a wire output volume into dB
pub fn decode_output_volume(bytes: [u8; 2]) -> f32 {
    i16::from_le_bytes(bytes) as f32 / OUTPUT_VOLUME_SCALE
}
