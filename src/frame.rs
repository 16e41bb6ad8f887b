//! SPDY/3 frame decoding.
//!
//! Every frame starts with the same 8-byte prelude:
//!
//! ```text
//! +----------------------------------+
//! |C| Version(15bits) | Type(16bits) |   control frame
//! +----------------------------------+
//! |C|       Stream-ID (31bits)       |   data frame
//! +----------------------------------+
//! | Flags (8)  |  Length (24 bits)   |
//! +----------------------------------+
//! |               Data               |
//! +----------------------------------+
//! ```
//!
//! The control bit selects between the two layouts of the first four
//! bytes. All integers are big-endian; the payload length excludes the
//! prelude itself.

use thiserror::Error;

/// Size of the common frame prelude.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Lowest SPDY version this engine decodes. Control frames below it
/// are surfaced but their payloads are skipped as opaque bytes.
pub const MIN_VERSION: u16 = 3;

/// Frame flags. Which bits apply depends on the frame type; see the
/// predicates on [`FrameHeader`].
pub mod flags {
    /// Last frame on this stream in this direction.
    pub const FIN: u8 = 0x01;
    /// SYN_STREAM only.
    pub const UNIDIRECTIONAL: u8 = 0x02;
    /// SETTINGS only.
    pub const CLEAR_SETTINGS: u8 = 0x01;
    /// Per-entry flags inside a SETTINGS frame.
    pub const SETTINGS_PERSIST_VALUE: u8 = 0x01;
    pub const SETTINGS_PERSISTED: u8 = 0x02;
}

/// Frame-level parse failures. The driver converts these into expert
/// annotations on the offending frame; they never unwind further.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("reported length remaining too small ({0} < 8)")]
    ShortPrelude(usize),
    #[error("invalid SPDY control frame type: {0}")]
    InvalidControlType(u16),
    #[error("not enough frame data: {declared} vs. {remaining}")]
    Truncated { declared: usize, remaining: usize },
    #[error("SETTINGS frame too small for number of entries field")]
    SettingsNoCount,
    #[error("SETTINGS frame too small [num_entries={0}]")]
    SettingsUndersized(u32),
    #[error("{0} frame payload too short")]
    PayloadTooShort(&'static str),
}

/// SPDY/3 frame types. DATA is the pseudo-type for frames with the
/// control bit clear; the rest are control-frame type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Data,
    SynStream,
    SynReply,
    RstStream,
    Settings,
    Noop,
    Ping,
    Goaway,
    Headers,
    WindowUpdate,
    Credential,
}

impl FrameType {
    /// Maps a control-frame type code. Code 0 is the DATA pseudo-type
    /// and never appears in a control prelude; codes past CREDENTIAL
    /// are invalid on the wire.
    pub fn from_code(code: u16) -> Result<Self, FrameError> {
        match code {
            1 => Ok(FrameType::SynStream),
            2 => Ok(FrameType::SynReply),
            3 => Ok(FrameType::RstStream),
            4 => Ok(FrameType::Settings),
            5 => Ok(FrameType::Noop),
            6 => Ok(FrameType::Ping),
            7 => Ok(FrameType::Goaway),
            8 => Ok(FrameType::Headers),
            9 => Ok(FrameType::WindowUpdate),
            10 => Ok(FrameType::Credential),
            other => Err(FrameError::InvalidControlType(other)),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            FrameType::Data => 0,
            FrameType::SynStream => 1,
            FrameType::SynReply => 2,
            FrameType::RstStream => 3,
            FrameType::Settings => 4,
            FrameType::Noop => 5,
            FrameType::Ping => 6,
            FrameType::Goaway => 7,
            FrameType::Headers => 8,
            FrameType::WindowUpdate => 9,
            FrameType::Credential => 10,
        }
    }

    /// Display name used in the info column.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::SynStream => "SYN_STREAM",
            FrameType::SynReply => "SYN_REPLY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::Noop => "NOOP",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::Headers => "HEADERS",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Credential => "CREDENTIAL",
        }
    }

    /// True for the three frame types that trail a compressed
    /// name/value header block.
    pub fn carries_header_block(self) -> bool {
        matches!(
            self,
            FrameType::SynStream | FrameType::SynReply | FrameType::Headers
        )
    }
}

/// A parsed 8-byte frame prelude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// High bit of byte 0.
    pub control: bool,
    /// 15-bit protocol version; 0 for DATA frames.
    pub version: u16,
    pub frame_type: FrameType,
    pub flags: u8,
    /// 24-bit payload length, prelude excluded.
    pub length: u32,
    /// 31-bit stream id for DATA frames; control frames carry theirs
    /// in the payload and leave this 0.
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parses the prelude at the front of `data`, verifying that the
    /// declared payload fits in the bytes behind it.
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::ShortPrelude(data.len()));
        }
        let control = data[0] & 0x80 != 0;
        let flags = data[4];
        let length = u32::from_be_bytes([0, data[5], data[6], data[7]]);
        if data.len() - FRAME_HEADER_SIZE < length as usize {
            return Err(FrameError::Truncated {
                declared: length as usize,
                remaining: data.len() - FRAME_HEADER_SIZE,
            });
        }
        if control {
            let version = u16::from_be_bytes([data[0], data[1]]) & 0x7FFF;
            let code = u16::from_be_bytes([data[2], data[3]]);
            Ok(FrameHeader {
                control,
                version,
                frame_type: FrameType::from_code(code)?,
                flags,
                length,
                stream_id: 0,
            })
        } else {
            let stream_id =
                u32::from_be_bytes([data[0], data[1], data[2], data[3]]) & 0x7FFF_FFFF;
            Ok(FrameHeader {
                control,
                version: 0,
                frame_type: FrameType::Data,
                flags,
                length,
                stream_id,
            })
        }
    }

    /// Total frame size including the prelude.
    pub fn total_size(&self) -> usize {
        self.length as usize + FRAME_HEADER_SIZE
    }

    /// FIN applies to DATA, SYN_STREAM, SYN_REPLY and HEADERS.
    pub fn is_fin(&self) -> bool {
        matches!(
            self.frame_type,
            FrameType::Data | FrameType::SynStream | FrameType::SynReply | FrameType::Headers
        ) && self.flags & flags::FIN != 0
    }

    /// UNIDIRECTIONAL applies only to SYN_STREAM.
    pub fn is_unidirectional(&self) -> bool {
        self.frame_type == FrameType::SynStream && self.flags & flags::UNIDIRECTIONAL != 0
    }

    /// CLEAR_SETTINGS applies only to SETTINGS.
    pub fn is_clear_settings(&self) -> bool {
        self.frame_type == FrameType::Settings && self.flags & flags::CLEAR_SETTINGS != 0
    }
}

fn be_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

fn stream_id_at(data: &[u8]) -> u32 {
    be_u32(data) & 0x7FFF_FFFF
}

/// Fixed fields of a SYN_STREAM payload; the compressed header block
/// follows at [`SynStream::FIXED_LEN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStream {
    pub stream_id: u32,
    pub associated_stream_id: u32,
    /// 3-bit priority, 0 is highest.
    pub priority: u8,
}

impl SynStream {
    pub const FIXED_LEN: usize = 10;

    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < Self::FIXED_LEN {
            return Err(FrameError::PayloadTooShort("SYN_STREAM"));
        }
        Ok(SynStream {
            stream_id: stream_id_at(&payload[0..4]),
            associated_stream_id: stream_id_at(&payload[4..8]),
            priority: payload[8] >> 5,
        })
    }
}

/// Fixed fields of a SYN_REPLY payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReply {
    pub stream_id: u32,
}

impl SynReply {
    pub const FIXED_LEN: usize = 4;

    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < Self::FIXED_LEN {
            return Err(FrameError::PayloadTooShort("SYN_REPLY"));
        }
        Ok(SynReply {
            stream_id: stream_id_at(&payload[0..4]),
        })
    }
}

/// Fixed fields of a HEADERS payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    pub stream_id: u32,
}

impl Headers {
    pub const FIXED_LEN: usize = 4;

    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < Self::FIXED_LEN {
            return Err(FrameError::PayloadTooShort("HEADERS"));
        }
        Ok(Headers {
            stream_id: stream_id_at(&payload[0..4]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RstStream {
    pub stream_id: u32,
    pub status: u32,
}

impl RstStream {
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < 8 {
            return Err(FrameError::PayloadTooShort("RST_STREAM"));
        }
        Ok(RstStream {
            stream_id: stream_id_at(&payload[0..4]),
            status: be_u32(&payload[4..8]),
        })
    }
}

/// One SETTINGS entry: a flags byte, a 24-bit id, a 32-bit value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingEntry {
    pub flags: u8,
    pub id: u32,
    pub value: u32,
}

impl SettingEntry {
    pub fn is_persist_value(&self) -> bool {
        self.flags & flags::SETTINGS_PERSIST_VALUE != 0
    }

    pub fn is_persisted(&self) -> bool {
        self.flags & flags::SETTINGS_PERSISTED != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub entries: Vec<SettingEntry>,
}

impl Settings {
    /// Parses a SETTINGS payload, validating the declared length
    /// against the entry count before touching the entries.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < 4 {
            return Err(FrameError::SettingsNoCount);
        }
        let num_entries = be_u32(&payload[0..4]);
        if (payload.len() as u64) < 4 + 8 * u64::from(num_entries) {
            return Err(FrameError::SettingsUndersized(num_entries));
        }
        let mut entries = Vec::with_capacity(num_entries as usize);
        let mut offset = 4;
        for _ in 0..num_entries {
            entries.push(SettingEntry {
                flags: payload[offset],
                id: u32::from_be_bytes([
                    0,
                    payload[offset + 1],
                    payload[offset + 2],
                    payload[offset + 3],
                ]),
                value: be_u32(&payload[offset + 4..offset + 8]),
            });
            offset += 8;
        }
        Ok(Settings { entries })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub id: u32,
}

impl Ping {
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < 4 {
            return Err(FrameError::PayloadTooShort("PING"));
        }
        Ok(Ping {
            id: be_u32(&payload[0..4]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowUpdate {
    pub stream_id: u32,
    pub delta: u32,
}

impl WindowUpdate {
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < 8 {
            return Err(FrameError::PayloadTooShort("WINDOW_UPDATE"));
        }
        Ok(WindowUpdate {
            stream_id: stream_id_at(&payload[0..4]),
            delta: be_u32(&payload[4..8]) & 0x7FFF_FFFF,
        })
    }
}

/// RST_STREAM status names from the protocol definition.
pub fn rst_status_name(status: u32) -> Option<&'static str> {
    match status {
        1 => Some("PROTOCOL_ERROR"),
        2 => Some("INVALID_STREAM"),
        3 => Some("REFUSED_STREAM"),
        4 => Some("UNSUPPORTED_VERSION"),
        5 => Some("CANCEL"),
        6 => Some("INTERNAL_ERROR"),
        7 => Some("FLOW_CONTROL_ERROR"),
        8 => Some("STREAM_IN_USE"),
        9 => Some("STREAM_ALREADY_CLOSED"),
        10 => Some("INVALID_CREDENTIALS"),
        11 => Some("FRAME_TOO_LARGE"),
        12 => Some("INVALID"),
        _ => None,
    }
}

/// SETTINGS id names from the protocol definition.
pub fn setting_name(id: u32) -> Option<&'static str> {
    match id {
        1 => Some("UPLOAD_BANDWIDTH"),
        2 => Some("DOWNLOAD_BANDWIDTH"),
        3 => Some("ROUND_TRIP_TIME"),
        4 => Some("MAX_CONCURRENT_STREAMS"),
        5 => Some("CURRENT_CWND"),
        6 => Some("DOWNLOAD_RETRANS_RATE"),
        7 => Some("INITIAL_WINDOW_SIZE"),
        _ => None,
    }
}
