//! Structured output records and host-facing sinks.
//!
//! The engine never renders UI itself; it emits one [`FrameRecord`]
//! per dissected frame to a [`FrameSink`] and maintains the packet's
//! one-line [`InfoColumn`]. Expert diagnostics ride along as
//! [`Annotation`]s on the offending frame's record.

use std::collections::HashMap;

use crate::frame::{FrameType, SettingEntry};
use crate::headers::Header;

/// Expert-info severity classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Framing that contradicts itself (lengths, counts).
    Malformed,
    /// Valid framing carrying a protocol-level violation.
    Protocol,
    /// Content the engine could not decode.
    Undecoded,
}

/// One expert diagnostic bound to a frame's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub severity: Severity,
    pub message: String,
}

/// Decoded header list carried by SYN_STREAM, SYN_REPLY and HEADERS
/// records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderListRecord {
    /// Pair count the plaintext declared; may exceed `headers.len()`
    /// when the list underflowed.
    pub num_pairs: u32,
    pub headers: Vec<Header>,
}

/// Where a completed entity body was handed after assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A dissector registered for the destination port took it.
    Port(u16),
    /// A dissector registered for the media type took it.
    MediaType(String),
    /// Generic media fallback; a content type was known but no
    /// specific dissector accepted.
    Media,
    /// Generic data fallback; no content type was known.
    Data,
    /// Nothing was dispatched (incomplete body, or no stream state).
    None,
}

/// Body-side outcome attached to a DATA frame's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRecord {
    /// FIN was clear; the entity body is still incomplete.
    pub partial: bool,
    /// Bytes handed to the dispatched dissector, after any decode.
    pub body_len: Option<usize>,
    /// Encoded size when the stream carried a content encoding.
    pub encoded_len: Option<usize>,
    pub content_encoding: Option<String>,
    /// Body decompression was attempted and failed; the raw encoded
    /// bytes were dispatched instead.
    pub decode_failed: bool,
    /// Distinct packet ordinals of a multi-chunk body, visit order.
    pub origin_frames: Vec<u32>,
    pub dispatched: Dispatch,
}

impl Default for BodyRecord {
    fn default() -> Self {
        Self {
            partial: false,
            body_len: None,
            encoded_len: None,
            content_encoding: None,
            decode_failed: false,
            origin_frames: Vec::new(),
            dispatched: Dispatch::None,
        }
    }
}

/// Typed per-frame payload detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDetail {
    Data {
        stream_id: u32,
        body: BodyRecord,
    },
    SynStream {
        stream_id: u32,
        associated_stream_id: u32,
        priority: u8,
        headers: Option<HeaderListRecord>,
    },
    SynReply {
        stream_id: u32,
        headers: Option<HeaderListRecord>,
    },
    RstStream {
        stream_id: u32,
        status: u32,
        status_name: String,
    },
    Settings {
        entries: Vec<SettingEntry>,
    },
    Noop,
    Ping {
        id: u32,
    },
    Goaway,
    Headers {
        stream_id: u32,
        headers: Option<HeaderListRecord>,
    },
    WindowUpdate {
        stream_id: u32,
        delta: u32,
    },
    Credential,
    /// Payload intentionally left undecoded (unsupported version,
    /// invalid type code).
    Opaque,
}

/// One dissected frame, as handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Ordinal of the packet this frame was found in.
    pub framenum: u32,
    pub control: bool,
    /// Control frames only.
    pub version: Option<u16>,
    /// `None` when the control type code was invalid.
    pub frame_type: Option<FrameType>,
    pub flags: u8,
    pub length: u32,
    /// One-line description in the style of a protocol-tree root,
    /// e.g. `"SPDY, SYN_REPLY (FIN)"`.
    pub summary: String,
    /// This frame's contribution to the info column.
    pub info: String,
    pub detail: FrameDetail,
    pub annotations: Vec<Annotation>,
}

impl FrameRecord {
    pub(crate) fn annotate(&mut self, severity: Severity, message: impl Into<String>) {
        self.annotations.push(Annotation {
            severity,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.annotations.is_empty()
    }
}

/// Receives each frame's record as it is dissected.
pub trait FrameSink {
    fn frame(&mut self, record: FrameRecord);
}

/// Sink that retains every record; the natural choice for taps and
/// tests.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub frames: Vec<FrameRecord>,
}

impl FrameSink for CollectSink {
    fn frame(&mut self, record: FrameRecord) {
        self.frames.push(record);
    }
}

/// The packet's one-line summary column. A fence protects everything
/// written so far, so later frames in the same packet append instead
/// of overwriting.
#[derive(Debug, Default)]
pub struct InfoColumn {
    text: String,
    fence: usize,
}

impl InfoColumn {
    /// Replaces the unfenced tail of the column.
    pub fn set(&mut self, text: &str) {
        self.text.truncate(self.fence);
        self.text.push_str(text);
    }

    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Protects the current contents from later `set` calls.
    pub fn set_fence(&mut self) {
        self.fence = self.text.len();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.fence = 0;
    }
}

/// Context handed to body dissectors along with the assembled bytes.
#[derive(Debug)]
pub struct BodyContext<'a> {
    pub stream_id: u32,
    /// Destination port of the packet that completed the body.
    pub port: u16,
    pub content_type: Option<&'a str>,
    pub content_type_parameters: Option<&'a str>,
}

/// A downstream content dissector. Returns true if it accepted the
/// payload.
pub trait BodyDissector {
    fn dissect(&mut self, body: &[u8], ctx: &BodyContext<'_>) -> bool;
}

/// Registry of downstream body dissectors, dispatched in priority
/// order: port, media type, then the generic fallbacks.
#[derive(Default)]
pub struct DissectorRegistry {
    by_port: HashMap<u16, Box<dyn BodyDissector>>,
    by_media_type: HashMap<String, Box<dyn BodyDissector>>,
    media: Option<Box<dyn BodyDissector>>,
    data: Option<Box<dyn BodyDissector>>,
}

impl std::fmt::Debug for DissectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DissectorRegistry")
            .field("ports", &self.by_port.keys().collect::<Vec<_>>())
            .field("media_types", &self.by_media_type.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DissectorRegistry {
    pub fn register_port(&mut self, port: u16, dissector: Box<dyn BodyDissector>) {
        self.by_port.insert(port, dissector);
    }

    /// Media types are matched lowercased, the form the stream store
    /// keeps them in.
    pub fn register_media_type(
        &mut self,
        media_type: impl Into<String>,
        dissector: Box<dyn BodyDissector>,
    ) {
        self.by_media_type
            .insert(media_type.into().to_ascii_lowercase(), dissector);
    }

    /// Fallback for bodies with a known content type no specific
    /// dissector accepted.
    pub fn set_media(&mut self, dissector: Box<dyn BodyDissector>) {
        self.media = Some(dissector);
    }

    /// Fallback for bodies with no content type at all.
    pub fn set_data(&mut self, dissector: Box<dyn BodyDissector>) {
        self.data = Some(dissector);
    }

    /// Runs the dispatch chain for a completed body and reports where
    /// it landed.
    pub(crate) fn dispatch(&mut self, body: &[u8], ctx: &BodyContext<'_>) -> Dispatch {
        if let Some(handler) = self.by_port.get_mut(&ctx.port) {
            if handler.dissect(body, ctx) {
                return Dispatch::Port(ctx.port);
            }
        }
        if let Some(content_type) = ctx.content_type {
            if let Some(handler) = self.by_media_type.get_mut(content_type) {
                if handler.dissect(body, ctx) {
                    return Dispatch::MediaType(content_type.to_string());
                }
            }
            if let Some(handler) = self.media.as_mut() {
                handler.dissect(body, ctx);
            }
            Dispatch::Media
        } else {
            if let Some(handler) = self.data.as_mut() {
                handler.dissect(body, ctx);
            }
            Dispatch::Data
        }
    }
}
