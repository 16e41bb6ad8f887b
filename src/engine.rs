//! The analyzer: conversation tracking, the frame loop, and the
//! heuristic probe.
//!
//! The host feeds one reassembled buffer at a time. The loop dissects
//! whole frames in buffer order and stops at the first frame that does
//! not fit, returning a desegment request the host satisfies by
//! re-entering with more bytes appended at the reported offset.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::debug;

use crate::body;
use crate::conn::{Connection, ConversationKey};
use crate::frame::{
    self, FrameError, FrameHeader, FrameType, FRAME_HEADER_SIZE, MIN_VERSION,
};
use crate::headers;
use crate::output::{
    DissectorRegistry, FrameDetail, FrameRecord, FrameSink, HeaderListRecord, InfoColumn,
    Severity,
};
use crate::reader::FrameReader;
use crate::stream::StreamState;

/// Engine configuration, fixed per analyzer instead of process-wide.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reassemble bodies that span multiple DATA frames.
    pub assemble_entity_bodies: bool,
    /// Inflate name/value header blocks.
    pub decompress_headers: bool,
    /// Decode gzip/deflate entity bodies.
    pub decompress_body: bool,
    /// Emit verbose per-frame diagnostics.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assemble_entity_bodies: true,
            decompress_headers: true,
            decompress_body: true,
            debug: false,
        }
    }
}

/// Host-supplied facts about the packet under dissection.
#[derive(Debug, Clone)]
pub struct PacketContext {
    /// Capture-wide packet ordinal.
    pub framenum: u32,
    pub src: SocketAddr,
    pub dst: SocketAddr,
    /// False on the sequential first pass, true on revisits. State
    /// mutation (chunk capture, stream saves) happens only when false.
    pub visited: bool,
}

impl PacketContext {
    pub fn new(framenum: u32, src: SocketAddr, dst: SocketAddr) -> Self {
        Self {
            framenum,
            src,
            dst,
            visited: false,
        }
    }
}

/// How many more bytes the engine needs before it can continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesegmentLen {
    /// Not even a prelude yet; any amount helps.
    OneMoreSegment,
    /// The current frame's declared size minus what is on hand.
    Bytes(usize),
}

/// Result of one dissection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DissectOutcome {
    /// The whole buffer was consumed.
    Consumed(usize),
    /// Frames up to `offset` were consumed; the host should re-enter
    /// at `offset` once `needed` more bytes are available.
    Desegment { offset: usize, needed: DesegmentLen },
}

impl DissectOutcome {
    /// Bytes consumed either way.
    pub fn consumed(&self) -> usize {
        match self {
            DissectOutcome::Consumed(n) => *n,
            DissectOutcome::Desegment { offset, .. } => *offset,
        }
    }
}

/// The passive SPDY/3 analyzer. One instance per capture.
pub struct Analyzer {
    config: Config,
    registry: DissectorRegistry,
    conversations: HashMap<ConversationKey, Connection>,
}

impl Analyzer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: DissectorRegistry::default(),
            conversations: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Toggling decompression mid-capture affects later conversations
    /// only; cached header plaintexts stay valid.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Downstream body dissector registrations.
    pub fn registry_mut(&mut self) -> &mut DissectorRegistry {
        &mut self.registry
    }

    /// Dissects every whole frame in `data`, emitting one record per
    /// frame, and reports how far it got.
    pub fn dissect(
        &mut self,
        packet: &PacketContext,
        data: &[u8],
        sink: &mut dyn FrameSink,
        info: &mut InfoColumn,
    ) -> DissectOutcome {
        let mut reader = FrameReader::new(data);
        loop {
            if reader.remaining() == 0 {
                return DissectOutcome::Consumed(reader.offset());
            }
            let Ok(prelude) = reader.ensure(FRAME_HEADER_SIZE) else {
                return DissectOutcome::Desegment {
                    offset: reader.offset(),
                    needed: DesegmentLen::OneMoreSegment,
                };
            };
            // The 24-bit length at offset 5 fixes the frame's total size.
            let total = u32::from_be_bytes([0, prelude[5], prelude[6], prelude[7]]) as usize
                + FRAME_HEADER_SIZE;
            let frame_bytes = match reader.ensure(total) {
                Ok(bytes) => bytes,
                Err(needed) => {
                    return DissectOutcome::Desegment {
                        offset: needed.at,
                        needed: DesegmentLen::Bytes(needed.more),
                    };
                }
            };

            let debug_enabled = self.config.debug;
            let decompress_headers = self.config.decompress_headers;
            let key = ConversationKey::new(packet.src, packet.dst);
            let conn = self.conversations.entry(key).or_insert_with(|| {
                if debug_enabled {
                    debug!(framenum = packet.framenum, "created conversation state");
                }
                Connection::new(decompress_headers)
            });

            dissect_frame(
                &self.config,
                conn,
                &mut self.registry,
                packet,
                frame_bytes,
                sink,
                info,
            );
            reader.advance(total);

            // Keep this frame's info-column text; later frames append.
            info.set_fence();
        }
    }

    /// First-byte probe for claiming unregistered flows.
    ///
    /// Declines unless the buffer opens like a SPDY frame and a full
    /// dissection pass makes progress; a decline leaves the caller's
    /// desegment state untouched.
    pub fn heuristic_dissect(
        &mut self,
        packet: &PacketContext,
        data: &[u8],
        sink: &mut dyn FrameSink,
        info: &mut InfoColumn,
    ) -> Option<DissectOutcome> {
        // A data frame on a stream below 2^24 starts 0x00; a control
        // frame starts 0x80. Anything else is not SPDY.
        let first = *data.first()?;
        if first != 0x00 && first != 0x80 {
            return None;
        }
        let outcome = self.dissect(packet, data, sink, info);
        if outcome.consumed() > 0 {
            Some(outcome)
        } else {
            None
        }
    }

    /// Capture-end hook: resets every conversation's decompressors.
    /// Idempotent and safe on an empty analyzer.
    pub fn close_capture(&mut self) {
        for conn in self.conversations.values_mut() {
            conn.reset_decompressors();
        }
    }
}

/// Dissects one whole frame (`frame_bytes` holds prelude + payload,
/// sized by the declared length) and emits its record.
fn dissect_frame(
    config: &Config,
    conn: &mut Connection,
    registry: &mut DissectorRegistry,
    packet: &PacketContext,
    frame_bytes: &[u8],
    sink: &mut dyn FrameSink,
    info: &mut InfoColumn,
) {
    if config.debug {
        debug!(framenum = packet.framenum, "attempting dissection");
    }
    let info_start = info.text().len();

    let header = match FrameHeader::parse(frame_bytes) {
        Ok(header) => header,
        Err(err) => {
            // Through the driver only an invalid type code lands here;
            // the buffer was already sized. Surface and skip.
            let control = frame_bytes[0] & 0x80 != 0;
            let version = control
                .then(|| u16::from_be_bytes([frame_bytes[0], frame_bytes[1]]) & 0x7FFF);
            let severity = match err {
                FrameError::InvalidControlType(_) => Severity::Protocol,
                _ => Severity::Malformed,
            };
            let mut record = FrameRecord {
                framenum: packet.framenum,
                control,
                version,
                frame_type: None,
                flags: frame_bytes[4],
                length: u32::from_be_bytes([0, frame_bytes[5], frame_bytes[6], frame_bytes[7]]),
                summary: "SPDY".to_string(),
                info: String::new(),
                detail: FrameDetail::Opaque,
                annotations: Vec::new(),
            };
            record.annotate(severity, err.to_string());
            sink.frame(record);
            return;
        }
    };

    let mut record = FrameRecord {
        framenum: packet.framenum,
        control: header.control,
        version: header.control.then_some(header.version),
        frame_type: Some(header.frame_type),
        flags: header.flags,
        length: header.length,
        summary: format!("SPDY, {}", header.frame_type.name()),
        info: String::new(),
        detail: FrameDetail::Opaque,
        annotations: Vec::new(),
    };
    if header.is_fin() {
        record.summary.push_str(" (FIN)");
    }
    info.set(header.frame_type.name());

    let payload = &frame_bytes[FRAME_HEADER_SIZE..];

    if header.control && header.version < MIN_VERSION {
        record.summary.push_str(" [Unsupported Version]");
        if config.debug {
            debug!(
                version = header.version,
                "unsupported version, gracefully aborting frame dissection"
            );
        }
        record.info = info.text()[info_start..].to_string();
        sink.frame(record);
        return;
    }

    match header.frame_type {
        FrameType::Data => {
            let body = body::handle_data_frame(
                config,
                conn,
                registry,
                packet,
                header.stream_id,
                header.is_fin(),
                payload,
                &mut record,
                info,
            );
            record.detail = FrameDetail::Data {
                stream_id: header.stream_id,
                body,
            };
        }
        FrameType::SynStream => match frame::SynStream::parse(payload) {
            Err(err) => record.annotate(Severity::Malformed, err.to_string()),
            Ok(syn) => {
                info.append(&format!("[{}]", syn.stream_id));
                let headers = process_header_block(
                    config,
                    conn,
                    packet,
                    &header,
                    syn.stream_id,
                    &payload[frame::SynStream::FIXED_LEN..],
                    &mut record,
                    info,
                );
                record.detail = FrameDetail::SynStream {
                    stream_id: syn.stream_id,
                    associated_stream_id: syn.associated_stream_id,
                    priority: syn.priority,
                    headers,
                };
            }
        },
        FrameType::SynReply => match frame::SynReply::parse(payload) {
            Err(err) => record.annotate(Severity::Malformed, err.to_string()),
            Ok(syn) => {
                info.append(&format!("[{}]", syn.stream_id));
                let headers = process_header_block(
                    config,
                    conn,
                    packet,
                    &header,
                    syn.stream_id,
                    &payload[frame::SynReply::FIXED_LEN..],
                    &mut record,
                    info,
                );
                record.detail = FrameDetail::SynReply {
                    stream_id: syn.stream_id,
                    headers,
                };
            }
        },
        FrameType::Headers => match frame::Headers::parse(payload) {
            Err(err) => record.annotate(Severity::Malformed, err.to_string()),
            Ok(hdrs) => {
                info.append(&format!("[{}]", hdrs.stream_id));
                let headers = process_header_block(
                    config,
                    conn,
                    packet,
                    &header,
                    hdrs.stream_id,
                    &payload[frame::Headers::FIXED_LEN..],
                    &mut record,
                    info,
                );
                record.detail = FrameDetail::Headers {
                    stream_id: hdrs.stream_id,
                    headers,
                };
            }
        },
        FrameType::RstStream => match frame::RstStream::parse(payload) {
            Err(err) => record.annotate(Severity::Malformed, err.to_string()),
            Ok(rst) => {
                info.append(&format!("[{}]", rst.stream_id));
                let status_name = match frame::rst_status_name(rst.status) {
                    Some(name) => name.to_string(),
                    None => {
                        record.annotate(
                            Severity::Protocol,
                            format!("Invalid status code for RST_STREAM: {}", rst.status),
                        );
                        format!("Unknown ({})", rst.status)
                    }
                };
                info.append(&format!(" {status_name}"));
                record.detail = FrameDetail::RstStream {
                    stream_id: rst.stream_id,
                    status: rst.status,
                    status_name,
                };
            }
        },
        FrameType::Settings => match frame::Settings::parse(payload) {
            Err(err) => record.annotate(Severity::Malformed, err.to_string()),
            Ok(settings) => {
                record.detail = FrameDetail::Settings {
                    entries: settings.entries,
                };
            }
        },
        FrameType::Noop => record.detail = FrameDetail::Noop,
        FrameType::Ping => match frame::Ping::parse(payload) {
            Err(err) => record.annotate(Severity::Malformed, err.to_string()),
            Ok(ping) => {
                info.append(&format!(" ID={}", ping.id));
                record.detail = FrameDetail::Ping { id: ping.id };
            }
        },
        FrameType::Goaway => record.detail = FrameDetail::Goaway,
        FrameType::WindowUpdate => match frame::WindowUpdate::parse(payload) {
            Err(err) => record.annotate(Severity::Malformed, err.to_string()),
            Ok(wu) => {
                info.append(&format!("[{}] Delta={}", wu.stream_id, wu.delta));
                record.detail = FrameDetail::WindowUpdate {
                    stream_id: wu.stream_id,
                    delta: wu.delta,
                };
            }
        },
        FrameType::Credential => record.detail = FrameDetail::Credential,
    }

    record.info = info.text()[info_start..].to_string();
    sink.frame(record);
}

/// Decompresses, parses and acts on one frame's name/value block.
/// Returns `None` when header processing was disabled or aborted.
#[allow(clippy::too_many_arguments)]
fn process_header_block(
    config: &Config,
    conn: &mut Connection,
    packet: &PacketContext,
    header: &FrameHeader,
    stream_id: u32,
    block: &[u8],
    record: &mut FrameRecord,
    info: &mut InfoColumn,
) -> Option<HeaderListRecord> {
    if !config.decompress_headers {
        return None;
    }

    let plain = match conn.header_plaintext(packet.framenum, stream_id, header.frame_type, block)
    {
        Ok(plain) => plain,
        Err(err) => {
            record.annotate(Severity::Undecoded, "Inflation failed. Aborting.");
            record
                .summary
                .push_str(" [Error: Header decompression failed]");
            if config.debug {
                debug!(stream_id, error = %err, "header inflation failed");
            }
            return None;
        }
    };

    let Some(num_pairs) = headers::pair_count(&plain) else {
        record.annotate(
            Severity::Malformed,
            "Header block too short for pair count",
        );
        return None;
    };

    // Guard against decompression bombs announcing absurd counts.
    if num_pairs > header.length {
        record.annotate(
            Severity::Malformed,
            "Number of headers is greater than frame length!",
        );
        return Some(HeaderListRecord {
            num_pairs,
            headers: Vec::new(),
        });
    }

    let (pairs, underflow) = headers::parse_pairs(&plain, num_pairs);
    if underflow {
        record.annotate(
            Severity::Malformed,
            "Header block ended before declared pair count",
        );
    }

    let recognized = headers::recognize(&pairs);
    if let Some(version) = &recognized.version {
        let verb = recognized.verb.as_deref().unwrap_or_default();
        match &recognized.url {
            Some(url) => info.append(&format!(": {verb} {url} {version}")),
            None => info.append(&format!(": {verb} {version}")),
        }
    }

    // Data may follow on this stream; remember what the headers said
    // about it. First visit only, so revisits cannot double-save.
    if let Some(content_type) = &recognized.content_type {
        if !packet.visited {
            let (media, params) = headers::split_content_type(content_type);
            if config.debug {
                debug!(stream_id, content_type = %media, "saved stream info");
            }
            let encoding = recognized
                .content_encoding
                .as_deref()
                .map(|ce| ce.to_ascii_lowercase());
            conn.streams
                .save(stream_id, StreamState::new(media, params, encoding));
        }
    }

    Some(HeaderListRecord {
        num_pairs,
        headers: pairs,
    })
}
