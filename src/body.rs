//! Entity-body reassembly and dispatch.
//!
//! DATA frames on a stream accumulate until the FIN frame arrives;
//! the chunks are then concatenated, optionally content-decoded, and
//! offered to the downstream dissector chain. All bookkeeping happens
//! on the first visit of each packet so that revisits replay the same
//! outcome from stored state.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use tracing::debug;

use crate::conn::Connection;
use crate::engine::{Config, PacketContext};
use crate::output::{
    BodyContext, BodyRecord, DissectorRegistry, FrameRecord, InfoColumn, Severity,
};

/// Runs the DATA-frame pipeline and reports the body-side outcome.
#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_data_frame(
    config: &Config,
    conn: &mut Connection,
    registry: &mut DissectorRegistry,
    packet: &PacketContext,
    stream_id: u32,
    fin: bool,
    payload: &[u8],
    record: &mut FrameRecord,
    info: &mut InfoColumn,
) -> BodyRecord {
    let frame_length = payload.len();
    info.set(&format!("DATA[{stream_id}] length={frame_length}"));
    record
        .summary
        .push_str(&format!(" stream={stream_id} length={frame_length}"));

    let mut body = BodyRecord::default();

    // DATA frames seen so far, not counting this one.
    let num_data_frames = conn
        .streams
        .get(stream_id)
        .map_or(0, |s| s.data_frame_count);
    if frame_length == 0 && num_data_frames == 0 {
        return body;
    }

    // A frame is a single-chunk message when nothing preceded it and it
    // also ends the stream; those bypass the chunk list entirely.
    let is_single_chunk;
    if frame_length != 0 {
        is_single_chunk = num_data_frames == 0 && fin;
        if !packet.visited && !is_single_chunk {
            match conn.streams.get_mut(stream_id) {
                Some(stream) if config.assemble_entity_bodies => {
                    stream.add_chunk(packet.framenum, payload.to_vec());
                    if config.debug {
                        debug!(
                            bytes = frame_length,
                            stream_id,
                            framenum = packet.framenum,
                            "saved data chunk"
                        );
                    }
                }
                Some(stream) => {
                    stream.data_frame_count += 1;
                }
                None => {
                    if config.debug {
                        debug!(stream_id, "no stream info found");
                    }
                }
            }
        }
    } else {
        is_single_chunk = num_data_frames == 1;
    }

    if !fin {
        info.set_fence();
        info.set(" (partial entity)");
        record.summary.push_str(" (partial entity body)");
        body.partial = true;
        return body;
    }

    // Last frame of the stream: reassemble and hand the body on.
    let mut have_entire_body = is_single_chunk;
    match conn.streams.get_mut(stream_id) {
        Some(stream) => stream.assemble(),
        None => return body,
    }
    if config.assemble_entity_bodies {
        have_entire_body = true;
    }
    if !have_entire_body {
        return body;
    }

    {
        let stream = conn
            .streams
            .get(stream_id)
            .expect("stream state verified above");
        let data: &[u8] = stream.assembled_body.as_deref().unwrap_or(payload);
        body.body_len = Some(data.len());
        if stream.data_frame_count > 1 {
            body.origin_frames = stream.origin_frames();
        }

        let mut decoded = None;
        if let Some(encoding) = stream.content_encoding.as_deref() {
            if !encoding.is_empty() && !encoding.eq_ignore_ascii_case("identity") {
                body.content_encoding = Some(encoding.to_string());
                body.encoded_len = Some(data.len());
                if config.decompress_body
                    && (encoding.eq_ignore_ascii_case("gzip")
                        || encoding.eq_ignore_ascii_case("deflate"))
                {
                    match decode_content(encoding, data) {
                        Some(out) => {
                            body.body_len = Some(out.len());
                            decoded = Some(out);
                        }
                        None => {
                            body.decode_failed = true;
                            record.annotate(
                                Severity::Undecoded,
                                format!("Entity body decompression failed ({encoding})"),
                            );
                        }
                    }
                }
            }
        }

        let ctx = BodyContext {
            stream_id,
            port: packet.dst.port(),
            content_type: Some(stream.content_type.as_str()),
            content_type_parameters: stream.content_type_parameters.as_deref(),
        };
        let dispatched = decoded.as_deref().unwrap_or(data);
        body.dispatched = registry.dispatch(dispatched, &ctx);
    }

    // The assembled buffer owns the bytes now.
    conn.streams
        .get_mut(stream_id)
        .expect("stream state verified above")
        .discard_chunks();

    body
}

/// Decodes a gzip or deflate entity body. HTTP "deflate" is normally a
/// zlib stream, but raw deflate shows up in the wild; try both.
pub fn decode_content(encoding: &str, data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    if encoding.eq_ignore_ascii_case("gzip") {
        GzDecoder::new(data).read_to_end(&mut out).ok()?;
        Some(out)
    } else if encoding.eq_ignore_ascii_case("deflate") {
        if ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
            return Some(out);
        }
        out.clear();
        DeflateDecoder::new(data).read_to_end(&mut out).ok()?;
        Some(out)
    } else {
        None
    }
}
