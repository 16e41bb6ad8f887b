//! Shared builders for dissection tests: raw frame construction and a
//! stateful header deflater mirroring the engine's inflater.
#![allow(dead_code)]

use std::net::SocketAddr;

use flate2::{Compress, Compression, FlushCompress};
use spdy_sans_io::{PacketContext, DICTIONARY};

pub fn src() -> SocketAddr {
    "10.0.0.1:49152".parse().unwrap()
}

pub fn dst() -> SocketAddr {
    "10.0.0.2:6121".parse().unwrap()
}

/// First-pass packet context.
pub fn packet(framenum: u32) -> PacketContext {
    PacketContext::new(framenum, src(), dst())
}

/// Revisit of a packet already seen.
pub fn revisit(framenum: u32) -> PacketContext {
    let mut p = packet(framenum);
    p.visited = true;
    p
}

fn len24(len: usize) -> [u8; 3] {
    [(len >> 16) as u8, (len >> 8) as u8, len as u8]
}

/// Builds a DATA frame.
pub fn data_frame(stream_id: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&(stream_id & 0x7FFF_FFFF).to_be_bytes());
    frame.push(flags);
    frame.extend_from_slice(&len24(payload.len()));
    frame.extend_from_slice(payload);
    frame
}

/// Builds a control frame with an arbitrary version and type code.
pub fn control_frame(version: u16, type_code: u16, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&(0x8000 | version).to_be_bytes());
    frame.extend_from_slice(&type_code.to_be_bytes());
    frame.push(flags);
    frame.extend_from_slice(&len24(payload.len()));
    frame.extend_from_slice(payload);
    frame
}

/// Encodes a name/value pair list as the post-inflation plaintext.
pub fn encode_pairs(pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut plain = Vec::new();
    plain.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
    for (name, value) in pairs {
        plain.extend_from_slice(&(name.len() as u32).to_be_bytes());
        plain.extend_from_slice(name.as_bytes());
        plain.extend_from_slice(&(value.len() as u32).to_be_bytes());
        plain.extend_from_slice(value.as_bytes());
    }
    plain
}

/// One direction's header deflater. Like the analyzer's inflater it
/// keeps zlib state across blocks, so frames built from one instance
/// must be fed to the engine in order.
pub struct HeaderDeflater {
    stream: Compress,
}

impl Default for HeaderDeflater {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderDeflater {
    pub fn new() -> Self {
        let mut stream = Compress::new(Compression::default(), true);
        stream
            .set_dictionary(&DICTIONARY)
            .expect("set SPDY dictionary");
        Self { stream }
    }

    /// Compresses a pair list into one sync-flushed header block.
    pub fn compress(&mut self, pairs: &[(&str, &str)]) -> Vec<u8> {
        self.compress_plaintext(&encode_pairs(pairs))
    }

    /// Compresses pre-encoded plaintext; lets tests forge counts and
    /// lengths the pair API would never produce.
    pub fn compress_plaintext(&mut self, plain: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; plain.len() + 1024];
        let in_before = self.stream.total_in();
        let out_before = self.stream.total_out();
        self.stream
            .compress(&plain, &mut out, FlushCompress::Sync)
            .expect("deflate header block");
        assert_eq!(
            (self.stream.total_in() - in_before) as usize,
            plain.len(),
            "deflater did not consume the whole plaintext"
        );
        out.truncate((self.stream.total_out() - out_before) as usize);
        out
    }
}

/// SYN_STREAM carrying a compressed header block.
pub fn syn_stream(
    deflater: &mut HeaderDeflater,
    stream_id: u32,
    flags: u8,
    pairs: &[(&str, &str)],
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&stream_id.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload.extend_from_slice(&[0x40, 0x00]); // priority 2
    payload.extend_from_slice(&deflater.compress(pairs));
    control_frame(3, 1, flags, &payload)
}

/// SYN_REPLY carrying a compressed header block.
pub fn syn_reply(
    deflater: &mut HeaderDeflater,
    stream_id: u32,
    flags: u8,
    pairs: &[(&str, &str)],
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&stream_id.to_be_bytes());
    payload.extend_from_slice(&deflater.compress(pairs));
    control_frame(3, 2, flags, &payload)
}

/// HEADERS carrying a compressed header block.
pub fn headers_frame(
    deflater: &mut HeaderDeflater,
    stream_id: u32,
    flags: u8,
    pairs: &[(&str, &str)],
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&stream_id.to_be_bytes());
    payload.extend_from_slice(&deflater.compress(pairs));
    control_frame(3, 8, flags, &payload)
}
