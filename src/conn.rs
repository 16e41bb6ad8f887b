//! Per-conversation state.
//!
//! A conversation is one TCP flow, keyed by its endpoint pair. Each
//! holds the two direction-scoped header inflaters, the stream map,
//! and the capture-scoped memo of decompressed header blocks that
//! keeps re-dissection deterministic.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::dictionary;
use crate::frame::FrameType;
use crate::stream::StreamMap;
use crate::zlib::{HeaderInflater, InflateError};

/// Canonical endpoint pair: both directions of a flow map to the same
/// conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    a: SocketAddr,
    b: SocketAddr,
}

impl ConversationKey {
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        if src <= dst {
            Self { a: src, b: dst }
        } else {
            Self { a: dst, b: src }
        }
    }
}

/// State owned by one SPDY conversation for the life of the capture.
#[derive(Debug)]
pub struct Connection {
    pub(crate) streams: StreamMap,
    rqst: Option<HeaderInflater>,
    rply: Option<HeaderInflater>,
    dictionary_id: u32,
    /// Decompressed header blocks keyed by (packet ordinal, stream id,
    /// frame type code). Never evicted; the capture owns it.
    header_memo: HashMap<(u32, u32, u16), Vec<u8>>,
}

impl Connection {
    /// Inflaters are only allocated when header decompression is on,
    /// mirroring the conversation-setup path of the capture host.
    pub(crate) fn new(decompress_headers: bool) -> Self {
        let dictionary_id = dictionary::dictionary_id();
        let (rqst, rply) = if decompress_headers {
            (
                Some(HeaderInflater::new(dictionary_id)),
                Some(HeaderInflater::new(dictionary_id)),
            )
        } else {
            (None, None)
        };
        Self {
            streams: StreamMap::default(),
            rqst,
            rply,
            dictionary_id,
            header_memo: HashMap::new(),
        }
    }

    pub fn dictionary_id(&self) -> u32 {
        self.dictionary_id
    }

    /// Returns the memoized plaintext for this frame, inflating and
    /// storing it on first visit.
    ///
    /// The inflater cannot be rewound, so the first visit's output is
    /// the one every revisit sees; this is what makes random-access
    /// re-dissection byte-stable.
    pub(crate) fn header_plaintext(
        &mut self,
        framenum: u32,
        stream_id: u32,
        frame_type: FrameType,
        block: &[u8],
    ) -> Result<Vec<u8>, InflateError> {
        let key = (framenum, stream_id, frame_type.code());
        if let Some(plain) = self.header_memo.get(&key) {
            return Ok(plain.clone());
        }
        let inflater = self
            .inflater_for(stream_id, frame_type)
            .ok_or_else(|| InflateError::Inflate("no inflater for this direction".into()))?;
        let plain = inflater.inflate(block)?;
        self.header_memo.insert(key, plain.clone());
        Ok(plain)
    }

    /// Selects the direction-scoped inflater for a header block.
    ///
    /// Even streams are server-initiated, so their header blocks come
    /// from the server side. Odd-stream HEADERS also use the reply
    /// inflater: no known client emits HEADERS, so they are assumed to
    /// be server-sent.
    fn inflater_for(
        &mut self,
        stream_id: u32,
        frame_type: FrameType,
    ) -> Option<&mut HeaderInflater> {
        let slot = if stream_id % 2 == 0 {
            &mut self.rply
        } else {
            match frame_type {
                FrameType::Headers => &mut self.rply,
                FrameType::SynStream => &mut self.rqst,
                FrameType::SynReply => &mut self.rply,
                _ => return None,
            }
        };
        slot.as_mut()
    }

    /// Resets both direction inflaters. Idempotent, and a no-op for
    /// connections created with decompression off.
    pub fn reset_decompressors(&mut self) {
        if let Some(inflater) = self.rqst.as_mut() {
            inflater.reset();
        }
        if let Some(inflater) = self.rply.as_mut() {
            inflater.reset();
        }
    }
}
