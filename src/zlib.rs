//! Stateful zlib inflation of SPDY header blocks.
//!
//! Thin wrapper around `flate2::Decompress` providing the
//! dictionary-negotiating, sync-flush inflate SPDY header blocks need.
//! One instance per direction per connection: the compression history
//! is shared by every header-bearing frame in that direction, so the
//! stream must outlive individual frames and must see blocks in
//! transport order.

use flate2::{Decompress, FlushDecompress};
use thiserror::Error;

use crate::dictionary;

/// Working-buffer size for one sync-flush inflate call.
const INFLATE_BUF_SIZE: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum InflateError {
    /// The stream asked for a preset dictionary other than SPDY's.
    #[error("decompressor wants dictionary {wanted:#010x}, but we have {have:#010x}")]
    DictionaryMismatch { wanted: u32, have: u32 },
    #[error("inflation failed: {0}")]
    Inflate(String),
}

/// One direction's shared header inflater.
pub struct HeaderInflater {
    stream: Decompress,
    dictionary_id: u32,
}

impl std::fmt::Debug for HeaderInflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderInflater")
            .field("dictionary_id", &self.dictionary_id)
            .finish()
    }
}

impl HeaderInflater {
    /// `dictionary_id` is the Adler-32 the stream is expected to ask
    /// for; the connection computes it once from the SPDY dictionary.
    pub fn new(dictionary_id: u32) -> Self {
        Self {
            stream: Decompress::new(true),
            dictionary_id,
        }
    }

    /// Inflates one compressed header block, negotiating the preset
    /// dictionary when the stream first asks for it.
    ///
    /// On failure the stream's history is likely unusable, so later
    /// blocks in the same direction will fail too; callers surface the
    /// error per frame and make no attempt to resynchronize.
    pub fn inflate(&mut self, block: &[u8]) -> Result<Vec<u8>, InflateError> {
        let mut out = vec![0u8; INFLATE_BUF_SIZE];
        let in_before = self.stream.total_in();
        let out_before = self.stream.total_out();

        let first = self
            .stream
            .decompress(block, &mut out, FlushDecompress::Sync);
        if let Err(err) = first {
            match err.needs_dictionary() {
                Some(wanted) if wanted == self.dictionary_id => {
                    self.stream
                        .set_dictionary(&dictionary::DICTIONARY)
                        .map_err(|e| InflateError::Inflate(e.to_string()))?;
                    // Resume after the header bytes the first call ate.
                    let consumed = (self.stream.total_in() - in_before) as usize;
                    self.stream
                        .decompress(&block[consumed..], &mut out, FlushDecompress::Sync)
                        .map_err(|e| InflateError::Inflate(e.to_string()))?;
                }
                Some(wanted) => {
                    return Err(InflateError::DictionaryMismatch {
                        wanted,
                        have: self.dictionary_id,
                    });
                }
                None => return Err(InflateError::Inflate(err.to_string())),
            }
        }

        let consumed = (self.stream.total_in() - in_before) as usize;
        let produced = (self.stream.total_out() - out_before) as usize;
        if consumed < block.len() {
            tracing::trace!(
                produced,
                leftover = block.len() - consumed,
                "inflation succeeded with input bytes left over"
            );
        }
        out.truncate(produced);
        Ok(out)
    }

    /// Drops all accumulated stream state. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.stream.reset(true);
    }
}
