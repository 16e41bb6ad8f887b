//! Per-stream state within one SPDY connection.

/// One DATA frame's payload retained for reassembly, tagged with the
/// packet ordinal it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChunk {
    pub data: Vec<u8>,
    pub framenum: u32,
}

/// State remembered for a stream once a header frame announced a
/// content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    /// Lowercased media type, parameters stripped.
    pub content_type: String,
    /// Parameter string after the `;`, if the header carried one.
    pub content_type_parameters: Option<String>,
    pub content_encoding: Option<String>,
    pub data_frames: Vec<DataChunk>,
    /// Concatenation of the chunks, built once on the FIN frame and
    /// never re-derived afterwards.
    pub assembled_body: Option<Vec<u8>>,
    /// DATA frames seen on the stream. At least the chunk-list length;
    /// larger when body assembly is off and frames are only counted.
    pub data_frame_count: u32,
}

impl StreamState {
    pub fn new(
        content_type: String,
        content_type_parameters: Option<String>,
        content_encoding: Option<String>,
    ) -> Self {
        Self {
            content_type,
            content_type_parameters,
            content_encoding,
            data_frames: Vec::new(),
            assembled_body: None,
            data_frame_count: 0,
        }
    }

    /// Retains one DATA payload for later assembly.
    pub fn add_chunk(&mut self, framenum: u32, data: Vec<u8>) {
        self.data_frames.push(DataChunk { data, framenum });
        self.data_frame_count += 1;
    }

    /// Concatenates the retained chunks into the assembled body. Runs
    /// at most once; revisits reuse the stored buffer.
    pub fn assemble(&mut self) {
        if self.assembled_body.is_some() || self.data_frames.is_empty() {
            return;
        }
        let total: usize = self.data_frames.iter().map(|df| df.data.len()).sum();
        if total == 0 {
            return;
        }
        let mut body = Vec::with_capacity(total);
        for df in &self.data_frames {
            body.extend_from_slice(&df.data);
        }
        self.assembled_body = Some(body);
    }

    /// Releases the chunk buffers once the assembled body owns the
    /// bytes. The origin ordinals stay behind for display.
    pub fn discard_chunks(&mut self) {
        for df in &mut self.data_frames {
            df.data = Vec::new();
        }
    }

    /// Distinct packet ordinals the body was assembled from, in visit
    /// order.
    pub fn origin_frames(&self) -> Vec<u32> {
        let mut frames = Vec::new();
        for df in &self.data_frames {
            if frames.last() != Some(&df.framenum) {
                frames.push(df.framenum);
            }
        }
        frames
    }
}

/// Grow-only map from stream id to state. Observed stream ids cluster
/// low and grow monotonically, so a dense vector with vacant slots is
/// the natural shape.
#[derive(Debug, Default)]
pub struct StreamMap {
    slots: Vec<Option<StreamState>>,
}

impl StreamMap {
    /// Stores the record for a stream. Saving the same id twice is a
    /// defect in the caller; the first record wins.
    pub fn save(&mut self, stream_id: u32, state: StreamState) {
        let index = stream_id as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        debug_assert!(self.slots[index].is_none(), "stream {stream_id} saved twice");
        if self.slots[index].is_none() {
            self.slots[index] = Some(state);
        }
    }

    pub fn get(&self, stream_id: u32) -> Option<&StreamState> {
        self.slots.get(stream_id as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, stream_id: u32) -> Option<&mut StreamState> {
        self.slots.get_mut(stream_id as usize)?.as_mut()
    }
}
