//! spdy-sans-io: a passive, sans-I/O SPDY/3 protocol analyzer
//!
//! This crate provides a synchronous SPDY/3 dissection engine designed
//! for capture tooling: it consumes the bidirectional byte stream a
//! transport-layer reassembler produces and emits one structured record
//! per SPDY frame, with decompressed header blocks and reassembled
//! entity bodies.
//!
//! # Features
//!
//! - **Sans-I/O Design**: no sockets, no async runtime; the host feeds
//!   buffers and acts on desegment requests
//! - **Stateful Header Decompression**: per-direction zlib streams
//!   seeded with the SPDY preset dictionary, shared across frames
//! - **Body Reassembly**: DATA frames coalesce per stream, with
//!   optional gzip/deflate decoding and a dissector dispatch chain
//! - **Revisit-Stable**: decompression results are memoized per packet,
//!   so random-access re-dissection of a capture is deterministic
//! - **Heuristic Detection**: first-byte probe for claiming
//!   unregistered TCP flows
//!
//! # Quick Start
//!
//! ```rust
//! use std::net::SocketAddr;
//! use spdy_sans_io::{
//!     Analyzer, CollectSink, Config, DissectOutcome, InfoColumn, PacketContext,
//! };
//!
//! let mut analyzer = Analyzer::new(Config::default());
//! let mut sink = CollectSink::default();
//! let mut info = InfoColumn::default();
//!
//! let src: SocketAddr = "10.0.0.1:49152".parse().unwrap();
//! let dst: SocketAddr = "10.0.0.2:6121".parse().unwrap();
//! let packet = PacketContext::new(1, src, dst);
//!
//! // A SPDY/3 PING control frame, id 7.
//! let frame = [0x80, 0x03, 0x00, 0x06, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x07];
//! let outcome = analyzer.dissect(&packet, &frame, &mut sink, &mut info);
//!
//! assert_eq!(outcome, DissectOutcome::Consumed(12));
//! assert_eq!(info.text(), "PING ID=7");
//! assert_eq!(sink.frames.len(), 1);
//! ```
//!
//! # Architecture
//!
//! This crate is intentionally passive. It provides:
//! - Frame parsing (bytes → records)
//! - Header-block inflation with the SPDY dictionary
//! - Per-stream body reassembly and content decoding
//!
//! It does NOT provide:
//! - TCP reassembly or TLS decryption (the host delivers plaintext)
//! - SPDY frame generation (analysis only)
//! - Content-type dissectors (register your own via the registry)
//!
//! # Use Cases
//!
//! - **Capture analysis**: wire the engine under a pcap reader's
//!   stream reassembler
//! - **Traffic taps**: collect per-frame records from live flows
//! - **Protocol testing**: assert on exact dissection outcomes without
//!   a UI in the loop

pub mod body;
pub mod conn;
pub mod dictionary;
pub mod engine;
pub mod frame;
pub mod headers;
pub mod output;
pub mod reader;
pub mod stream;
pub mod zlib;

pub use conn::{Connection, ConversationKey};
pub use dictionary::{dictionary_id, DICTIONARY};
pub use engine::{Analyzer, Config, DesegmentLen, DissectOutcome, PacketContext};
pub use frame::{
    flags, rst_status_name, setting_name, FrameError, FrameHeader, FrameType, Ping, RstStream,
    SettingEntry, Settings, SynReply, SynStream, WindowUpdate, FRAME_HEADER_SIZE, MIN_VERSION,
};
pub use headers::{split_content_type, Header, RecognizedHeaders};
pub use output::{
    Annotation, BodyContext, BodyDissector, BodyRecord, CollectSink, Dispatch, DissectorRegistry,
    FrameDetail, FrameRecord, FrameSink, HeaderListRecord, InfoColumn, Severity,
};
pub use reader::{FrameReader, Needed};
pub use stream::{DataChunk, StreamState};
pub use zlib::{HeaderInflater, InflateError};

/// Registered port for cleartext SPDY.
pub const TCP_PORT: u16 = 6121;

/// SPDY rides TLS on the standard HTTPS port.
pub const TLS_PORT: u16 = 443;
