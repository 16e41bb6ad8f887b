//! Tests for header-block decompression, name/value parsing, and the
//! per-packet memo that keeps revisits stable.

#[path = "../common/mod.rs"]
mod common;

use spdy_sans_io::{
    dictionary_id, flags, headers, Analyzer, CollectSink, Config, FrameDetail, Header,
    HeaderInflater, InfoColumn, InflateError, Severity,
};

fn analyzer() -> Analyzer {
    Analyzer::new(Config::default())
}

#[test]
fn dictionary_id_matches_zlib() {
    assert_eq!(dictionary_id(), 0xe3c6_a7c2);
}

/// The deflater's first block makes the inflater ask for exactly the
/// dictionary id the engine computed.
#[test]
fn inflater_negotiates_the_preset_dictionary() {
    let mut deflater = common::HeaderDeflater::new();
    let block = deflater.compress(&[("method", "GET")]);
    let mut inflater = HeaderInflater::new(dictionary_id());
    let plain = inflater.inflate(&block).unwrap();
    assert_eq!(plain, common::encode_pairs(&[("method", "GET")]));
}

#[test]
fn inflater_rejects_a_foreign_dictionary_id() {
    let mut deflater = common::HeaderDeflater::new();
    let block = deflater.compress(&[("method", "GET")]);
    let mut inflater = HeaderInflater::new(0xdead_beef);
    match inflater.inflate(&block) {
        Err(InflateError::DictionaryMismatch { wanted, have }) => {
            assert_eq!(wanted, dictionary_id());
            assert_eq!(have, 0xdead_beef);
        }
        other => panic!("expected dictionary mismatch, got {other:?}"),
    }
}

#[test]
fn pair_list_round_trips_through_plaintext() {
    let pairs = [("method", "GET"), ("url", "/index.html"), ("version", "HTTP/1.1")];
    let plain = common::encode_pairs(&pairs);
    let count = headers::pair_count(&plain).unwrap();
    assert_eq!(count, 3);
    let (decoded, underflow) = headers::parse_pairs(&plain, count);
    assert!(!underflow);
    assert_eq!(
        decoded,
        vec![
            Header::new("method", "GET"),
            Header::new("url", "/index.html"),
            Header::new("version", "HTTP/1.1"),
        ]
    );
}

#[test]
fn pair_list_underflow_stops_early() {
    let mut plain = common::encode_pairs(&[("method", "GET")]);
    // Claim one more pair than the plaintext holds.
    plain[3] = 2;
    let (decoded, underflow) = headers::parse_pairs(&plain, 2);
    assert!(underflow);
    assert_eq!(decoded.len(), 1);
}

#[test]
fn recognize_is_case_insensitive_and_aliases_verb() {
    let request = headers::recognize(&[
        Header::new("Method", "POST"),
        Header::new("URL", "/submit"),
        Header::new("Version", "HTTP/1.1"),
    ]);
    assert_eq!(request.verb.as_deref(), Some("POST"));
    assert_eq!(request.url.as_deref(), Some("/submit"));

    let response = headers::recognize(&[
        Header::new("status", "200 OK"),
        Header::new("Content-Type", "text/html; charset=utf-8"),
        Header::new("CONTENT-ENCODING", "GZIP"),
    ]);
    assert_eq!(response.verb.as_deref(), Some("200 OK"));
    assert_eq!(
        response.content_type.as_deref(),
        Some("text/html; charset=utf-8")
    );
    assert_eq!(response.content_encoding.as_deref(), Some("GZIP"));
}

/// Decompress(Compress(hdrs, dict)) == hdrs, through the full engine.
#[test]
fn syn_stream_headers_round_trip() {
    let mut deflater = common::HeaderDeflater::new();
    let pairs = [
        ("method", "GET"),
        ("url", "https://example.com/"),
        ("version", "HTTP/1.1"),
        ("accept", "text/html"),
    ];
    let frame = common::syn_stream(&mut deflater, 1, flags::FIN, &pairs);

    let mut analyzer = analyzer();
    let mut sink = CollectSink::default();
    let mut info = InfoColumn::default();
    let outcome = analyzer.dissect(&common::packet(1), &frame, &mut sink, &mut info);
    assert_eq!(outcome.consumed(), frame.len());

    let record = &sink.frames[0];
    assert!(!record.has_errors(), "annotations: {:?}", record.annotations);
    match &record.detail {
        FrameDetail::SynStream {
            stream_id,
            priority,
            headers: Some(list),
            ..
        } => {
            assert_eq!(*stream_id, 1);
            assert_eq!(*priority, 2);
            assert_eq!(list.num_pairs, 4);
            let expected: Vec<Header> = pairs
                .iter()
                .map(|(n, v)| Header::new(*n, *v))
                .collect();
            assert_eq!(list.headers, expected);
        }
        other => panic!("expected SYN_STREAM detail, got {other:?}"),
    }
    assert_eq!(
        info.text(),
        "SYN_STREAM[1]: GET https://example.com/ HTTP/1.1"
    );
}

/// The second block in a direction continues the first block's zlib
/// stream; decoding both proves the inflater state survives across
/// frames.
#[test]
fn request_direction_state_survives_across_frames() {
    let mut deflater = common::HeaderDeflater::new();
    let first = common::syn_stream(&mut deflater, 1, 0, &[("method", "GET"), ("url", "/a")]);
    let second = common::syn_stream(&mut deflater, 3, 0, &[("method", "GET"), ("url", "/b")]);

    let mut analyzer = analyzer();
    let mut sink = CollectSink::default();
    let mut info = InfoColumn::default();
    analyzer.dissect(&common::packet(1), &first, &mut sink, &mut info);
    info.clear();
    analyzer.dissect(&common::packet(2), &second, &mut sink, &mut info);

    for record in &sink.frames {
        assert!(!record.has_errors(), "annotations: {:?}", record.annotations);
    }
    match &sink.frames[1].detail {
        FrameDetail::SynStream {
            headers: Some(list),
            ..
        } => assert_eq!(list.headers[1], Header::new("url", "/b")),
        other => panic!("expected SYN_STREAM detail, got {other:?}"),
    }
}

/// Requests and replies use independent zlib streams; interleaving
/// them must not cross-contaminate.
#[test]
fn directions_use_separate_inflaters() {
    let mut rqst = common::HeaderDeflater::new();
    let mut rply = common::HeaderDeflater::new();
    let syn = common::syn_stream(&mut rqst, 1, 0, &[("method", "GET"), ("url", "/")]);
    let reply = common::syn_reply(&mut rply, 1, 0, &[("status", "200 OK"), ("version", "HTTP/1.1")]);
    let syn2 = common::syn_stream(&mut rqst, 3, 0, &[("method", "GET"), ("url", "/next")]);
    // Odd-stream HEADERS are assumed server-sent and continue the
    // reply direction's stream.
    let trailers = common::headers_frame(&mut rply, 1, 0, &[("x-trailer", "1")]);

    let mut analyzer = analyzer();
    let mut sink = CollectSink::default();
    let mut info = InfoColumn::default();
    for (framenum, frame) in [&syn, &reply, &syn2, &trailers].iter().enumerate() {
        info.clear();
        let packet = common::packet(framenum as u32 + 1);
        let outcome = analyzer.dissect(&packet, frame, &mut sink, &mut info);
        assert_eq!(outcome.consumed(), frame.len());
    }

    assert_eq!(sink.frames.len(), 4);
    for record in &sink.frames {
        assert!(!record.has_errors(), "annotations: {:?}", record.annotations);
    }
    match &sink.frames[3].detail {
        FrameDetail::Headers {
            headers: Some(list),
            ..
        } => assert_eq!(list.headers[0], Header::new("x-trailer", "1")),
        other => panic!("expected HEADERS detail, got {other:?}"),
    }
}

/// Revisiting a packet must reuse the memoized plaintext rather than
/// feeding the block through the inflater a second time.
#[test]
fn revisit_reuses_memoized_plaintext() {
    let mut deflater = common::HeaderDeflater::new();
    let frame = common::syn_stream(&mut deflater, 1, 0, &[("method", "GET"), ("url", "/")]);

    let mut analyzer = analyzer();
    let mut sink = CollectSink::default();
    let mut info = InfoColumn::default();
    analyzer.dissect(&common::packet(1), &frame, &mut sink, &mut info);

    for _ in 0..3 {
        info.clear();
        analyzer.dissect(&common::revisit(1), &frame, &mut sink, &mut info);
    }

    assert_eq!(sink.frames.len(), 4);
    let first = &sink.frames[0];
    for record in &sink.frames[1..] {
        assert_eq!(record, first);
    }
}

#[test]
fn garbage_block_reports_decompression_failure() {
    let mut payload = 1u32.to_be_bytes().to_vec();
    payload.extend_from_slice(&[0xFF; 16]);
    let frame = common::control_frame(3, 2, 0, &payload);

    let mut analyzer = analyzer();
    let mut sink = CollectSink::default();
    let mut info = InfoColumn::default();
    let outcome = analyzer.dissect(&common::packet(1), &frame, &mut sink, &mut info);

    // The frame still consumes fully; only header processing aborts.
    assert_eq!(outcome.consumed(), frame.len());
    let record = &sink.frames[0];
    assert!(record
        .annotations
        .iter()
        .any(|a| a.severity == Severity::Undecoded));
    assert!(record.summary.contains("[Error: Header decompression failed]"));
    match &record.detail {
        FrameDetail::SynReply { headers, .. } => assert!(headers.is_none()),
        other => panic!("expected SYN_REPLY detail, got {other:?}"),
    }
}

#[test]
fn decompression_disabled_skips_header_block() {
    let mut deflater = common::HeaderDeflater::new();
    let frame = common::syn_stream(&mut deflater, 1, 0, &[("method", "GET")]);

    let mut analyzer = Analyzer::new(Config {
        decompress_headers: false,
        ..Config::default()
    });
    let mut sink = CollectSink::default();
    let mut info = InfoColumn::default();
    analyzer.dissect(&common::packet(1), &frame, &mut sink, &mut info);

    let record = &sink.frames[0];
    assert!(!record.has_errors());
    match &record.detail {
        FrameDetail::SynStream { headers, .. } => assert!(headers.is_none()),
        other => panic!("expected SYN_STREAM detail, got {other:?}"),
    }
}

/// A decompressed count bigger than the frame length is treated as a
/// decompression bomb and the pair list is skipped.
#[test]
fn preposterous_pair_count_is_rejected() {
    // Hand-build a block whose plaintext claims 2^31 pairs.
    let mut deflater = common::HeaderDeflater::new();
    let huge = 0x8000_0000u32;
    let mut plain = common::encode_pairs(&[("a", "b")]);
    plain[0..4].copy_from_slice(&huge.to_be_bytes());
    let block = deflater.compress_plaintext(&plain);

    let mut payload = 1u32.to_be_bytes().to_vec();
    payload.extend_from_slice(&block);
    let frame = common::control_frame(3, 2, 0, &payload);

    let mut analyzer = analyzer();
    let mut sink = CollectSink::default();
    let mut info = InfoColumn::default();
    analyzer.dissect(&common::packet(1), &frame, &mut sink, &mut info);

    let record = &sink.frames[0];
    assert!(record
        .annotations
        .iter()
        .any(|a| a.severity == Severity::Malformed
            && a.message.contains("Number of headers is greater than frame length")));
    match &record.detail {
        FrameDetail::SynReply {
            headers: Some(list),
            ..
        } => {
            assert_eq!(list.num_pairs, huge);
            assert!(list.headers.is_empty());
        }
        other => panic!("expected SYN_REPLY detail, got {other:?}"),
    }
}
