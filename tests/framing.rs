//! Frame-splitting behavior: HEADERS plus CONTINUATION sequences bounded by
//! the negotiated max frame size.

mod common;

use bytes::BytesMut;
use common::{hpack_payload, split_frames};
use h2_hpack::{
    EncodeOptions, EncoderStats, HpackCompressor, Metadata, MetadataEntry, FLAG_END_HEADERS,
    FLAG_END_STREAM, FRAME_TYPE_CONTINUATION, FRAME_TYPE_HEADERS,
};

fn options(max_frame_size: u32, end_of_stream: bool) -> EncodeOptions {
    EncodeOptions {
        stream_id: 3,
        is_end_of_stream: end_of_stream,
        use_true_binary_metadata: false,
        max_frame_size,
    }
}

fn encode_set(
    compressor: &mut HpackCompressor,
    options: &EncodeOptions,
    headers: Vec<Metadata>,
) -> (Vec<u8>, EncoderStats) {
    let mut output = BytesMut::new();
    let mut stats = EncoderStats::default();
    compressor.encode_header_set(options, headers, &mut output, &mut stats);
    (output.to_vec(), stats)
}

#[test]
fn test_large_value_splits_into_continuations() {
    let mut compressor = HpackCompressor::new();
    let value = vec![0x61u8; 500];
    let headers = vec![Metadata::Entry(MetadataEntry::transient(
        "x-payload",
        value.clone(),
    ))];
    let (output, stats) = encode_set(&mut compressor, &options(256, false), headers.clone());

    let frames = split_frames(&output);
    assert!(frames.len() > 1);
    assert_eq!(frames[0].0.frame_type, FRAME_TYPE_HEADERS);
    for (header, payload) in &frames[1..] {
        assert_eq!(header.frame_type, FRAME_TYPE_CONTINUATION);
        assert_eq!(header.length as usize, payload.len());
    }
    // Every payload is bounded; only the last frame ends the header block.
    for (i, (header, _)) in frames.iter().enumerate() {
        assert!(header.length <= 256);
        let is_last = i == frames.len() - 1;
        assert_eq!(header.flags & FLAG_END_HEADERS != 0, is_last);
    }
    // The payload sum is the whole HPACK stream, byte-counted by stats.
    let total: u64 = frames.iter().map(|(h, _)| u64::from(h.length)).sum();
    assert_eq!(total, stats.header_bytes);
    assert_eq!(stats.framing_bytes, 9 * frames.len() as u64);

    // The split stream reassembles to exactly what an unsplit encode of the
    // same set produces.
    let mut unsplit = HpackCompressor::new();
    let (contiguous, _) = encode_set(&mut unsplit, &options(16384, false), headers);
    assert_eq!(hpack_payload(&output), hpack_payload(&contiguous));
}

#[test]
fn test_empty_header_set_is_one_empty_headers_frame() {
    let mut compressor = HpackCompressor::new();
    let (output, _) = encode_set(&mut compressor, &options(16384, false), Vec::new());

    let frames = split_frames(&output);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0.frame_type, FRAME_TYPE_HEADERS);
    assert_eq!(frames[0].0.length, 0);
    assert_eq!(frames[0].0.flags, FLAG_END_HEADERS);
}

#[test]
fn test_end_stream_stays_on_headers_frame() {
    let mut compressor = HpackCompressor::new();
    let headers = vec![Metadata::Entry(MetadataEntry::transient(
        "x-payload",
        vec![0x62u8; 300],
    ))];
    let (output, _) = encode_set(&mut compressor, &options(128, true), headers);

    let frames = split_frames(&output);
    assert!(frames.len() > 1);
    assert_eq!(frames[0].0.flags & FLAG_END_STREAM, FLAG_END_STREAM);
    for (header, _) in &frames[1..] {
        assert_eq!(header.flags & FLAG_END_STREAM, 0);
    }
}

#[test]
fn test_exactly_full_frame_does_not_spill() {
    let mut compressor = HpackCompressor::new();
    // 0x00 type byte, 1-byte key length, "k", 1-byte value length, then the
    // value: 4 + 60 = 64 bytes of HPACK, exactly one 64-byte frame.
    let headers = vec![Metadata::Entry(MetadataEntry::transient(
        "k",
        vec![0x63u8; 60],
    ))];
    let (output, _) = encode_set(&mut compressor, &options(64, false), headers);

    let frames = split_frames(&output);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0.length, 64);
    assert_eq!(frames[0].0.flags, FLAG_END_HEADERS);
}

#[test]
fn test_stream_id_written_on_every_frame() {
    let mut compressor = HpackCompressor::new();
    let headers = vec![Metadata::Entry(MetadataEntry::transient(
        "x-payload",
        vec![0x64u8; 300],
    ))];
    let (output, _) = encode_set(&mut compressor, &options(100, false), headers);

    let frames = split_frames(&output);
    assert!(frames.len() > 1);
    for (header, _) in &frames {
        assert_eq!(header.stream_id, 3);
    }
}
