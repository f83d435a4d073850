//! Shared helpers for the compliance suites: a frame splitter and a
//! minimal HPACK reader that covers exactly the representations this
//! encoder emits (Huffman-coded strings excepted).
#![allow(dead_code)]

use h2_hpack::{FrameHeader, FRAME_HEADER_SIZE};

/// Split an output buffer into (header, payload) frames.
pub fn split_frames(buf: &[u8]) -> Vec<(FrameHeader, Vec<u8>)> {
    let mut frames = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        let header = FrameHeader::parse(rest).expect("frame header");
        let end = FRAME_HEADER_SIZE + header.length as usize;
        frames.push((header, rest[FRAME_HEADER_SIZE..end].to_vec()));
        rest = &rest[end..];
    }
    frames
}

/// Concatenate the frame payloads back into the logical HPACK byte stream.
pub fn hpack_payload(buf: &[u8]) -> Vec<u8> {
    split_frames(buf)
        .into_iter()
        .flat_map(|(_, payload)| payload)
        .collect()
}

/// The RFC 7541 Appendix A static table, 1-indexed.
const STATIC_TABLE: [(&[u8], &[u8]); 62] = [
    (b"", b""),
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

/// A decoder-side dynamic table plus just enough representation parsing to
/// read back the encoder's output and mirror its table mutations.
pub struct TestDecoder {
    dynamic: Vec<(Vec<u8>, Vec<u8>)>,
    max_size: usize,
    current_size: usize,
}

impl Default for TestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDecoder {
    pub fn new() -> Self {
        Self {
            dynamic: Vec::new(),
            max_size: 4096,
            current_size: 0,
        }
    }

    /// Decode one header block into (name, value) pairs in order.
    pub fn decode(&mut self, mut data: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        while !data.is_empty() {
            let first = data[0];
            if first & 0x80 != 0 {
                let index = read_varint(&mut data, 7) as usize;
                out.push(self.entry_at(index));
            } else if first & 0x40 != 0 {
                let index = read_varint(&mut data, 6) as usize;
                let name = if index == 0 {
                    read_string(&mut data)
                } else {
                    self.entry_at(index).0
                };
                let value = read_string(&mut data);
                self.insert(name.clone(), value.clone());
                out.push((name, value));
            } else if first & 0x20 != 0 {
                self.max_size = read_varint(&mut data, 5) as usize;
                self.evict_to_fit(0);
            } else if first & 0x10 != 0 {
                panic!("never-indexed representation is not emitted by this encoder");
            } else {
                let index = read_varint(&mut data, 4) as usize;
                let name = if index == 0 {
                    read_string(&mut data)
                } else {
                    self.entry_at(index).0
                };
                let value = read_string(&mut data);
                out.push((name, value));
            }
        }
        out
    }

    pub fn dynamic_len(&self) -> usize {
        self.dynamic.len()
    }

    fn entry_at(&self, index: usize) -> (Vec<u8>, Vec<u8>) {
        if index <= 61 {
            let (name, value) = STATIC_TABLE[index];
            (name.to_vec(), value.to_vec())
        } else {
            self.dynamic[index - 62].clone()
        }
    }

    fn insert(&mut self, name: Vec<u8>, value: Vec<u8>) {
        let size = name.len() + value.len() + 32;
        if size > self.max_size {
            self.dynamic.clear();
            self.current_size = 0;
            return;
        }
        self.evict_to_fit(size);
        self.dynamic.insert(0, (name, value));
        self.current_size += size;
    }

    fn evict_to_fit(&mut self, incoming: usize) {
        while self.current_size + incoming > self.max_size {
            let (name, value) = self.dynamic.pop().expect("eviction from empty table");
            self.current_size -= name.len() + value.len() + 32;
        }
    }
}

fn read_varint(data: &mut &[u8], prefix_bits: u32) -> u64 {
    let mask = (1u64 << prefix_bits) - 1;
    let first = u64::from(data[0]) & mask;
    *data = &data[1..];
    if first < mask {
        return first;
    }
    let mut value = first;
    let mut shift = 0;
    loop {
        let byte = data[0];
        *data = &data[1..];
        value += u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    value
}

fn read_string(data: &mut &[u8]) -> Vec<u8> {
    let huffman = data[0] & 0x80 != 0;
    let len = read_varint(data, 7) as usize;
    assert!(!huffman, "test reader does not decode Huffman strings");
    let s = data[..len].to_vec();
    *data = &data[len..];
    s
}
