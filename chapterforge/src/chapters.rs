//! In-memory chapter sample types and the `tx3g` text-sample codec.

use crate::bytes::ByteWriter;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChapterTextSample {
    pub text: String,
    pub href: String,
    pub start_ms: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChapterImageSample {
    pub data: Vec<u8>,
    pub start_ms: u32,
}

/// Encode one tx3g sample: `u16_be(len) || text_bytes`, plus an optional `href`
/// modifier box when `href` is non-empty. The trailing pad byte after the URL
/// matches what Apple's own encoder emits and is required for AVFoundation to
/// recognize the modifier.
pub fn encode_tx3g(sample: &ChapterTextSample) -> Vec<u8> {
    let mut w = ByteWriter::new();
    let text_bytes = sample.text.as_bytes();
    w.put_u16(text_bytes.len() as u16);
    w.put_bytes(text_bytes);

    if !sample.href.is_empty() {
        let url_bytes = sample.href.as_bytes();
        let url_len = url_bytes.len().min(u8::MAX as usize) as u8;
        let box_size = 4 + 4 + 2 + 2 + 1 + url_len as u32 + 1;
        w.put_u32(box_size);
        w.put_fourcc("href");
        w.put_u16(0);
        w.put_u16(0x000a);
        w.put_u8(url_len);
        w.put_bytes(&url_bytes[..url_len as usize]);
        w.put_u8(0);
    }
    w.into_vec()
}

/// Decode a tx3g sample previously produced by `encode_tx3g`. Returns `None` if
/// the buffer is too short to contain the length-prefixed text.
pub fn decode_tx3g(data: &[u8]) -> Option<ChapterTextSample> {
    if data.len() < 2 {
        return None;
    }
    let text_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let text_end = 2 + text_len;
    if data.len() < text_end {
        return None;
    }
    let text = String::from_utf8_lossy(&data[2..text_end]).into_owned();

    let mut href = String::new();
    let rest = &data[text_end..];
    if rest.len() >= 13 && &rest[4..8] == b"href" {
        let url_len = rest[12] as usize;
        let url_start = 13;
        let url_end = url_start + url_len;
        if rest.len() >= url_end {
            href = String::from_utf8_lossy(&rest[url_start..url_end]).into_owned();
        }
    }

    Some(ChapterTextSample {
        text,
        href,
        start_ms: 0,
    })
}
