//! Text (`tx3g`) chapter-title / URL track `stbl`.

use crate::boxes::Atom;
use crate::bytes::ByteWriter;
use crate::chapters::{encode_tx3g, ChapterTextSample};
use crate::tables::run_length_stsc;

fn build_ftab() -> Atom {
    let name = b"Sans-Serif";
    let mut w = ByteWriter::with_capacity(4 + 3 + name.len());
    w.put_u16(1); // entry_count
    w.put_u16(1); // fontID
    w.put_u8(name.len() as u8);
    w.put_bytes(name);
    Atom::with_payload("ftab", w.into_vec())
}

fn build_tx3g_entry() -> Atom {
    let mut w = ByteWriter::with_capacity(38);
    w.put_u32(0).put_u16(0).put_u16(1); // SampleEntry reserved[6] + data_reference_index
    w.put_u32(0); // displayFlags
    w.put_u8(0x01).put_u8(0xFF); // horizontal/vertical justification
    w.put_u8(0x1f).put_u8(0x1f).put_u8(0x1f).put_u8(0x00); // background color RGBA
    w.put_u16(0).put_u16(0).put_u16(0).put_u16(0); // default text box (top/left/bottom/right)
    // Default style record: startChar/endChar/fontID/face/size/color.
    w.put_u16(0).put_u16(0); // startChar, endChar
    w.put_u16(1); // fontID
    w.put_u8(0x01); // font face (bold)
    w.put_u8(0x12); // font size
    w.put_u8(0).put_u8(0).put_u8(0).put_u8(0xFF); // text color RGBA
    Atom::with_payload("tx3g", w.into_vec()).with_child(build_ftab())
}

fn build_stsd_tx3g() -> Atom {
    let mut w = ByteWriter::with_capacity(8);
    w.put_u8(0).put_u24(0).put_u32(1);
    Atom::with_payload("stsd", w.into_vec()).with_child(build_tx3g_entry())
}

/// Apple-authored `tx3g` tracks duplicate the final chapter sample twice before
/// building the sample tables, so `sample_count == chapter_count + 2`. The same
/// padded list must be reused by the `mdat` writer so `stsz`/`stco` line up with
/// the bytes actually written.
pub fn pad_samples(samples: &[ChapterTextSample]) -> Vec<ChapterTextSample> {
    let mut padded = samples.to_vec();
    if let Some(last) = samples.last() {
        padded.push(last.clone());
        padded.push(last.clone());
    }
    padded
}

fn build_stts(sample_count: u32, durations_ms: &[u64]) -> Atom {
    let mut w = ByteWriter::with_capacity(8 + durations_ms.len() * 8);
    let _ = sample_count;
    w.put_u8(0).put_u24(0).put_u32(durations_ms.len() as u32);
    for &d in durations_ms {
        w.put_u32(1).put_u32(d.max(1) as u32);
    }
    Atom::with_payload("stts", w.into_vec())
}

fn build_stsc(sample_count: u32) -> Atom {
    let plan = vec![1u32; sample_count as usize];
    let entries = run_length_stsc(&plan);
    let mut w = ByteWriter::with_capacity(8 + entries.len() * 12);
    w.put_u8(0).put_u24(0).put_u32(entries.len() as u32);
    for (first_chunk, samples_per_chunk) in entries {
        w.put_u32(first_chunk).put_u32(samples_per_chunk).put_u32(1);
    }
    Atom::with_payload("stsc", w.into_vec())
}

fn build_stsz(sizes: &[u32]) -> Atom {
    let mut w = ByteWriter::with_capacity(12 + sizes.len() * 4);
    w.put_u8(0).put_u24(0).put_u32(0).put_u32(sizes.len() as u32);
    for &s in sizes {
        w.put_u32(s);
    }
    Atom::with_payload("stsz", w.into_vec())
}

fn build_stco_placeholder(chunk_count: u32) -> Atom {
    let mut w = ByteWriter::with_capacity(8 + chunk_count as usize * 4);
    w.put_u8(0).put_u24(0).put_u32(chunk_count);
    for _ in 0..chunk_count {
        w.put_u32(0);
    }
    Atom::with_payload("stco", w.into_vec())
}

/// Builds a full text-track `stbl` from already-padded samples (see `pad_samples`)
/// and one duration-per-sample list (already reflecting the padding).
pub fn build_text_stbl(padded_samples: &[ChapterTextSample], durations_ms: &[u64]) -> Atom {
    let encoded: Vec<Vec<u8>> = padded_samples.iter().map(encode_tx3g).collect();
    let sizes: Vec<u32> = encoded.iter().map(|e| e.len() as u32).collect();
    let sample_count = padded_samples.len() as u32;

    let mut stbl = Atom::new("stbl");
    stbl.add_child(build_stsd_tx3g());
    stbl.add_child(build_stts(sample_count, durations_ms));
    stbl.add_child(build_stsc(sample_count));
    stbl.add_child(build_stsz(&sizes));
    stbl.add_child(build_stco_placeholder(sample_count));
    stbl
}

/// Each encoded sample is written to `mdat` as its own chunk (one sample per chunk).
pub fn encode_samples(padded_samples: &[ChapterTextSample]) -> Vec<Vec<u8>> {
    padded_samples.iter().map(encode_tx3g).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(text: &str, start_ms: u32) -> ChapterTextSample {
        ChapterTextSample {
            text: text.into(),
            href: String::new(),
            start_ms,
        }
    }

    #[test]
    fn pad_samples_duplicates_last_twice() {
        let samples = vec![sample("One", 0), sample("Two", 1000)];
        let padded = pad_samples(&samples);
        assert_eq!(padded.len(), 4);
        assert_eq!(padded[2].text, "Two");
        assert_eq!(padded[3].text, "Two");
    }

    #[test]
    fn text_stbl_stsc_collapses_to_single_entry_regardless_of_count() {
        let samples = vec![sample("A", 0), sample("B", 1), sample("C", 2)];
        let padded = pad_samples(&samples);
        let durations = vec![1000u64; padded.len()];
        let stbl = build_text_stbl(&padded, &durations);
        let stsc = &stbl.children[2];
        // version/flags(4) + entry_count(4) == 8, plus exactly one 12-byte entry.
        assert_eq!(stsc.payload.len(), 8 + 12);
    }

    #[test]
    fn sample_count_is_chapter_count_plus_two() {
        let samples = vec![sample("Only", 0)];
        let padded = pad_samples(&samples);
        assert_eq!(padded.len(), 3);
    }
}
