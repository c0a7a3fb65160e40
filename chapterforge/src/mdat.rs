//! `mdat` writer and `stco` offset patcher: writes audio samples, then each
//! text track in order, then image samples, recording the byte offset of
//! each chunk relative to the start of `mdat`'s payload.

use crate::boxes::Atom;
use crate::error::{ChapterForgeError, Result};
use std::io::Write;

#[derive(Debug, Clone, Default)]
pub struct MdatOffsets {
    pub payload_start: u64,
    pub audio_offsets: Vec<u64>,
    pub text_offsets: Vec<Vec<u64>>,
    pub image_offsets: Vec<u64>,
}

struct TrackLayout<'a> {
    chunk_plan: &'a [u32],
    sample_bytes: &'a [Vec<u8>],
}

fn chunk_offsets(layout: &TrackLayout, start: u64) -> (Vec<u64>, u64) {
    let mut offsets = Vec::with_capacity(layout.chunk_plan.len());
    let mut cursor = start;
    let mut sample_idx = 0usize;
    for &count in layout.chunk_plan {
        offsets.push(cursor);
        let end = (sample_idx + count as usize).min(layout.sample_bytes.len());
        for sample in &layout.sample_bytes[sample_idx..end] {
            cursor += sample.len() as u64;
        }
        sample_idx = end;
    }
    (offsets, cursor)
}

/// Compute where every chunk would land, relative to `mdat`'s payload start
/// (offset 0 == the first byte after `mdat`'s header). Used both to simulate a
/// fast-start write before any bytes exist and to report the real offsets of a
/// completed trailing-`moov` write; either way, `payload_start` in the returned
/// struct records what the caller should add when patching `stco`.
pub fn compute_relative_offsets(
    audio_samples: &[Vec<u8>],
    audio_chunk_plan: &[u32],
    text_tracks: &[(Vec<Vec<u8>>, Vec<u32>)],
    image_samples: &[Vec<u8>],
    image_chunk_plan: &[u32],
) -> MdatOffsets {
    let mut cursor = 0u64;

    let audio_layout = TrackLayout {
        chunk_plan: audio_chunk_plan,
        sample_bytes: audio_samples,
    };
    let (audio_offsets, next) = chunk_offsets(&audio_layout, cursor);
    cursor = next;

    let mut text_offsets = Vec::with_capacity(text_tracks.len());
    for (samples, plan) in text_tracks {
        let layout = TrackLayout {
            chunk_plan: plan,
            sample_bytes: samples,
        };
        let (offsets, next) = chunk_offsets(&layout, cursor);
        text_offsets.push(offsets);
        cursor = next;
    }

    let image_layout = TrackLayout {
        chunk_plan: image_chunk_plan,
        sample_bytes: image_samples,
    };
    let (image_offsets, _) = chunk_offsets(&image_layout, cursor);

    MdatOffsets {
        payload_start: 0,
        audio_offsets,
        text_offsets,
        image_offsets,
    }
}

/// Write the real `mdat` box (header + audio + text tracks + image samples, in
/// that order) and return the offsets actually used, relative to `mdat`'s
/// payload start (which the caller adds to `payload_start` when patching).
pub fn write_mdat<W: Write>(
    sink: &mut W,
    audio_samples: &[Vec<u8>],
    audio_chunk_plan: &[u32],
    text_tracks: &[(Vec<Vec<u8>>, Vec<u32>)],
    image_samples: &[Vec<u8>],
    image_chunk_plan: &[u32],
) -> Result<MdatOffsets> {
    let total_bytes: u64 = audio_samples.iter().map(|s| s.len() as u64).sum::<u64>()
        + text_tracks
            .iter()
            .map(|(samples, _)| samples.iter().map(|s| s.len() as u64).sum::<u64>())
            .sum::<u64>()
        + image_samples.iter().map(|s| s.len() as u64).sum::<u64>();

    let box_size = 8u64 + total_bytes;
    if box_size > u32::MAX as u64 {
        return Err(ChapterForgeError::Oversize {
            what: "mdat",
            size: box_size,
        });
    }

    let mut header = crate::bytes::ByteWriter::with_capacity(8);
    header.put_u32(box_size as u32).put_fourcc("mdat");
    sink.write_all(header.as_slice())?;

    let offsets = compute_relative_offsets(audio_samples, audio_chunk_plan, text_tracks, image_samples, image_chunk_plan);

    for sample in audio_samples {
        sink.write_all(sample)?;
    }
    for (samples, _) in text_tracks {
        for sample in samples {
            sink.write_all(sample)?;
        }
    }
    for sample in image_samples {
        sink.write_all(sample)?;
    }

    Ok(offsets)
}

/// Patch every `stco` table reachable from `root` with `payload_start + relative_offset`,
/// consuming offsets for audio, then each text track in order, then image — the
/// same traversal order `mdat` was written in. Even a verbatim-reused audio `stbl`
/// is patched: absolute offsets always depend on the final file layout.
pub fn patch_stco_tables(root: &mut Atom, payload_start: u64, offsets: &MdatOffsets) -> Result<()> {
    let mut stco_tables = root.find_mut("stco");
    let mut flat_offsets: Vec<u64> = Vec::new();
    flat_offsets.extend(offsets.audio_offsets.iter().map(|o| payload_start + o));
    for track in &offsets.text_offsets {
        flat_offsets.extend(track.iter().map(|o| payload_start + o));
    }
    flat_offsets.extend(offsets.image_offsets.iter().map(|o| payload_start + o));

    let mut cursor = 0usize;
    for stco in stco_tables.iter_mut() {
        let entry_count = if stco.payload.len() >= 8 {
            u32::from_be_bytes(stco.payload[4..8].try_into().unwrap()) as usize
        } else {
            0
        };
        let mut w = crate::bytes::ByteWriter::with_capacity(8 + entry_count * 4);
        w.put_u8(0).put_u24(0).put_u32(entry_count as u32);
        for _ in 0..entry_count {
            let abs = flat_offsets.get(cursor).copied().unwrap_or(0);
            if abs > u32::MAX as u64 {
                return Err(ChapterForgeError::Oversize {
                    what: "stco entry",
                    size: abs,
                });
            }
            w.put_u32(abs as u32);
            cursor += 1;
        }
        stco.payload = w.into_vec();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_offsets_match_real_write_offsets() {
        let audio = vec![vec![1u8; 10], vec![2u8; 10], vec![3u8; 5]];
        let plan = vec![2u32, 1u32];
        let text: Vec<(Vec<Vec<u8>>, Vec<u32>)> = vec![(vec![vec![9u8; 4]], vec![1u32])];
        let image: Vec<Vec<u8>> = vec![vec![7u8; 3]];
        let image_plan = vec![1u32];

        let simulated = compute_relative_offsets(&audio, &plan, &text, &image, &image_plan);

        let mut sink = Vec::new();
        let real = write_mdat(&mut sink, &audio, &plan, &text, &image, &image_plan).unwrap();

        assert_eq!(simulated.audio_offsets, real.audio_offsets);
        assert_eq!(simulated.text_offsets, real.text_offsets);
        assert_eq!(simulated.image_offsets, real.image_offsets);
    }

    #[test]
    fn patch_stco_assigns_sequential_absolute_offsets() {
        let stco_payload = {
            let mut w = crate::bytes::ByteWriter::new();
            w.put_u8(0).put_u24(0).put_u32(2).put_u32(0).put_u32(0);
            w.into_vec()
        };
        let mut root = Atom::new("stbl").with_child(Atom::with_payload("stco", stco_payload));
        let offsets = MdatOffsets {
            payload_start: 100,
            audio_offsets: vec![0, 20],
            text_offsets: vec![],
            image_offsets: vec![],
        };
        patch_stco_tables(&mut root, 100, &offsets).unwrap();
        let stco = &root.find("stco")[0];
        let e0 = u32::from_be_bytes(stco.payload[8..12].try_into().unwrap());
        let e1 = u32::from_be_bytes(stco.payload[12..16].try_into().unwrap());
        assert_eq!(e0, 100);
        assert_eq!(e1, 120);
    }
}
