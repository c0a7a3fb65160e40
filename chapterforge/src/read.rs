//! Read-back path: walk a produced (or foreign) file and reconstruct titles,
//! URL track, image track, and top-level metadata.

use crate::chapters::{decode_tx3g, ChapterImageSample, ChapterTextSample};
use crate::error::ChapterForgeError;
use crate::metadata::{parse_ilst, MetadataSet};
use crate::mux::Status;
use crate::parser::{parse_mp4, stco_chunk_offsets, stsz_sample_sizes, TrackParseResult};
use crate::tables::chunk_plan_from_stsc;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReadResult {
    pub status: Status,
    pub titles: Vec<ChapterTextSample>,
    pub urls: Vec<ChapterTextSample>,
    pub images: Vec<ChapterImageSample>,
    pub metadata: MetadataSet,
}

impl Default for Status {
    fn default() -> Self {
        Status::success("")
    }
}

fn stts_start_times_ms(stts: &[u8], timescale: u32) -> Vec<u64> {
    if stts.len() < 8 || timescale == 0 {
        return Vec::new();
    }
    let entry_count = u32::from_be_bytes(stts[4..8].try_into().unwrap()) as usize;
    let mut starts = Vec::new();
    let mut cum_ticks: u64 = 0;
    let mut off = 8usize;
    for _ in 0..entry_count {
        if off + 8 > stts.len() {
            break;
        }
        let count = u32::from_be_bytes(stts[off..off + 4].try_into().unwrap());
        let delta = u32::from_be_bytes(stts[off + 4..off + 8].try_into().unwrap()) as u64;
        for _ in 0..count {
            starts.push(cum_ticks * 1000 / timescale as u64);
            cum_ticks += delta;
        }
        off += 8;
    }
    starts
}

fn read_samples(path: &Path, track: &TrackParseResult) -> crate::error::Result<Vec<Vec<u8>>> {
    let sizes = stsz_sample_sizes(&track.stsz);
    let chunk_plan = chunk_plan_from_stsc(&track.stsc, sizes.len() as u32);
    let offsets = stco_chunk_offsets(&track.stco);

    let mut file = File::open(path).map_err(|e| ChapterForgeError::InputUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut samples = Vec::with_capacity(sizes.len());
    let mut sample_idx = 0usize;
    for (chunk_idx, &count) in chunk_plan.iter().enumerate() {
        let offset = *offsets.get(chunk_idx).unwrap_or(&0) as u64;
        let end = (sample_idx + count as usize).min(sizes.len());
        let chunk_sizes = &sizes[sample_idx..end];
        let total: u32 = chunk_sizes.iter().sum();
        let mut buf = vec![0u8; total as usize];
        file.seek(SeekFrom::Start(offset)).map_err(ChapterForgeError::Io)?;
        file.read_exact(&mut buf).map_err(ChapterForgeError::Io)?;
        let mut pos = 0usize;
        for &s in chunk_sizes {
            samples.push(buf[pos..pos + s as usize].to_vec());
            pos += s as usize;
        }
        sample_idx = end;
    }
    Ok(samples)
}

/// Authoring always duplicates a non-empty text track's last sample twice
/// before building its sample tables (see `tables::text::pad_samples`); undo
/// that here so callers see one entry per chapter again.
fn decode_text_track(path: &Path, track: &TrackParseResult) -> crate::error::Result<Vec<ChapterTextSample>> {
    let samples = read_samples(path, track)?;
    let starts = stts_start_times_ms(&track.stts, track.timescale);
    let unpadded_count = samples.len().saturating_sub(2);
    let mut out = Vec::with_capacity(unpadded_count);
    for (i, raw) in samples.iter().enumerate().take(unpadded_count) {
        if let Some(mut decoded) = decode_tx3g(raw) {
            decoded.start_ms = starts.get(i).copied().unwrap_or(0) as u32;
            out.push(decoded);
        }
    }
    Ok(out)
}

fn decode_image_track(path: &Path, track: &TrackParseResult) -> crate::error::Result<Vec<ChapterImageSample>> {
    let samples = read_samples(path, track)?;
    let starts = stts_start_times_ms(&track.stts, track.timescale);
    Ok(samples
        .into_iter()
        .enumerate()
        .map(|(i, data)| ChapterImageSample {
            data,
            start_ms: starts.get(i).copied().unwrap_or(0) as u32,
        })
        .collect())
}

/// Read a produced (or foreign) M4A and recover its chapter tracks and metadata.
pub fn read_m4a(path: &Path) -> ReadResult {
    match read_m4a_inner(path) {
        Ok(result) => result,
        Err(e) => {
            log::error!("read_m4a: {e}");
            ReadResult {
                status: Status::failure(e.to_string()),
                ..Default::default()
            }
        }
    }
}

fn read_m4a_inner(path: &Path) -> crate::error::Result<ReadResult> {
    let parsed = parse_mp4(path)?;
    if !parsed.has_usable_audio_stbl() && parsed.tracks.is_empty() {
        return Err(ChapterForgeError::ReadIncomplete(format!(
            "{}: no usable tracks recovered",
            path.display()
        )));
    }

    let text_tracks: Vec<&TrackParseResult> = parsed
        .tracks
        .iter()
        .filter(|t| t.handler_type == crate::bytes::fourcc("text"))
        .collect();

    let url_track = text_tracks
        .iter()
        .find(|t| t.handler_name.to_lowercase().contains("url"))
        .copied()
        .or_else(|| text_tracks.get(1).copied());

    let title_track = text_tracks
        .iter()
        .find(|t| !std::ptr::eq(**t, url_track.unwrap_or(&TrackParseResult::default())))
        .copied()
        .or_else(|| text_tracks.first().copied());

    let titles = match title_track {
        Some(t) => decode_text_track(path, t)?,
        None => Vec::new(),
    };
    let urls = match url_track {
        Some(t) => decode_text_track(path, t)?,
        None => Vec::new(),
    };

    let image_track = parsed.tracks.iter().find(|t| t.handler_type == crate::bytes::fourcc("vide"));
    let images = match image_track {
        Some(t) => decode_image_track(path, t)?,
        None => Vec::new(),
    };

    let metadata = if !parsed.ilst_payload.is_empty() {
        parse_ilst(&parsed.ilst_payload)
    } else {
        MetadataSet::default()
    };

    Ok(ReadResult {
        status: Status::success(format!("read {}", path.display())),
        titles,
        urls,
        images,
        metadata,
    })
}
