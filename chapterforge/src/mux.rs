//! The top-level authoring pipeline: `write_mp4`. Ties together the parser/
//! extractor, timing helper, sample-table builders, track/moov composers, and
//! the `mdat` writer under either layout mode.

use crate::aac::{load_audio, AacExtractResult};
use crate::boxes::Atom;
use crate::chapters::{encode_tx3g, ChapterImageSample, ChapterTextSample};
use crate::error::ChapterForgeError;
use crate::jpeg::parse_jpeg_info;
use crate::metadata::MetadataSet;
use crate::tables::audio::Mp4aConfig;
use crate::tables::{audio as audio_tbl, chunk_plan_from_stsc, image as image_tbl, synthesize_chunk_plan, text as text_tbl};
use crate::timing::derive_durations;
use crate::tracks;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const FTYP_BYTES: [u8; 36] = [
    0x00, 0x00, 0x00, 0x24, 0x66, 0x74, 0x79, 0x70, 0x4D, 0x34, 0x56, 0x20, 0x00, 0x00, 0x00, 0x01, 0x6D, 0x70, 0x34,
    0x32, 0x69, 0x73, 0x6F, 0x6D, 0x4D, 0x34, 0x41, 0x20, 0x4D, 0x34, 0x56, 0x20, 0x64, 0x62, 0x79, 0x31,
];

const TRAILING_FREE_BYTES: usize = 1024;
const AUDIO_CHUNK_SIZE: u32 = 21;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Status {
    pub ok: bool,
    pub message: String,
}

impl Status {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }

    fn from_err(err: ChapterForgeError) -> Self {
        log::error!("mux: {err}");
        Status::failure(err.to_string())
    }
}

/// One extra text track beyond the title track (conventionally "Chapter URLs").
pub struct ExtraTextTrack<'a> {
    pub handler_name: &'a str,
    pub samples: &'a [ChapterTextSample],
}

#[allow(clippy::too_many_arguments)]
pub fn write_mp4(
    input_audio_path: &Path,
    titles: &[ChapterTextSample],
    extra_text_tracks: &[ExtraTextTrack],
    images: &[ChapterImageSample],
    metadata: Option<&MetadataSet>,
    output_path: &Path,
    fast_start: bool,
) -> Status {
    match write_mp4_inner(
        input_audio_path,
        titles,
        extra_text_tracks,
        images,
        metadata,
        output_path,
        fast_start,
    ) {
        Ok(()) => Status::success(format!("wrote {}", output_path.display())),
        Err(e) => Status::from_err(e),
    }
}

fn write_mp4_inner(
    input_audio_path: &Path,
    titles: &[ChapterTextSample],
    extra_text_tracks: &[ExtraTextTrack],
    images: &[ChapterImageSample],
    metadata: Option<&MetadataSet>,
    output_path: &Path,
    fast_start: bool,
) -> crate::error::Result<()> {
    log::info!(
        "write_mp4: input={} output={} fast_start={} titles={} extras={} images={}",
        input_audio_path.display(),
        output_path.display(),
        fast_start,
        titles.len(),
        extra_text_tracks.len(),
        images.len()
    );

    let aac = load_audio(input_audio_path)?;
    if aac.frames.is_empty() {
        return Err(ChapterForgeError::InputInvalid("audio sample count is zero".into()));
    }

    let total_audio_ms = (aac.frames.len() as u64 * 1024 * 1000) / aac.sample_rate.max(1) as u64;

    validate_images(images)?;

    let default_meta = MetadataSet::default();
    let meta = metadata.unwrap_or(&default_meta);
    let (meta_source, reused_meta) = choose_metadata_source(&aac, meta);
    log::debug!("write_mp4: metadata reuse={reused_meta}");

    // --- Text tracks: title first, then caller-declared extras. ---
    let title_starts: Vec<u32> = titles.iter().map(|s| s.start_ms).collect();
    let title_durations = derive_durations(&title_starts, total_audio_ms);
    let title_padded = text_tbl::pad_samples(titles);
    let title_padded_durations = pad_durations(&title_durations);

    let mut text_track_builds: Vec<(String, Vec<ChapterTextSample>, Vec<u64>, bool)> = Vec::new();
    text_track_builds.push(("Chapter Titles".to_string(), title_padded, title_padded_durations, true));
    for extra in extra_text_tracks {
        let starts: Vec<u32> = extra.samples.iter().map(|s| s.start_ms).collect();
        let durations = derive_durations(&starts, total_audio_ms);
        let padded = text_tbl::pad_samples(extra.samples);
        let padded_durations = pad_durations(&durations);
        text_track_builds.push((extra.handler_name.to_string(), padded, padded_durations, false));
    }

    // --- Audio stbl + chunk plan. ---
    let audio_chunk_plan = if !aac.stsc_payload.is_empty() {
        chunk_plan_from_stsc(&aac.stsc_payload, aac.frames.len() as u32)
    } else {
        synthesize_chunk_plan(aac.frames.len() as u32, AUDIO_CHUNK_SIZE)
    };
    let audio_stbl = build_audio_stbl(&aac, &audio_chunk_plan);

    // --- Image stbl. ---
    let image_starts: Vec<u32> = images.iter().map(|s| s.start_ms).collect();
    let image_durations = derive_durations(&image_starts, total_audio_ms);
    let image_chunk_plan = synthesize_chunk_plan(images.len() as u32, 1);
    let image_info = images.first().and_then(|img| parse_jpeg_info(&img.data));
    let image_sizes: Vec<u32> = images.iter().map(|img| img.data.len() as u32).collect();
    let image_stbl = image_info.map(|info| image_tbl::build_image_stbl(&info, &image_sizes, &image_durations));

    // --- trak/moov composition. ---
    let title_track_id = tracks::AUDIO_TRACK_ID + 1;
    let extra_track_count = extra_text_tracks.len() as u32;
    let image_track_id = title_track_id + extra_track_count + 1;

    let mut chapter_refs = vec![title_track_id];
    if image_stbl.is_some() {
        chapter_refs.push(image_track_id);
    }

    let audio_media_timescale = aac.sample_rate;
    let audio_duration_ts = aac.frames.len() as u64 * 1024;
    let audio_tkhd_dur = tracks::tkhd_duration(audio_duration_ts, audio_media_timescale);

    let mut text_trak_atoms: Vec<Atom> = Vec::new();
    let mut all_text_samples: Vec<(Vec<Vec<u8>>, Vec<u32>)> = Vec::new();
    let mut mvhd_max_dur = audio_tkhd_dur;
    for (idx, (handler_name, padded_samples, durations, enabled)) in text_track_builds.iter().enumerate() {
        let track_id = title_track_id + idx as u32;
        let total_ms: u64 = durations.iter().sum();
        let stbl = text_tbl::build_text_stbl(padded_samples, durations);
        let tkhd_dur = tracks::tkhd_duration(total_ms, tracks::CHAPTER_TIMESCALE);
        mvhd_max_dur = mvhd_max_dur.max(tkhd_dur);
        let trak = tracks::build_trak_text(track_id, tracks::CHAPTER_TIMESCALE, total_ms, stbl, tkhd_dur, handler_name, *enabled);
        text_trak_atoms.push(trak);

        let encoded = text_tbl::encode_samples(padded_samples);
        let sample_count = encoded.len() as u32;
        all_text_samples.push((encoded, synthesize_chunk_plan(sample_count, 1)));
    }

    let trak_audio = tracks::build_trak_audio(
        tracks::AUDIO_TRACK_ID,
        audio_media_timescale,
        audio_duration_ts,
        audio_stbl,
        &chapter_refs,
        audio_tkhd_dur,
    );

    let trak_image = if let (Some(stbl), Some(info)) = (image_stbl, image_info) {
        let total_ms: u64 = image_durations.iter().sum();
        let tkhd_dur = tracks::tkhd_duration(total_ms, tracks::CHAPTER_TIMESCALE);
        mvhd_max_dur = mvhd_max_dur.max(tkhd_dur);
        Some(tracks::build_trak_image(
            image_track_id,
            tracks::CHAPTER_TIMESCALE,
            total_ms,
            stbl,
            info.width,
            info.height,
            tkhd_dur,
        ))
    } else {
        None
    };

    let chpl = tracks::build_chpl(&titles_for_chpl(titles), &title_durations);
    let udta = tracks::build_udta(meta_source.as_deref(), meta, chpl);

    let mut moov = tracks::build_moov(
        tracks::MOVIE_TIMESCALE,
        mvhd_max_dur,
        trak_audio,
        text_trak_atoms,
        trak_image,
        udta,
    );

    let image_bytes: Vec<Vec<u8>> = images.iter().map(|i| i.data.clone()).collect();

    let mut out = File::create(output_path).map_err(|e| ChapterForgeError::OutputUnwritable {
        path: output_path.to_path_buf(),
        source: e,
    })?;

    if fast_start {
        moov.fix_size_recursive();
        let payload_start = FTYP_BYTES.len() as u64 + moov.size() + 8;
        let simulated = crate::mdat::compute_relative_offsets(
            &aac.frames,
            &audio_chunk_plan,
            &all_text_samples,
            &image_bytes,
            &image_chunk_plan,
        );
        crate::mdat::patch_stco_tables(&mut moov, payload_start, &simulated)?;
        moov.fix_size_recursive();
        let moov_bytes = moov.serialize()?;

        out.write_all(&FTYP_BYTES).map_err(ChapterForgeError::Io)?;
        out.write_all(&moov_bytes).map_err(ChapterForgeError::Io)?;
        crate::mdat::write_mdat(
            &mut out,
            &aac.frames,
            &audio_chunk_plan,
            &all_text_samples,
            &image_bytes,
            &image_chunk_plan,
        )?;
    } else {
        out.write_all(&FTYP_BYTES).map_err(ChapterForgeError::Io)?;
        let mdat_payload_start = FTYP_BYTES.len() as u64 + 8;
        let real_offsets = crate::mdat::write_mdat(
            &mut out,
            &aac.frames,
            &audio_chunk_plan,
            &all_text_samples,
            &image_bytes,
            &image_chunk_plan,
        )?;
        crate::mdat::patch_stco_tables(&mut moov, mdat_payload_start, &real_offsets)?;

        let free_box = Atom::with_payload("free", vec![0u8; TRAILING_FREE_BYTES - 8]);
        let free_bytes = free_box.serialize()?;
        out.write_all(&free_bytes).map_err(ChapterForgeError::Io)?;

        moov.fix_size_recursive();
        let moov_bytes = moov.serialize()?;
        out.write_all(&moov_bytes).map_err(ChapterForgeError::Io)?;
    }

    Ok(())
}

fn titles_for_chpl(titles: &[ChapterTextSample]) -> Vec<ChapterTextSample> {
    titles.to_vec()
}

fn pad_durations(durations: &[u64]) -> Vec<u64> {
    let mut padded = durations.to_vec();
    if let Some(&last) = durations.last() {
        padded.push(last);
        padded.push(last);
    }
    padded
}

fn build_audio_stbl(aac: &AacExtractResult, chunk_plan: &[u32]) -> Atom {
    if aac.is_mp4_sourced() {
        audio_tbl::build_audio_stbl_raw(
            &aac.stsd_payload,
            &aac.stts_payload,
            &aac.stsc_payload,
            &aac.stsz_payload,
            chunk_plan.len() as u32,
        )
    } else {
        let cfg = Mp4aConfig {
            channel_count: if aac.channel_config == 1 { 1 } else { 2 },
            sample_size: 16,
            sample_rate: aac.sample_rate,
            audio_object_type: aac.audio_object_type,
            sampling_index: aac.sampling_index,
            channel_config: aac.channel_config,
        };
        audio_tbl::build_audio_stbl(&cfg, &aac.sizes, chunk_plan, None)
    }
}

fn choose_metadata_source(aac: &AacExtractResult, caller_meta: &MetadataSet) -> (Option<Vec<u8>>, &'static str) {
    if let Some(ilst) = &aac.ilst_payload {
        if !ilst.is_empty() {
            return (Some(ilst.clone()), "reused source ilst");
        }
    }
    if !caller_meta.is_empty() {
        return (None, "caller-supplied metadata");
    }
    log::warn!("write_mp4: no source or caller metadata available, writing empty ilst");
    (None, "none")
}

fn validate_images(images: &[ChapterImageSample]) -> crate::error::Result<()> {
    if images.is_empty() {
        return Ok(());
    }
    let first = parse_jpeg_info(&images[0].data)
        .ok_or_else(|| ChapterForgeError::InputInvalid("first chapter image is not a parseable JPEG".into()))?;
    if !first.is_yuv420 {
        return Err(ChapterForgeError::InputInvalid(
            "first chapter image is not 4:2:0 subsampled".into(),
        ));
    }
    for img in &images[1..] {
        match parse_jpeg_info(&img.data) {
            Some(info) => {
                if !info.is_yuv420 {
                    return Err(ChapterForgeError::InputInvalid(
                        "chapter image is not 4:2:0 subsampled".into(),
                    ));
                }
                if info.width != first.width || info.height != first.height {
                    log::warn!(
                        "write_mp4: image dimension mismatch: {}x{} vs first image {}x{}",
                        info.width,
                        info.height,
                        first.width,
                        first.height
                    );
                }
            }
            None => {
                return Err(ChapterForgeError::InputInvalid(
                    "chapter image is not a parseable JPEG".into(),
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_success_is_ok() {
        let s = Status::success("done");
        assert!(s.ok);
        assert_eq!(s.message, "done");
    }

    #[test]
    fn status_from_err_is_not_ok() {
        let s = Status::from_err(ChapterForgeError::InputInvalid("bad".into()));
        assert!(!s.ok);
        assert!(s.message.contains("bad"));
    }

    #[test]
    fn validate_images_rejects_non_jpeg() {
        let images = vec![ChapterImageSample {
            data: vec![0x89, b'P', b'N', b'G'],
            start_ms: 0,
        }];
        assert!(validate_images(&images).is_err());
    }

    #[test]
    fn validate_images_accepts_empty() {
        assert!(validate_images(&[]).is_ok());
    }
}
