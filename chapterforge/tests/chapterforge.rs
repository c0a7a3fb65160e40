//! End-to-end coverage against the public `write_mp4`/`read_m4a` API, named
//! after the scenarios the box-level unit tests can't exercise on their own.

use chapterforge::{ChapterImageSample, ChapterTextSample, ExtraTextTrack, MetadataSet};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

fn adts_frame(payload: &[u8]) -> Vec<u8> {
    let profile = 1u8; // AAC LC
    let sampling_index = 4u8; // 44100 Hz
    let channel_config = 2u8;
    let frame_length = 7 + payload.len();
    let mut b = vec![0u8; 7];
    b[0] = 0xFF;
    b[1] = 0xF1;
    b[2] = (profile << 6) | (sampling_index << 2) | ((channel_config >> 2) & 0x01);
    b[3] = ((channel_config & 0x03) << 6) | (((frame_length >> 11) & 0x03) as u8);
    b[4] = ((frame_length >> 3) & 0xFF) as u8;
    b[5] = (((frame_length & 0x07) << 5) as u8) | 0x1F;
    b[6] = 0xFC;
    b.extend_from_slice(payload);
    b
}

fn write_adts_input(dir: &std::path::Path, frame_count: usize) -> PathBuf {
    let path = dir.join("input.aac");
    let mut f = fs::File::create(&path).unwrap();
    for i in 0..frame_count {
        let payload = vec![i as u8; 32];
        f.write_all(&adts_frame(&payload)).unwrap();
    }
    path
}

fn sof0_jpeg(width: u16, height: u16, subsampling: [(u8, u8); 3]) -> Vec<u8> {
    let mut b = vec![0xFF, 0xD8];
    b.extend_from_slice(&[0xFF, 0xC0]);
    let segment_length: u16 = 8 + 3 * 3;
    b.extend_from_slice(&segment_length.to_be_bytes());
    b.push(8);
    b.extend_from_slice(&height.to_be_bytes());
    b.extend_from_slice(&width.to_be_bytes());
    b.push(3);
    for (i, (h, v)) in subsampling.iter().enumerate() {
        b.push(i as u8 + 1);
        b.push((h << 4) | v);
        b.push(0);
    }
    b.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
    b
}

#[test]
fn audio_reuse_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_adts_input(dir.path(), 5);
    let output = dir.path().join("out.m4a");

    let titles = vec![
        ChapterTextSample { text: "Intro".into(), href: String::new(), start_ms: 0 },
        ChapterTextSample { text: "Body".into(), href: String::new(), start_ms: 60 },
    ];

    let status = chapterforge::write_mp4(&input, &titles, &[], &[], None, &output, false);
    assert!(status.ok, "{}", status.message);

    let original = chapterforge::aac::load_audio(&input).unwrap();
    let roundtripped = chapterforge::aac::load_audio(&output).unwrap();
    assert_eq!(roundtripped.frames, original.frames);
}

#[test]
fn tx3g_href_encoding_roundtrips_through_a_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_adts_input(dir.path(), 3);
    let output = dir.path().join("out.m4a");

    let titles = vec![ChapterTextSample {
        text: "Chapter One".into(),
        href: "https://example.com/1".into(),
        start_ms: 0,
    }];

    let status = chapterforge::write_mp4(&input, &titles, &[], &[], None, &output, false);
    assert!(status.ok, "{}", status.message);

    let result = chapterforge::read_m4a(&output);
    assert!(result.status.ok, "{}", result.status.message);
    assert_eq!(result.titles[0].text, "Chapter One");
    assert_eq!(result.titles[0].href, "https://example.com/1");
}

#[test]
fn chunk_plan_from_stsc_repeats_last_entry_past_declared_runs() {
    // An stsc declaring one run of 4-sample chunks, asked to cover 18 samples:
    // the run has no successor entry, so it repeats until total samples are covered.
    let mut stsc = Vec::new();
    stsc.extend_from_slice(&[0, 0, 0, 0]);
    stsc.extend_from_slice(&1u32.to_be_bytes());
    stsc.extend_from_slice(&1u32.to_be_bytes());
    stsc.extend_from_slice(&4u32.to_be_bytes());
    stsc.extend_from_slice(&1u32.to_be_bytes());
    let plan = chapterforge::tables::chunk_plan_from_stsc(&stsc, 18);
    assert_eq!(plan, vec![4, 4, 4, 4, 4]);
}

#[test]
fn duration_derivation_clamps_last_chapter_to_remaining_audio() {
    let starts = [0u32, 10_000, 25_000];
    let durations = chapterforge::timing::derive_durations(&starts, 30_000);
    assert_eq!(durations, vec![10_000, 15_000, 5_000]);
}

#[test]
fn jpeg_subsampling_validation_rejects_non_420_chapter_image() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_adts_input(dir.path(), 2);
    let output = dir.path().join("out.m4a");

    let images = vec![ChapterImageSample {
        data: sof0_jpeg(100, 100, [(2, 1), (1, 1), (1, 1)]),
        start_ms: 0,
    }];

    let status = chapterforge::write_mp4(&input, &[], &[], &images, None, &output, false);
    assert!(!status.ok);
    assert!(status.message.contains("4:2:0"));
}

#[test]
fn fast_start_layout_offsets_place_moov_before_mdat() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_adts_input(dir.path(), 4);
    let output = dir.path().join("out.m4a");

    let titles = vec![ChapterTextSample { text: "Only".into(), href: String::new(), start_ms: 0 }];
    let status = chapterforge::write_mp4(&input, &titles, &[], &[], None, &output, true);
    assert!(status.ok, "{}", status.message);

    let bytes = fs::read(&output).unwrap();
    assert_eq!(&bytes[4..8], b"ftyp");
    let moov_offset = 36usize;
    assert_eq!(&bytes[moov_offset + 4..moov_offset + 8], b"moov");
    let moov_size = u32::from_be_bytes(bytes[moov_offset..moov_offset + 4].try_into().unwrap()) as usize;
    let mdat_offset = moov_offset + moov_size;
    assert_eq!(&bytes[mdat_offset + 4..mdat_offset + 8], b"mdat");

    // reading the produced file back should recover the same audio and chapters
    // regardless of which layout mode produced it.
    let original = chapterforge::aac::load_audio(&input).unwrap();
    let roundtripped = chapterforge::aac::load_audio(&output).unwrap();
    assert_eq!(roundtripped.frames, original.frames);
}

#[test]
fn extra_url_track_is_present_but_not_chapter_referenced() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_adts_input(dir.path(), 3);
    let output = dir.path().join("out.m4a");

    let titles = vec![ChapterTextSample { text: "Intro".into(), href: String::new(), start_ms: 0 }];
    let urls = vec![ChapterTextSample { text: "link".into(), href: String::new(), start_ms: 0 }];
    let extra = vec![ExtraTextTrack { handler_name: "Chapter URLs", samples: &urls }];

    let status = chapterforge::write_mp4(&input, &titles, &extra, &[], None, &output, false);
    assert!(status.ok, "{}", status.message);

    let result = chapterforge::read_m4a(&output);
    assert!(result.status.ok, "{}", result.status.message);
    assert_eq!(result.titles.len(), 1);
    assert_eq!(result.urls.len(), 1);
}

#[test]
fn metadata_roundtrips_through_caller_supplied_ilst() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_adts_input(dir.path(), 2);
    let output = dir.path().join("out.m4a");

    let meta = MetadataSet {
        title: "My Episode".into(),
        artist: "My Show".into(),
        album: String::new(),
        genre: "Podcast".into(),
        year: "2026".into(),
        comment: String::new(),
        cover: Vec::new(),
    };

    let status = chapterforge::write_mp4(&input, &[], &[], &[], Some(&meta), &output, false);
    assert!(status.ok, "{}", status.message);

    let result = chapterforge::read_m4a(&output);
    assert_eq!(result.metadata.title, "My Episode");
    assert_eq!(result.metadata.genre, "Podcast");
}
