//! AAC source extraction: either reconstruct per-sample buffers from an existing
//! MP4 audio track, or parse raw ADTS frames.

use crate::error::{ChapterForgeError, Result};
use crate::parser::{stco_chunk_offsets, stsz_sample_sizes, ParsedMp4};
use crate::tables::chunk_plan_from_stsc;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Default)]
pub struct AacExtractResult {
    pub frames: Vec<Vec<u8>>,
    pub sizes: Vec<u32>,
    pub sample_rate: u32,
    pub sampling_index: u8,
    pub channel_config: u8,
    pub audio_object_type: u8,
    pub stsd_payload: Vec<u8>,
    pub stts_payload: Vec<u8>,
    pub stsc_payload: Vec<u8>,
    pub stsz_payload: Vec<u8>,
    pub stco_payload: Vec<u8>,
    pub ilst_payload: Option<Vec<u8>>,
    pub meta_payload: Option<Vec<u8>>,
}

impl AacExtractResult {
    pub fn is_mp4_sourced(&self) -> bool {
        !self.stsd_payload.is_empty()
            && !self.stts_payload.is_empty()
            && !self.stsc_payload.is_empty()
            && !self.stsz_payload.is_empty()
            && !self.stco_payload.is_empty()
    }
}

struct AdtsHeader {
    frame_length: usize,
    header_len: usize,
    audio_object_type: u8,
    sampling_index: u8,
    channel_config: u8,
}

fn parse_adts_header(data: &[u8]) -> Option<AdtsHeader> {
    if data.len() < 7 || data[0] != 0xFF || (data[1] & 0xF0) != 0xF0 {
        return None;
    }
    let protection_absent = data[1] & 0x01;
    let profile = (data[2] >> 6) & 0x03;
    let sampling_index = (data[2] >> 2) & 0x0F;
    let channel_config = ((data[2] & 0x01) << 2) | ((data[3] >> 6) & 0x03);
    let frame_length =
        (((data[3] as usize) & 0x03) << 11) | ((data[4] as usize) << 3) | (((data[5] as usize) >> 5) & 0x07);
    let header_len = if protection_absent == 1 { 7 } else { 9 };
    if frame_length < header_len {
        return None;
    }
    Some(AdtsHeader {
        frame_length,
        header_len,
        audio_object_type: profile + 1,
        sampling_index,
        channel_config,
    })
}

/// Parse a raw ADTS AAC stream into per-frame access units, ADTS header stripped.
pub fn extract_adts_frames(data: &[u8]) -> Result<AacExtractResult> {
    let mut frames = Vec::new();
    let mut sizes = Vec::new();
    let mut pos = 0usize;
    let mut header_store: Option<AdtsHeader> = None;

    while pos + 7 <= data.len() {
        let hdr = match parse_adts_header(&data[pos..]) {
            Some(h) => h,
            None => break,
        };
        let end = pos + hdr.frame_length;
        if end > data.len() {
            break;
        }
        frames.push(data[pos + hdr.header_len..end].to_vec());
        sizes.push((hdr.frame_length - hdr.header_len) as u32);
        if header_store.is_none() {
            header_store = Some(hdr);
        }
        pos = end;
    }

    if frames.is_empty() {
        return Err(ChapterForgeError::InputInvalid(
            "no ADTS frames recovered from audio stream".into(),
        ));
    }

    let hdr = header_store.unwrap();
    Ok(AacExtractResult {
        frames,
        sizes,
        sample_rate: SAMPLE_RATES
            .get(hdr.sampling_index as usize)
            .copied()
            .unwrap_or(44100),
        sampling_index: hdr.sampling_index,
        channel_config: hdr.channel_config,
        audio_object_type: hdr.audio_object_type,
        stsd_payload: Vec::new(),
        stts_payload: Vec::new(),
        stsc_payload: Vec::new(),
        stsz_payload: Vec::new(),
        stco_payload: Vec::new(),
        ilst_payload: None,
        meta_payload: None,
    })
}

/// Best-effort decode of the `AudioSpecificConfig` nested inside a reused `stsd`
/// payload's `esds`, for informational/logging purposes only; the table itself
/// is reused verbatim regardless of whether this succeeds.
fn find_asc_in_stsd(stsd: &[u8]) -> Option<(u8, u8, u8)> {
    let needle = [0x05u8];
    for i in 0..stsd.len() {
        if stsd[i] == needle[0] && i + 2 < stsd.len() && stsd[i + 1] == 0x80 {
            // tag(1) + len(4, padded form 80 80 80 len) + ASC(2 bytes minimum)
            let asc_off = i + 5;
            if asc_off + 2 <= stsd.len() {
                let b0 = stsd[asc_off];
                let b1 = stsd[asc_off + 1];
                let aot = (b0 >> 3) & 0x1F;
                let sampling_index = ((b0 & 0x07) << 1) | (b1 >> 7);
                let channel_config = (b1 >> 3) & 0x0F;
                return Some((aot, sampling_index, channel_config));
            }
        }
    }
    None
}

/// Reconstruct per-sample AAC access units from an already-parsed MP4 audio
/// track, using its `stsc`/`stco`/`stsz` tables to locate each sample's bytes.
pub fn extract_from_mp4(path: &Path, parsed: &ParsedMp4) -> Result<AacExtractResult> {
    log::debug!("extract_from_mp4: path={}", path.display());
    let sizes = stsz_sample_sizes(&parsed.stsz);
    if sizes.is_empty() {
        return Err(ChapterForgeError::InputInvalid(
            "source stsz carries zero audio samples".into(),
        ));
    }
    let chunk_plan = chunk_plan_from_stsc(&parsed.stsc, sizes.len() as u32);
    let offsets = stco_chunk_offsets(&parsed.stco);

    let mut file = File::open(path).map_err(|e| ChapterForgeError::InputUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut frames = Vec::with_capacity(sizes.len());
    let mut sample_idx = 0usize;
    for (chunk_idx, &samples_in_chunk) in chunk_plan.iter().enumerate() {
        let chunk_offset = *offsets.get(chunk_idx).unwrap_or(&0) as u64;
        let chunk_sample_sizes = &sizes[sample_idx..(sample_idx + samples_in_chunk as usize).min(sizes.len())];
        let chunk_total: u32 = chunk_sample_sizes.iter().sum();
        let mut chunk_bytes = vec![0u8; chunk_total as usize];
        file.seek(SeekFrom::Start(chunk_offset)).map_err(ChapterForgeError::Io)?;
        file.read_exact(&mut chunk_bytes).map_err(ChapterForgeError::Io)?;

        let mut off = 0usize;
        for &size in chunk_sample_sizes {
            frames.push(chunk_bytes[off..off + size as usize].to_vec());
            off += size as usize;
        }
        sample_idx += chunk_sample_sizes.len();
    }

    let (audio_object_type, sampling_index, channel_config) =
        find_asc_in_stsd(&parsed.stsd).unwrap_or((2, 4, 2));

    Ok(AacExtractResult {
        frames,
        sizes,
        sample_rate: SAMPLE_RATES.get(sampling_index as usize).copied().unwrap_or(44100),
        sampling_index,
        channel_config,
        audio_object_type,
        stsd_payload: parsed.stsd.clone(),
        stts_payload: parsed.stts.clone(),
        stsc_payload: parsed.stsc.clone(),
        stsz_payload: parsed.stsz.clone(),
        stco_payload: parsed.stco.clone(),
        ilst_payload: if parsed.ilst_payload.is_empty() {
            None
        } else {
            Some(parsed.ilst_payload.clone())
        },
        meta_payload: if parsed.meta_payload.is_empty() {
            None
        } else {
            Some(parsed.meta_payload.clone())
        },
    })
}

/// Dispatches on file extension: `.m4a`/`.mp4` sources are read as MP4
/// containers, everything else as raw ADTS.
pub fn load_audio(path: &Path) -> Result<AacExtractResult> {
    let is_mp4 = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("m4a") || e.eq_ignore_ascii_case("mp4"))
        .unwrap_or(false);

    if is_mp4 {
        let parsed = crate::parser::parse_mp4(path)?;
        if !parsed.has_usable_audio_stbl() {
            return Err(ChapterForgeError::ReadIncomplete(format!(
                "{}: no usable audio sample table",
                path.display()
            )));
        }
        extract_from_mp4(path, &parsed)
    } else {
        let mut data = Vec::new();
        let mut file = File::open(path).map_err(|e| ChapterForgeError::InputUnreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        file.read_to_end(&mut data).map_err(ChapterForgeError::Io)?;
        extract_adts_frames(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adts_frame(aac_payload: &[u8], profile: u8, sampling_index: u8, channel_config: u8) -> Vec<u8> {
        let frame_length = 7 + aac_payload.len();
        let mut b = vec![0u8; 7];
        b[0] = 0xFF;
        b[1] = 0xF1; // MPEG-4, layer 0, protection_absent=1
        b[2] = ((profile) << 6) | (sampling_index << 2) | ((channel_config >> 2) & 0x01);
        b[3] = ((channel_config & 0x03) << 6) | (((frame_length >> 11) & 0x03) as u8);
        b[4] = ((frame_length >> 3) & 0xFF) as u8;
        b[5] = (((frame_length & 0x07) << 5) as u8) | 0x1F;
        b[6] = 0xFC;
        b.extend_from_slice(aac_payload);
        b
    }

    #[test]
    fn extracts_single_adts_frame() {
        let payload = vec![0xAA, 0xBB, 0xCC];
        let frame = adts_frame(&payload, 1, 4, 2); // profile=1 -> AOT LC(2)
        let result = extract_adts_frames(&frame).unwrap();
        assert_eq!(result.frames.len(), 1);
        assert_eq!(result.frames[0], payload);
        assert_eq!(result.audio_object_type, 2);
        assert_eq!(result.sampling_index, 4);
        assert_eq!(result.sample_rate, 44100);
    }

    #[test]
    fn extracts_multiple_adts_frames() {
        let mut data = Vec::new();
        data.extend(adts_frame(&[0x01, 0x02], 1, 4, 2));
        data.extend(adts_frame(&[0x03, 0x04, 0x05], 1, 4, 2));
        let result = extract_adts_frames(&data).unwrap();
        assert_eq!(result.frames.len(), 2);
        assert_eq!(result.frames[0], vec![0x01, 0x02]);
        assert_eq!(result.frames[1], vec![0x03, 0x04, 0x05]);
    }

    #[test]
    fn empty_input_is_invalid() {
        assert!(extract_adts_frames(&[]).is_err());
    }
}
