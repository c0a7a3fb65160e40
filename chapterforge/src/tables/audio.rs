//! Audio `stbl`: reuse a source's raw sample tables verbatim, or synthesize from
//! an `Mp4aConfig` + chunk plan.

use crate::boxes::Atom;
use crate::bytes::ByteWriter;
use crate::tables::run_length_stsc;

#[derive(Debug, Clone)]
pub struct Mp4aConfig {
    pub channel_count: u16,
    pub sample_size: u16,
    pub sample_rate: u32,
    pub audio_object_type: u8,
    pub sampling_index: u8,
    pub channel_config: u8,
}

impl Default for Mp4aConfig {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_size: 16,
            sample_rate: 44100,
            audio_object_type: 2, // AAC-LC
            sampling_index: 4,    // 44100 Hz
            channel_config: 2,    // stereo
        }
    }
}

fn write_descr_len_padded4(w: &mut ByteWriter, len: u8) {
    w.put_u8(0x80).put_u8(0x80).put_u8(0x80).put_u8(len);
}

fn build_audio_specific_config(audio_object_type: u8, sampling_freq_index: u8, channel_config: u8) -> [u8; 2] {
    let byte1 = ((audio_object_type & 0x1F) << 3) | ((sampling_freq_index & 0x0E) >> 1);
    let byte2 = ((sampling_freq_index & 0x01) << 7) | ((channel_config & 0x0F) << 3);
    [byte1, byte2]
}

fn build_esds(cfg: &Mp4aConfig) -> Atom {
    let mut w = ByteWriter::new();
    w.put_u8(0).put_u24(0);

    let asc = build_audio_specific_config(cfg.audio_object_type, cfg.sampling_index, cfg.channel_config);

    w.put_u8(0x03);
    write_descr_len_padded4(&mut w, 0x22);
    w.put_u16(0x0000); // ES_ID
    w.put_u8(0x00); // flags

    w.put_u8(0x04);
    write_descr_len_padded4(&mut w, 0x14);
    w.put_u8(0x40); // objectTypeIndication: MPEG-4 Audio
    w.put_u8(0x15); // streamType=audio, upstream=0, reserved=1
    w.put_u24(0x00018300); // bufferSizeDB
    w.put_u32(0x0147F000); // maxBitrate
    w.put_u32(0x01388105); // avgBitrate

    w.put_u8(0x05);
    write_descr_len_padded4(&mut w, asc.len() as u8);
    w.put_bytes(&asc);

    w.put_u8(0x06);
    write_descr_len_padded4(&mut w, 0x01);
    w.put_u8(0x02);

    Atom::with_payload("esds", w.into_vec())
}

fn build_mp4a(cfg: &Mp4aConfig) -> Atom {
    let mut w = ByteWriter::new();
    w.put_u32(0).put_u16(0).put_u16(1); // SampleEntry: reserved[6] + data_reference_index
    w.put_u32(0).put_u32(0); // AudioSampleEntry reserved[2]
    w.put_u16(cfg.channel_count).put_u16(cfg.sample_size);
    w.put_u16(0).put_u16(0); // pre_defined, reserved
    w.put_u32(cfg.sample_rate << 16);
    Atom::with_payload("mp4a", w.into_vec()).with_child(build_esds(cfg))
}

fn build_stsd_mp4a(cfg: &Mp4aConfig) -> Atom {
    let mut w = ByteWriter::with_capacity(8);
    w.put_u8(0).put_u24(0).put_u32(1);
    Atom::with_payload("stsd", w.into_vec()).with_child(build_mp4a(cfg))
}

fn build_stts(sample_count: u32) -> Atom {
    let mut w = ByteWriter::with_capacity(16);
    w.put_u8(0).put_u24(0).put_u32(1);
    w.put_u32(sample_count).put_u32(1024); // AAC-LC: 1024 PCM samples/frame
    Atom::with_payload("stts", w.into_vec())
}

fn build_stsc(chunk_plan: &[u32]) -> Atom {
    let entries = run_length_stsc(chunk_plan);
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

pub fn build_stco_placeholder(chunk_count: u32) -> Atom {
    let mut w = ByteWriter::with_capacity(8 + chunk_count as usize * 4);
    w.put_u8(0).put_u24(0).put_u32(chunk_count);
    for _ in 0..chunk_count {
        w.put_u32(0);
    }
    Atom::with_payload("stco", w.into_vec())
}

/// Synthesize a full audio `stbl` from a config, per-sample sizes, and a chunk plan.
pub fn build_audio_stbl(
    cfg: &Mp4aConfig,
    sample_sizes: &[u32],
    chunk_plan: &[u32],
    raw_stsd: Option<&[u8]>,
) -> Atom {
    let mut stbl = Atom::new("stbl");
    match raw_stsd {
        Some(bytes) if !bytes.is_empty() => {
            stbl.add_child(Atom::with_payload("stsd", bytes.to_vec()));
        }
        _ => {
            stbl.add_child(build_stsd_mp4a(cfg));
        }
    }
    stbl.add_child(build_stts(sample_sizes.len() as u32));
    stbl.add_child(build_stsc(chunk_plan));
    stbl.add_child(build_stsz(sample_sizes));
    stbl.add_child(build_stco_placeholder(chunk_plan.len() as u32));
    stbl
}

/// Rehydrate an audio `stbl` from raw source atom payloads, used when reusing a
/// source MP4's sample table verbatim. `stco` is still rebuilt as a placeholder:
/// per the design notes, absolute chunk offsets always depend on the new file
/// layout and must always be patched, even when every other table is reused.
pub fn build_audio_stbl_raw(
    stsd_payload: &[u8],
    stts_payload: &[u8],
    stsc_payload: &[u8],
    stsz_payload: &[u8],
    chunk_count: u32,
) -> Atom {
    let mut stbl = Atom::new("stbl");
    stbl.add_child(Atom::with_payload("stsd", stsd_payload.to_vec()));
    stbl.add_child(Atom::with_payload("stts", stts_payload.to_vec()));
    stbl.add_child(Atom::with_payload("stsc", stsc_payload.to_vec()));
    stbl.add_child(Atom::with_payload("stsz", stsz_payload.to_vec()));
    stbl.add_child(build_stco_placeholder(chunk_count));
    stbl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_stbl_has_five_children() {
        let cfg = Mp4aConfig::default();
        let sizes = vec![100u32; 5];
        let plan = vec![5u32];
        let stbl = build_audio_stbl(&cfg, &sizes, &plan, None);
        assert_eq!(stbl.children.len(), 5);
        assert_eq!(crate::bytes::fourcc_to_string(stbl.children[0].kind), "stsd");
    }

    #[test]
    fn raw_stbl_reuses_payloads_but_rebuilds_stco() {
        let stbl = build_audio_stbl_raw(&[1, 2], &[3, 4], &[5, 6], &[7, 8], 3);
        assert_eq!(stbl.children[0].payload, vec![1, 2]);
        assert_eq!(crate::bytes::fourcc_to_string(stbl.children[4].kind), "stco");
        // 8-byte header + 3 placeholder u32 entries.
        assert_eq!(stbl.children[4].payload.len(), 8 + 12);
    }
}
