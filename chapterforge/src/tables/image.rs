//! Image (`jpeg`) chapter-thumbnail track `stbl`.

use crate::boxes::Atom;
use crate::bytes::ByteWriter;
use crate::jpeg::JpegInfo;
use crate::tables::run_length_stsc;

fn build_jpeg_sample_entry(info: &JpegInfo) -> Atom {
    let mut w = ByteWriter::with_capacity(86);
    w.put_u32(0).put_u16(0).put_u16(1); // SampleEntry reserved[6] + data_reference_index
    w.put_u16(0).put_u16(0); // version, revision
    w.put_u32(0); // vendor
    w.put_u32(0); // temporal quality
    w.put_u32(0); // spatial quality
    w.put_u16(info.width).put_u16(info.height);
    w.put_fixed16_16(72.0); // horizresolution
    w.put_fixed16_16(72.0); // vertresolution
    w.put_u32(0); // data_size
    w.put_u16(1); // frame_count
    let name = b"JPEG";
    let mut name_field = [0u8; 32];
    name_field[0] = name.len() as u8;
    name_field[1..1 + name.len()].copy_from_slice(name);
    w.put_bytes(&name_field);
    w.put_u16(24); // depth
    w.put_u16(0xFFFF); // color_table: -1, no table
    Atom::with_payload("jpeg", w.into_vec())
}

fn build_stsd_jpeg(info: &JpegInfo) -> Atom {
    let mut w = ByteWriter::with_capacity(8);
    w.put_u8(0).put_u24(0).put_u32(1);
    Atom::with_payload("stsd", w.into_vec()).with_child(build_jpeg_sample_entry(info))
}

fn build_stts(durations_ms: &[u64]) -> Atom {
    let mut w = ByteWriter::with_capacity(8 + durations_ms.len() * 8);
    w.put_u8(0).put_u24(0).put_u32(durations_ms.len() as u32);
    for &d in durations_ms {
        w.put_u32(1).put_u32(d.max(1) as u32);
    }
    Atom::with_payload("stts", w.into_vec())
}

/// Every image sample is a sync sample (keyframe): one independent JPEG per chapter.
fn build_stss(sample_count: u32) -> Atom {
    let mut w = ByteWriter::with_capacity(8 + sample_count as usize * 4);
    w.put_u8(0).put_u24(0).put_u32(sample_count);
    for i in 1..=sample_count {
        w.put_u32(i);
    }
    Atom::with_payload("stss", w.into_vec())
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

/// Builds the image-track `stbl`. `sizes` is one JPEG's byte length per chapter.
pub fn build_image_stbl(info: &JpegInfo, sizes: &[u32], durations_ms: &[u64]) -> Atom {
    let sample_count = sizes.len() as u32;
    let mut stbl = Atom::new("stbl");
    stbl.add_child(build_stsd_jpeg(info));
    stbl.add_child(build_stts(durations_ms));
    stbl.add_child(build_stss(sample_count));
    stbl.add_child(build_stsc(sample_count));
    stbl.add_child(build_stsz(sizes));
    stbl.add_child(build_stco_placeholder(sample_count));
    stbl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_stbl_has_six_children_including_stss() {
        let info = JpegInfo {
            width: 640,
            height: 480,
            is_yuv420: true,
        };
        let sizes = vec![1000u32, 2000u32];
        let durations = vec![1000u64, 2000u64];
        let stbl = build_image_stbl(&info, &sizes, &durations);
        assert_eq!(stbl.children.len(), 6);
        assert_eq!(crate::bytes::fourcc_to_string(stbl.children[2].kind), "stss");
    }

    #[test]
    fn stss_marks_every_sample_as_sync() {
        let stss = build_stss(3);
        // header(8) + 3 entries * 4 bytes.
        assert_eq!(stss.payload.len(), 8 + 12);
        assert_eq!(&stss.payload[8..12], &1u32.to_be_bytes());
        assert_eq!(&stss.payload[16..20], &3u32.to_be_bytes());
    }
}
