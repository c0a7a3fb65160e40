//! Track (`trak`) and movie (`moov`) composers: `tkhd`/`mdhd`/`hdlr`/`minf`/`dinf`/
//! `smhd`/`nmhd`/`vmhd`/`edts`/`elst`/`tref`, plus `mvhd` and `udta`/`chpl`.

use crate::boxes::Atom;
use crate::bytes::ByteWriter;
use crate::chapters::ChapterTextSample;
use crate::metadata::build_meta;

pub const MOVIE_TIMESCALE: u32 = 600;
pub const CHAPTER_TIMESCALE: u32 = 1000;
pub const AUDIO_TRACK_ID: u32 = 1;
pub const FALLBACK_IMAGE_WIDTH: u16 = 1280;
pub const FALLBACK_IMAGE_HEIGHT: u16 = 720;
const LANG_UND: u16 = 0x55C4;
const LANG_ENG: u16 = 0x15C7;

/// `tkhd_dur = media_dur_ts * movie_timescale / media_timescale`.
pub fn tkhd_duration(media_duration_ts: u64, media_timescale: u32) -> u64 {
    if media_timescale == 0 {
        return 0;
    }
    media_duration_ts * MOVIE_TIMESCALE as u64 / media_timescale as u64
}

fn build_tkhd_common(
    track_id: u32,
    duration: u64,
    flags: u32,
    volume: u16,
    width: f64,
    height: f64,
) -> Atom {
    let mut w = ByteWriter::with_capacity(84);
    w.put_u8(0).put_u24(flags);
    w.put_u32(0).put_u32(0); // creation/modification time
    w.put_u32(track_id).put_u32(0); // reserved
    w.put_u32(duration as u32);
    w.put_u64(0); // reserved[8]
    w.put_u16(0).put_u16(0); // layer, alternate_group
    w.put_u16(volume).put_u16(0);
    // identity matrix: {1,0,0, 0,1,0, 0,0,0x4000} in 16.16 fixed point.
    w.put_u32(0x00010000).put_u32(0).put_u32(0);
    w.put_u32(0).put_u32(0x00010000).put_u32(0);
    w.put_u32(0).put_u32(0).put_u32(0x40000000);
    w.put_fixed16_16(width);
    w.put_fixed16_16(height);
    Atom::with_payload("tkhd", w.into_vec())
}

pub fn build_tkhd_audio(track_id: u32, duration: u64) -> Atom {
    build_tkhd_common(track_id, duration, 0x000007, 0x0100, 0.0, 0.0)
}

pub fn build_tkhd_text(track_id: u32, duration: u64, enabled: bool) -> Atom {
    let flags = if enabled { 0x000007 } else { 0x000001 };
    build_tkhd_common(track_id, duration, flags, 0x0000, 0.0, 0.0)
}

pub fn build_tkhd_image(track_id: u32, duration: u64, width: u16, height: u16) -> Atom {
    build_tkhd_common(track_id, duration, 0x000007, 0x0000, width as f64, height as f64)
}

pub fn build_mdhd(timescale: u32, duration: u64, language: u16) -> Atom {
    let mut w = ByteWriter::with_capacity(24);
    w.put_u8(0).put_u24(0);
    w.put_u32(0).put_u32(0);
    w.put_u32(timescale).put_u32(duration as u32);
    w.put_u16(language).put_u16(0);
    Atom::with_payload("mdhd", w.into_vec())
}

pub fn build_hdlr(handler_type: &str, name: &str) -> Atom {
    let mut w = ByteWriter::new();
    w.put_u8(0).put_u24(0);
    w.put_u32(0); // pre_defined
    w.put_fourcc(handler_type);
    w.put_u32(0).put_u32(0).put_u32(0); // reserved
    w.put_bytes(name.as_bytes());
    w.put_u8(0); // NUL terminator
    Atom::with_payload("hdlr", w.into_vec())
}

pub fn build_smhd() -> Atom {
    let mut w = ByteWriter::with_capacity(8);
    w.put_u8(0).put_u24(0).put_u16(0).put_u16(0);
    Atom::with_payload("smhd", w.into_vec())
}

pub fn build_nmhd() -> Atom {
    let mut w = ByteWriter::with_capacity(4);
    w.put_u8(0).put_u24(0);
    Atom::with_payload("nmhd", w.into_vec())
}

pub fn build_vmhd() -> Atom {
    let mut w = ByteWriter::with_capacity(12);
    w.put_u8(0).put_u24(1); // flags MUST be 1, Apple players require it
    w.put_u16(0).put_u16(0).put_u16(0).put_u16(0);
    Atom::with_payload("vmhd", w.into_vec())
}

pub fn build_dinf() -> Atom {
    let mut url_w = ByteWriter::with_capacity(4);
    url_w.put_u8(0).put_u24(1); // flags=1: self-contained, no payload follows
    let url = Atom::with_payload("url ", url_w.into_vec());

    let mut dref_w = ByteWriter::with_capacity(8);
    dref_w.put_u8(0).put_u24(0).put_u32(1);
    let dref = Atom::with_payload("dref", dref_w.into_vec()).with_child(url);

    Atom::new("dinf").with_child(dref)
}

fn build_tref_chap(refs: &[u32]) -> Atom {
    let mut chap_w = ByteWriter::new();
    for &id in refs {
        if id != 0 {
            chap_w.put_u32(id);
        }
    }
    let chap = Atom::with_payload("chap", chap_w.into_vec());
    Atom::new("tref").with_child(chap)
}

#[allow(clippy::too_many_arguments)]
pub fn build_trak_audio(
    track_id: u32,
    timescale: u32,
    duration_ts: u64,
    stbl_audio: Atom,
    chapter_ref_track_ids: &[u32],
    tkhd_duration_mvhd: u64,
) -> Atom {
    let mut mdia = Atom::new("mdia");
    mdia.add_child(build_mdhd(timescale, duration_ts, LANG_UND));
    mdia.add_child(build_hdlr("soun", "sound handler"));
    let mut minf = Atom::new("minf");
    minf.add_child(build_smhd());
    minf.add_child(build_dinf());
    minf.add_child(stbl_audio);
    mdia.add_child(minf);

    let mut trak = Atom::new("trak");
    trak.add_child(build_tkhd_audio(track_id, tkhd_duration_mvhd));
    if !chapter_ref_track_ids.is_empty() {
        trak.add_child(build_tref_chap(chapter_ref_track_ids));
    }
    trak.add_child(mdia);
    trak
}

#[allow(clippy::too_many_arguments)]
pub fn build_trak_text(
    track_id: u32,
    timescale: u32,
    duration_ts: u64,
    stbl_text: Atom,
    tkhd_duration_mvhd: u64,
    handler_name: &str,
    enabled: bool,
) -> Atom {
    let mut mdia = Atom::new("mdia");
    mdia.add_child(build_mdhd(timescale, duration_ts, LANG_ENG));
    mdia.add_child(build_hdlr("text", handler_name));
    let mut minf = Atom::new("minf");
    minf.add_child(build_nmhd());
    minf.add_child(build_dinf());
    minf.add_child(stbl_text);
    mdia.add_child(minf);

    let mut trak = Atom::new("trak");
    trak.add_child(build_tkhd_text(track_id, tkhd_duration_mvhd, enabled));
    trak.add_child(mdia);
    trak
}

#[allow(clippy::too_many_arguments)]
pub fn build_trak_image(
    track_id: u32,
    timescale: u32,
    duration_ts: u64,
    stbl_image: Atom,
    width: u16,
    height: u16,
    tkhd_duration_mvhd: u64,
) -> Atom {
    let mut trak = Atom::new("trak");
    trak.add_child(build_tkhd_image(track_id, tkhd_duration_mvhd, width, height));

    let mut elst_w = ByteWriter::with_capacity(16);
    elst_w.put_u8(0).put_u24(0).put_u32(1);
    elst_w.put_u32(tkhd_duration_mvhd as u32);
    elst_w.put_u32(0); // media_time
    elst_w.put_u32(0x00010000); // media_rate = 1.0
    let elst = Atom::with_payload("elst", elst_w.into_vec());
    trak.add_child(Atom::new("edts").with_child(elst));

    let mut mdia = Atom::new("mdia");
    mdia.add_child(build_mdhd(timescale, duration_ts, LANG_ENG));
    mdia.add_child(build_hdlr("vide", "Chapter Images"));
    let mut minf = Atom::new("minf");
    minf.add_child(build_vmhd());
    minf.add_child(build_dinf());
    minf.add_child(stbl_image);
    mdia.add_child(minf);
    trak.add_child(mdia);
    trak
}

/// `mvhd`'s rate/volume/identity-matrix header.
pub fn build_mvhd(timescale: u32, duration: u64) -> Atom {
    let mut w = ByteWriter::with_capacity(100);
    w.put_u8(0).put_u24(0);
    w.put_u32(0).put_u32(0);
    w.put_u32(timescale).put_u32(duration as u32);
    w.put_u32(0x00010000); // rate = 1.0
    w.put_u16(0x0100).put_u16(0); // volume = 1.0, reserved
    w.put_u64(0); // reserved
    w.put_u32(0x00010000).put_u32(0).put_u32(0);
    w.put_u32(0).put_u32(0x00010000).put_u32(0);
    w.put_u32(0).put_u32(0).put_u32(0x40000000);
    w.put_zeros(24); // pre_defined
    w.put_u32(5); // next_track_ID
    Atom::with_payload("mvhd", w.into_vec())
}

/// `chpl`: cumulative chapter start times computed from derived durations, not
/// from `start_ms` directly — this matches the reference behavior and, per the
/// design notes, is preserved intentionally rather than "fixed".
pub fn build_chpl(samples: &[ChapterTextSample], durations_ms: &[u64]) -> Atom {
    let mut w = ByteWriter::new();
    w.put_u8(0).put_u24(0);
    let count = samples.len().min(255);
    w.put_u8(count as u8);

    let mut start: u64 = 0;
    for i in 0..count {
        w.put_u64(start);
        let title = samples[i].text.as_bytes();
        let len = title.len().min(255);
        w.put_u8(len as u8);
        w.put_bytes(&title[..len]);
        start += durations_ms.get(i).copied().unwrap_or(0);
    }
    Atom::with_payload("chpl", w.into_vec())
}

pub fn build_udta(meta_payload_source: Option<&[u8]>, meta: &crate::metadata::MetadataSet, chpl: Atom) -> Atom {
    let meta_atom = match meta_payload_source {
        Some(ilst_payload) => crate::metadata::build_meta_from_ilst_payload(ilst_payload),
        None => build_meta(crate::metadata::build_ilst(meta)),
    };
    Atom::new("udta").with_child(meta_atom).with_child(chpl)
}

pub fn build_moov(
    timescale: u32,
    duration_ts: u64,
    trak_audio: Atom,
    text_tracks: Vec<Atom>,
    trak_image: Option<Atom>,
    udta: Atom,
) -> Atom {
    let mut moov = Atom::new("moov");
    moov.add_child(build_mvhd(timescale, duration_ts));
    moov.add_child(trak_audio);
    for t in text_tracks {
        moov.add_child(t);
    }
    if let Some(image) = trak_image {
        moov.add_child(image);
    }
    moov.add_child(udta);
    moov
}
