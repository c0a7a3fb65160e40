//! Source-container parser: structured `moov`/`trak`/`mdia`/`minf`/`stbl` walk,
//! with a flat byte-signature fallback scan for malformed inputs.

use crate::error::{ChapterForgeError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const MAX_ATOM_SIZE: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct TrackParseResult {
    pub track_id: u32,
    pub tkhd_flags: u32,
    pub handler_type: u32,
    pub handler_name: String,
    pub timescale: u32,
    pub duration: u64,
    pub sample_count: u32,
    pub stsd: Vec<u8>,
    pub stts: Vec<u8>,
    pub stsc: Vec<u8>,
    pub stsz: Vec<u8>,
    pub stco: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedMp4 {
    pub audio_timescale: u32,
    pub audio_duration: u64,
    pub stsd: Vec<u8>,
    pub stts: Vec<u8>,
    pub stsc: Vec<u8>,
    pub stsz: Vec<u8>,
    pub stco: Vec<u8>,
    pub meta_payload: Vec<u8>,
    pub ilst_payload: Vec<u8>,
    pub used_fallback_stbl: bool,
    pub tracks: Vec<TrackParseResult>,
}

/// Per-sample byte sizes from an `stsz` FullBox payload.
pub fn stsz_sample_sizes(stsz: &[u8]) -> Vec<u32> {
    if stsz.len() < 12 {
        return Vec::new();
    }
    let sample_size = u32::from_be_bytes(stsz[4..8].try_into().unwrap());
    let sample_count = u32::from_be_bytes(stsz[8..12].try_into().unwrap()) as usize;
    if sample_size != 0 {
        return vec![sample_size; sample_count];
    }
    let mut sizes = Vec::with_capacity(sample_count);
    let mut off = 12usize;
    for _ in 0..sample_count {
        if off + 4 > stsz.len() {
            break;
        }
        sizes.push(u32::from_be_bytes(stsz[off..off + 4].try_into().unwrap()));
        off += 4;
    }
    sizes
}

/// Absolute chunk offsets from an `stco` FullBox payload.
pub fn stco_chunk_offsets(stco: &[u8]) -> Vec<u32> {
    if stco.len() < 8 {
        return Vec::new();
    }
    let entry_count = u32::from_be_bytes(stco[4..8].try_into().unwrap()) as usize;
    let mut offsets = Vec::with_capacity(entry_count);
    let mut off = 8usize;
    for _ in 0..entry_count {
        if off + 4 > stco.len() {
            break;
        }
        offsets.push(u32::from_be_bytes(stco[off..off + 4].try_into().unwrap()));
        off += 4;
    }
    offsets
}

struct AtomHeader {
    kind: u32,
    payload_len: u64,
}

fn read_header(data: &[u8], at: usize) -> Option<(AtomHeader, usize)> {
    if at + 8 > data.len() {
        return None;
    }
    let mut size = u32::from_be_bytes(data[at..at + 4].try_into().unwrap()) as u64;
    let kind = u32::from_be_bytes(data[at + 4..at + 8].try_into().unwrap());
    let mut header_len = 8usize;
    if size == 1 {
        if at + 16 > data.len() {
            return None;
        }
        size = u64::from_be_bytes(data[at + 8..at + 16].try_into().unwrap());
        header_len = 16;
    } else if size == 0 {
        size = (data.len() - at) as u64;
    }
    if size < header_len as u64 {
        return None;
    }
    let payload_len = size - header_len as u64;
    Some((AtomHeader { kind, payload_len }, header_len))
}

/// Walk direct children of `data`, yielding `(kind, payload_slice)`. Declared
/// sizes exceeding 512 MiB or running past the buffer end are clamped to what's
/// actually available.
fn walk_atoms(data: &[u8]) -> Vec<(u32, &[u8])> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some((hdr, header_len)) = read_header(data, pos) {
        let mut payload_len = hdr.payload_len.min(MAX_ATOM_SIZE);
        let avail = (data.len() - pos - header_len) as u64;
        if payload_len > avail {
            payload_len = avail;
        }
        let start = pos + header_len;
        let end = start + payload_len as usize;
        out.push((hdr.kind, &data[start..end]));
        let advance = header_len + payload_len as usize;
        if advance == 0 {
            break;
        }
        pos += advance;
    }
    out
}

fn find_first<'a>(atoms: &[(u32, &'a [u8])], tag: &str) -> Option<&'a [u8]> {
    let target = crate::bytes::fourcc(tag);
    atoms.iter().find(|(k, _)| *k == target).map(|(_, p)| *p)
}

fn parse_hdlr(payload: &[u8]) -> (u32, String) {
    if payload.len() < 12 {
        return (0, String::new());
    }
    let handler_type = u32::from_be_bytes(payload[8..12].try_into().unwrap());
    let name_bytes = &payload[12..];
    let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();
    (handler_type, name)
}

fn parse_mdhd(payload: &[u8]) -> (u32, u64) {
    if payload.len() < 20 {
        return (0, 0);
    }
    let timescale = u32::from_be_bytes(payload[12..16].try_into().unwrap());
    let duration = u32::from_be_bytes(payload[16..20].try_into().unwrap()) as u64;
    (timescale, duration)
}

fn parse_tkhd_flags(payload: &[u8]) -> u32 {
    if payload.len() < 4 {
        return 0;
    }
    u32::from_be_bytes([0, payload[1], payload[2], payload[3]])
}

fn parse_stbl(stbl: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>) {
    let atoms = walk_atoms(stbl);
    let stsd = find_first(&atoms, "stsd").unwrap_or(&[]).to_vec();
    let stts = find_first(&atoms, "stts").unwrap_or(&[]).to_vec();
    let stsc = find_first(&atoms, "stsc").unwrap_or(&[]).to_vec();
    let stsz = find_first(&atoms, "stsz").unwrap_or(&[]).to_vec();
    let stco = find_first(&atoms, "stco").unwrap_or(&[]).to_vec();
    (stsd, stts, stsc, stsz, stco)
}

fn parse_trak(trak: &[u8]) -> Option<TrackParseResult> {
    let atoms = walk_atoms(trak);
    let tkhd = find_first(&atoms, "tkhd")?;
    let tkhd_flags = parse_tkhd_flags(tkhd);
    let track_id = if tkhd.len() >= 16 {
        u32::from_be_bytes(tkhd[12..16].try_into().unwrap())
    } else {
        0
    };

    let mdia = find_first(&atoms, "mdia")?;
    let mdia_atoms = walk_atoms(mdia);
    let mdhd = find_first(&mdia_atoms, "mdhd")?;
    let (timescale, duration) = parse_mdhd(mdhd);
    let hdlr = find_first(&mdia_atoms, "hdlr")?;
    let (handler_type, handler_name) = parse_hdlr(hdlr);

    let minf = find_first(&mdia_atoms, "minf")?;
    let minf_atoms = walk_atoms(minf);
    let stbl = find_first(&minf_atoms, "stbl")?;
    let (stsd, stts, stsc, stsz, stco) = parse_stbl(stbl);
    if stsd.is_empty() || stts.is_empty() || stsc.is_empty() || stsz.is_empty() || stco.is_empty() {
        return None;
    }
    let sample_count = stsz_sample_sizes(&stsz).len() as u32;

    Some(TrackParseResult {
        track_id,
        tkhd_flags,
        handler_type,
        handler_name,
        timescale,
        duration,
        sample_count,
        stsd,
        stts,
        stsc,
        stsz,
        stco,
    })
}

/// `meta`'s payload starts with a FullBox `version(1)||flags(3)` header before
/// its `hdlr`/`ilst` children; skip it before walking for child boxes.
fn meta_children(meta: &[u8]) -> &[u8] {
    meta.get(4..).unwrap_or(&[])
}

fn find_meta_and_ilst(moov_atoms: &[(u32, &[u8])]) -> (Vec<u8>, Vec<u8>) {
    // Either moov/meta or moov/udta/meta; both are checked since authors vary.
    if let Some(meta) = find_first(moov_atoms, "meta") {
        let ilst = find_first(&walk_atoms(meta_children(meta)), "ilst")
            .unwrap_or(&[])
            .to_vec();
        return (meta.to_vec(), ilst);
    }
    if let Some(udta) = find_first(moov_atoms, "udta") {
        let udta_atoms = walk_atoms(udta);
        if let Some(meta) = find_first(&udta_atoms, "meta") {
            let ilst = find_first(&walk_atoms(meta_children(meta)), "ilst")
                .unwrap_or(&[])
                .to_vec();
            return (meta.to_vec(), ilst);
        }
    }
    (Vec::new(), Vec::new())
}

fn find_enclosing_box<'a>(data: &'a [u8], tag: &str) -> Option<&'a [u8]> {
    let tag_bytes = tag.as_bytes();
    let mut best: Option<&[u8]> = None;
    let mut i = 0usize;
    while let Some(pos) = find_subslice(&data[i..], tag_bytes) {
        let at = i + pos;
        if at >= 4 {
            let size = u32::from_be_bytes(data[at - 4..at].try_into().unwrap()) as usize;
            if size >= 8 && at - 4 + size <= data.len() {
                let candidate = &data[at - 4..at - 4 + size];
                if best.map(|b| candidate.len() < b.len()).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }
        i = at + 4;
        if i >= data.len() {
            break;
        }
    }
    best
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn flat_scan(data: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>) {
    let stsd = find_enclosing_box(data, "stsd").map(|b| b[8..].to_vec()).unwrap_or_default();
    let stts = find_enclosing_box(data, "stts").map(|b| b[8..].to_vec()).unwrap_or_default();
    let stsc = find_enclosing_box(data, "stsc").map(|b| b[8..].to_vec()).unwrap_or_default();
    let stsz = find_enclosing_box(data, "stsz").map(|b| b[8..].to_vec()).unwrap_or_default();
    let stco = find_enclosing_box(data, "stco").map(|b| b[8..].to_vec()).unwrap_or_default();
    let ilst = find_enclosing_box(data, "ilst").map(|b| b[8..].to_vec()).unwrap_or_default();
    (stsd, stts, stsc, stsz, stco, ilst)
}

/// Parse an MP4/M4A file into its audio track plus the raw per-track tables
/// needed downstream (mux reuse, read-back). `mdat` payload bytes are never
/// copied into memory; only its header is consulted to skip past it.
pub fn parse_mp4(path: &Path) -> Result<ParsedMp4> {
    log::debug!("parse_mp4: path={}", path.display());
    let mut file = File::open(path).map_err(|e| ChapterForgeError::InputUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file_len = file
        .metadata()
        .map_err(|e| ChapterForgeError::InputUnreadable {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    if file_len == 0 {
        return Err(ChapterForgeError::InputInvalid(format!(
            "{}: zero-length file",
            path.display()
        )));
    }

    let mut moov_bytes: Option<Vec<u8>> = None;
    let mut pos: u64 = 0;
    loop {
        file.seek(SeekFrom::Start(pos)).map_err(ChapterForgeError::Io)?;
        let mut hdr_buf = [0u8; 8];
        if file.read_exact(&mut hdr_buf).is_err() {
            break;
        }
        let mut size = u32::from_be_bytes(hdr_buf[0..4].try_into().unwrap()) as u64;
        let kind = u32::from_be_bytes(hdr_buf[4..8].try_into().unwrap());
        let mut header_len = 8u64;
        if size == 1 {
            let mut ext = [0u8; 8];
            file.read_exact(&mut ext).map_err(ChapterForgeError::Io)?;
            size = u64::from_be_bytes(ext);
            header_len = 16;
        } else if size == 0 {
            size = file_len - pos;
        }
        if size < header_len {
            break;
        }
        let payload_len = (size - header_len).min(MAX_ATOM_SIZE);

        if kind == crate::bytes::fourcc("moov") {
            let mut buf = vec![0u8; payload_len as usize];
            file.read_exact(&mut buf).map_err(ChapterForgeError::Io)?;
            moov_bytes = Some(buf);
        }
        // mdat and anything else: skip without reading into memory.

        let advance = header_len + (size - header_len).min(file_len.saturating_sub(pos + header_len));
        if advance == 0 {
            break;
        }
        pos += advance;
        if pos >= file_len {
            break;
        }
    }

    let moov_bytes = match moov_bytes {
        Some(b) => b,
        None => {
            log::warn!("parse_mp4: no moov box found, falling back to flat scan");
            let mut whole = Vec::with_capacity(file_len as usize);
            file.seek(SeekFrom::Start(0)).map_err(ChapterForgeError::Io)?;
            file.read_to_end(&mut whole).map_err(ChapterForgeError::Io)?;
            return Ok(build_from_fallback(&whole));
        }
    };

    let moov_atoms = walk_atoms(&moov_bytes);
    let mut tracks = Vec::new();
    for (kind, payload) in &moov_atoms {
        if *kind == crate::bytes::fourcc("trak") {
            if let Some(t) = parse_trak(payload) {
                tracks.push(t);
            }
        }
    }
    let (meta_payload, ilst_payload) = find_meta_and_ilst(&moov_atoms);

    let audio_track = tracks
        .iter()
        .filter(|t| t.handler_type == crate::bytes::fourcc("soun"))
        .max_by_key(|t| t.sample_count);

    match audio_track {
        Some(t) => Ok(ParsedMp4 {
            audio_timescale: t.timescale,
            audio_duration: t.duration,
            stsd: t.stsd.clone(),
            stts: t.stts.clone(),
            stsc: t.stsc.clone(),
            stsz: t.stsz.clone(),
            stco: t.stco.clone(),
            meta_payload,
            ilst_payload,
            used_fallback_stbl: false,
            tracks,
        }),
        None => {
            log::warn!("parse_mp4: structured parse found no usable audio track, falling back to flat scan");
            let mut whole = Vec::with_capacity(file_len as usize);
            file.seek(SeekFrom::Start(0)).map_err(ChapterForgeError::Io)?;
            file.read_to_end(&mut whole).map_err(ChapterForgeError::Io)?;
            let mut parsed = build_from_fallback(&whole);
            parsed.meta_payload = meta_payload;
            parsed.ilst_payload = ilst_payload;
            parsed.tracks = tracks;
            Ok(parsed)
        }
    }
}

fn build_from_fallback(data: &[u8]) -> ParsedMp4 {
    let (stsd, stts, stsc, stsz, stco, ilst) = flat_scan(data);
    ParsedMp4 {
        audio_timescale: 0,
        audio_duration: 0,
        stsd,
        stts,
        stsc,
        stsz,
        stco,
        meta_payload: Vec::new(),
        ilst_payload: ilst,
        used_fallback_stbl: true,
        tracks: Vec::new(),
    }
}

impl ParsedMp4 {
    /// Whether recovery (structured or fallback) produced enough of the audio
    /// `stbl` to proceed; per the parser's failure semantics, all five tables
    /// must be non-empty.
    pub fn has_usable_audio_stbl(&self) -> bool {
        !self.stsd.is_empty()
            && !self.stts.is_empty()
            && !self.stsc.is_empty()
            && !self.stsz.is_empty()
            && !self.stco.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::Atom;
    use std::io::Write as _;

    fn build_minimal_m4a() -> Vec<u8> {
        let stsd = Atom::with_payload("stsd", vec![0u8; 8]);
        let stts = Atom::with_payload("stts", {
            let mut w = crate::bytes::ByteWriter::new();
            w.put_u8(0).put_u24(0).put_u32(1).put_u32(1).put_u32(1024);
            w.into_vec()
        });
        let stsc = Atom::with_payload("stsc", {
            let mut w = crate::bytes::ByteWriter::new();
            w.put_u8(0).put_u24(0).put_u32(1).put_u32(1).put_u32(1).put_u32(1);
            w.into_vec()
        });
        let stsz = Atom::with_payload("stsz", {
            let mut w = crate::bytes::ByteWriter::new();
            w.put_u8(0).put_u24(0).put_u32(0).put_u32(1).put_u32(100);
            w.into_vec()
        });
        let stco = Atom::with_payload("stco", {
            let mut w = crate::bytes::ByteWriter::new();
            w.put_u8(0).put_u24(0).put_u32(1).put_u32(0);
            w.into_vec()
        });
        let mut stbl = Atom::new("stbl");
        stbl.add_child(stsd);
        stbl.add_child(stts);
        stbl.add_child(stsc);
        stbl.add_child(stsz);
        stbl.add_child(stco);

        let mut minf = Atom::new("minf");
        minf.add_child(stbl);

        let mut hdlr_w = crate::bytes::ByteWriter::new();
        hdlr_w.put_u8(0).put_u24(0).put_u32(0).put_fourcc("soun");
        hdlr_w.put_u32(0).put_u32(0).put_u32(0);
        hdlr_w.put_bytes(b"sound handler\0");
        let hdlr = Atom::with_payload("hdlr", hdlr_w.into_vec());

        let mut mdhd_w = crate::bytes::ByteWriter::new();
        mdhd_w.put_u8(0).put_u24(0).put_u32(0).put_u32(0).put_u32(44100).put_u32(1024);
        mdhd_w.put_u16(0).put_u16(0);
        let mdhd = Atom::with_payload("mdhd", mdhd_w.into_vec());

        let mut mdia = Atom::new("mdia");
        mdia.add_child(mdhd);
        mdia.add_child(hdlr);
        mdia.add_child(minf);

        let mut tkhd_w = crate::bytes::ByteWriter::new();
        tkhd_w.put_u8(0).put_u24(7).put_u32(0).put_u32(0).put_u32(1).put_u32(0);
        tkhd_w.put_zeros(84 - tkhd_w.len());
        let tkhd = Atom::with_payload("tkhd", tkhd_w.into_vec());

        let mut trak = Atom::new("trak");
        trak.add_child(tkhd);
        trak.add_child(mdia);

        let mut moov = Atom::new("moov");
        moov.add_child(trak);
        let moov_bytes = moov.serialize().unwrap();

        let ftyp = Atom::with_payload("ftyp", vec![0u8; 28]);
        let ftyp_bytes = ftyp.serialize().unwrap();
        let mdat = Atom::with_payload("mdat", vec![0xAB; 100]);
        let mdat_bytes = mdat.serialize().unwrap();

        let mut file_bytes = Vec::new();
        file_bytes.extend_from_slice(&ftyp_bytes);
        file_bytes.extend_from_slice(&moov_bytes);
        file_bytes.extend_from_slice(&mdat_bytes);
        file_bytes
    }

    #[test]
    fn parses_audio_track_from_structured_walk() {
        let bytes = build_minimal_m4a();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.m4a");
        let mut f = File::create(&path).unwrap();
        f.write_all(&bytes).unwrap();
        drop(f);

        let parsed = parse_mp4(&path).unwrap();
        assert!(!parsed.used_fallback_stbl);
        assert_eq!(parsed.audio_timescale, 44100);
        assert!(parsed.has_usable_audio_stbl());
        assert_eq!(parsed.tracks.len(), 1);
        assert_eq!(parsed.tracks[0].handler_type, crate::bytes::fourcc("soun"));
    }

    #[test]
    fn stsz_sample_sizes_reads_explicit_sizes() {
        let mut w = crate::bytes::ByteWriter::new();
        w.put_u8(0).put_u24(0).put_u32(0).put_u32(2).put_u32(10).put_u32(20);
        assert_eq!(stsz_sample_sizes(w.as_slice()), vec![10, 20]);
    }

    #[test]
    fn stsz_sample_sizes_expands_uniform_size() {
        let mut w = crate::bytes::ByteWriter::new();
        w.put_u8(0).put_u24(0).put_u32(16).put_u32(3);
        assert_eq!(stsz_sample_sizes(w.as_slice()), vec![16, 16, 16]);
    }

    #[test]
    fn find_meta_and_ilst_skips_the_meta_fullbox_header() {
        let meta_set = crate::metadata::MetadataSet {
            title: "Episode 1".into(),
            ..Default::default()
        };
        let ilst = crate::metadata::build_ilst(&meta_set);
        let meta = crate::metadata::build_meta(ilst);
        let udta_bytes = Atom::new("udta").with_child(meta).serialize().unwrap();
        let udta_children = walk_atoms(&udta_bytes[8..]);

        let (_meta_payload, ilst_payload) = find_meta_and_ilst(&udta_children);
        assert!(!ilst_payload.is_empty());
        let recovered = crate::metadata::parse_ilst(&ilst_payload);
        assert_eq!(recovered.title, "Episode 1");
    }
}
