//! Minimal JPEG marker scanner: just enough to recover dimensions and detect
//! 4:2:0 chroma subsampling. This crate never decodes pixel data; JPEGs are
//! passed through verbatim.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u16,
    pub height: u16,
    pub is_yuv420: bool,
}

const SOF_MARKERS: [u8; 13] = [
    0xC0, 0xC1, 0xC2, 0xC3, 0xC5, 0xC6, 0xC7, 0xC9, 0xCA, 0xCB, 0xCD, 0xCE, 0xCF,
];

/// Scan markers after SOI for the first SOF segment; returns `None` if the bytes
/// don't start with a JPEG SOI marker or no SOF is found before SOS/EOI.
pub fn parse_jpeg_info(data: &[u8]) -> Option<JpegInfo> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut i = 2usize;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        // Markers with no payload length (standalone).
        if marker == 0xD8 || marker == 0xD9 || (0xD0..=0xD7).contains(&marker) {
            i += 2;
            continue;
        }
        if i + 4 > data.len() {
            break;
        }
        let segment_length = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if marker == 0xDA {
            // SOS: entropy-coded data follows, no more markers to scan for our purposes.
            break;
        }
        if SOF_MARKERS.contains(&marker) && segment_length >= 7 {
            let base = i + 4;
            if base + 5 > data.len() {
                return None;
            }
            let height = u16::from_be_bytes([data[base + 1], data[base + 2]]);
            let width = u16::from_be_bytes([data[base + 3], data[base + 4]]);
            let num_components = data[base + 5] as usize;
            let mut is_yuv420 = false;
            if num_components == 3 && base + 5 + 3 * 3 <= data.len() {
                let comp = |n: usize| {
                    let off = base + 6 + n * 3;
                    (data[off + 1] >> 4, data[off + 1] & 0x0F)
                };
                let (h1, v1) = comp(0);
                let (h2, v2) = comp(1);
                let (h3, v3) = comp(2);
                is_yuv420 = h1 == 2 && v1 == 2 && h2 == 1 && v2 == 1 && h3 == 1 && v3 == 1;
            }
            return Some(JpegInfo {
                width,
                height,
                is_yuv420,
            });
        }
        i += 2 + segment_length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sof0_jpeg(width: u16, height: u16, subsampling: [(u8, u8); 3]) -> Vec<u8> {
        let mut b = vec![0xFF, 0xD8]; // SOI
        b.extend_from_slice(&[0xFF, 0xC0]); // SOF0
        let segment_length: u16 = 8 + 3 * 3;
        b.extend_from_slice(&segment_length.to_be_bytes());
        b.push(8); // precision
        b.extend_from_slice(&height.to_be_bytes());
        b.extend_from_slice(&width.to_be_bytes());
        b.push(3); // num components
        for (i, (h, v)) in subsampling.iter().enumerate() {
            b.push(i as u8 + 1);
            b.push((h << 4) | v);
            b.push(0); // quant table id
        }
        b.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]); // SOS, stub
        b
    }

    #[test]
    fn detects_420_subsampling() {
        let data = sof0_jpeg(400, 400, [(2, 2), (1, 1), (1, 1)]);
        let info = parse_jpeg_info(&data).unwrap();
        assert_eq!(info.width, 400);
        assert_eq!(info.height, 400);
        assert!(info.is_yuv420);
    }

    #[test]
    fn detects_non_420_subsampling() {
        let data = sof0_jpeg(400, 400, [(2, 1), (1, 1), (1, 1)]);
        let info = parse_jpeg_info(&data).unwrap();
        assert!(!info.is_yuv420);
    }

    #[test]
    fn rejects_non_jpeg_bytes() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert!(parse_jpeg_info(&png).is_none());
    }
}
