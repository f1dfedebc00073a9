//! JPEG encoding with an embedded text comment (COM segment).

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::error::RenderError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const COM: u8 = 0xFE;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

/// Largest COM payload a single segment can carry
const MAX_COMMENT: usize = u16::MAX as usize - 2;

/// Encode opaque RGB pixels. `comment`, when given, is written as a COM
/// segment after the JFIF header.
pub fn encode_rgb(
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
    comment: Option<&str>,
) -> Result<Vec<u8>, RenderError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::JpegEncode(e.to_string()))?;

    match comment {
        Some(text) => insert_comment(out, text),
        None => Ok(out),
    }
}

fn insert_comment(jpeg: Vec<u8>, text: &str) -> Result<Vec<u8>, RenderError> {
    if jpeg.get(0..2) != Some(&SOI[..]) {
        return Err(RenderError::JpegEncode("missing SOI marker".to_string()));
    }

    let mut payload = text.as_bytes();
    if payload.len() > MAX_COMMENT {
        let mut end = MAX_COMMENT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        payload = &payload[..end];
    }

    // JFIF requires APP0 directly after SOI
    let mut at = 2;
    if jpeg.get(3) == Some(&APP0) {
        at += 2 + segment_len(&jpeg, 2).unwrap_or(0);
    }

    let len = (payload.len() + 2) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..at]);
    out.extend_from_slice(&[0xFF, COM]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&jpeg[at..]);
    Ok(out)
}

fn segment_len(jpeg: &[u8], marker_at: usize) -> Option<usize> {
    let bytes = jpeg.get(marker_at + 2..marker_at + 4)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]) as usize)
}

/// First COM segment of a JPEG, if any. Scanning stops at start-of-scan.
pub fn read_comment(jpeg: &[u8]) -> Option<String> {
    if jpeg.get(0..2) != Some(&SOI[..]) {
        return None;
    }

    let mut at = 2;
    loop {
        if *jpeg.get(at)? != 0xFF {
            return None;
        }
        let marker = *jpeg.get(at + 1)?;
        if marker == SOS || marker == EOI {
            return None;
        }
        let len = segment_len(jpeg, at)?;
        if marker == COM {
            let body = jpeg.get(at + 4..at + 2 + len)?;
            return Some(String::from_utf8_lossy(body).into_owned());
        }
        at += 2 + len;
    }
}
