//! Best-effort EXIF extraction (spec.md §4.6: "extracts EXIF (best effort)").
//! Any failure to parse falls back to image-crate dimensions and defaults;
//! a missing or corrupt EXIF block is never a reason to reject a file.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Tag};

pub type ExtractedMetadata = (u32, u32, u16, Option<DateTime<Utc>>, Option<String>, Option<(f64, f64)>);

/// Extract `(width, height, orientation, taken_at, camera, gps)` from image
/// bytes. Dimensions fall back to decoding the image itself when EXIF is
/// absent or unreadable; everything else defaults to `None`/identity.
pub fn extract(bytes: &[u8], path: &Path) -> ExtractedMetadata {
    let (mut width, mut height) = dimensions_from_bytes(bytes);
    let mut orientation = 1u16;
    let mut taken_at = None;
    let mut camera = None;
    let mut gps = None;

    if let Ok(reader) = exif::Reader::new().read_from_container(&mut std::io::Cursor::new(bytes)) {
        if let Some(field) = reader.get_field(Tag::Orientation, In::PRIMARY) {
            if let Some(v) = field.value.get_uint(0) {
                orientation = v as u16;
            }
        }
        if let Some(field) = reader.get_field(Tag::DateTimeOriginal, In::PRIMARY) {
            let raw = field.display_value().to_string();
            taken_at = parse_exif_datetime(&raw);
        }
        let make = reader.get_field(Tag::Make, In::PRIMARY).map(|f| f.display_value().to_string());
        let model = reader.get_field(Tag::Model, In::PRIMARY).map(|f| f.display_value().to_string());
        camera = match (make, model) {
            (Some(make), Some(model)) => Some(format!("{make} {model}").trim().to_string()),
            (Some(make), None) => Some(make),
            (None, Some(model)) => Some(model),
            (None, None) => None,
        };
        gps = extract_gps(&reader);
        if let (Some(w), Some(h)) = (
            reader.get_field(Tag::PixelXDimension, In::PRIMARY).and_then(|f| f.value.get_uint(0)),
            reader.get_field(Tag::PixelYDimension, In::PRIMARY).and_then(|f| f.value.get_uint(0)),
        ) {
            width = w;
            height = h;
        }
    }

    let _ = path;
    (width, height, orientation, taken_at, camera, gps)
}

fn dimensions_from_bytes(bytes: &[u8]) -> (u32, u32) {
    image::load_from_memory(bytes)
        .map(|img| (img.width(), img.height()))
        .unwrap_or((0, 0))
}

fn parse_exif_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim_matches('"');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

fn extract_gps(reader: &exif::Exif) -> Option<(f64, f64)> {
    let lat = reader.get_field(Tag::GPSLatitude, In::PRIMARY)?;
    let lat_ref = reader.get_field(Tag::GPSLatitudeRef, In::PRIMARY)?;
    let lon = reader.get_field(Tag::GPSLongitude, In::PRIMARY)?;
    let lon_ref = reader.get_field(Tag::GPSLongitudeRef, In::PRIMARY)?;

    let lat_deg = dms_to_degrees(&lat.value)?;
    let lon_deg = dms_to_degrees(&lon.value)?;
    let lat_sign = if lat_ref.display_value().to_string().contains('S') { -1.0 } else { 1.0 };
    let lon_sign = if lon_ref.display_value().to_string().contains('W') { -1.0 } else { 1.0 };
    Some((lat_deg * lat_sign, lon_deg * lon_sign))
}

fn dms_to_degrees(value: &exif::Value) -> Option<f64> {
    if let exif::Value::Rational(rationals) = value {
        if rationals.len() == 3 {
            let deg = rationals[0].to_f64();
            let min = rationals[1].to_f64();
            let sec = rationals[2].to_f64();
            return Some(deg + min / 60.0 + sec / 3600.0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_exif_datetime_handles_standard_format() {
        let parsed = parse_exif_datetime("2024-03-15 10:30:00");
        assert!(parsed.is_some());
    }

    #[test]
    fn parse_exif_datetime_rejects_garbage() {
        assert!(parse_exif_datetime("not a date").is_none());
    }
}
