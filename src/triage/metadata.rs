//! Embedded image metadata (EXIF) extraction.
//!
//! Gated on the sniffed MIME type: anything outside `image/*` yields an empty
//! map without the file being opened. Only the primary IFD (and the Exif and
//! GPS sub-IFDs hanging off it) is reported; thumbnail tags are skipped.

use crate::core::triage::{MetadataMap, MetadataValue, TypeSniffResult};
use crate::error::{Result, TriageError};
use exif::{Field, In, Tag, Value};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use tracing::debug;

/// Image MIME types whose containers can carry an EXIF block.
const EXIF_CONTAINERS: &[&str] = &[
    "image/jpeg",
    "image/tiff",
    "image/png",
    "image/webp",
    "image/heif",
    "image/heic",
    "image/avif",
    "image/x-canon-cr2",
];

/// Extract normalized metadata for `path` given its sniff result.
pub fn extract(path: &Path, sniffed: &TypeSniffResult) -> Result<MetadataMap> {
    let Some(mime) = sniffed.mime.as_deref() else {
        return Ok(MetadataMap::new());
    };
    if !sniffed.is_image() {
        return Ok(MetadataMap::new());
    }
    if !EXIF_CONTAINERS.contains(&mime) {
        debug!(mime, "image container cannot hold EXIF");
        return Ok(MetadataMap::new());
    }

    let file = File::open(path).map_err(|e| TriageError::io_at(path, e))?;
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(MetadataMap::new()),
        Err(exif::Error::Io(e)) if e.kind() != io::ErrorKind::UnexpectedEof => {
            return Err(TriageError::io_at(path, e))
        }
        Err(e) => return Err(TriageError::UnsupportedImage(e.to_string())),
    };

    let mut map = MetadataMap::new();
    for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
        map.entry(tag_name(field.tag))
            .or_insert_with(|| normalize(field));
    }
    debug!(tags = map.len(), "metadata extracted");
    Ok(map)
}

/// Known tags by name, unknown tags by their numeric id.
fn tag_name(tag: Tag) -> String {
    if tag.description().is_some() {
        tag.to_string()
    } else {
        tag.number().to_string()
    }
}

/// Collapse single-element values to text, keep multi-element values as lists.
fn collapse(mut items: Vec<String>) -> MetadataValue {
    if items.len() == 1 {
        MetadataValue::Text(items.remove(0))
    } else {
        MetadataValue::List(items)
    }
}

fn stringify<T: ToString>(values: &[T]) -> MetadataValue {
    collapse(values.iter().map(ToString::to_string).collect())
}

fn normalize(field: &Field) -> MetadataValue {
    match &field.value {
        Value::Ascii(parts) => collapse(parts.iter().map(|p| decode_lossy(p)).collect()),
        Value::Undefined(bytes, _) if field.tag == Tag::UserComment => {
            MetadataValue::Text(decode_user_comment(bytes))
        }
        Value::Undefined(bytes, _) => MetadataValue::Text(decode_lossy(bytes)),
        Value::Byte(v) => stringify(v),
        Value::SByte(v) => stringify(v),
        Value::Short(v) => stringify(v),
        Value::SShort(v) => stringify(v),
        Value::Long(v) => stringify(v),
        Value::SLong(v) => stringify(v),
        Value::Float(v) => stringify(v),
        Value::Double(v) => stringify(v),
        Value::Rational(v) => collapse(v.iter().map(|r| format!("{}/{}", r.num, r.denom)).collect()),
        Value::SRational(v) => {
            collapse(v.iter().map(|r| format!("{}/{}", r.num, r.denom)).collect())
        }
        #[allow(unreachable_patterns)]
        _ => MetadataValue::Text(field.display_value().to_string()),
    }
}

/// Decode bytes permissively, dropping trailing NUL padding.
fn decode_lossy(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// UserComment carries an 8-byte character code before the text.
fn decode_user_comment(bytes: &[u8]) -> String {
    if bytes.len() < 8 {
        return decode_lossy(bytes);
    }
    let (code, text) = bytes.split_at(8);
    match code {
        b"UNICODE\0" => {
            let encoding = if text.len() >= 2 && text[0] == 0 {
                encoding_rs::UTF_16BE
            } else {
                encoding_rs::UTF_16LE
            };
            let (decoded, _) = encoding.decode_without_bom_handling(text);
            decoded.trim_end_matches('\0').to_string()
        }
        b"JIS\0\0\0\0\0" => {
            let (decoded, _, _) = encoding_rs::SHIFT_JIS.decode(text);
            decoded.trim_end_matches('\0').to_string()
        }
        _ => decode_lossy(text).trim_end().to_string(),
    }
}
