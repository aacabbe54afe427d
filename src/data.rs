use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::Path;

/// Image bytes sent alongside the transcription prompt.
#[derive(Debug, Clone)]
pub struct DataAttachment {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

impl DataAttachment {
    /// Base64 payload in the form the relay endpoint accepts.
    pub fn encoded(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

pub fn load_attachment(path: &Path, mime_hint: Option<&str>) -> Result<DataAttachment> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image file: {}", path.display()))?;
    let mime = resolve_mime(mime_hint.unwrap_or("auto"), &bytes, Some(path))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string());
    Ok(DataAttachment { bytes, mime, name })
}

/// Decodes the `imageData` field of a request. A `data:<mime>;base64,` prefix
/// is stripped; its media type is returned when present.
pub fn decode_image_data(
    image_data: &str,
) -> Result<(Vec<u8>, Option<String>), base64::DecodeError> {
    let trimmed = image_data.trim();
    let (declared, payload) = match trimmed
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
    {
        Some((header, payload)) => {
            let mime = header
                .split(';')
                .next()
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty());
            (mime, payload)
        }
        None => (None, trimmed),
    };
    let compact: String = payload.split_whitespace().collect();
    let bytes = BASE64.decode(compact.as_bytes())?;
    Ok((bytes, declared))
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    let kind = infer::get(bytes)?;
    let detected = kind.mime_type();
    detected.starts_with("image/").then_some(detected)
}

fn resolve_mime(input: &str, bytes: &[u8], path: Option<&Path>) -> Result<String> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(anyhow!("mime is empty"));
    }
    let lower = raw.to_lowercase();

    if lower == "auto" || lower == "image" || lower == "image/*" {
        return detect_mime(bytes, path);
    }
    if let Some(mime) = mime_from_extension(&lower) {
        return Ok(mime.to_string());
    }
    if lower.starts_with("image/") {
        return Ok(lower);
    }

    Err(anyhow!(
        "unsupported mime '{}' (expected auto, image/*, png, jpg, webp, gif, bmp, tiff, heic)",
        raw
    ))
}

fn detect_mime(bytes: &[u8], path: Option<&Path>) -> Result<String> {
    if let Some(detected) = sniff_mime(bytes) {
        return Ok(detected.to_string());
    }

    if let Some(mime) = path
        .and_then(|path| path.extension())
        .and_then(|value| value.to_str())
        .and_then(|ext| mime_from_extension(&ext.to_lowercase()))
    {
        return Ok(mime.to_string());
    }

    Err(anyhow!(
        "unable to detect an image type for '{}'",
        path.map(|value| value.display().to_string())
            .unwrap_or_else(|| "stdin".to_string())
    ))
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn data_url_prefix_is_stripped() {
        let encoded = BASE64.encode(b"abc");
        let (bytes, mime) = decode_image_data(&format!("data:image/png;base64,{}", encoded)).unwrap();
        assert_eq!(bytes, b"abc");
        assert_eq!(mime.as_deref(), Some("image/png"));

        let (bytes, mime) = decode_image_data(&encoded).unwrap();
        assert_eq!(bytes, b"abc");
        assert_eq!(mime, None);

        assert!(decode_image_data("not base64!").is_err());
    }

    #[test]
    fn mime_comes_from_content_before_extension() {
        assert_eq!(sniff_mime(PNG_HEADER), Some("image/png"));
        assert_eq!(sniff_mime(b"%PDF-1.7"), None);
        assert_eq!(
            resolve_mime("auto", PNG_HEADER, Some(Path::new("scan.jpg"))).unwrap(),
            "image/png"
        );
        assert_eq!(
            resolve_mime("auto", b"??", Some(Path::new("scan.JPG"))).unwrap(),
            "image/jpeg"
        );
        assert_eq!(resolve_mime("webp", b"", None).unwrap(), "image/webp");
        assert!(resolve_mime("auto", b"??", None).is_err());
        assert!(resolve_mime("pdf", b"", None).is_err());
    }

    #[test]
    fn load_attachment_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, PNG_HEADER).unwrap();
        let attachment = load_attachment(&path, None).unwrap();
        assert_eq!(attachment.mime, "image/png");
        assert_eq!(attachment.name.as_deref(), Some("page.png"));
        assert_eq!(attachment.encoded(), BASE64.encode(PNG_HEADER));
    }
}
