use chrono::{DateTime, Utc};

/// MIME type of a media payload the event did not label. Falls back to the
/// generic octet-stream type when the magic bytes are not recognized.
#[must_use]
pub fn detect_mime(data: &[u8]) -> String {
    infer::get(data)
        .map(|info| info.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

/// File extension for a MIME type. Common chat-media types are mapped
/// explicitly; anything unmapped falls back to the MIME subtype.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> String {
    let mapped = match mime_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "audio/mpeg" => Some("mp3"),
        "audio/wav" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        _ => None,
    };
    if let Some(ext) = mapped {
        return ext.to_string();
    }

    mime_type
        .parse::<mime::Mime>()
        .ok()
        .map(|mime| {
            mime.subtype()
                .as_str()
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
        })
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or_else(|| "bin".into())
}

/// Artifact filename under the temp and saved directories:
/// `{epoch_millis}_{local_id}.{ext}`.
#[must_use]
pub fn artifact_filename(now: DateTime<Utc>, message_id: &str, extension: &str) -> String {
    format!(
        "{}_{}.{extension}",
        now.timestamp_millis(),
        local_id(message_id)
    )
}

/// Message id reduced to filesystem-safe characters.
#[must_use]
pub fn local_id(message_id: &str) -> String {
    message_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{artifact_filename, detect_mime, extension_for_mime, local_id};
    use chrono::{TimeZone, Utc};

    #[test]
    fn detect_mime_png_magic_bytes() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert_eq!(detect_mime(&png), "image/png");
    }

    #[test]
    fn detect_mime_unknown_falls_back_to_octet_stream() {
        let unknown = [0x00, 0x11, 0x22, 0x33, 0x44];
        assert_eq!(detect_mime(&unknown), "application/octet-stream");
    }

    #[test]
    fn extension_for_mapped_mime_types() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("audio/ogg"), "ogg");
        assert_eq!(extension_for_mime("application/pdf"), "pdf");
    }

    #[test]
    fn extension_for_unmapped_mime_uses_subtype() {
        assert_eq!(extension_for_mime("image/heic"), "heic");
        assert_eq!(extension_for_mime("application/zip"), "zip");
    }

    #[test]
    fn extension_for_garbage_mime_uses_generic_fallback() {
        assert_eq!(extension_for_mime("not a mime"), "bin");
    }

    #[test]
    fn artifact_filename_embeds_millis_and_sanitized_id() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let name = artifact_filename(at, "true_123@c.us_AB", "jpg");
        assert_eq!(name, format!("{}_true_123-c-us_AB.jpg", at.timestamp_millis()));
    }

    #[test]
    fn local_id_replaces_unsafe_characters() {
        assert_eq!(local_id("a/b:c@d"), "a-b-c-d");
        assert_eq!(local_id("plain_id-7"), "plain_id-7");
    }
}
