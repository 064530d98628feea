use crate::error::invalid;
use anyhow::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// URL prefix uploaded files are served under.
pub const MEDIA_URL_PREFIX: &str = "/media/";

const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Stores an uploaded avatar as `<user_id>-<uuid>.<ext>` and returns the
/// public URL. The declared content type is not trusted: the bytes must
/// sniff as one of the allowed image formats.
pub fn save_avatar(
    upload_dir: &Path,
    user_id: i64,
    original_name: &str,
    data: &[u8],
    max_bytes: usize,
) -> Result<String> {
    if data.is_empty() {
        return Err(invalid("The uploaded file is empty"));
    }
    if data.len() > max_bytes {
        return Err(invalid(format!(
            "Image is too large: {} bytes (max {} bytes)",
            data.len(),
            max_bytes
        )));
    }

    let kind = infer::get(data)
        .filter(|k| ALLOWED_IMAGE_TYPES.contains(&k.mime_type()))
        .ok_or_else(|| {
            invalid(format!(
                "Avatar must be an image ({})",
                ALLOWED_IMAGE_TYPES.join(", ")
            ))
        })?;

    let filename = format!("{}-{}.{}", user_id, Uuid::new_v4(), kind.extension());

    std::fs::create_dir_all(upload_dir)?;
    std::fs::write(upload_dir.join(&filename), data)?;

    tracing::info!(
        user_id,
        original_name,
        filename = %filename,
        size = data.len(),
        "Avatar uploaded"
    );
    Ok(format!("{}{}", MEDIA_URL_PREFIX, filename))
}

/// Deletes a previously uploaded file given its public URL. URLs that do
/// not point into the upload directory are ignored.
pub fn remove_upload(upload_dir: &Path, url: &str) -> Result<()> {
    if let Some(path) = resolve_upload(upload_dir, url.trim_start_matches(MEDIA_URL_PREFIX))
        .filter(|_| url.starts_with(MEDIA_URL_PREFIX))
    {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Maps a requested file name to a path inside `upload_dir`, rejecting
/// anything that could escape it.
pub fn resolve_upload(upload_dir: &Path, filename: &str) -> Option<PathBuf> {
    let valid = !filename.is_empty()
        && !filename.starts_with('.')
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !filename.contains("..");
    valid.then(|| upload_dir.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("heartecho-media-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_save_avatar_names_file_after_user() {
        let dir = temp_dir();
        let url = save_avatar(&dir, 42, "me.png", PNG_HEADER, 1024).unwrap();
        assert!(url.starts_with("/media/42-"));
        assert!(url.ends_with(".png"));

        let name = url.trim_start_matches(MEDIA_URL_PREFIX);
        assert!(dir.join(name).exists());

        remove_upload(&dir, &url).unwrap();
        assert!(!dir.join(name).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_avatar_rejects_non_images() {
        let dir = temp_dir();
        assert!(save_avatar(&dir, 1, "notes.png", b"just some text", 1024).is_err());
        assert!(save_avatar(&dir, 1, "empty.png", b"", 1024).is_err());
    }

    #[test]
    fn test_save_avatar_rejects_oversized() {
        let dir = temp_dir();
        assert!(save_avatar(&dir, 1, "me.png", PNG_HEADER, 8).is_err());
    }

    #[test]
    fn test_resolve_upload_rejects_traversal() {
        let dir = Path::new("/srv/media");
        assert!(resolve_upload(dir, "1-abc.png").is_some());
        assert!(resolve_upload(dir, "../etc/passwd").is_none());
        assert!(resolve_upload(dir, ".hidden").is_none());
        assert!(resolve_upload(dir, "a/b.png").is_none());
        assert!(resolve_upload(dir, "").is_none());
    }
}
