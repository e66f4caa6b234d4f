use std::path::{Component, Path, PathBuf};

use md5::{Digest, Md5};

use crate::error::AppError;

pub const POSTS_SUBDIR: &str = "posts";

/// Writes uploaded image bytes under `<media_root>/posts/` and returns
/// the media-relative path stored on the post. A name collision gets a
/// content-hash suffix instead of overwriting the existing file.
pub async fn save_image(
    media_root: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<String, AppError> {
    let name = sanitize_filename(filename);
    let dir = Path::new(media_root).join(POSTS_SUBDIR);
    tokio::fs::create_dir_all(&dir).await?;

    let mut target = dir.join(&name);
    let mut relative = format!("{}/{}", POSTS_SUBDIR, name);
    if tokio::fs::metadata(&target).await.is_ok() {
        let renamed = hashed_name(&name, bytes);
        target = dir.join(&renamed);
        relative = format!("{}/{}", POSTS_SUBDIR, renamed);
    }

    tokio::fs::write(&target, bytes).await?;
    Ok(relative)
}

/// Maps a media-relative path to a filesystem path, refusing anything
/// that is not a plain relative path (absolute paths, `..` components).
pub fn resolve_media_path(media_root: &str, relative: &str) -> Option<PathBuf> {
    let rel = Path::new(relative);
    if relative.is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(Path::new(media_root).join(rel))
}

fn sanitize_filename(raw: &str) -> String {
    let base = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let trimmed = cleaned.trim_matches('.').to_string();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed
    }
}

fn hashed_name(name: &str, bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    let digest = format!("{:x}", hasher.finalize());
    let tag = &digest[..8];
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_{}.{}", stem, tag, ext),
        None => format!("{}_{}", name, tag),
    }
}
