use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use crate::models::Stem;

const ALLOWED_EXTENSIONS: [&str; 5] = ["mp3", "wav", "flac", "m4a", "ogg"];

/// Returns the lowercased extension when the name carries one from the
/// upload allow-list, `None` otherwise.
pub fn allowed_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn upload_path(storage_root: &Path, job_id: &str, ext: &str) -> PathBuf {
    storage_root.join("uploads").join(format!("{job_id}.{ext}"))
}

pub fn output_dir(storage_root: &Path, job_id: &str) -> PathBuf {
    storage_root.join("outputs").join(job_id)
}

pub fn stem_path(storage_root: &Path, job_id: &str, stem: Stem) -> PathBuf {
    output_dir(storage_root, job_id).join(stem.file_name())
}

/// Client-facing attachment name: original base name plus stem suffix.
pub fn download_file_name(original_name: &str, stem: Stem) -> String {
    let base = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    format!("{base}_{}.wav", stem.as_str())
}

pub async fn ensure_storage_root(storage_root: &Path) -> Result<()> {
    for dir in ["uploads", "outputs"] {
        let path = storage_root.join(dir);
        fs::create_dir_all(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

pub async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

pub async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{allowed_extension, download_file_name, stem_path, upload_path};
    use crate::models::Stem;

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        assert_eq!(allowed_extension("song.mp3"), Some("mp3".to_string()));
        assert_eq!(allowed_extension("SONG.WAV"), Some("wav".to_string()));
        assert_eq!(allowed_extension("mix.FlAc"), Some("flac".to_string()));
        assert_eq!(allowed_extension("notes.txt"), None);
        assert_eq!(allowed_extension("noextension"), None);
        assert_eq!(allowed_extension(".mp3"), None);
    }

    #[test]
    fn download_name_uses_original_base_name() {
        assert_eq!(
            download_file_name("my song.mp3", Stem::Vocals),
            "my song_vocals.wav"
        );
        assert_eq!(
            download_file_name("track.flac", Stem::Instrumental),
            "track_instrumental.wav"
        );
        assert_eq!(download_file_name("", Stem::Vocals), "audio_vocals.wav");
    }

    #[test]
    fn per_job_paths_are_namespaced_by_id() {
        let root = Path::new("storage");
        assert_eq!(
            upload_path(root, "abc", "mp3"),
            Path::new("storage/uploads/abc.mp3")
        );
        assert_eq!(
            stem_path(root, "abc", Stem::Vocals),
            Path::new("storage/outputs/abc/vocals.wav")
        );
    }
}
