use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Working directory the uploaded images are written to.
///
/// Files are stored under the name the client sent, so two uploads with
/// the same name overwrite each other.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub async fn save(&self, filename: Option<&str>, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.dir.join(stored_name(filename));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

// Only the last component of the client-supplied name is kept, so uploads
// cannot escape the working directory.
fn stored_name(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("upload-{}", Uuid::now_v7()))
}
