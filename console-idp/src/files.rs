//! Files in the data directory.
//!
//! Generated configuration carries upstream client secrets, so the data
//! directory is kept at `0700` and every file written into it at `0600`.

use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Create `dir` and its parents, and restrict `dir` to its owner.
pub async fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    set_permissions(dir, 0o700).await
}

/// Replace `path` with `contents`, readable only by its owner.
///
/// The content goes to a sibling temporary file that is renamed into place,
/// so a reader never observes a partial document.
pub async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        create_private_dir(parent).await?;
    }

    let staging = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&staging).await?;
    set_permissions(&staging, 0o600).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&staging, path).await
}

#[cfg(unix)]
async fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
