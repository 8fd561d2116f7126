use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Create the directory if it doesn’t exist; error if a non-directory exists there.
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("Path exists but is not a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Error unless the file already exists.
pub fn require_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {}", path.display());
    }
    if !path.is_file() {
        anyhow::bail!("Path exists but is not a file: {}", path.display());
    }
    Ok(())
}

/// Extracts the given `.zip` file to the target directory and returns the
/// extracted paths whose extension matches `extension` (e.g. "csv").
pub fn extract_zip(zip_path: &Path, dest_dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(zip_path)
        .map_err(|e| anyhow::anyhow!("failed to open {:?}: {}", zip_path, e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| anyhow::anyhow!("failed to read zip archive {:?}: {}", zip_path, e))?;

    let matches: Vec<PathBuf> = archive
        .file_names()
        .filter(|name| Path::new(name).extension().is_some_and(|ext| ext == extension))
        .map(|name| dest_dir.join(name))
        .collect();

    archive
        .extract(dest_dir)
        .map_err(|e| anyhow::anyhow!("failed to extract {:?} to {:?}: {}", zip_path, dest_dir, e))?;

    Ok(matches)
}
