use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::{current_unix_timestamp, current_unix_timestamp_ms};

/// Writes text using a temp file + rename so readers never observe partial data.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.exists() && path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("records"),
        std::process::id(),
        current_unix_timestamp_ms()
    );
    let temp_path = parent_dir.join(temp_name);
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    if let Err(error) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error).with_context(|| {
            format!(
                "failed to move temporary file {} into {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

/// Copies `path` to a sibling named `<file>.<tag>-<unix seconds>` and returns it.
///
/// The original file is left untouched.
pub fn copy_aside(path: &Path, tag: &str) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path '{}' has no file name", path.display()))?;
    let target = path.with_file_name(format!(
        "{file_name}.{tag}-{}",
        current_unix_timestamp()
    ));
    std::fs::copy(path, &target).with_context(|| {
        format!(
            "failed to copy {} to {}",
            path.display(),
            target.display()
        )
    })?;
    Ok(target)
}
