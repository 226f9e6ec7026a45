use crate::error::SyncError;
use crate::sync::format::FormatProfile;
use crate::sync::library;
use crate::sync::transport::Transport;
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Reserved suffix for in-flight downloads. The destination is only ever
/// replaced by renaming a completed temp file, so an interrupted transfer can
/// never leave a partial file under the final name.
pub const PARTIAL_SUFFIX: &str = ".sebsync-partial";

/// The sibling temp path used while downloading `dest`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Atomically fetch `href` into `dest`: stream to the partial sibling,
/// verify self-describing formats by re-parsing their metadata, then rename
/// over the destination. A failed verification leaves the partial file in
/// place for inspection and the destination untouched.
pub fn install(
    transport: &dyn Transport,
    href: &str,
    dest: &Path,
    profile: &FormatProfile,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let partial = partial_path(dest);
    {
        let mut body = transport.get(href, None)?;
        let mut file = fs::File::create(&partial)
            .with_context(|| format!("failed to create {}", partial.display()))?;
        io::copy(&mut body, &mut file)
            .with_context(|| format!("download of {href} failed"))?;
    }

    if profile.self_describing
        && let Err(err) = library::read_epub_metadata(&partial)
    {
        return Err(err.context(SyncError::CorruptDownload(partial)));
    }

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move download into {}", dest.display()))?;
    Ok(())
}
