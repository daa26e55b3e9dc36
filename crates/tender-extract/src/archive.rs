use std::io::{Cursor, Read};

use tracing::debug;

use crate::ExtractError;

/// One file pulled out of a tender archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the archive, `/`-separated.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }
}

pub(crate) fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Directories, macOS resource forks, hidden files and Office lock files.
fn is_noise(path: &str) -> bool {
    if path.ends_with('/') {
        return true;
    }
    if path
        .split(['/', '\\'])
        .any(|component| component == "__MACOSX")
    {
        return true;
    }
    let base = base_name(path);
    base.is_empty() || base.starts_with('.') || base.starts_with("~$") || base.starts_with("__")
}

pub fn unpack_archive(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().replace('\\', "/");
        if file.is_dir() || is_noise(&name) {
            debug!(entry = %name, "skipping archive entry");
            continue;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        entries.push(ArchiveEntry { name, bytes: buf });
    }
    Ok(entries)
}
