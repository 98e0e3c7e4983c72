//! Document-root resolution.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::files::mapping::FileMapping;

/// Other-read permission bit (S_IROTH).
const OTHER_READ: u32 = 0o004;

/// Classification of a request path against the document root.
#[derive(Debug)]
pub enum Resolution {
    /// A servable regular file. Empty files carry no mapping.
    File {
        size: usize,
        mapping: Option<FileMapping>,
    },
    /// Exists but is not readable by others, or the path tries to leave the root.
    Forbidden,
    /// Missing, inaccessible, or the joined path is too long.
    NotFound,
    /// Directories are never served.
    Directory,
    /// Passed every check but could not be opened or mapped.
    Unavailable(io::Error),
}

/// Resolves `url_path` (which starts with `/`) under `root`.
pub fn resolve(root: &Path, url_path: &str, max_path_len: usize) -> Resolution {
    if url_path.split('/').any(|segment| segment == "..") {
        tracing::warn!(path = url_path, "rejecting parent-directory traversal");
        return Resolution::Forbidden;
    }

    let path = join(root, url_path);
    if path.as_os_str().len() > max_path_len {
        tracing::debug!(path = %path.display(), max_path_len, "path too long");
        return Resolution::NotFound;
    }

    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "stat failed");
            return Resolution::NotFound;
        }
    };

    if metadata.permissions().mode() & OTHER_READ == 0 {
        return Resolution::Forbidden;
    }
    if metadata.is_dir() {
        return Resolution::Directory;
    }

    let size = metadata.len() as usize;
    if size == 0 {
        return Resolution::File { size, mapping: None };
    }

    // The descriptor is closed when `file` drops; the mapping stays valid.
    let mapping = File::open(&path).and_then(|file| FileMapping::map(&file, size));
    match mapping {
        Ok(mapping) => Resolution::File {
            size,
            mapping: Some(mapping),
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to map file");
            Resolution::Unavailable(e)
        }
    }
}

fn join(root: &Path, url_path: &str) -> PathBuf {
    let mut joined = OsString::from(root.as_os_str());
    joined.push(url_path);
    PathBuf::from(joined)
}
