use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Default clip file stem: the UTC capture time as `yyyy-MM-dd_HHmmss`.
pub fn timestamp_stem(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d_%H%M%S").to_string()
}

/// Claim `directory/stem.extension` for a new clip.
///
/// With `unique` set the name is created empty with `create_new`, moving on
/// to ` (1)`, ` (2)`, ... while a name is taken, so two savers never get the
/// same path. The caller owns the placeholder and must replace or remove it.
/// Without `unique` the plain name is returned untouched and an existing
/// file there will be replaced.
pub fn reserve_output_path(
    directory: &Path,
    stem: &str,
    extension: &str,
    unique: bool,
) -> io::Result<PathBuf> {
    let plain = directory.join(format!("{stem}.{extension}"));
    if !unique {
        return Ok(plain);
    }

    for n in 0u32.. {
        let path = match n {
            0 => plain.clone(),
            n => directory.join(format!("{stem} ({n}).{extension}")),
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {}", plain.display()),
    ))
}

/// Hidden sibling of `final_path` used while a clip is being written.
pub fn temp_path(final_path: &Path, suffix: &str) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip".to_string());
    let name = format!(".{stem}.{}.{suffix}", uuid::Uuid::new_v4().simple());
    final_path.with_file_name(name)
}
