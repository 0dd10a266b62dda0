use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

/// Suffix appended to a destination's file name while its bytes are still arriving.
pub const PART_SUFFIX: &str = ".part";

static FORBIDDEN_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// returns a filename that is safe to use on Windows, Linux and Mac OS
///
/// ### Details
///
/// On Windows, filenames cannot contain the following characters: \ / : * ? " < > | ^
///
/// On Linux the only forbidden character in filenames is '/'.
///
/// On Mac OS, same as linux, plus it cannot contain ':' (kind of)
///
/// Control characters (ASCII 0-31) are also not allowed on most platforms.
///
/// This function replaces all forbidden characters with '_', and trims leading/trailing whitespace and dots,
/// which can cause issues on Windows (e.g., filenames ending with a dot or space are not allowed).
/// Manifest supplied names pass through here, so a name can never climb out of the base directory.
pub fn cleanup_filename(input: &str) -> String {
    let mut result: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' | '^' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect();
    result = result
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string();

    // avoid forbidden windows names by adding an underscore at the end if found
    let upper_result = result.to_ascii_uppercase();
    if FORBIDDEN_WINDOWS_NAMES
        .iter()
        .any(|&name| name == upper_result)
    {
        result.push('_');
    }

    if result.len() > 255 {
        let mut cut = 255;
        while !result.is_char_boundary(cut) {
            cut -= 1;
        }
        result.truncate(cut);
    }

    if result.is_empty() {
        result.push_str("download");
    }
    result
}

/// The in-progress side file for `destination`: the full file name with [`PART_SUFFIX`] appended.
///
/// `scans.tar.zip` becomes `scans.tar.zip.part`, so every run against the same
/// destination finds the same partial file.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    destination.with_file_name(name)
}

/// Length of the file at `path`, or 0 when there is no file yet.
pub async fn existing_len<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// True only for an existing regular file.
pub async fn is_file<P: AsRef<Path>>(path: P) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub fn get_partfetch_dir() -> PathBuf {
    dirs::data_dir()
        .map(|mut path| {
            path.push("partfetch");
            path
        })
        .unwrap_or_else(|| std::env::temp_dir().join("partfetch"))
}

/// Renames `src` over `dst` in one step. Whatever was at `dst` is replaced.
pub async fn atomic_replace(src: PathBuf, dst: PathBuf) -> io::Result<()> {
    tokio::task::spawn_blocking(move || atomicwrites::replace_atomic(&src, &dst))
        .await
        .map_err(io::Error::other)??;

    Ok(())
}
