//! Content verification inside a mounted snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Path of the test file for a given mountpoint.
///
/// A bare drive mountpoint such as `R:` is anchored at its root, so the
/// result is `R:\Test 1.txt` rather than the drive-relative `R:Test 1.txt`.
#[must_use]
pub fn verification_path(mountpoint: &str, test_file: &Path) -> PathBuf {
    if is_bare_drive(mountpoint) {
        PathBuf::from(format!("{mountpoint}{MAIN_SEPARATOR}")).join(test_file)
    } else {
        Path::new(mountpoint).join(test_file)
    }
}

fn is_bare_drive(mountpoint: &str) -> bool {
    let bytes = mountpoint.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Check whether `file_path` contains `expected` as a literal substring.
///
/// The whole file is read and compared byte-wise, so files that are not valid
/// UTF-8 can still be checked. An empty `expected` always matches.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be read.
pub fn verify_content(file_path: &Path, expected: &str) -> io::Result<bool> {
    let contents = fs::read(file_path)?;
    Ok(contains_bytes(&contents, expected.as_bytes()))
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}
