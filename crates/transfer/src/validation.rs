use std::path::{Component, Path};

use crate::TransferError;

/// Validates a file name announced by an uploader.
///
/// The name must be a single plain path component so the file lands
/// directly inside the download directory. Rejects:
/// - Empty names
/// - Separators (`/`, and `\` on every platform)
/// - `.` and `..`
/// - Prefixes and roots (`C:`, `/`)
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidFileName("empty name".into()));
    }

    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidFileName(format!(
            "path separators not allowed: {name}"
        )));
    }

    if name.contains('\0') {
        return Err(TransferError::InvalidFileName(format!(
            "NUL byte not allowed: {name:?}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidFileName(format!(
            "parent directory not allowed: {name}"
        ))),
        _ => Err(TransferError::InvalidFileName(format!(
            "not a plain file name: {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_file_name("a.txt").is_ok());
        assert!(validate_file_name("archive.tar.gz").is_ok());
        assert!(validate_file_name(".hidden").is_ok());
        assert!(validate_file_name("with space").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn rejects_parent_dir() {
        assert!(validate_file_name("..").is_err());
    }

    #[test]
    fn rejects_current_dir() {
        assert!(validate_file_name(".").is_err());
    }

    #[test]
    fn rejects_separators() {
        assert!(validate_file_name("../../etc/passwd").is_err());
        assert!(validate_file_name("sub/file").is_err());
        assert!(validate_file_name("/tmp/malicious").is_err());
        assert!(validate_file_name("C:\\Windows\\evil").is_err());
    }

    #[test]
    fn rejects_nul() {
        assert!(validate_file_name("a\0b").is_err());
    }
}
