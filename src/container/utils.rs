/// Length of a full (non-truncated) Docker container id.
pub(super) const DOCKER_ID_LENGTH: usize = 64;

/// Checks whether all bytes in the given slice are lowercase hexadecimal ASCII characters.
///
/// Returns `true` for an empty slice.
pub(super) fn is_lowercase_hex(src: &[u8]) -> bool {
    src.iter()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

/// Returns `true` if the raw id cannot be joined onto a directory without leaving it.
pub(super) fn escapes_directory(src: &str) -> bool {
    src == "." || src == ".." || src.contains('/') || src.contains('\0')
}
