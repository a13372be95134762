use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Error that occurs when opening or reading a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to read file `{path}`: {source}")]
pub struct FileReadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use cgstat::fsutil;
/// let reader = fsutil::open_file_reader("/proc/self/mountinfo")?;
/// # Ok::<(), fsutil::FileReadError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileReadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Opens the file once and reads it to the end in a single pass.
///
/// Pseudo-files under `/sys/fs/cgroup` and `/proc` are generated on open, so one open plus one
/// read yields a consistent snapshot of the counters they expose.
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened or read.
pub fn read_snapshot(path: impl AsRef<Path>) -> Result<String, FileReadError> {
    let path = path.as_ref();
    let mut reader = open_file_reader(path)?;
    let mut contents = String::with_capacity(512);
    reader
        .read_to_string(&mut contents)
        .map_err(|source| FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
    log::trace!("read {} bytes from `{}`", contents.len(), path.display());
    Ok(contents)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_open_file_reader_success() {
        let tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
        let path = tmp.path();
        let reader = open_file_reader(path).expect("should open test file");
        let metadata = reader.get_ref().metadata().unwrap();
        assert!(metadata.is_file());
    }

    #[test]
    fn test_open_file_reader_error() {
        let result = open_file_reader("/definitely/does/not/exist");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.path, PathBuf::from("/definitely/does/not/exist"));
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_snapshot_returns_whole_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "user 100\nsystem 50\n").unwrap();
        let contents = read_snapshot(tmp.path()).unwrap();
        assert_eq!(contents, "user 100\nsystem 50\n");
    }

    #[test]
    fn test_read_snapshot_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_snapshot(dir.path()).unwrap_err();
        assert_eq!(err.path, dir.path());
    }
}
