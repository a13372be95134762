use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

mod error;
mod utils;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// An opaque container identifier.
///
/// Only emptiness, length, and path safety are checked on construction; whether the id names a
/// real container is decided by the path resolver.
///
/// # Examples
///
/// ```
/// # use cgstat::container::ContainerID;
/// let container_id = ContainerID::new("abc123").unwrap();
/// assert_eq!(container_id.as_ref(), "abc123");
/// assert!(ContainerID::new("").is_err());
/// assert!(ContainerID::new("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty, longer than
    /// [`CONTAINER_ID_MAX_LEN`], or would escape its parent directory when used as a path
    /// component (`.`, `..`, or containing `/` or NUL).
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN || utils::escapes_directory(src) {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Parses a full Docker container id (64 lowercase hexadecimal characters).
    ///
    /// Returns `None` for anything else, including truncated ids.
    ///
    /// ```
    /// # use cgstat::container::ContainerID;
    /// let full = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    /// assert!(ContainerID::from_docker_id(full).is_some());
    /// assert!(ContainerID::from_docker_id("0123456789ab").is_none());
    /// ```
    pub fn from_docker_id(src: &str) -> Option<Self> {
        if src.len() != utils::DOCKER_ID_LENGTH || !utils::is_lowercase_hex(src.as_bytes()) {
            return None;
        }
        Some(Self(src.into()))
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for ContainerID {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_arbitrary_names() {
        let id = ContainerID::new("bad id").unwrap();
        assert_eq!(id.to_string(), "bad id");
    }

    #[test]
    fn test_new_rejects_unsafe_names() {
        for raw in ["", ".", "..", "a/b", "/abs"] {
            assert!(
                matches!(ContainerID::new(raw), Err(Error::InvalidContainerID(_))),
                "expected `{raw}` to be rejected"
            );
        }
        assert!(ContainerID::new("a".repeat(CONTAINER_ID_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_from_docker_id() {
        let full = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        assert_eq!(ContainerID::from_docker_id(full).unwrap().as_ref(), full);
        assert!(ContainerID::from_docker_id(&full.to_uppercase()).is_none());
        assert!(ContainerID::from_docker_id(&full[..63]).is_none());
    }

    #[test]
    fn test_serializes_as_string() {
        let id = ContainerID::new("abc123").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
    }
}
