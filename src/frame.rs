use std::fmt;
use std::path::PathBuf;

/// Opaque, stable reference to one retrievable 2D frame, e.g.
/// `wadouri:https://pacs/dcm/a/b/c/0001.dcm` or `dicomfile:/data/0001.dcm`.
///
/// Position inside the containing list is acquisition order and is never
/// re-sorted by this crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameReference(String);

impl FrameReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Scheme prefix up to the first `:`, if the reference carries one.
    ///
    /// Single letters are not treated as schemes so Windows drive paths
    /// (`C:\...`) stay bare paths.
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once(':')?;
        let valid = scheme.len() > 1
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        valid.then_some(scheme)
    }

    /// Local file path for `dicomfile:`, `file://` and bare path references.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self.scheme() {
            None => Some(PathBuf::from(&self.0)),
            Some("dicomfile") => Some(PathBuf::from(&self.0["dicomfile:".len()..])),
            Some("file") => {
                let rest = &self.0["file:".len()..];
                Some(PathBuf::from(rest.strip_prefix("//").unwrap_or(rest)))
            }
            Some(_) => None,
        }
    }
}

impl fmt::Display for FrameReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameReference {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FrameReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_parsed_from_prefix() {
        let reference = FrameReference::new("wadouri:https://pacs.local/dcm/1.dcm");
        assert_eq!(reference.scheme(), Some("wadouri"));
        assert_eq!(reference.local_path(), None);
    }

    #[test]
    fn local_paths_resolve_for_file_schemes() {
        assert_eq!(
            FrameReference::new("dicomfile:/data/1.dcm").local_path(),
            Some(PathBuf::from("/data/1.dcm"))
        );
        assert_eq!(
            FrameReference::new("file:///data/2.dcm").local_path(),
            Some(PathBuf::from("/data/2.dcm"))
        );
        assert_eq!(
            FrameReference::new("/data/3.dcm").local_path(),
            Some(PathBuf::from("/data/3.dcm"))
        );
    }

    #[test]
    fn drive_letter_is_not_a_scheme() {
        let reference = FrameReference::new("C:\\scans\\1.dcm");
        assert_eq!(reference.scheme(), None);
        assert!(reference.local_path().is_some());
    }
}
