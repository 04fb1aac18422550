//! Content-addressed identity of a frame set.
//!
//! The key is a blake3 digest of the first frame reference combined with the
//! number of frames. It never depends on wall-clock time, so rendering the
//! same series twice resolves to the same cached volume.

use std::fmt;

use crate::frame::FrameReference;

const DOMAIN: &str = "dicom-viewport volume identity v1";

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeIdentity {
    digest: [u8; 32],
    frame_count: usize,
}

impl VolumeIdentity {
    /// Derives the identity of an ordered frame list.
    ///
    /// An empty list yields the identity of "no frames"; callers never load
    /// anything for it.
    pub fn of(frames: &[FrameReference]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(DOMAIN);
        if let Some(first) = frames.first() {
            hasher.update(first.as_bytes());
        }
        hasher.update(&(frames.len() as u64).to_le_bytes());
        Self {
            digest: *hasher.finalize().as_bytes(),
            frame_count: frames.len(),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn short_hex(&self) -> String {
        self.digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for VolumeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "streaming-volume:{}-{}", self.short_hex(), self.frame_count)
    }
}

impl fmt::Debug for VolumeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolumeIdentity({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(prefix: &str, count: usize) -> Vec<FrameReference> {
        (0..count)
            .map(|i| FrameReference::new(format!("{prefix}/{i:04}.dcm")))
            .collect()
    }

    #[test]
    fn same_first_frame_and_length_share_identity() {
        let a = frames("dicomfile:/series-a", 40);
        let mut b = frames("dicomfile:/series-a", 40);
        // Only the first reference and the length participate.
        b[39] = FrameReference::new("dicomfile:/elsewhere/last.dcm");

        assert_eq!(VolumeIdentity::of(&a), VolumeIdentity::of(&b));
    }

    #[test]
    fn differing_length_or_first_frame_changes_identity() {
        let base = VolumeIdentity::of(&frames("dicomfile:/series-a", 40));

        assert_ne!(base, VolumeIdentity::of(&frames("dicomfile:/series-a", 39)));
        assert_ne!(base, VolumeIdentity::of(&frames("dicomfile:/series-b", 40)));
    }

    #[test]
    fn identity_is_stable_across_calls() {
        let list = frames("wadouri:https://pacs/dcm", 12);
        let first = VolumeIdentity::of(&list);
        let second = VolumeIdentity::of(&list.clone());

        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(first.frame_count(), 12);
    }

    #[test]
    fn empty_list_has_zero_frames() {
        let empty = VolumeIdentity::of(&[]);
        assert_eq!(empty.frame_count(), 0);
        assert_ne!(empty, VolumeIdentity::of(&frames("x", 1)));
    }
}
