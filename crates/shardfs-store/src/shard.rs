//! Digest-to-path sharding.
//!
//! A digest is cut into `depth` consecutive chunks of length `2, 4, 8, ...,
//! 2^depth`, each becoming one directory level, followed by a final segment
//! holding the rest of the digest:
//!
//! ```text
//! depth = 3, digest = 2d0bd7f6c3e1a1b5f0e6f28d0b5f3c7e9a1b2c3d
//!   -> 2d/0bd7/f6c3e1a1/b5f0e6f28d0b5f3c7e9a1b2c3d
//! ```
//!
//! Few top-level directories, many leaves: fan-out near the root stays
//! bounded while leaf directories stay small.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Number of directory levels used when sharding a digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Depth(u32);

impl Depth {
    /// Default tree depth.
    pub const DEFAULT: Self = Self(3);

    /// No sharding: objects sit directly in the root.
    pub const FLAT: Self = Self(0);

    /// Validate a signed depth.
    pub fn new(depth: i64) -> StoreResult<Self> {
        u32::try_from(depth)
            .map(Self)
            .map_err(|_| StoreError::InvalidDepth(depth))
    }

    /// The depth as an unsigned level count.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for Depth {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for Depth {
    fn from(depth: u32) -> Self {
        Self(depth)
    }
}

impl From<Depth> for u32 {
    fn from(depth: Depth) -> Self {
        depth.0
    }
}

impl TryFrom<i64> for Depth {
    type Error = StoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Depth({})", self.0)
    }
}

/// Minimum digest length the scheme can consume: `2^1 + ... + 2^depth + 1`.
///
/// Saturates for depths whose requirement does not fit in `usize`.
pub fn min_digest_len(depth: Depth) -> usize {
    1usize
        .checked_shl(depth.get().saturating_add(1))
        .map_or(usize::MAX, |n| n - 1)
}

/// Lengths of the directory segments for `depth`, root first.
pub fn segment_lengths(depth: Depth) -> impl Iterator<Item = usize> {
    (1..=depth.get()).map(|level| 1usize << level)
}

/// Relative path holding the object for `digest`.
pub fn shard(digest: &str, depth: Depth) -> StoreResult<PathBuf> {
    validate_digest(digest)?;

    let min = min_digest_len(depth);
    if digest.len() < min {
        return Err(StoreError::DigestTooShort {
            digest: digest.to_string(),
            depth: depth.get(),
            min,
        });
    }

    let mut path = PathBuf::new();
    let mut rest = digest;
    for len in segment_lengths(depth) {
        let (segment, tail) = rest.split_at(len);
        push_segment(&mut path, digest, segment)?;
        rest = tail;
    }
    push_segment(&mut path, digest, rest)?;
    Ok(path)
}

/// Reassemble a digest from a relative shard path by concatenating its
/// segments.
///
/// Returns `None` if the path has non-UTF-8 or non-plain components.
pub fn unshard(relative: &Path) -> Option<String> {
    let mut digest = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => digest.push_str(segment.to_str()?),
            _ => return None,
        }
    }
    Some(digest)
}

fn validate_digest(digest: &str) -> StoreResult<()> {
    let reason = if digest.is_empty() {
        "digest is empty"
    } else if !digest.is_ascii() {
        "digest must be ASCII"
    } else if digest.contains(['/', '\\']) {
        "digest cannot contain a path separator"
    } else if digest.contains('\0') {
        "digest cannot contain NUL"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidDigest {
        digest: digest.to_string(),
        reason: reason.to_string(),
    })
}

fn push_segment(path: &mut PathBuf, digest: &str, segment: &str) -> StoreResult<()> {
    if segment == "." || segment == ".." {
        return Err(StoreError::InvalidDigest {
            digest: digest.to_string(),
            reason: format!("segment {segment:?} would escape the tree"),
        });
    }
    path.push(segment);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SHA1_HEX: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    #[test]
    fn depth_three_layout() {
        let path = shard(SHA1_HEX, Depth::DEFAULT).unwrap();
        assert_eq!(
            path,
            PathBuf::from("2a").join("ae6c").join("35c94fcf").join("b415dbe95f408b9ce91ee846ed")
        );
    }

    #[test]
    fn depth_zero_is_flat() {
        assert_eq!(shard(SHA1_HEX, Depth::FLAT).unwrap(), PathBuf::from(SHA1_HEX));
        assert_eq!(shard("a", Depth::FLAT).unwrap(), PathBuf::from("a"));
    }

    #[test]
    fn negative_depth_rejected() {
        assert!(matches!(Depth::new(-1), Err(StoreError::InvalidDepth(-1))));
        assert!(matches!(
            Depth::new(i64::from(u32::MAX) + 1),
            Err(StoreError::InvalidDepth(_))
        ));
        assert_eq!(Depth::new(5).unwrap().get(), 5);
    }

    #[test]
    fn separator_rejected() {
        let err = shard("abcdef/0123456789", Depth::DEFAULT).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDigest { .. }));
        let err = shard("abcdef\\0123456789", Depth::DEFAULT).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDigest { .. }));
    }

    #[test]
    fn traversal_segments_rejected() {
        assert!(matches!(
            shard("..", Depth::FLAT).unwrap_err(),
            StoreError::InvalidDigest { .. }
        ));
        assert!(matches!(
            shard("..abcd", Depth::new(1).unwrap()).unwrap_err(),
            StoreError::InvalidDigest { .. }
        ));
    }

    #[test]
    fn empty_and_non_ascii_rejected() {
        assert!(matches!(
            shard("", Depth::FLAT).unwrap_err(),
            StoreError::InvalidDigest { .. }
        ));
        assert!(matches!(
            shard("ééééééééééééééé", Depth::DEFAULT).unwrap_err(),
            StoreError::InvalidDigest { .. }
        ));
    }

    #[test]
    fn too_short_rejected_at_boundary() {
        let depth = Depth::DEFAULT;
        assert_eq!(min_digest_len(depth), 15);
        let err = shard(&"a".repeat(14), depth).unwrap_err();
        assert!(matches!(err, StoreError::DigestTooShort { min: 15, depth: 3, .. }));
        // Exactly the minimum leaves a one-character final segment.
        let path = shard(&"a".repeat(15), depth).unwrap();
        assert_eq!(path.components().last().unwrap().as_os_str(), "a");
    }

    #[test]
    fn min_len_saturates() {
        assert_eq!(min_digest_len(Depth::FLAT), 1);
        assert_eq!(min_digest_len(Depth::from(1)), 3);
        assert_eq!(min_digest_len(Depth::from(200)), usize::MAX);
    }

    #[test]
    fn unshard_rejects_odd_components() {
        assert_eq!(unshard(Path::new("ab/cdef/rest")).as_deref(), Some("abcdefrest"));
        assert_eq!(unshard(Path::new("../ab")), None);
        assert_eq!(unshard(Path::new("/ab")), None);
    }

    #[test]
    fn depth_serde() {
        let depth: Depth = serde_json::from_str("4").unwrap();
        assert_eq!(depth.get(), 4);
        assert_eq!(serde_json::to_string(&depth).unwrap(), "4");
        assert!(serde_json::from_str::<Depth>("-5").is_err());
        assert!(serde_json::from_str::<Depth>("\"3\"").is_err());
    }

    proptest! {
        /// Sharding yields depth + 1 segments that concatenate back to the digest.
        #[test]
        fn shard_segments_reassemble(digest in "[0-9a-f]{63,128}", depth in 0u32..=5) {
            let depth = Depth::from(depth);
            let path = shard(&digest, depth).unwrap();
            prop_assert_eq!(path.components().count(), depth.get() as usize + 1);
            prop_assert_eq!(unshard(&path).unwrap(), digest);
        }

        /// Segment lengths widen as 2, 4, 8, ...
        #[test]
        fn shard_segments_widen(digest in "[0-9a-f]{31,64}", depth in 0u32..=4) {
            let depth = Depth::from(depth);
            let path = shard(&digest, depth).unwrap();
            let lens: Vec<usize> = path
                .components()
                .map(|c| c.as_os_str().len())
                .take(depth.get() as usize)
                .collect();
            let expected: Vec<usize> = segment_lengths(depth).collect();
            prop_assert_eq!(lens, expected);
        }

        /// Sharding is a pure function of its inputs.
        #[test]
        fn shard_is_deterministic(digest in "[0-9a-f]{40}") {
            prop_assert_eq!(
                shard(&digest, Depth::DEFAULT).unwrap(),
                shard(&digest, Depth::DEFAULT).unwrap()
            );
        }
    }
}
