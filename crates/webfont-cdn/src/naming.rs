//! Deterministic naming of subset files.

use sha2::{Digest, Sha256};

/// Derives stable identifiers for subset files from `(font, variant, range ID)` keys.
///
/// The identifier is a truncated hex SHA-256 digest of `{font}-{variant}-{range_id}` followed
/// by a salt. It depends only on the key, not on the subset contents, so filenames remain stable
/// across font releases; cache invalidation must be driven by the CSS / version instead.
#[derive(Debug, Clone)]
pub struct Namer {
    salt: String,
    len: usize,
}

impl Default for Namer {
    fn default() -> Self {
        Self {
            salt: Self::DEFAULT_SALT.to_owned(),
            len: Self::DEFAULT_LEN,
        }
    }
}

impl Namer {
    /// Default salt appended to hashed keys.
    pub const DEFAULT_SALT: &'static str = "font-subset";
    /// Default identifier length in hex digits.
    pub const DEFAULT_LEN: usize = 32;
    /// Number of hex digits in a SHA-256 digest.
    const MAX_LEN: usize = 64;

    /// Creates a namer with the specified salt and identifier length. The length is capped
    /// at 64 hex digits.
    pub fn new(salt: impl Into<String>, len: usize) -> Self {
        Self {
            salt: salt.into(),
            len: len.min(Self::MAX_LEN),
        }
    }

    /// Returns the identifier for the specified key.
    pub fn name(&self, font: &str, variant: &str, range_id: &str) -> String {
        self.hash(&format!("{font}-{variant}-{range_id}"))
    }

    /// Returns the subset filename: `{font}-{variant}-{id}.woff2`.
    pub fn filename(&self, font: &str, variant: &str, range_id: &str) -> String {
        let id = self.name(font, variant, range_id);
        format!("{font}-{variant}-{id}.woff2")
    }

    fn hash(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hasher.update(self.salt.as_bytes());
        let mut digest = format!("{:x}", hasher.finalize());
        digest.truncate(self.len);
        digest
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use quickcheck::quickcheck;

    use super::*;

    #[test]
    fn name_reference_values() {
        let namer = Namer::default();
        assert_eq!(
            namer.name("Inter", "Regular", "basic-latin"),
            "26660c1a00c2720297e3a674dbd98b55"
        );
        assert_eq!(
            namer.name("NotoSansSC", "Bold", "cjk"),
            "dcbda59c417ec60bddfe60be84820cff"
        );
        assert_eq!(
            namer.filename("Inter", "Regular", "basic-latin"),
            "Inter-Regular-26660c1a00c2720297e3a674dbd98b55.woff2"
        );
    }

    #[test]
    fn custom_salt_and_len() {
        let namer = Namer::new("other-salt", 8);
        assert_eq!(namer.name("Inter", "Regular", "basic-latin"), "73a71313");

        let namer = Namer::new("font-subset", 100);
        assert_eq!(
            namer.name("Inter", "Regular", "basic-latin"),
            "26660c1a00c2720297e3a674dbd98b55bef02979e5203e5d190c5a402cb35c45"
        );
    }

    quickcheck! {
        fn name_is_pure(font: String, variant: String, range_id: String) -> bool {
            let name = Namer::default().name(&font, &variant, &range_id);
            name.len() == Namer::DEFAULT_LEN
                && name.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
                && name == Namer::default().name(&font, &variant, &range_id)
        }

        fn distinct_keys_produce_distinct_names(range_ids: HashSet<String>) -> bool {
            let namer = Namer::default();
            let names: HashSet<_> = range_ids
                .iter()
                .map(|range_id| namer.name("Inter", "Regular", range_id))
                .collect();
            names.len() == range_ids.len()
        }
    }

    #[test]
    fn no_collisions_for_realistic_catalog() {
        let namer = Namer::default();
        let fonts = ["Inter", "NotoSansSC", "LXGWWenKai", "SourceHanSerif"];
        let variants = ["Light", "Regular", "Medium", "Bold"];
        let mut names = HashSet::new();
        let mut key_count = 0;
        for font in fonts {
            for variant in variants {
                for range_idx in 0..500 {
                    names.insert(namer.name(font, variant, &format!("range-{range_idx}")));
                    key_count += 1;
                }
            }
        }
        assert_eq!(names.len(), key_count);
    }
}
