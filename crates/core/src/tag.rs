//! Canonical tag titles.
//!
//! Two kinds of tags share one namespace. User tags are slugs and therefore
//! never start with a dot. Automatic tags are derived from file extensions
//! and always start with a dot (`.scenario`, `.objects`, `.txt`), so the two
//! kinds cannot collide.

use crate::slug::slugify;
use crate::{MAX_TAG_LEN, MIN_TAG_LEN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A canonical tag title.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagName(String);

impl TagName {
    /// Canonicalise a user-supplied tag.
    ///
    /// Returns `None` when the slug is shorter than the minimum tag length.
    pub fn user(raw: &str) -> Option<Self> {
        let slug = slugify(raw, '-', Some(MAX_TAG_LEN));
        if slug.len() < MIN_TAG_LEN {
            return None;
        }
        Some(Self(slug))
    }

    /// Automatic tag for a file extension, folded through the alias table.
    ///
    /// `aliases` maps a bare extension (`ocs`) to the umbrella name it is
    /// filed under (`scenario`).
    pub fn for_extension(extension: &str, aliases: &BTreeMap<String, String>) -> Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        let name = aliases.get(&extension).unwrap_or(&extension);
        let mut title = format!(".{name}");
        if title.len() > MAX_TAG_LEN {
            let mut cut = MAX_TAG_LEN;
            while !title.is_char_boundary(cut) {
                cut -= 1;
            }
            title.truncate(cut);
        }
        Self(title)
    }

    /// Wrap a title read back from storage.
    pub fn from_stored(title: impl Into<String>) -> Self {
        Self(title.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this tag was derived from a file extension.
    pub fn is_automatic(&self) -> bool {
        self.0.starts_with('.')
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TagName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> BTreeMap<String, String> {
        crate::config::default_extension_tag_aliases()
    }

    #[test]
    fn test_user_tags_are_slugs() {
        assert_eq!(TagName::user("Race Track").unwrap().as_str(), "race-track");
        assert_eq!(TagName::user(".ocs").unwrap().as_str(), "ocs");
        assert!(TagName::user("x").is_none());
        assert!(TagName::user("  !! ").is_none());
        assert!(!TagName::user("puzzle").unwrap().is_automatic());
    }

    #[test]
    fn test_user_tags_truncated() {
        let tag = TagName::user(&"long".repeat(20)).unwrap();
        assert_eq!(tag.as_str().len(), MAX_TAG_LEN);
    }

    #[test]
    fn test_extension_aliases() {
        let aliases = aliases();
        assert_eq!(TagName::for_extension("ocs", &aliases).as_str(), ".scenario");
        assert_eq!(TagName::for_extension("OCF", &aliases).as_str(), ".scenario");
        assert_eq!(TagName::for_extension(".ocd", &aliases).as_str(), ".objects");
        assert_eq!(TagName::for_extension("txt", &aliases).as_str(), ".txt");
        assert!(TagName::for_extension("ocs", &aliases).is_automatic());
    }

    #[test]
    fn test_user_tag_never_collides_with_auto_tag() {
        let aliases = aliases();
        let user = TagName::user(".scenario").unwrap();
        assert_ne!(user, TagName::for_extension("ocs", &aliases));
    }
}
