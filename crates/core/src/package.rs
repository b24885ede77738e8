//! Package and resource identifiers, upload validation and derived values.

use crate::config::PackagesConfig;
use crate::slug::{file_extension, slugify};
use crate::tag::TagName;
use crate::{Error, MAX_SLUG_LEN, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parse user input. Accepts both the hyphenated and the plain
            /// 32-hex-digit form.
            pub fn parse(s: &str) -> Result<Self> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| Error::InvalidId(format!("{s:?}: {e}")))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.simple())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.simple())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a package, generated at creation and never changed.
    PackageId
);

opaque_id!(
    /// Identifier of one uploaded file.
    ResourceId
);

/// Listing sort key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Creation order.
    #[default]
    None,
    Title,
    ModifiedAt,
}

/// A sort key plus direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortOrder {
    pub key: SortKey,
    pub descending: bool,
}

impl SortOrder {
    /// Newest modification first.
    pub fn newest_first() -> Self {
        Self {
            key: SortKey::ModifiedAt,
            descending: true,
        }
    }

    /// Parse the `sort` query parameter: `title` or `updatedAt`, with an
    /// optional leading `-` for descending order. Unknown keys fall back to
    /// creation order.
    pub fn parse(raw: &str) -> Self {
        let (descending, name) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let key = match name {
            "title" => SortKey::Title,
            "updatedAt" => SortKey::ModifiedAt,
            _ => SortKey::None,
        };
        Self { key, descending }
    }
}

/// Upload validation rules derived from [`PackagesConfig`].
#[derive(Clone, Debug)]
pub struct UploadRules {
    config: PackagesConfig,
}

impl UploadRules {
    pub fn new(config: PackagesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PackagesConfig {
        &self.config
    }

    pub fn validate_title(&self, title: &str) -> Result<()> {
        check_length(
            "Title",
            title,
            self.config.title_min_len,
            self.config.title_max_len,
        )
    }

    pub fn validate_description(&self, description: &str) -> Result<()> {
        check_length(
            "Description",
            description,
            self.config.description_min_len,
            self.config.description_max_len,
        )
    }

    /// Check a sanitised filename against the allowed extensions and return
    /// its lowercased extension.
    pub fn check_filename(&self, filename: &str) -> Result<String> {
        let extension = file_extension(filename).ok_or_else(|| {
            Error::validation(format!("File has no extension: {filename}"))
        })?;
        if !self.config.allowed_extensions.contains(&extension) {
            return Err(Error::validation(format!(
                "File extension not allowed: {extension}"
            )));
        }
        Ok(extension)
    }

    /// Automatic tag for a stored filename, if it has an extension.
    pub fn extension_tag(&self, filename: &str) -> Option<TagName> {
        file_extension(filename)
            .map(|ext| TagName::for_extension(&ext, &self.config.extension_tag_aliases))
    }
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(Error::validation(format!(
            "{field} must be between {min} and {max} characters long (got {len})."
        )));
    }
    Ok(())
}

/// Parse a dependency reference.
///
/// References come from the suggestion list as `"<id> <title>"`; only the
/// part before the first space is significant. Malformed ids yield `None`.
pub fn parse_dependency_ref(raw: &str) -> Option<PackageId> {
    let id = raw.trim().split(' ').next()?;
    PackageId::parse(id).ok()
}

/// URL slug of a package title.
pub fn package_slug(title: &str) -> String {
    slugify(title, '-', Some(MAX_SLUG_LEN))
}

/// Derived full-text search document of a package.
///
/// Title, description, author and every tag title are each slugified with a
/// space separator; the non-empty results are joined with single spaces.
pub fn search_text<'a>(
    title: &str,
    description: &str,
    author: &str,
    tags: impl IntoIterator<Item = &'a TagName>,
) -> String {
    [title, description, author]
        .into_iter()
        .map(str::to_string)
        .chain(tags.into_iter().map(|t| t.as_str().to_string()))
        .map(|s| slugify(&s, ' ', None))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a free-text query into search keywords.
pub fn search_keywords(query: &str) -> Vec<String> {
    query
        .split(' ')
        .flat_map(|word| {
            slugify(word, ' ', None)
                .split(' ')
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|w| !w.is_empty())
        .collect()
}
