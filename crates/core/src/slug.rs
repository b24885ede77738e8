//! Slug and filename canonicalisation.

use deunicode::deunicode_with_tofu;

/// Normalise free text into a slug.
///
/// The input is transliterated to ASCII and lowercased, apostrophes are
/// dropped and every other run of non-alphanumeric characters collapses into
/// a single `separator`. Leading and trailing separators never appear. When
/// `max_len` is given the slug is cut to that many characters and any
/// separator left dangling at the end is removed.
///
/// The function is idempotent: `slugify(slugify(x)) == slugify(x)`.
pub fn slugify(input: &str, separator: char, max_len: Option<usize>) -> String {
    let ascii = deunicode_with_tofu(input, "");
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push(separator);
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else if c != '\'' {
            pending_separator = true;
        }
    }

    if let Some(max_len) = max_len
        && slug.len() > max_len
    {
        slug.truncate(max_len);
        while slug.ends_with(separator) {
            slug.pop();
        }
    }

    slug
}

/// Reduce a client-supplied filename to a safe, flat ASCII name.
///
/// Path separators become whitespace, whitespace runs become `_`, only
/// `[A-Za-z0-9_.-]` survive, and leading or trailing `.`/`_` are stripped.
/// The result may be empty, in which case the upload carries no usable name.
pub fn secure_filename(name: &str) -> String {
    let ascii = deunicode_with_tofu(name, "").replace(['/', '\\'], " ");
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Lowercased extension of a filename, without the dot.
///
/// Returns `None` when the name has no dot or ends with one.
pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello, World!", '-', None), "hello-world");
        assert_eq!(slugify("  Crème Brûlée  ", '-', None), "creme-brulee");
        assert_eq!(slugify("Don't Panic", '-', None), "dont-panic");
        assert_eq!(slugify("a  --  b", ' ', None), "a b");
        assert_eq!(slugify("!!!", '-', None), "");
    }

    #[test]
    fn test_slugify_idempotent() {
        for input in ["Some Title 2", "ÄÖÜ tags", "race/puzzle", "x"] {
            let once = slugify(input, '-', Some(32));
            assert_eq!(slugify(&once, '-', Some(32)), once);
        }
    }

    #[test]
    fn test_slugify_truncates_without_trailing_separator() {
        let slug = slugify("abcdefghij klmnop", '-', Some(11));
        assert_eq!(slug, "abcdefghij");
        assert_eq!(slugify("a".repeat(40).as_str(), '-', Some(32)).len(), 32);
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool scenario.ocs"), "My_cool_scenario.ocs");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("C:\\maps\\Über.ocf"), "C_maps_Uber.ocf");
        assert_eq!(secure_filename("..."), "");
        assert_eq!(secure_filename("  _hidden.ocd_ "), "hidden.ocd");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("a.OCS").as_deref(), Some("ocs"));
        assert_eq!(file_extension("archive.tar.ocd").as_deref(), Some("ocd"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("trailing."), None);
    }
}
