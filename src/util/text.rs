use thiserror::Error;

/// Characters that would break the surrounding markup if an episode field
/// were spliced into the feed as-is.
const UNSAFE_CHARS: [char; 2] = ['<', '&'];

/// Reasons an episode text field is refused before it reaches the feed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextError {
    #[error("'{field}' must not be empty")]
    Empty { field: &'static str },

    #[error("'{field}' may not contain '{found}' (markup characters '<' and '&' are rejected)")]
    UnsafeChar { field: &'static str, found: char },
}

/// Checks an episode text field (title, description) for feed safety.
///
/// This is not a markup validator. It only rejects blank values and the
/// characters that start a tag or an entity reference, matching what the
/// publishing workflow has always accepted.
///
/// # Examples
///
/// ```
/// use castfeed::util::check_feed_text;
///
/// assert!(check_feed_text("Title", "Episode 12: Ownership").is_ok());
/// assert!(check_feed_text("Title", "Q&A").is_err());
/// assert!(check_feed_text("Title", "   ").is_err());
/// ```
pub fn check_feed_text(field: &'static str, value: &str) -> Result<(), TextError> {
    if value.trim().is_empty() {
        return Err(TextError::Empty { field });
    }

    match value.chars().find(|c| UNSAFE_CHARS.contains(c)) {
        Some(found) => Err(TextError::UnsafeChar { field, found }),
        None => Ok(()),
    }
}

/// Checks both episode text fields, title first.
pub fn check_episode_text(title: &str, description: &str) -> Result<(), TextError> {
    check_feed_text("Title", title)?;
    check_feed_text("Description", description)
}

/// Returns true if the path-like string ends in one of `extensions`,
/// compared case-insensitively. Extensions are given without the dot.
pub fn has_extension(name: &str, extensions: &[&str]) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_accepted() {
        assert_eq!(check_feed_text("Title", "Ep1"), Ok(()));
        assert_eq!(
            check_feed_text("Description", "Quotes \"and\" 'apostrophes' > are fine"),
            Ok(())
        );
    }

    #[test]
    fn test_angle_bracket_rejected() {
        assert_eq!(
            check_feed_text("Title", "a <b> c"),
            Err(TextError::UnsafeChar {
                field: "Title",
                found: '<'
            })
        );
    }

    #[test]
    fn test_ampersand_rejected() {
        let err = check_feed_text("Description", "Rock & Roll").unwrap_err();
        assert_eq!(
            err,
            TextError::UnsafeChar {
                field: "Description",
                found: '&'
            }
        );
        assert!(err.to_string().contains("Description"));
    }

    #[test]
    fn test_blank_rejected() {
        assert_eq!(
            check_feed_text("Title", ""),
            Err(TextError::Empty { field: "Title" })
        );
        assert_eq!(
            check_feed_text("Title", " \t\n"),
            Err(TextError::Empty { field: "Title" })
        );
    }

    #[test]
    fn test_episode_text_checks_title_then_description() {
        assert_eq!(check_episode_text("Ep1", "First"), Ok(()));
        assert_eq!(
            check_episode_text("<Ep1>", "Q&A"),
            Err(TextError::UnsafeChar {
                field: "Title",
                found: '<'
            })
        );
        assert_eq!(
            check_episode_text("Ep1", "Q&A"),
            Err(TextError::UnsafeChar {
                field: "Description",
                found: '&'
            })
        );
    }

    #[test]
    fn test_has_extension_case_insensitive() {
        assert!(has_extension("cover.PNG", &["png", "jpg"]));
        assert!(has_extension("https://cdn.example.com/a/cover.jpg", &["png", "jpg"]));
        assert!(!has_extension("cover.gif", &["png", "jpg"]));
        assert!(!has_extension("cover", &["png"]));
    }
}
