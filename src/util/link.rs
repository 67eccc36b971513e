use std::path::Path;
use url::Url;

/// Builds the public URL of a file published under `base`.
///
/// Only the base name of `file` is used, so local directory structure never
/// leaks into the feed. A trailing `/` is added to `base` when missing.
///
/// When `base` is an absolute URL the name is pushed as a path segment, which
/// percent-encodes characters such as spaces. Anything else (a relative base,
/// a bare host) falls back to plain concatenation and is logged, since podcast
/// clients generally require absolute links.
///
/// # Examples
///
/// ```
/// use castfeed::util::public_link;
///
/// assert_eq!(
///     public_link("https://example.com/podcast", "/tmp/ep1.mp3"),
///     "https://example.com/podcast/ep1.mp3"
/// );
/// ```
pub fn public_link(base: &str, file: impl AsRef<Path>) -> String {
    let name = file
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut folder = base.to_string();
    if !folder.ends_with('/') {
        folder.push('/');
    }

    let mut url = match Url::parse(&folder) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(base = %base, error = %e, "Link base is not an absolute URL, concatenating");
            return folder + &name;
        }
    };

    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(&name);
    } else {
        tracing::warn!(base = %base, "Link base cannot hold a path, concatenating");
        return folder + &name;
    }

    if !matches!(url.scheme(), "http" | "https") {
        tracing::warn!(base = %base, scheme = %url.scheme(), "Link base is not an http(s) URL");
    }
    url.to_string()
}
