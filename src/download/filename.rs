//! Local file naming for downloaded items.

use std::path::{Component, Path};

use url::Url;

/// Fallback name when a URL yields nothing usable.
const FALLBACK_FILENAME: &str = "download.bin";

/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |` and control characters) with `_`.
///
/// Names that would resolve to a path component such as `..` have their
/// dots replaced as well.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_plain_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

/// Derives the on-disk name of a binary item from the last path segment of
/// its URL. Query strings and fragments are ignored.
pub(crate) fn filename_from_url(url: &str) -> String {
    let last_segment = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });

    match last_segment {
        Some(segment) if !segment.is_empty() => {
            let decoded = urlencoding::decode(&segment)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or(segment);
            let name = sanitize_filename(&decoded);
            if name.trim_matches('_').is_empty() {
                FALLBACK_FILENAME.to_string()
            } else {
                name
            }
        }
        _ => FALLBACK_FILENAME.to_string(),
    }
}

/// Audio players do not expose a stable file name, so audio items are stored
/// under the id of the post that embeds them.
pub(crate) fn audio_filename(post_id: &str) -> String {
    format!("{}.mp3", sanitize_filename(post_id))
}

fn is_plain_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file\\name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("a:b*c?d.png"), "a_b_c_d.png");
        assert_eq!(sanitize_filename("x\u{0}y"), "x_y");
    }

    #[test]
    fn test_sanitize_filename_rejects_dot_components() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename(""), "_");
    }

    #[test]
    fn test_filename_from_url_uses_last_segment() {
        assert_eq!(
            filename_from_url("https://64.media.tumblr.com/abc/tumblr_xyz_1280.jpg"),
            "tumblr_xyz_1280.jpg"
        );
        assert_eq!(
            filename_from_url("http://vt.tumblr.com/tumblr_abc_480.mp4?play=1#t"),
            "tumblr_abc_480.mp4"
        );
    }

    #[test]
    fn test_filename_from_url_decodes_percent_escapes() {
        assert_eq!(
            filename_from_url("https://example.com/media/my%20photo.png"),
            "my photo.png"
        );
    }

    #[test]
    fn test_filename_from_url_falls_back() {
        assert_eq!(filename_from_url("https://example.com/"), "download.bin");
        assert_eq!(filename_from_url("not a url"), "download.bin");
        assert_eq!(filename_from_url("https://example.com/%2F"), "download.bin");
    }

    #[test]
    fn test_audio_filename_uses_post_id() {
        assert_eq!(audio_filename("123456"), "123456.mp3");
    }
}
