//! URL path to filesystem path translation

use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};

/// Map a request path onto `root`
///
/// The path is percent-decoded and normalised segment by segment: empty
/// segments and `.` are dropped, `..` removes the previous segment but never
/// climbs above `root`, and anything that is not a single plain path
/// component (drive prefixes, NUL bytes) is skipped.
pub fn translate_path(root: &Path, uri_path: &str) -> PathBuf {
    let decoded = percent_decode_str(uri_path).decode_utf8_lossy();

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if is_plain_segment(s) => segments.push(s),
            _ => {}
        }
    }

    let mut path = root.to_path_buf();
    path.extend(segments);
    path
}

fn is_plain_segment(segment: &str) -> bool {
    if segment.contains('\0') {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(uri_path: &str) -> PathBuf {
        translate_path(Path::new("/srv/www"), uri_path)
    }

    #[test]
    fn test_plain_paths() {
        assert_eq!(translate("/"), PathBuf::from("/srv/www"));
        assert_eq!(translate("/css/site.css"), PathBuf::from("/srv/www/css/site.css"));
        assert_eq!(translate("//css///site.css"), PathBuf::from("/srv/www/css/site.css"));
        assert_eq!(translate("/docs/"), PathBuf::from("/srv/www/docs"));
    }

    #[test]
    fn test_percent_decoding() {
        assert_eq!(translate("/my%20file.txt"), PathBuf::from("/srv/www/my file.txt"));
        assert_eq!(translate("/caf%C3%A9"), PathBuf::from("/srv/www/café"));
    }

    #[test]
    fn test_dot_segments_stay_inside_root() {
        assert_eq!(translate("/a/./b/../c"), PathBuf::from("/srv/www/a/c"));
        assert_eq!(translate("/../../etc/passwd"), PathBuf::from("/srv/www/etc/passwd"));
        assert_eq!(translate("/%2e%2e/%2E%2E/secret"), PathBuf::from("/srv/www/secret"));
        assert_eq!(translate("/a/..%2f..%2fsecret"), PathBuf::from("/srv/www/secret"));
    }

    #[test]
    fn test_nul_segments_dropped() {
        assert_eq!(translate("/evil%00.txt/ok"), PathBuf::from("/srv/www/ok"));
    }
}
