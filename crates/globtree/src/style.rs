//! Path-style adapter: POSIX, Windows, and URL path semantics.
//!
//! The matcher and planner operate exclusively on POSIX-form strings. This
//! module is the only place that knows how each style recognizes roots,
//! separators, and absoluteness, and how a native path is brought into
//! POSIX form.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Path flavor a [`Glob`](crate::Glob) is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    /// `/`-separated paths with a single `/` root.
    Posix,
    /// Drive (`C:/`) and UNC (`//host/share`) roots. Inputs may use `\` or
    /// `/` as separators; patterns are always `/`-separated.
    Windows,
    /// `scheme://authority` roots; paths are treated as opaque
    /// percent-encoded strings.
    Url,
}

/// Characters that must be percent-encoded in a URL-style literal run.
/// Existing `%xx` escapes are preserved verbatim by [`encode_url_literal`].
const URL_LITERAL: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'^')
    .add(b'|')
    .add(b'\\');

impl PathStyle {
    /// The style of the platform this process runs on.
    pub fn system() -> PathStyle {
        if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Posix
        }
    }

    /// Whether globs compiled for this style compare case-sensitively when
    /// the caller does not say otherwise.
    pub fn default_case_sensitivity(self) -> bool {
        self != PathStyle::Windows
    }

    pub(crate) fn is_separator(self, c: char) -> bool {
        c == '/' || (self == PathStyle::Windows && c == '\\')
    }

    /// Whether `path` begins with a root this style recognizes.
    pub fn is_absolute(self, path: &str) -> bool {
        self.split_root(path).is_some()
    }

    /// Splits a recognized root prefix off `path`.
    ///
    /// The returned root is in POSIX form and keeps its trailing separator
    /// (`/`, `C:/`, `//host/share/`, `http://authority/`); the remainder has
    /// any leading separators stripped.
    pub(crate) fn split_root(self, path: &str) -> Option<(String, &str)> {
        match self {
            PathStyle::Posix => {
                if path.starts_with('/') {
                    Some(("/".to_string(), path.trim_start_matches('/')))
                } else {
                    None
                }
            }
            PathStyle::Windows => {
                let mut chars = path.chars();
                let first = chars.next()?;
                let second = chars.next();
                // Drive root: `X:/` or `X:\`.
                if first.is_ascii_alphabetic() && second == Some(':') {
                    let rest = &path[2..];
                    if rest.chars().next().map(|c| self.is_separator(c)) == Some(true) {
                        let rest = rest.trim_start_matches(|c| self.is_separator(c));
                        return Some((format!("{}:/", first), rest));
                    }
                    return None;
                }
                if !self.is_separator(first) {
                    return None;
                }
                // UNC root: `//host/share` with either separator.
                if second.map(|c| self.is_separator(c)) == Some(true) {
                    if let Some((host, share, rest)) = split_unc(&path[2..], self) {
                        let rest = rest.trim_start_matches(|c| self.is_separator(c));
                        return Some((format!("//{}/{}/", host, share), rest));
                    }
                }
                // Plain (drive-relative) root.
                let rest = path.trim_start_matches(|c| self.is_separator(c));
                Some(("/".to_string(), rest))
            }
            PathStyle::Url => {
                if let Some((scheme, after)) = path.split_once("://") {
                    if !scheme.is_empty()
                        && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                        && scheme
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                    {
                        let authority_end = after.find('/').unwrap_or(after.len());
                        let authority = &after[..authority_end];
                        let rest = after[authority_end..].trim_start_matches('/');
                        return Some((format!("{}://{}/", scheme, authority), rest));
                    }
                }
                if path.starts_with('/') {
                    Some(("/".to_string(), path.trim_start_matches('/')))
                } else {
                    None
                }
            }
        }
    }

    /// Converts separators to `/` without touching the path otherwise.
    pub fn to_posix(self, path: &str) -> String {
        if self == PathStyle::Windows {
            path.replace('\\', "/")
        } else {
            path.to_string()
        }
    }

    /// Normalizes `path` into POSIX form: separators become `/`, repeated
    /// separators collapse, `.` segments drop, and `..` pops the previous
    /// non-`..` segment. Leading `..` segments on a relative path are kept;
    /// an absolute root absorbs them. An empty result is `.`.
    pub fn normalize(self, path: &str) -> String {
        let (root, rest) = match self.split_root(path) {
            Some((root, rest)) => (Some(root), rest),
            None => (None, path),
        };
        let mut segments: Vec<&str> = Vec::new();
        for segment in rest.split(|c| self.is_separator(c)) {
            match segment {
                "" | "." => {}
                ".." => match segments.last() {
                    Some(&"..") | None => {
                        if root.is_none() {
                            segments.push("..");
                        }
                    }
                    Some(_) => {
                        segments.pop();
                    }
                },
                _ => segments.push(segment),
            }
        }
        match root {
            Some(root) => format!("{}{}", root, segments.join("/")),
            None if segments.is_empty() => ".".to_string(),
            None => segments.join("/"),
        }
    }

    /// Joins `path` onto `base`; an absolute `path` replaces `base`.
    pub(crate) fn join(self, base: &str, path: &str) -> String {
        if self.is_absolute(path) || base.is_empty() {
            return path.to_string();
        }
        if base.chars().last().map(|c| self.is_separator(c)) == Some(true) {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Expresses `path` relative to `base`. Both are normalized first; the
    /// result is `None` when the two cannot be related (mixed absoluteness,
    /// or different Windows drives / URL authorities).
    pub(crate) fn relative(self, path: &str, base: &str) -> Option<String> {
        let path = self.normalize(path);
        let base = self.normalize(base);
        let (path_root, path_rest) = match self.split_root(&path) {
            Some((root, rest)) => (Some(root), rest),
            None => (None, path.as_str()),
        };
        let (base_root, base_rest) = match self.split_root(&base) {
            Some((root, rest)) => (Some(root), rest),
            None => (None, base.as_str()),
        };
        match (&path_root, &base_root) {
            (Some(p), Some(b)) if !self.roots_equal(p, b) => return None,
            (Some(_), None) | (None, Some(_)) => return None,
            _ => {}
        }
        let path_segments: Vec<&str> = path_rest.split('/').filter(|s| !s.is_empty()).collect();
        let base_segments: Vec<&str> = base_rest.split('/').filter(|s| !s.is_empty()).collect();
        let mut common = 0;
        while common < path_segments.len()
            && common < base_segments.len()
            && self.segments_equal(path_segments[common], base_segments[common])
        {
            common += 1;
        }
        // Can't climb out of a `..` prefix of a relative base.
        if base_segments[common..].iter().any(|s| *s == "..") {
            return None;
        }
        let mut out: Vec<&str> = Vec::new();
        for _ in common..base_segments.len() {
            out.push("..");
        }
        out.extend(&path_segments[common..]);
        if out.is_empty() {
            Some(".".to_string())
        } else {
            Some(out.join("/"))
        }
    }

    fn roots_equal(self, a: &str, b: &str) -> bool {
        if self == PathStyle::Windows {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }

    fn segments_equal(self, a: &str, b: &str) -> bool {
        if self == PathStyle::Windows {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }
}

fn split_unc(after_seps: &str, style: PathStyle) -> Option<(&str, &str, &str)> {
    let host_end = after_seps.find(|c| style.is_separator(c))?;
    let host = &after_seps[..host_end];
    let after_host = &after_seps[host_end + 1..];
    let share_end = after_host
        .find(|c| style.is_separator(c))
        .unwrap_or(after_host.len());
    let share = &after_host[..share_end];
    if host.is_empty() || share.is_empty() {
        return None;
    }
    Some((host, share, &after_host[share_end..]))
}

/// Percent-encodes a literal run for URL-style matching. Existing `%xx`
/// escapes pass through verbatim.
pub(crate) fn encode_url_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push_str(&utf8_percent_encode(&text[start..i], URL_LITERAL).to_string());
            out.push_str(&text[i..i + 3]);
            i += 3;
            start = i;
        } else {
            i += 1;
        }
    }
    out.push_str(&utf8_percent_encode(&text[start..], URL_LITERAL).to_string());
    out
}

/// A path style plus the current directory used to absolutize and
/// relativize paths during matching. Resolved once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathContext {
    style: PathStyle,
    current: String,
}

impl PathContext {
    /// A context for `style` with the process working directory as current
    /// (`.` for URL style, or when the working directory is unavailable).
    pub fn new(style: PathStyle) -> PathContext {
        let current = match style {
            PathStyle::Url => ".".to_string(),
            _ => std::env::current_dir()
                .map(|p| style.to_posix(&p.to_string_lossy()))
                .unwrap_or_else(|_| ".".to_string()),
        };
        PathContext { style, current }
    }

    /// The platform's context.
    pub fn system() -> PathContext {
        PathContext::new(PathStyle::system())
    }

    /// A context with an explicit current directory.
    pub fn with_current(style: PathStyle, current: impl Into<String>) -> PathContext {
        PathContext {
            style,
            current: current.into(),
        }
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    pub fn current(&self) -> &str {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_roots() {
        assert_eq!(
            PathStyle::Posix.split_root("/foo/bar"),
            Some(("/".to_string(), "foo/bar"))
        );
        assert_eq!(
            PathStyle::Posix.split_root("//foo"),
            Some(("/".to_string(), "foo"))
        );
        assert_eq!(PathStyle::Posix.split_root("foo/bar"), None);
        assert!(PathStyle::Posix.is_absolute("/"));
        assert!(!PathStyle::Posix.is_absolute("foo"));
    }

    #[test]
    fn windows_roots() {
        assert_eq!(
            PathStyle::Windows.split_root("C:\\foo"),
            Some(("C:/".to_string(), "foo"))
        );
        assert_eq!(
            PathStyle::Windows.split_root("c:/foo/bar"),
            Some(("c:/".to_string(), "foo/bar"))
        );
        assert_eq!(
            PathStyle::Windows.split_root("\\\\server\\share\\x"),
            Some(("//server/share/".to_string(), "x"))
        );
        assert_eq!(
            PathStyle::Windows.split_root("//server/share"),
            Some(("//server/share/".to_string(), ""))
        );
        assert_eq!(
            PathStyle::Windows.split_root("\\foo"),
            Some(("/".to_string(), "foo"))
        );
        assert_eq!(PathStyle::Windows.split_root("C:foo"), None);
        assert_eq!(PathStyle::Windows.split_root("foo"), None);
    }

    #[test]
    fn url_roots() {
        assert_eq!(
            PathStyle::Url.split_root("http://example.com/a/b"),
            Some(("http://example.com/".to_string(), "a/b"))
        );
        assert_eq!(
            PathStyle::Url.split_root("http://example.com"),
            Some(("http://example.com/".to_string(), ""))
        );
        assert_eq!(
            PathStyle::Url.split_root("/a/b"),
            Some(("/".to_string(), "a/b"))
        );
        assert_eq!(PathStyle::Url.split_root("a/b"), None);
        // `://` without a plausible scheme is not a root.
        assert_eq!(PathStyle::Url.split_root("1ttp://x"), None);
    }

    #[test]
    fn normalize_drops_dot_and_resolves_dotdot() {
        let posix = PathStyle::Posix;
        assert_eq!(posix.normalize("foo/./bar"), "foo/bar");
        assert_eq!(posix.normalize("foo//bar"), "foo/bar");
        assert_eq!(posix.normalize("foo/../bar"), "bar");
        assert_eq!(posix.normalize("foo/.."), ".");
        assert_eq!(posix.normalize("../foo"), "../foo");
        assert_eq!(posix.normalize("../../foo/.."), "../..");
        assert_eq!(posix.normalize("/../foo"), "/foo");
        assert_eq!(posix.normalize("/"), "/");
        assert_eq!(posix.normalize(""), ".");
    }

    #[test]
    fn normalize_windows_separators() {
        let win = PathStyle::Windows;
        assert_eq!(win.normalize("C:\\foo\\.\\bar"), "C:/foo/bar");
        assert_eq!(win.normalize("foo\\bar\\..\\baz"), "foo/baz");
        assert_eq!(win.normalize("\\\\srv\\share\\a\\..\\b"), "//srv/share/b");
    }

    #[test]
    fn join_and_relative() {
        let posix = PathStyle::Posix;
        assert_eq!(posix.join("/home/user", "src"), "/home/user/src");
        assert_eq!(posix.join("/home/user", "/etc"), "/etc");
        assert_eq!(posix.relative("/home/user/src/x", "/home/user"), Some("src/x".to_string()));
        assert_eq!(posix.relative("/home/other", "/home/user"), Some("../other".to_string()));
        assert_eq!(posix.relative("/home/user", "/home/user"), Some(".".to_string()));
        assert_eq!(posix.relative("/x", "y"), None);

        let win = PathStyle::Windows;
        assert_eq!(win.relative("D:/x", "C:/y"), None);
        assert_eq!(win.relative("C:/Foo/x", "c:/foo"), Some("x".to_string()));
    }

    #[test]
    fn url_literal_encoding() {
        assert_eq!(encode_url_literal("plain"), "plain");
        assert_eq!(encode_url_literal("a b"), "a%20b");
        // Pre-encoded escapes pass through untouched.
        assert_eq!(encode_url_literal("a%20b"), "a%20b");
        // A stray `%` is itself encoded.
        assert_eq!(encode_url_literal("100%"), "100%25");
    }

    #[test]
    fn context_defaults() {
        assert_eq!(PathContext::new(PathStyle::Url).current(), ".");
        assert!(PathStyle::Posix.default_case_sensitivity());
        assert!(!PathStyle::Windows.default_case_sensitivity());
    }
}
