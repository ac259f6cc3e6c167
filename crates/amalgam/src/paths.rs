//! Lexical path arithmetic for the packer.
//!
//! Every path stored in the database is project-root-relative with forward
//! slashes, so all operations here are purely textual: no filesystem calls,
//! no symlink resolution. Backslashes are treated as separators (sources may
//! reference Windows-style paths), and `.`/`..` segments collapse lexically.
//! A `..` that would escape a relative path is kept, producing a leading-`..`
//! result.

/// Whether a path is absolute: starts with `/` or a drive letter + `:`.
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    let p = path.replace('\\', "/");
    if p.starts_with('/') {
        return true;
    }
    let mut chars = p.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(c), Some(':')) if c.is_ascii_alphabetic()
    )
}

/// Normalize a path: forward slashes, collapsed separators, lexical
/// `.`/`..` resolution.
#[must_use]
pub fn normalize(path: &str) -> String {
    let p = path.replace('\\', "/");

    // Split off the root: "/" for rooted paths, "C:/" for drive paths.
    let (root, rest) = if let Some(stripped) = p.strip_prefix('/') {
        ("/".to_string(), stripped)
    } else if is_absolute(&p) {
        let (drive, rest) = p.split_at(2);
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        (format!("{drive}/"), rest)
    } else {
        (String::new(), p.as_str())
    };

    let mut stack: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => match stack.last() {
                // Inside an absolute path `..` at the root is dropped;
                // in a relative path it is preserved.
                Some(&"..") | None if root.is_empty() => stack.push(".."),
                None => {}
                Some(&"..") => stack.push(".."),
                Some(_) => {
                    stack.pop();
                }
            },
            s => stack.push(s),
        }
    }

    let joined = stack.join("/");
    if root.is_empty() {
        if joined.is_empty() {
            ".".to_string()
        } else {
            joined
        }
    } else if joined.is_empty() {
        root
    } else {
        format!("{root}{joined}")
    }
}

/// Prefix `path` with `base` unless it is already absolute, then normalize.
#[must_use]
pub fn make_absolute(path: &str, base: &str) -> String {
    if is_absolute(path) {
        normalize(path)
    } else {
        normalize(&format!("{base}/{path}"))
    }
}

/// Return the suffix of `path` under `root`, or `path` unchanged when it
/// does not start with `root`. Matching happens on whole segments, so
/// `/a/bc` is not under `/a/b`.
#[must_use]
pub fn relative_to(path: &str, root: &str) -> String {
    let p = normalize(path);
    let r = normalize(root);

    if p == r {
        return String::new();
    }

    let prefix = if r.ends_with('/') {
        r.clone()
    } else {
        format!("{r}/")
    };
    p.strip_prefix(&prefix).map_or(p.clone(), String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_collapses_repeated_separators() {
        assert_eq!(normalize("a//b///c"), "a/b/c");
        assert_eq!(normalize("/a//b/"), "/a/b");
    }

    #[test]
    fn normalize_resolves_dot_segments() {
        assert_eq!(normalize("a/./b"), "a/b");
        assert_eq!(normalize("./a"), "a");
        assert_eq!(normalize("a/b/../c"), "a/c");
        assert_eq!(normalize("a/b/../../c"), "c");
    }

    #[test]
    fn normalize_converts_backslashes() {
        assert_eq!(normalize(r"src\App\Service.php"), "src/App/Service.php");
    }

    #[test]
    fn normalize_keeps_escaping_dotdot_for_relative_paths() {
        assert_eq!(normalize("../a"), "../a");
        assert_eq!(normalize("a/../../b"), "../b");
        assert_eq!(normalize("../../x"), "../../x");
    }

    #[test]
    fn normalize_drops_dotdot_at_absolute_root() {
        assert_eq!(normalize("/../a"), "/a");
        assert_eq!(normalize("/a/../../b"), "/b");
    }

    #[test]
    fn normalize_handles_drive_paths() {
        assert_eq!(normalize(r"C:\proj\src\..\lib"), "C:/proj/lib");
        assert!(is_absolute("C:/proj"));
        assert!(is_absolute(r"c:\proj"));
    }

    #[test]
    fn normalize_of_empty_is_dot() {
        assert_eq!(normalize(""), ".");
        assert_eq!(normalize("."), ".");
        assert_eq!(normalize("a/.."), ".");
    }

    #[test]
    fn make_absolute_respects_already_absolute_paths() {
        assert_eq!(make_absolute("/etc/x", "/proj"), "/etc/x");
        assert_eq!(make_absolute("src/a.php", "/proj"), "/proj/src/a.php");
    }

    #[test]
    fn relative_to_strips_root_prefix() {
        assert_eq!(relative_to("/proj/src/a.php", "/proj"), "src/a.php");
        assert_eq!(relative_to("/proj", "/proj"), "");
    }

    #[test]
    fn relative_to_leaves_outside_paths_unchanged() {
        assert_eq!(relative_to("/other/a.php", "/proj"), "/other/a.php");
        // Segment boundary: /projx is not under /proj.
        assert_eq!(relative_to("/projx/a.php", "/proj"), "/projx/a.php");
    }

    #[test]
    fn absolute_round_trip_under_root() {
        let p = "/proj/src/deep/../a.php";
        let rel = relative_to(p, "/proj");
        assert_eq!(make_absolute(&rel, "/proj"), normalize(p));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(path in r"[a-z./\\]{0,30}") {
            let once = normalize(&path);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn round_trip_for_paths_under_root(suffix in r"[a-z]{1,8}(/[a-z]{1,8}){0,4}") {
            let p = format!("/root/{suffix}");
            let rel = relative_to(&p, "/root");
            prop_assert_eq!(make_absolute(&rel, "/root"), normalize(&p));
        }
    }
}
