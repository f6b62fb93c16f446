//! Remote path resolution against the configured root

/// Resolve `path` against `root`
///
/// Absolute paths are kept, relative ones are appended to `root`, and runs of
/// `/` collapse to one. The result never ends with `/` unless it is `/`.
pub fn full_path(root: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else if path.is_empty() || path == "." {
        root.to_string()
    } else {
        format!("{root}/{path}")
    };

    let segments: Vec<&str> = joined
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Cumulative prefixes of an absolute path: `/a/b` gives `/a`, `/a/b`
pub fn ancestors_inclusive(absolute: &str) -> Vec<String> {
    let mut current = String::new();
    absolute
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            current.push('/');
            current.push_str(segment);
            current.clone()
        })
        .collect()
}

/// Directories `mkdir` has to walk to create `absolute`
///
/// The connected root already exists, so for targets inside it only the
/// ancestors strictly below the root are returned.
pub fn ancestors_below_root(root: &str, absolute: &str) -> Vec<String> {
    let root = full_path(root, "");
    if absolute == root {
        return Vec::new();
    }
    let prefix = if root == "/" { root.clone() } else { format!("{root}/") };
    let mut ancestors = ancestors_inclusive(absolute);
    if absolute.starts_with(&prefix) {
        ancestors.retain(|directory| directory.starts_with(&prefix));
    }
    ancestors
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/html", "", "/html")]
    #[case("/html", ".", "/html")]
    #[case("/html", "a/b.txt", "/html/a/b.txt")]
    #[case("/html", "/etc/motd", "/etc/motd")]
    #[case("/", "a", "/a")]
    #[case("/html/", "a//b/", "/html/a/b")]
    #[case("/html", "/", "/")]
    fn test_full_path(#[case] root: &str, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(full_path(root, path), expected);
    }

    #[test]
    fn test_ancestors_inclusive() {
        assert_eq!(ancestors_inclusive("/html/a/b"), vec!["/html", "/html/a", "/html/a/b"]);
        assert!(ancestors_inclusive("/").is_empty());
    }

    #[rstest]
    #[case("/html", "/html/a/b", &["/html/a", "/html/a/b"])]
    #[case("/html/", "/html/a", &["/html/a"])]
    #[case("/html", "/html", &[])]
    #[case("/", "/a/b", &["/a", "/a/b"])]
    #[case("/html", "/htmlx/a", &["/htmlx", "/htmlx/a"])]
    #[case("/srv/www", "/tmp/x", &["/tmp", "/tmp/x"])]
    fn test_ancestors_below_root(#[case] root: &str, #[case] absolute: &str, #[case] expected: &[&str]) {
        assert_eq!(ancestors_below_root(root, absolute), expected);
    }
}
