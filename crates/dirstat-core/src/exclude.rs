/// Exclusion predicate consulted once per directory before it is read.
use std::path::Path;

/// Decides whether a directory is skipped.
///
/// An excluded directory stays in the tree with its own attributes but is
/// never read. Implemented for closures, so `|p: &Path| ...` works too.
pub trait ExcludeRule: Send + Sync {
    fn should_exclude(&self, path: &Path) -> bool;
}

impl<F> ExcludeRule for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn should_exclude(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Simple pattern list.
///
/// A pattern containing a path separator is compared against the whole
/// path; anything else against the last component, either exactly or as a
/// `prefix*` / `*suffix` wildcard.
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    patterns: Vec<String>,
}

impl ExcludeRules {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn matches(pattern: &str, path: &Path) -> bool {
        if pattern.contains('/') {
            return path == Path::new(pattern);
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if let Some(prefix) = pattern.strip_suffix('*') {
            return name.starts_with(prefix);
        }
        if let Some(suffix) = pattern.strip_prefix('*') {
            return name.ends_with(suffix);
        }
        name == pattern
    }
}

impl ExcludeRule for ExcludeRules {
    fn should_exclude(&self, path: &Path) -> bool {
        self.patterns.iter().any(|p| Self::matches(p, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_patterns() {
        let rules = ExcludeRules::new(["node_modules", "*.snapshot", "tmp*"]);
        assert!(rules.should_exclude(Path::new("/src/app/node_modules")));
        assert!(rules.should_exclude(Path::new("/var/db.snapshot")));
        assert!(rules.should_exclude(Path::new("/tmpfiles")));
        assert!(!rules.should_exclude(Path::new("/src/app")));
    }

    #[test]
    fn test_full_path_pattern() {
        let rules = ExcludeRules::new(["/proc"]);
        assert!(rules.should_exclude(Path::new("/proc")));
        assert!(!rules.should_exclude(Path::new("/home/proc")));
    }

    #[test]
    fn test_closure_rule() {
        let rule = |path: &Path| path.ends_with("skip");
        assert!(rule.should_exclude(Path::new("/a/skip")));
        assert!(!ExcludeRules::default().should_exclude(Path::new("/a/skip")));
    }
}
