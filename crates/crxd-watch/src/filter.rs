//! Include/exclude glob filtering.

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::WatchError;

/// Patterns that are never watched, whatever the configuration says.
const BUILTIN_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/DumpStack.log*",
    "**/System Volume Information/**",
];

/// Characters that end the literal prefix of a glob.
const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Decides which paths under the watch root qualify as changes.
#[derive(Clone, Debug)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    roots: Vec<PathBuf>,
}

impl PathFilter {
    /// Build a filter.
    ///
    /// `output_dir` is the build output directory name relative to the root;
    /// it is always excluded along with the operating-system artifacts in
    /// the built-in list.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern is not a valid glob.
    pub fn new(
        include: &[String],
        exclude: &[String],
        output_dir: &str,
    ) -> Result<Self, WatchError> {
        let output_exclude = format!("**/{}/**", output_dir.trim_matches('/'));

        let roots = watch_roots(include);
        let include = include
            .iter()
            .map(String::as_str)
            .map(compile)
            .collect::<Result<_, _>>()?;
        let exclude = BUILTIN_EXCLUDES
            .iter()
            .copied()
            .chain(std::iter::once(output_exclude.as_str()))
            .chain(exclude.iter().map(String::as_str))
            .map(compile)
            .collect::<Result<_, _>>()?;

        Ok(Self {
            include,
            exclude,
            roots,
        })
    }

    /// Directories, relative to the watch root, that can hold a match.
    ///
    /// Each is the literal directory prefix of an include pattern. Nested
    /// prefixes collapse into their parent; an empty path is the root itself.
    #[must_use]
    pub fn watch_roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check a path relative to the watch root.
    #[must_use]
    pub fn matches(&self, relative: &Path) -> bool {
        self.include.iter().any(|p| p.matches_path(relative))
            && !self.exclude.iter().any(|p| p.matches_path(relative))
    }
}

fn watch_roots(include: &[String]) -> Vec<PathBuf> {
    let mut prefixes: Vec<PathBuf> = include
        .iter()
        .map(String::as_str)
        .map(literal_dir)
        .collect();
    prefixes.sort();
    prefixes.dedup();

    let mut roots: Vec<PathBuf> = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        // Sorted order puts a parent before its children.
        if !roots.iter().any(|root| prefix.starts_with(root)) {
            roots.push(prefix);
        }
    }
    roots
}

/// Leading path components of `pattern` that contain no glob syntax.
fn literal_dir(pattern: &str) -> PathBuf {
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();
    let literal = components
        .iter()
        .take_while(|c| !c.contains(GLOB_META))
        .count();
    // A pattern with no glob at all names a file; watch its directory.
    let dirs = if literal == components.len() {
        literal.saturating_sub(1)
    } else {
        literal
    };
    components[..dirs].iter().collect()
}

fn compile(pattern: &str) -> Result<Pattern, WatchError> {
    Pattern::new(pattern).map_err(|source| WatchError::Pattern {
        pattern: pattern.to_owned(),
        source,
    })
}
