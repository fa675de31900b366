use crate::config::AnalysisConfig;
use crate::error::Error;
use crate::symbols::{Diagnostic, DiagnosticKind};
use crate::utils::posix_path;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A discovered source file: absolute path plus the repository-relative
/// POSIX path used everywhere downstream.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub rel: String,
}

/// Enumerates source files under a root, honoring include and exclude
/// globs. Output order is deterministic (lexicographic by relative path).
pub struct SourceWalker {
    include: GlobSet,
    exclude: GlobSet,
}

impl SourceWalker {
    pub fn new(config: &AnalysisConfig) -> Result<Self, Error> {
        Ok(Self {
            include: build_glob_set(&config.include)?,
            exclude: build_glob_set(&config.exclude)?,
        })
    }

    /// Walks the tree. A missing root is fatal; unreadable entries are
    /// skipped with a diagnostic.
    pub fn walk(&self, root: &Path) -> Result<(Vec<SourceFile>, Vec<Diagnostic>), Error> {
        if !root.is_dir() {
            return Err(Error::RootNotFound(root.to_path_buf()));
        }

        let mut files = Vec::new();
        let mut diagnostics = Vec::new();

        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let file = err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    diagnostics.push(Diagnostic {
                        file,
                        line: 0,
                        kind: DiagnosticKind::Io,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => posix_path(rel),
                Err(_) => continue,
            };
            if !self.include.is_match(&rel) || self.exclude.is_match(&rel) {
                continue;
            }
            files.push(SourceFile {
                path: entry.path().to_path_buf(),
                rel,
            });
        }

        files.sort_by(|a, b| a.rel.cmp(&b.rel));
        debug!(count = files.len(), "discovered source files");
        Ok((files, diagnostics))
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("bad glob pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("glob set: {}", e)))
}

/// Compiles name globs (`_*`, `test_*`) used by the scorer's
/// `ignore_names` rule. Bad patterns are a configuration error.
pub fn name_glob_set(patterns: &[String]) -> Result<GlobSet, Error> {
    build_glob_set(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use std::fs;

    #[test]
    fn test_walk_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("b.py"), "").unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();
        fs::write(dir.path().join("pkg/c.py"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("tests/test_a.py"), "").unwrap();

        let walker = SourceWalker::new(&AnalysisConfig::default()).unwrap();
        let (files, diagnostics) = walker.walk(dir.path()).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(rels, vec!["a.py", "b.py", "pkg/c.py"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let walker = SourceWalker::new(&AnalysisConfig::default()).unwrap();
        assert!(walker.walk(Path::new("/definitely/not/here")).is_err());
    }
}
