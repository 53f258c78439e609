//! Test-module discovery
//!
//! Positional CLI arguments resolve to an ordered list of test-module
//! paths through one of four modes: default glob, explicit glob,
//! directory, or verbatim file list. Glob expansion is lexically sorted
//! so the harness script-tag order is reproducible across runs.

use crate::error::{Result, SpecterError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Glob applied when no positional arguments are given.
pub const DEFAULT_TEST_GLOB: &str = "test/**/*.js";

/// Dependency directory excluded from every glob expansion.
const DEPENDENCY_DIR: &str = "node_modules";

/// Resolve positional arguments against the current directory.
pub fn discover(args: &[String]) -> Result<Vec<PathBuf>> {
    discover_from(Path::new("."), args)
}

/// Resolve positional arguments against an explicit root directory.
///
/// - no arguments: [`DEFAULT_TEST_GLOB`]
/// - one argument containing `*`: literal glob pattern
/// - one argument naming a directory: recursive `*.js` glob under it
/// - one argument naming a file: that single file
/// - two or more arguments: verbatim file list, no glob expansion
pub fn discover_from(root: &Path, args: &[String]) -> Result<Vec<PathBuf>> {
    if args.len() >= 2 {
        // The caller's shell already expanded any wildcards.
        return Ok(args.iter().map(PathBuf::from).collect());
    }

    let pattern = match args.first() {
        None => DEFAULT_TEST_GLOB.to_string(),
        Some(arg) if arg.contains('*') => arg.clone(),
        Some(arg) => {
            let meta = std::fs::metadata(root.join(arg))
                .map_err(|e| SpecterError::Resolution(arg.clone(), e))?;
            if meta.is_dir() {
                format!("{}/**/*.js", arg.trim_end_matches('/'))
            } else {
                return Ok(vec![PathBuf::from(arg)]);
            }
        }
    };

    debug!("expanding test glob '{}'", pattern);
    expand_glob(root, &pattern)
}

fn expand_glob(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let anchored = root.join(pattern).to_string_lossy().into_owned();
    let entries = glob::glob(&anchored)
        .map_err(|e| SpecterError::Pattern(pattern.to_string(), e.to_string()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|path| !path.components().any(|c| c.as_os_str() == DEPENDENCY_DIR))
        .map(|path| {
            path.strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or(path)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for path in [
            "test/first.spec.js",
            "test/sub/second.spec.js",
            "imports/imports.spec.js",
            "assert.spec.js",
            "node_modules/mocha/mocha.spec.js",
        ] {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, "// fixture").unwrap();
        }
        dir
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_arguments_uses_default_glob() {
        let dir = fixture();
        let found = discover_from(dir.path(), &[]).unwrap();
        assert_eq!(
            found,
            vec![
                PathBuf::from("test/first.spec.js"),
                PathBuf::from("test/sub/second.spec.js"),
            ]
        );
    }

    #[test]
    fn test_glob_argument_expands_and_sorts() {
        let dir = fixture();
        let found = discover_from(dir.path(), &strings(&["**/*.spec.js"])).unwrap();
        assert_eq!(
            found,
            vec![
                PathBuf::from("assert.spec.js"),
                PathBuf::from("imports/imports.spec.js"),
                PathBuf::from("test/first.spec.js"),
                PathBuf::from("test/sub/second.spec.js"),
            ]
        );
    }

    #[test]
    fn test_glob_excludes_dependency_directory() {
        let dir = fixture();
        let found = discover_from(dir.path(), &strings(&["**/*.spec.js"])).unwrap();
        assert!(!found.iter().any(|p| p.to_string_lossy().contains("node_modules")));
    }

    #[test]
    fn test_directory_argument_globs_recursively() {
        let dir = fixture();
        let found = discover_from(dir.path(), &strings(&["imports"])).unwrap();
        assert_eq!(found, vec![PathBuf::from("imports/imports.spec.js")]);
    }

    #[test]
    fn test_file_argument_is_taken_verbatim() {
        let dir = fixture();
        let found = discover_from(dir.path(), &strings(&["assert.spec.js"])).unwrap();
        assert_eq!(found, vec![PathBuf::from("assert.spec.js")]);
    }

    #[test]
    fn test_multiple_arguments_skip_glob_expansion() {
        let dir = fixture();
        let args = strings(&["b.js", "a*.js", "missing.js"]);
        let found = discover_from(dir.path(), &args).unwrap();
        // Order preserved, no expansion, no existence check.
        assert_eq!(
            found,
            vec![
                PathBuf::from("b.js"),
                PathBuf::from("a*.js"),
                PathBuf::from("missing.js"),
            ]
        );
    }

    #[test]
    fn test_dangling_single_argument_is_a_resolution_error() {
        let dir = fixture();
        let err = discover_from(dir.path(), &strings(&["nope.js"])).unwrap_err();
        match err {
            SpecterError::Resolution(path, _) => assert_eq!(path, "nope.js"),
            other => panic!("expected Resolution error, got {other:?}"),
        }
    }
}
