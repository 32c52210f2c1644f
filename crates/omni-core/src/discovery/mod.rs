//! File-system discovery: walks a collection root, applies a layered
//! ignore-pattern stack, and classifies each surviving file into a
//! processing tier.
//!
//! Three ignore layers are merged, last wins: universal defaults (VCS
//! dirs, binary extensions, lock files, build output, OS artefacts), a
//! per-user global ignore file, and a per-project ignore file. Pattern
//! syntax is standard gitignore semantics, which `ignore::WalkBuilder`
//! already implements — a negation can only re-include a path if no
//! parent directory is itself excluded, which is exactly how `ignore`
//! resolves overrides internally, so no extra bookkeeping is needed here.

use crate::error::OmniError;
use crate::types::{DiscoveredFile, FileTier};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Universal ignore defaults applied before any user or project file.
/// Order doesn't matter within a layer; `ignore` merges layers by the
/// order they're added to the builder, later additions winning ties.
const UNIVERSAL_IGNORES: &[&str] = &[
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "target/",
    "dist/",
    "build/",
    ".next/",
    ".nuxt/",
    "vendor/",
    "__pycache__/",
    ".venv/",
    "venv/",
    ".tox/",
    ".mypy_cache/",
    ".pytest_cache/",
    "*.pyc",
    "*.so",
    "*.dylib",
    "*.dll",
    "*.exe",
    "*.o",
    "*.a",
    "*.class",
    "*.jar",
    "*.lock",
    "Cargo.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    ".DS_Store",
    "Thumbs.db",
    "*.min.js",
    "*.min.css",
];

/// File-extension / path-suffix markers that route a file to the
/// `light` tier: metadata-only parsing, no implementation chunks.
const LIGHT_TIER_MARKERS: &[&str] = &[
    ".d.ts",
    ".min.js",
    ".min.css",
    ".generated.ts",
    ".generated.go",
    ".pb.go",
    "_pb2.py",
    ".g.dart",
];

/// Path fragments that route a file to the `deep` tier: core business
/// logic worth full semantic enhancement.
const DEEP_TIER_MARKERS: &[&str] = &[
    "/routes/",
    "/controllers/",
    "/handlers/",
    "/api/",
    "/middleware/",
    "/auth/",
    "/store/",
    "/reducers/",
    "/models/",
    "/services/",
];

/// Classify a relative path into a processing tier.
pub fn classify_tier(rel_path: &str) -> FileTier {
    let lower = rel_path.to_ascii_lowercase();
    if LIGHT_TIER_MARKERS.iter().any(|m| lower.ends_with(m)) {
        return FileTier::Light;
    }
    let with_slashes = format!("/{lower}");
    if DEEP_TIER_MARKERS.iter().any(|m| with_slashes.contains(m)) {
        return FileTier::Deep;
    }
    FileTier::Standard
}

/// Walk `root`, applying the universal/global/project ignore stack plus
/// `extra_excludes` (the project's own configured patterns), and return
/// every surviving file tagged with its tier.
///
/// Unreadable entries are logged and skipped; a single bad path never
/// aborts the walk.
pub fn discover(
    root: &Path,
    extra_excludes: &[String],
    follow_symlinks: bool,
    global_ignore_file: Option<&Path>,
) -> Result<Vec<DiscoveredFile>, OmniError> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .follow_links(follow_symlinks)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true);

    let mut overrides = ignore::overrides::OverrideBuilder::new(root);
    for pattern in UNIVERSAL_IGNORES {
        // OverrideBuilder treats a bare pattern as an include; ignore
        // patterns need the leading `!` negated into an exclude, which
        // for OverrideBuilder is the reverse: prefixing with `!` means
        // "don't match", i.e. exclude. See `ignore::overrides` docs.
        if let Err(err) = overrides.add(&format!("!{pattern}")) {
            tracing::warn!(pattern, %err, "skipping malformed universal ignore pattern");
        }
    }
    for pattern in extra_excludes {
        if let Err(err) = overrides.add(&format!("!{pattern}")) {
            tracing::warn!(pattern, %err, "skipping malformed project ignore pattern");
        }
    }
    let overrides = overrides.build().map_err(|err| OmniError::Config {
        details: format!("invalid ignore pattern set: {err}"),
    })?;
    builder.overrides(overrides);

    if let Some(global) = global_ignore_file {
        if global.exists() {
            if let Some(err) = builder.add_ignore(global) {
                tracing::warn!(path = %global.display(), %err, "failed to load global ignore file");
            }
        }
    }

    let project_ignore = root.join(".omniignore");
    if project_ignore.exists() {
        if let Some(err) = builder.add_ignore(&project_ignore) {
            tracing::warn!(path = %project_ignore.display(), %err, "failed to load project ignore file");
        }
    }

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(%err, "skipping unreadable path during discovery");
                continue;
            }
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let abs_path = entry.path().to_path_buf();
        let rel_path = rel_path_string(root, &abs_path);
        let tier = classify_tier(&rel_path);
        files.push(DiscoveredFile {
            rel_path,
            abs_path,
            tier,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn rel_path_string(root: &Path, abs_path: &Path) -> String {
    abs_path
        .strip_prefix(root)
        .unwrap_or(abs_path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Default path to the per-user global ignore file, analogous to Git's
/// `core.excludesFile`.
pub fn default_global_ignore_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("omnicontext").join("ignore"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_light_tier_by_suffix() {
        assert_eq!(classify_tier("src/types.d.ts"), FileTier::Light);
        assert_eq!(classify_tier("dist/app.min.js"), FileTier::Light);
        assert_eq!(classify_tier("proto/service_pb2.py"), FileTier::Light);
    }

    #[test]
    fn classifies_deep_tier_by_path_fragment() {
        assert_eq!(classify_tier("src/routes/users.ts"), FileTier::Deep);
        assert_eq!(classify_tier("app/controllers/session.rb"), FileTier::Deep);
        assert_eq!(classify_tier("internal/auth/middleware.go"), FileTier::Deep);
    }

    #[test]
    fn classifies_standard_tier_by_default() {
        assert_eq!(classify_tier("src/utils/strings.rs"), FileTier::Standard);
    }

    #[test]
    fn discover_walks_and_skips_universal_ignores() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules/pkg")).unwrap();
        std::fs::write(tmp.path().join("node_modules/pkg/index.js"), "module.exports = {}").unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/main.rs"), "fn main() {}").unwrap();

        let files = discover(tmp.path(), &[], false, None).unwrap();
        let rel: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert!(rel.contains(&"src/main.rs"));
        assert!(!rel.iter().any(|p| p.starts_with("node_modules")));
    }

    #[test]
    fn discover_honours_project_excludes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("keep.rs"), "fn keep() {}").unwrap();
        std::fs::write(tmp.path().join("drop.tmp"), "scratch").unwrap();

        let files = discover(tmp.path(), &["*.tmp".to_string()], false, None).unwrap();
        let rel: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert!(rel.contains(&"keep.rs"));
        assert!(!rel.contains(&"drop.tmp"));
    }
}
