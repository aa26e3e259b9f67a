//! Depth-first directory walker, filtered by a fixed media extension set.
//! No crate in the dependency stack provides recursive directory walking
//! (`globset`/`gix-ignore` only match patterns), so this is a small
//! hand-rolled `std::fs` recursion, consistent with the extension-matching
//! idiom `globset::GlobSet` is used for.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;

pub const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "webp", "gif", "bmp", "tiff", "tif",
];

static MEDIA_GLOBS: Lazy<GlobSet> = Lazy::new(|| {
    let mut builder = GlobSetBuilder::new();
    for ext in MEDIA_EXTENSIONS {
        let glob = GlobBuilder::new(&format!("*.{ext}"))
            .case_insensitive(true)
            .build()
            .expect("static glob is well-formed");
        builder.add(glob);
    }
    builder.build().expect("static glob set is well-formed")
});

fn is_media_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| MEDIA_GLOBS.is_match(Path::new(name)))
        .unwrap_or(false)
}

/// Depth-first walk of `root`, yielding every regular file whose name
/// matches a recognized media extension. Directories that cannot be read
/// (permissions, races with concurrent deletion) are skipped rather than
/// aborting the whole walk (spec.md §4.6: "I/O errors on a single file are
/// logged and skipped").
pub fn walk_roots(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk_into(root, &mut out);
    out
}

fn walk_into(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        if file_type.is_dir() {
            walk_into(&path, out);
        } else if file_type.is_file() && is_media_file(&path) {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_finds_nested_media_files_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("b.PNG"), b"x").unwrap();

        let mut found: Vec<String> = walk_roots(dir.path())
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        found.sort();
        assert_eq!(found, vec!["a.jpg".to_string(), "b.PNG".to_string()]);
    }
}
