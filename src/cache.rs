use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;

use crate::core::Hash32;
use crate::error::{FilesystemError, IoContext};

/// Content-addressed store for transform results which are expensive to
/// recompute. Entries live at `<root>/<area>/<fingerprint>.<ext>` and are
/// never invalidated, a changed source simply has a different fingerprint.
#[derive(Debug, Clone)]
pub struct Cache {
    root: Utf8PathBuf,
}

impl Cache {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn path(&self, area: &str, key: Hash32, ext: &str) -> Utf8PathBuf {
        self.root
            .join(area)
            .join(key.to_hex())
            .with_extension(ext)
    }

    /// Returns the path of a cached entry, if present.
    pub fn get(&self, area: &str, key: Hash32, ext: &str) -> Option<Utf8PathBuf> {
        let path = self.path(area, key, ext);
        path.is_file().then_some(path)
    }

    /// Stores an entry and returns its path. The entry appears at once,
    /// readers never observe a partially written file.
    pub fn put(
        &self,
        area: &str,
        key: Hash32,
        ext: &str,
        data: &[u8],
    ) -> Result<Utf8PathBuf, FilesystemError> {
        let path = self.path(area, key, ext);
        let dir = self.root.join(area);
        fs::create_dir_all(&dir).at(&dir)?;

        let mut file = NamedTempFile::new_in(&dir).at(&dir)?;
        file.write_all(data).at(&dir)?;
        file.persist(&path).map_err(|e| e.error).at(&path)?;

        Ok(path)
    }

    /// Drops every cached entry. Build output is not touched.
    pub fn clear(&self) -> Result<(), FilesystemError> {
        if fs::metadata(&self.root).is_ok() {
            fs::remove_dir_all(&self.root).at(&self.root)?;
        }

        tracing::info!("cleared cache at {}", self.root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_clear() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().join("cache")).unwrap();
        let cache = Cache::new(&root);

        let key = Hash32::hash(b"pixels");
        assert!(cache.get("img", key, "png").is_none());

        let path = cache.put("img", key, "png", b"optimized").unwrap();
        assert_eq!(cache.get("img", key, "png"), Some(path.clone()));
        assert_eq!(fs::read(&path).unwrap(), b"optimized");

        // same key, different extension is a different entry
        assert!(cache.get("img", key, "jpg").is_none());

        cache.clear().unwrap();
        assert!(cache.get("img", key, "png").is_none());
        assert!(!root.exists());
    }

    #[test]
    fn test_concurrent_puts_never_expose_partial_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(Utf8PathBuf::try_from(dir.path().join("cache")).unwrap());
        let key = Hash32::hash(b"same icon");

        let small = vec![b'a'; 64 * 1024];
        let large = vec![b'b'; 256 * 1024];

        std::thread::scope(|scope| {
            for i in 0..4 {
                let cache = &cache;
                let data = if i % 2 == 0 { &small } else { &large };
                scope.spawn(move || {
                    for _ in 0..20 {
                        cache.put("img", key, "png", data).unwrap();
                    }
                });
            }

            let cache = &cache;
            let (small, large) = (&small, &large);
            scope.spawn(move || {
                for _ in 0..200 {
                    if let Some(path) = cache.get("img", key, "png") {
                        let read = fs::read(path).unwrap();
                        assert!(
                            read == *small || read == *large,
                            "torn entry of {} bytes",
                            read.len()
                        );
                    }
                }
            });
        });

        // no temporary files left behind
        let entries = fs::read_dir(cache.root().join("img")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_clear_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(Utf8PathBuf::try_from(dir.path().join("nope")).unwrap());
        cache.clear().unwrap();
    }
}
