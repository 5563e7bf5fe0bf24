//! Cache directory resolution and compiled view storage
//!
//! The cache directory is resolved once, when a view service is built:
//! the process-wide override wins, then the caller's path, then
//! `<temp dir>/hilt-cache`. A missing directory is created recursively;
//! the result must be a writable directory or resolution fails.
//!
//! Compiled views are stored as `<sha256 of source path>-<fingerprint>.compiled`,
//! where the fingerprint identifies the directive set the view was compiled
//! with. Services with different directives can share a cache directory
//! without reading each other's artifacts. The first line of each artifact
//! repeats the fingerprint and is checked on load.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::cache_path_override;
use crate::error::{CoreError, Result};

/// Permissions for a newly created cache directory (before umask)
pub const DEFAULT_CACHE_MODE: u32 = 0o775;

/// Folder created under the system temp dir when no path is configured
pub const CACHE_SUBDIR: &str = "hilt-cache";

/// File extension of compiled artifacts
pub const COMPILED_EXTENSION: &str = "compiled";

const HEADER_PREFIX: &str = "{# hilt:";
const HEADER_SUFFIX: &str = " #}";

/// Short stable digest of `parts`, used to tag compiled artifacts
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..8])
}

/// A resolved, writable cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDir {
    path: PathBuf,
}

impl CacheDir {
    /// Resolve the cache directory by priority and make sure it is usable
    pub fn resolve(requested: Option<&Path>, mode: u32) -> Result<Self> {
        let path = cache_path_override()
            .or_else(|| {
                requested
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            })
            .unwrap_or_else(|| std::env::temp_dir().join(CACHE_SUBDIR));

        Self::prepare(path, mode)
    }

    /// Create `path` if needed and check that it is a writable directory
    pub fn prepare(path: PathBuf, mode: u32) -> Result<Self> {
        if !path.exists() {
            if let Err(source) = create_dir(&path, mode) {
                return Err(CoreError::CacheNotCreatable { path, source });
            }
            tracing::debug!("Created cache directory {} (mode {:o})", path.display(), mode);
        }

        if !is_writable_dir(&path) {
            return Err(CoreError::CacheNotWritable { path });
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn create_dir(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    builder.create(path)
}

fn is_writable_dir(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {}
        _ => return false,
    }

    let probe = path.join(format!(".hilt-probe-{}", std::process::id()));
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(e) => e.kind() == ErrorKind::AlreadyExists,
    }
}

/// On-disk store for compiled views
#[derive(Debug, Clone)]
pub struct CompiledCache {
    dir: PathBuf,
}

impl CompiledCache {
    pub fn new(dir: &CacheDir) -> Self {
        Self {
            dir: dir.path().to_path_buf(),
        }
    }

    /// Artifact location for a source file compiled with `fingerprint`
    pub fn compiled_path(&self, source: &Path, fingerprint: &str) -> PathBuf {
        let digest = Sha256::digest(source.to_string_lossy().as_bytes());
        self.dir.join(format!(
            "{}-{}.{}",
            hex::encode(digest),
            fingerprint,
            COMPILED_EXTENSION
        ))
    }

    /// Return the compiled body for `source` if a fresh artifact exists
    ///
    /// An artifact is stale when the source was modified after it, or when it
    /// was compiled with a different directive fingerprint.
    pub fn load(&self, source: &Path, fingerprint: &str) -> Option<String> {
        let compiled = self.compiled_path(source, fingerprint);

        let source_time = fs::metadata(source).and_then(|m| m.modified()).ok()?;
        let compiled_time = fs::metadata(&compiled).and_then(|m| m.modified()).ok()?;
        if compiled_time <= source_time {
            return None;
        }

        let content = match fs::read_to_string(&compiled) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Discarding unreadable compiled view {}: {}", compiled.display(), e);
                return None;
            }
        };

        let (header, body) = content.split_once('\n')?;
        let stored = header
            .strip_prefix(HEADER_PREFIX)
            .and_then(|h| h.strip_suffix(HEADER_SUFFIX))?;

        if stored != fingerprint {
            tracing::debug!("Compiled view for {} has a stale directive fingerprint", source.display());
            return None;
        }

        Some(body.to_string())
    }

    /// Write a compiled artifact, returning its path
    pub fn store(&self, source: &Path, fingerprint: &str, compiled: &str) -> Result<PathBuf> {
        let path = self.compiled_path(source, fingerprint);
        let content = format!("{}{}{}\n{}", HEADER_PREFIX, fingerprint, HEADER_SUFFIX, compiled);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Remove every compiled artifact, returning how many were deleted
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_compiled = path
                .extension()
                .is_some_and(|ext| ext == COMPILED_EXTENSION);

            if is_compiled && path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_missing_dir() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("nested/cache");

        let cache = CacheDir::prepare(path.clone(), DEFAULT_CACHE_MODE).unwrap();

        assert!(path.is_dir());
        assert_eq!(cache.path(), path);
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_uses_mode() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let path = root.path().join("cache");
        CacheDir::prepare(path.clone(), 0o700).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn test_prepare_uncreatable_dir() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("plain-file");
        fs::write(&file, "x").unwrap();

        let err = CacheDir::prepare(file.join("cache"), DEFAULT_CACHE_MODE).unwrap_err();

        assert!(matches!(err, CoreError::CacheNotCreatable { .. }));
        assert!(err.to_string().contains("plain-file"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_prepare_rejects_file() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("plain-file");
        fs::write(&file, "x").unwrap();

        let err = CacheDir::prepare(file, DEFAULT_CACHE_MODE).unwrap_err();
        assert!(matches!(err, CoreError::CacheNotWritable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_rejects_readonly_dir() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let path = root.path().join("readonly");
        fs::create_dir(&path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o555)).unwrap();

        let err = CacheDir::prepare(path.clone(), DEFAULT_CACHE_MODE).unwrap_err();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(err, CoreError::CacheNotWritable { .. }));
    }

    #[test]
    fn test_compiled_path_is_stable() {
        let root = TempDir::new().unwrap();
        let cache = CompiledCache::new(&CacheDir::prepare(root.path().to_path_buf(), DEFAULT_CACHE_MODE).unwrap());

        let a = cache.compiled_path(Path::new("/views/home.hilt.html"), "abc");
        let b = cache.compiled_path(Path::new("/views/home.hilt.html"), "abc");
        let c = cache.compiled_path(Path::new("/views/other.hilt.html"), "abc");
        let d = cache.compiled_path(Path::new("/views/home.hilt.html"), "def");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.extension().unwrap(), "compiled");
    }

    fn age(path: &Path, secs: u64) {
        let old = SystemTime::now() - Duration::from_secs(secs);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(old)
            .unwrap();
    }

    #[test]
    fn test_store_and_load() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("home.hilt.html");
        fs::write(&source, "raw").unwrap();
        age(&source, 60);

        let dir = CacheDir::prepare(root.path().join("cache"), DEFAULT_CACHE_MODE).unwrap();
        let cache = CompiledCache::new(&dir);
        cache.store(&source, "abc", "compiled\nbody").unwrap();

        assert_eq!(cache.load(&source, "abc").as_deref(), Some("compiled\nbody"));
        assert_eq!(cache.load(&source, "other"), None);
    }

    #[test]
    fn test_fingerprints_do_not_overwrite_each_other() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("home.hilt.html");
        fs::write(&source, "raw").unwrap();
        age(&source, 60);

        let dir = CacheDir::prepare(root.path().join("cache"), DEFAULT_CACHE_MODE).unwrap();
        let cache = CompiledCache::new(&dir);
        cache.store(&source, "one", "first").unwrap();
        cache.store(&source, "two", "second").unwrap();

        assert_eq!(cache.load(&source, "one").as_deref(), Some("first"));
        assert_eq!(cache.load(&source, "two").as_deref(), Some("second"));
        assert_eq!(cache.clear().unwrap(), 2);
    }

    #[test]
    fn test_load_stale_source() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("home.hilt.html");
        fs::write(&source, "raw").unwrap();

        let dir = CacheDir::prepare(root.path().join("cache"), DEFAULT_CACHE_MODE).unwrap();
        let cache = CompiledCache::new(&dir);
        let compiled = cache.store(&source, "abc", "body").unwrap();
        age(&compiled, 60);

        assert_eq!(cache.load(&source, "abc"), None);
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(fingerprint(["a", "b"]), fingerprint(["a", "b"]));
        assert_ne!(fingerprint(["a", "b"]), fingerprint(["ab"]));
        assert_eq!(fingerprint(["x"]).len(), 16);
    }

    #[test]
    fn test_clear() {
        let root = TempDir::new().unwrap();
        let dir = CacheDir::prepare(root.path().to_path_buf(), DEFAULT_CACHE_MODE).unwrap();
        let cache = CompiledCache::new(&dir);
        cache.store(Path::new("a"), "f", "x").unwrap();
        cache.store(Path::new("b"), "f", "y").unwrap();
        fs::write(root.path().join("keep.txt"), "z").unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(root.path().join("keep.txt").exists());
    }
}
