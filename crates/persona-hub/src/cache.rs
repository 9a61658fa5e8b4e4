use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{HubError, HubResult},
    integrity::verify_integrity,
    source::{ArtifactSource, LocalArtifacts},
};

const META_SUFFIX: &str = ".meta.json";

/// Metadata stored alongside each cached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub repo_id: String,
    pub revision: String,
    pub filename: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// On-disk artifact cache.
///
/// Layout: `<cache_dir>/<repo_id with / as __>/<revision>/<filename>`,
/// with a `<filename>.meta.json` sidecar written once a download completes.
#[derive(Debug, Clone)]
pub struct ModelCache {
    root: PathBuf,
}

impl ModelCache {
    /// Create a cache rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> HubResult<Self> {
        let root = expand_tilde(&root.into());
        std::fs::create_dir_all(&root).map_err(|e| {
            HubError::InvalidCacheDir(format!("cannot create {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    /// Default cache directory: `~/.cache/persona-chat`.
    pub fn default_cache() -> HubResult<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            HubError::InvalidCacheDir("Cannot determine home directory".to_string())
        })?;
        Self::new(home.join(".cache").join("persona-chat"))
    }

    pub fn file_path(&self, repo_id: &str, revision: &str, filename: &str) -> PathBuf {
        self.model_dir(repo_id, revision).join(filename)
    }

    pub fn meta_path(&self, repo_id: &str, revision: &str, filename: &str) -> PathBuf {
        self.model_dir(repo_id, revision)
            .join(format!("{filename}{META_SUFFIX}"))
    }

    /// A file counts as cached only once both data and sidecar exist.
    pub fn is_cached(&self, repo_id: &str, revision: &str, filename: &str) -> bool {
        self.file_path(repo_id, revision, filename).is_file()
            && self.meta_path(repo_id, revision, filename).is_file()
    }

    pub fn write_meta(&self, meta: &FileMetadata) -> HubResult<()> {
        let path = self.meta_path(&meta.repo_id, &meta.revision, &meta.filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(meta)?)?;
        debug!("Wrote metadata to {}", path.display());
        Ok(())
    }

    pub fn read_meta(&self, repo_id: &str, revision: &str, filename: &str) -> HubResult<FileMetadata> {
        let path = self.meta_path(repo_id, revision, filename);
        let json = std::fs::read_to_string(&path)
            .map_err(|_| HubError::NotCached(format!("{repo_id}@{revision}/{filename}")))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Re-hash a cached file and compare it to its recorded digest.
    pub fn verify(&self, repo_id: &str, revision: &str, filename: &str) -> HubResult<()> {
        let meta = self.read_meta(repo_id, revision, filename)?;
        verify_integrity(&self.file_path(repo_id, revision, filename), &meta.sha256)
    }

    /// Resolve a source to local paths without touching the network.
    ///
    /// The weights must be cached; a missing tokenizer is reported as `None`
    /// so the caller can fall back to the GGUF vocabulary.
    pub fn resolve(&self, source: &ArtifactSource) -> HubResult<LocalArtifacts> {
        if !self.is_cached(&source.repo, &source.revision, &source.gguf_file) {
            return Err(HubError::NotCached(format!(
                "{}@{}/{}",
                source.repo, source.revision, source.gguf_file
            )));
        }
        let tokenizer = source
            .tokenizer_repo
            .as_deref()
            .filter(|repo| self.is_cached(repo, &source.revision, crate::TOKENIZER_FILE))
            .map(|repo| self.file_path(repo, &source.revision, crate::TOKENIZER_FILE));
        Ok(LocalArtifacts {
            weights: self.file_path(&source.repo, &source.revision, &source.gguf_file),
            tokenizer,
        })
    }

    /// List all cached repos as `(repo_id, revision)` pairs, sorted.
    pub fn list_models(&self) -> HubResult<Vec<(String, String)>> {
        let mut results = Vec::new();
        if !self.root.exists() {
            return Ok(results);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let repo_id = entry.file_name().to_string_lossy().replace("__", "/");
            for rev_entry in std::fs::read_dir(entry.path())? {
                let rev_entry = rev_entry?;
                if rev_entry.path().is_dir() {
                    results.push((repo_id.clone(), rev_entry.file_name().to_string_lossy().to_string()));
                }
            }
        }
        results.sort();
        Ok(results)
    }

    /// Metadata of every completed download under `(repo_id, revision)`.
    pub fn list_files(&self, repo_id: &str, revision: &str) -> HubResult<Vec<FileMetadata>> {
        let dir = self.model_dir(repo_id, revision);
        let mut files = Vec::new();
        if !dir.is_dir() {
            return Ok(files);
        }
        for entry in std::fs::read_dir(&dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(filename) = name.strip_suffix(META_SUFFIX) {
                files.push(self.read_meta(repo_id, revision, filename)?);
            }
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    pub fn model_dir(&self, repo_id: &str, revision: &str) -> PathBuf {
        self.root.join(repo_id.replace('/', "__")).join(revision)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache() -> (ModelCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path()).unwrap();
        (cache, dir)
    }

    fn cache_file(cache: &ModelCache, repo: &str, filename: &str, body: &[u8]) {
        let path = cache.file_path(repo, "main", filename);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        cache
            .write_meta(&FileMetadata {
                repo_id: repo.to_string(),
                revision: "main".to_string(),
                filename: filename.to_string(),
                sha256: crate::integrity::sha256_file(&path).unwrap(),
                size_bytes: body.len() as u64,
            })
            .unwrap();
    }

    fn source() -> ArtifactSource {
        ArtifactSource {
            repo: "TheBloke/Nous-Hermes-13B-GGUF".to_string(),
            gguf_file: "nous-hermes-13b.Q4_K_M.gguf".to_string(),
            tokenizer_repo: Some("TheBloke/Nous-Hermes-13B-GPTQ".to_string()),
            revision: "main".to_string(),
        }
    }

    #[test]
    fn test_file_path_encodes_slash() {
        let (cache, _dir) = temp_cache();
        let p = cache.file_path("owner/repo", "main", "model.gguf");
        assert!(p.starts_with(cache.root().join("owner__repo").join("main")));
        assert!(p.ends_with("model.gguf"));
    }

    #[test]
    fn test_meta_path_has_suffix() {
        let (cache, _dir) = temp_cache();
        let p = cache.meta_path("a/b", "rev", "model.gguf");
        assert!(p.to_string_lossy().ends_with("model.gguf.meta.json"));
    }

    #[test]
    fn test_data_without_meta_is_not_cached() {
        let (cache, _dir) = temp_cache();
        let path = cache.file_path("test/model", "main", "model.gguf");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"partial").unwrap();
        assert!(!cache.is_cached("test/model", "main", "model.gguf"));
    }

    #[test]
    fn test_metadata_roundtrip() {
        let (cache, _dir) = temp_cache();
        let meta = FileMetadata {
            repo_id: "test/model".to_string(),
            revision: "main".to_string(),
            filename: "tokenizer.json".to_string(),
            sha256: "deadbeef".to_string(),
            size_bytes: 1024,
        };
        cache.write_meta(&meta).unwrap();
        assert_eq!(cache.read_meta("test/model", "main", "tokenizer.json").unwrap(), meta);
    }

    #[test]
    fn test_read_meta_missing_is_not_cached() {
        let (cache, _dir) = temp_cache();
        let err = cache.read_meta("x/y", "main", "nope.gguf").unwrap_err();
        assert!(matches!(err, HubError::NotCached(_)));
    }

    #[test]
    fn test_resolve_requires_weights() {
        let (cache, _dir) = temp_cache();
        assert!(matches!(cache.resolve(&source()), Err(HubError::NotCached(_))));
    }

    #[test]
    fn test_resolve_with_and_without_tokenizer() {
        let (cache, _dir) = temp_cache();
        let src = source();
        cache_file(&cache, &src.repo, &src.gguf_file, b"GGUF");

        let local = cache.resolve(&src).unwrap();
        assert!(local.weights.ends_with("nous-hermes-13b.Q4_K_M.gguf"));
        assert!(local.tokenizer.is_none());

        cache_file(&cache, "TheBloke/Nous-Hermes-13B-GPTQ", crate::TOKENIZER_FILE, b"{}");
        let local = cache.resolve(&src).unwrap();
        assert!(local.tokenizer.unwrap().ends_with("tokenizer.json"));
    }

    #[test]
    fn test_list_models_and_files() {
        let (cache, _dir) = temp_cache();
        assert!(cache.list_models().unwrap().is_empty());

        cache_file(&cache, "myorg/mymodel", "b.gguf", b"bb");
        cache_file(&cache, "myorg/mymodel", "a.json", b"a");
        assert_eq!(
            cache.list_models().unwrap(),
            vec![("myorg/mymodel".to_string(), "main".to_string())]
        );
        let files = cache.list_files("myorg/mymodel", "main").unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.gguf"]);
        assert_eq!(files[1].size_bytes, 2);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let (cache, _dir) = temp_cache();
        cache_file(&cache, "o/r", "model.gguf", b"original");
        assert!(cache.verify("o/r", "main", "model.gguf").is_ok());

        std::fs::write(cache.file_path("o/r", "main", "model.gguf"), b"tampered").unwrap();
        assert!(matches!(
            cache.verify("o/r", "main", "model.gguf"),
            Err(HubError::IntegrityMismatch { .. })
        ));
    }
}
