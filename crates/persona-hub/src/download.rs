use std::path::{Path, PathBuf};

use futures::StreamExt;
use hf_hub::{
    api::tokio::{Api, ApiBuilder, ApiRepo},
    Repo, RepoType,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::{
    cache::{FileMetadata, ModelCache},
    error::{HubError, HubResult},
    integrity::sha256_file,
    source::{ArtifactSource, LocalArtifacts},
    TOKENIZER_FILE,
};

/// Progress bar template for files whose `Content-Length` is known.
const PB_TEMPLATE_SIZED: &str =
    "{wide_msg}\n[{bar:50.cyan/blue}] {bytes}/{total_bytes}  {bytes_per_sec}  ETA {eta}";

/// Progress bar template when the total size is not known.
const PB_TEMPLATE_SPINNER: &str =
    "{spinner:.green} {wide_msg}  {bytes}  {bytes_per_sec}  [{elapsed_precise}]";

/// Fetches model artifacts into a [`ModelCache`].
pub struct ModelDownloader {
    cache: ModelCache,
    api: Api,
    http: reqwest::Client,
    hf_token: Option<String>,
}

impl ModelDownloader {
    /// Reads `HUGGING_FACE_HUB_TOKEN` from the environment if present.
    pub fn new(cache: ModelCache) -> HubResult<Self> {
        let hf_token = std::env::var("HUGGING_FACE_HUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let api = ApiBuilder::new().with_token(hf_token.clone()).build()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("persona-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HubError::DownloadFailed {
                file: "<http client>".into(),
                reason: e.to_string(),
            })?;

        Ok(Self { cache, api, http, hf_token })
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Download the GGUF weights and, when a tokenizer repo is configured,
    /// its `tokenizer.json`.
    ///
    /// The weights are required. A tokenizer that cannot be fetched is
    /// logged and skipped; loading then falls back to the GGUF vocabulary.
    pub async fn fetch(
        &self,
        source: &ArtifactSource,
        mp: Option<&MultiProgress>,
    ) -> HubResult<LocalArtifacts> {
        info!(repo = %source.repo, file = %source.gguf_file, revision = %source.revision, "Fetching model");

        let weights = self
            .download_file(&source.repo, &source.revision, &source.gguf_file, mp)
            .await?;

        let tokenizer = match source.tokenizer_repo.as_deref() {
            None => None,
            Some(repo) => match self.download_file(repo, &source.revision, TOKENIZER_FILE, mp).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(repo, error = %e, "Tokenizer not available, GGUF vocabulary will be used");
                    None
                }
            },
        };

        Ok(LocalArtifacts { weights, tokenizer })
    }

    fn repo(&self, repo_id: &str, revision: &str) -> ApiRepo {
        self.api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ))
    }

    /// Stream one file to `<dest>.tmp`, rename on success, then record its
    /// digest in the sidecar.
    async fn download_file(
        &self,
        repo_id: &str,
        revision: &str,
        filename: &str,
        mp: Option<&MultiProgress>,
    ) -> HubResult<PathBuf> {
        let dest = self.cache.file_path(repo_id, revision, filename);
        if self.cache.is_cached(repo_id, revision, filename) {
            debug!(repo_id, filename, "Already cached, skipping download");
            return Ok(dest);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = self.repo(repo_id, revision).url(filename);
        info!(repo_id, filename, "Downloading");

        let mut req = self.http.get(&url);
        if let Some(ref token) = self.hf_token {
            req = req.bearer_auth(token);
        }
        let response = req.send().await.map_err(|e| HubError::DownloadFailed {
            file: filename.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let hint = if matches!(status.as_u16(), 401 | 403) {
                " (hint: set HUGGING_FACE_HUB_TOKEN for gated repos)"
            } else {
                ""
            };
            return Err(HubError::DownloadFailed {
                file: filename.to_string(),
                reason: format!("HTTP {status}{hint}"),
            });
        }

        let pb = mp.map(|m| progress_bar(m, filename, response.content_length()));
        let tmp_path = tmp_path_for(&dest);

        if let Err(e) = stream_to_disk(response, &tmp_path, pb.as_ref()).await {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        std::fs::rename(&tmp_path, &dest)?;

        let size_bytes = std::fs::metadata(&dest)?.len();
        self.cache.write_meta(&FileMetadata {
            repo_id: repo_id.to_string(),
            revision: revision.to_string(),
            filename: filename.to_string(),
            sha256: sha256_file(&dest)?,
            size_bytes,
        })?;

        if let Some(ref pb) = pb {
            pb.finish_with_message(format!("Done  {filename}"));
        }
        Ok(dest)
    }
}

fn progress_bar(mp: &MultiProgress, filename: &str, total: Option<u64>) -> ProgressBar {
    let pb = match total {
        Some(total) => {
            let pb = mp.add(ProgressBar::new(total));
            if let Ok(style) = ProgressStyle::with_template(PB_TEMPLATE_SIZED) {
                pb.set_style(style.progress_chars("##-"));
            }
            pb
        }
        None => {
            let pb = mp.add(ProgressBar::new_spinner());
            if let Ok(style) = ProgressStyle::with_template(PB_TEMPLATE_SPINNER) {
                pb.set_style(style);
            }
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb
        }
    };
    pb.set_message(filename.to_string());
    pb
}

fn tmp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!("{name}.tmp"))
}

async fn stream_to_disk(
    response: reqwest::Response,
    path: &Path,
    pb: Option<&ProgressBar>,
) -> HubResult<()> {
    use std::io::Write;

    let mut file = std::fs::File::create(path)?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| HubError::DownloadFailed {
            file: path.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
        file.write_all(&chunk)?;
        if let Some(pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }

    file.flush()?;
    Ok(())
}
