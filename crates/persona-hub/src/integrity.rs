use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{HubError, HubResult};

const READ_CHUNK: usize = 1 << 20;

/// Compute the SHA-256 hex digest of a file on disk.
///
/// Reads in 1 MiB chunks; GGUF files run to several gigabytes.
pub fn sha256_file(path: &Path) -> HubResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify that `path` matches the expected SHA-256 hex string.
pub fn verify_integrity(path: &Path, expected_sha256: &str) -> HubResult<()> {
    let actual = sha256_file(path)?;
    debug!(
        path = %path.display(),
        expected = expected_sha256,
        actual = %actual,
        "Verifying file integrity"
    );
    if actual.eq_ignore_ascii_case(expected_sha256) {
        Ok(())
    } else {
        Err(HubError::IntegrityMismatch {
            file: path.to_string_lossy().to_string(),
            expected: expected_sha256.to_string(),
            actual,
        })
    }
}
