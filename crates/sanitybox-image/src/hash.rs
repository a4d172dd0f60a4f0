//! SHA-256 digest of the archive under test.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use sanitybox_common::error::BuildError;
use sanitybox_common::types::Sha256Hash;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hash of a file.
///
/// # Errors
///
/// Returns `BuildError::ArchiveUnreadable` if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<Sha256Hash, BuildError> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let unreadable = |source| BuildError::ArchiveUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(path).map_err(unreadable)?);
    let mut hasher = Sha256::new();
    let _bytes = std::io::copy(&mut reader, &mut hasher).map_err(unreadable)?;

    let hex = format!("{:x}", hasher.finalize());
    Sha256Hash::from_hex(hex).map_err(|e| BuildError::InvalidArchive {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
