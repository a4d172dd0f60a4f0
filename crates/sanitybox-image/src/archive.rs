//! Archive pre-validation.
//!
//! Engines report a corrupt archive only deep inside a build log, so the
//! archive is opened as a gzip tarball and walked once before any build
//! process is spawned.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;
use sanitybox_common::error::BuildError;

/// What a successful validation learned about the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of tar entries.
    pub entries: usize,
    /// Compressed size in bytes.
    pub size_bytes: u64,
}

/// Checks that `path` is a readable, non-empty gzip-compressed tarball.
///
/// # Errors
///
/// Returns `BuildError::ArchiveUnreadable` if the file cannot be opened and
/// `BuildError::InvalidArchive` if it is not a regular file, fails to
/// decode, or contains no entries.
pub fn validate_archive(path: &Path) -> Result<ArchiveSummary, BuildError> {
    let meta = std::fs::metadata(path).map_err(|e| BuildError::ArchiveUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !meta.is_file() {
        return Err(invalid(path, "not a regular file"));
    }

    let file = File::open(path).map_err(|e| BuildError::ArchiveUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut entries = 0usize;
    for entry in archive
        .entries()
        .map_err(|e| invalid(path, &e.to_string()))?
    {
        let _entry = entry.map_err(|e| invalid(path, &e.to_string()))?;
        entries += 1;
    }

    if entries == 0 {
        return Err(invalid(path, "archive contains no entries"));
    }

    tracing::debug!(path = %path.display(), entries, "archive validated");
    Ok(ArchiveSummary {
        entries,
        size_bytes: meta.len(),
    })
}

fn invalid(path: &Path, message: &str) -> BuildError {
    BuildError::InvalidArchive {
        path: path.to_path_buf(),
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).expect("create");
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).expect("append");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip");
    }

    #[test]
    fn valid_archive_counts_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("collection.tar.gz");
        write_tar_gz(
            &path,
            &[("MANIFEST.json", b"{}"), ("plugins/README.md", b"docs")],
        );

        let summary = validate_archive(&path).expect("valid");
        assert_eq!(summary.entries, 2);
        assert!(summary.size_bytes > 0);
    }

    #[test]
    fn plain_text_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake.tar.gz");
        std::fs::write(&path, b"fake tar").expect("write");

        let err = validate_archive(&path).unwrap_err();
        assert!(matches!(err, BuildError::InvalidArchive { .. }));
    }

    #[test]
    fn empty_tarball_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.tar.gz");
        write_tar_gz(&path, &[]);

        let err = validate_archive(&path).unwrap_err();
        assert!(err.to_string().contains("no entries"));
    }

    #[test]
    fn directory_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = validate_archive(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = validate_archive(Path::new("/file/path/to/archive.tar.gz")).unwrap_err();
        assert!(matches!(err, BuildError::ArchiveUnreadable { .. }));
    }
}
