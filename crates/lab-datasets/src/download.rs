//! Fetching gzipped dataset files.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use lab_core::{Error, Result};
use tracing::{info, warn};

/// Downloads `<mirror><file_name>.gz` from the first mirror that answers and
/// writes the decompressed bytes to `dest_dir/file_name`.
///
/// Existing files are left untouched.
pub fn fetch_gzip(mirrors: &[&str], file_name: &str, dest_dir: &Path) -> Result<PathBuf> {
    let dest = dest_dir.join(file_name);
    if dest.exists() {
        info!("{} already exists, skipping download", dest.display());
        return Ok(dest);
    }

    fs::create_dir_all(dest_dir)?;

    let mut last_error = None;
    for mirror in mirrors {
        let url = format!("{mirror}{file_name}.gz");
        info!("Downloading {}", url);

        match fetch_bytes(&url) {
            Ok(bytes) => {
                let decompressed = gunzip(&bytes)?;
                write_atomically(&dest, &decompressed)?;
                info!("Wrote {} ({} bytes)", dest.display(), decompressed.len());
                return Ok(dest);
            }
            Err(e) => {
                warn!("Failed to download {}: {}", url, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        Error::Download(format!("No mirrors configured for {file_name}"))
    }))
}

fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Download(format!("Request to {url} failed: {e}")))?;
    let bytes = response
        .bytes()
        .map_err(|e| Error::Download(format!("Failed to read body of {url}: {e}")))?;
    Ok(bytes.to_vec())
}

/// Decompresses a gzip stream held in memory
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Download(format!("Failed to decompress: {e}")))?;
    Ok(out)
}

fn write_atomically(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let partial = dest.with_extension("partial");
    {
        let mut file = File::create(&partial)?;
        io::Write::write_all(&mut file, bytes)?;
    }
    fs::rename(&partial, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_gunzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"idx payload").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(gunzip(&compressed).unwrap(), b"idx payload");
        assert!(gunzip(b"plain bytes").is_err());
    }

    #[test]
    fn test_existing_file_is_not_fetched() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("t10k-labels-idx1-ubyte");
        fs::write(&existing, b"cached").unwrap();

        let path = fetch_gzip(&[], "t10k-labels-idx1-ubyte", temp_dir.path()).unwrap();
        assert_eq!(path, existing);
        assert_eq!(fs::read(&path).unwrap(), b"cached");
    }

    #[test]
    fn test_no_mirrors() {
        let temp_dir = TempDir::new().unwrap();
        let result = fetch_gzip(&[], "train-labels-idx1-ubyte", temp_dir.path());
        assert!(matches!(result, Err(Error::Download(_))));
    }
}
