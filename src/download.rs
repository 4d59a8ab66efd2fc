//! Source corpus downloading.
//!
//! Fetches the archives configured for a source definition into
//! `data/source/<source>/<dataset>/`. Files land under their final name
//! only through a rename, a sha256 checksum file is written next to each
//! download, and gzip archives are decompressed in place. Existing files
//! are skipped, so the stage can be re-run after a partial failure.
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use futures::stream::StreamExt;
use log::{error, info};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::Error;

#[derive(Debug, Clone)]
pub struct DownloadTarget {
    pub url: String,
    pub dest: PathBuf,
}

/// Holds the urls to download and the http client that will make the
/// requests.
pub struct Downloader {
    targets: Vec<DownloadTarget>,
    client: reqwest::Client,
}

impl Downloader {
    pub fn from_config(config: &Config, source: &str, data: &Path) -> Result<Self, Error> {
        let source_config = config
            .sources
            .get(source)
            .ok_or_else(|| Error::Config(format!("source definition not available: {}", source)))?;

        let root = data.join("source").join(source);
        let mut targets = Vec::new();
        for dataset in &source_config.datasets {
            let Some(url) = &dataset.url else { continue };
            let file = url
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| Error::Config(format!("cannot derive file name from {}", url)))?;
            targets.push(DownloadTarget {
                url: url.clone(),
                dest: root.join(&dataset.name).join(file),
            });
        }

        Ok(Self {
            targets,
            client: reqwest::Client::new(),
        })
    }

    pub fn targets(&self) -> &[DownloadTarget] {
        &self.targets
    }

    /// Download everything, `n_tasks` transfers in flight at a time.
    pub async fn download_all(&self, n_tasks: usize) -> Result<(), Error> {
        let results: Vec<Result<(), Error>> =
            futures::stream::iter(self.targets.iter().map(|target| self.fetch(target)))
                .buffer_unordered(n_tasks.max(1))
                .collect()
                .await;

        let mut failures = 0;
        for result in results {
            if let Err(e) = result {
                error!("download failed: {:?}", e);
                failures += 1;
            }
        }
        if failures > 0 {
            return Err(Error::Custom(format!(
                "{} downloads failed: see previous messages",
                failures
            )));
        }
        Ok(())
    }

    async fn fetch(&self, target: &DownloadTarget) -> Result<(), Error> {
        if target.dest.is_file() {
            info!("skipping existing {}", target.dest.display());
            return Ok(());
        }
        info!("downloading {}", target.url);

        let bytes = self
            .client
            .get(&target.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let parent = target.dest.parent().ok_or_else(|| {
            Error::Custom(format!("no parent directory for {}", target.dest.display()))
        })?;
        fs::create_dir_all(parent)?;

        let mut tmp = target.dest.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &target.dest)?;

        write_checksum(&target.dest, &bytes)?;

        if target.dest.extension().map_or(false, |ext| ext == "gz") {
            decompress_gz(&target.dest)?;
        }

        info!("completed {} ({} bytes)", target.url, bytes.len());
        Ok(())
    }
}

/// `sha256sum -c` compatible sibling file.
fn write_checksum(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = format!("{:x}", hasher.finalize());

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let mut checksum_path = path.as_os_str().to_owned();
    checksum_path.push(".sha256");

    let mut out = File::create(PathBuf::from(checksum_path))?;
    writeln!(out, "{}  {}", digest, file_name)?;
    Ok(())
}

/// Decompress `<name>.gz` next to itself as `<name>`, through a rename.
fn decompress_gz(path: &Path) -> Result<(), Error> {
    let plain = path.with_extension("");
    if plain.is_file() {
        return Ok(());
    }
    let mut tmp = plain.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    let mut decoder = GzDecoder::new(File::open(path)?);
    let mut out = File::create(&tmp)?;
    std::io::copy(&mut decoder, &mut out)?;
    fs::rename(&tmp, &plain)?;
    info!("decompressed {}", plain.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    #[test]
    fn checksum_file_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.txt");
        fs::write(&path, "hello").unwrap();
        write_checksum(&path, b"hello").unwrap();

        let checksum = fs::read_to_string(dir.path().join("corpus.txt.sha256")).unwrap();
        assert!(checksum.ends_with("  corpus.txt\n"));
        assert_eq!(checksum.split_whitespace().next().unwrap().len(), 64);
    }

    #[test]
    fn gz_decompresses_next_to_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("corpus.txt.gz");

        let mut encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        encoder.write_all(b"line one\nline two").unwrap();
        encoder.finish().unwrap();

        decompress_gz(&archive).unwrap();
        let plain = fs::read_to_string(dir.path().join("corpus.txt")).unwrap();
        assert_eq!(plain, "line one\nline two");
    }
}
