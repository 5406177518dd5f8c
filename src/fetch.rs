//! "Fetch if absent" for raw sources.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use reqwest::blocking::Client;

use crate::config::SourceConfig;
use crate::error::{Result, TokprepError};

/// Retrieves a remote resource into a local file.
pub trait Fetch {
    /// Downloads `url` so that `destination` exists on return.
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Blocking HTTP(S) fetcher without timeout or retry.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    show_progress: bool,
}

impl HttpFetcher {
    /// Builds a fetcher; `show_progress` draws a byte progress bar on stderr.
    pub fn new(show_progress: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            show_progress,
        })
    }

    fn progress_bar(&self, total: Option<u64>, destination: &Path) -> Result<ProgressBar> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = match total {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        let style = ProgressStyle::with_template(concat!(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] ",
            "{bytes}/{total_bytes} ({eta}) {msg}"
        ))
        .map_err(|err| TokprepError::Internal(err.to_string()))?
        .progress_chars("#>-");
        pb.set_style(style);
        pb.set_message(format!(
            "Downloading {}",
            destination
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
        ));
        Ok(pb)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        let fetch_err = |message: String| TokprepError::Fetch {
            url: url.to_string(),
            message,
        };

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| TokprepError::io(err, Some(parent.to_path_buf())))?;
            }
        }

        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }

        let partial = partial_path(destination);
        let io_err = |err| TokprepError::io(err, Some(partial.clone()));
        let pb = self.progress_bar(response.content_length(), destination)?;
        let mut writer = BufWriter::new(File::create(&partial).map_err(io_err)?);
        io::copy(&mut response, &mut pb.wrap_write(&mut writer))
            .map_err(|err| fetch_err(err.to_string()))?;
        writer.flush().map_err(io_err)?;
        drop(writer);
        pb.finish_and_clear();

        fs::rename(&partial, destination)
            .map_err(|err| TokprepError::io(err, Some(destination.to_path_buf())))
    }
}

/// Makes sure the raw text of `source` is on disk and returns its path.
///
/// Remote sources land in `directory` and are skipped when already present; local sources must
/// exist.
pub fn ensure_present<F>(source: &SourceConfig, directory: &Path, fetcher: &F) -> Result<PathBuf>
where
    F: Fetch + ?Sized,
{
    let path = source.local_path(directory)?;
    if !source.is_remote() {
        if !path.is_file() {
            return Err(TokprepError::Fetch {
                url: source.location.clone(),
                message: "local source file does not exist".into(),
            });
        }
        return Ok(path);
    }
    if path.exists() {
        info!("{} already exists, skipping download...", path.display());
    } else {
        info!("Downloading {} to {}...", source.location, path.display());
        fetcher.fetch(&source.location, &path)?;
    }
    Ok(path)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    /// Writes a fixed body and records every request.
    #[derive(Default)]
    struct RecordingFetcher {
        calls: RefCell<Vec<String>>,
    }

    impl Fetch for RecordingFetcher {
        fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
            self.calls.borrow_mut().push(url.to_string());
            fs::write(destination, "fetched").map_err(|err| TokprepError::io(err, None))
        }
    }

    struct FailingFetcher;

    impl Fetch for FailingFetcher {
        fn fetch(&self, url: &str, _destination: &Path) -> Result<()> {
            Err(TokprepError::Fetch {
                url: url.to_string(),
                message: "offline".into(),
            })
        }
    }

    #[test]
    fn remote_source_is_fetched_once() {
        let dir = tempdir().expect("tempdir");
        let fetcher = RecordingFetcher::default();
        let source = SourceConfig::new("https://example.com/raw.txt", 1);

        let path = ensure_present(&source, dir.path(), &fetcher).expect("first fetch");
        assert_eq!(path, dir.path().join("raw.txt"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "fetched");

        ensure_present(&source, dir.path(), &fetcher).expect("second call");
        assert_eq!(fetcher.calls.borrow().len(), 1);
    }

    #[test]
    fn local_source_is_never_fetched() {
        let dir = tempdir().expect("tempdir");
        let local = dir.path().join("local.txt");
        fs::write(&local, "text").expect("write");
        let source = SourceConfig::new(local.to_string_lossy(), 2);
        let path = ensure_present(&source, dir.path(), &FailingFetcher).expect("local");
        assert_eq!(path, local);

        let missing = SourceConfig::new(dir.path().join("nope.txt").to_string_lossy(), 3);
        let err = ensure_present(&missing, dir.path(), &FailingFetcher).expect_err("missing");
        assert!(matches!(err, TokprepError::Fetch { .. }));
    }

    #[test]
    fn fetch_failure_propagates() {
        let dir = tempdir().expect("tempdir");
        let source = SourceConfig::new("https://example.com/raw.txt", 1);
        let err = ensure_present(&source, dir.path(), &FailingFetcher).expect_err("offline");
        assert!(err.to_string().contains("offline"));
        assert!(!dir.path().join("raw.txt").exists());
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("data/input.txt")),
            PathBuf::from("data/input.txt.part")
        );
    }
}
