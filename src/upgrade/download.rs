use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_LENGTH, USER_AGENT};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use super::github::{AGENT, Asset};
use crate::error::UpdateError;

const HEAD_TIMEOUT: Duration = Duration::from_secs(15);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);
const CHUNK: usize = 8192;

/// Local cache of downloaded assets, keyed by asset name.
///
/// Entries are never deleted here. An entry is reused only when its size
/// matches the remote `Content-Length`; anything else is re-downloaded
/// over the same path.
#[derive(Debug, Clone)]
pub struct DownloadCache {
    client: Client,
    dir: PathBuf,
    response_timeout: Duration,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, UpdateError> {
        // No overall timeout: a multi-hundred-megabyte body must be allowed
        // to stream for as long as it takes. Only connect + headers are bounded.
        let client = Client::builder()
            .connect_timeout(RESPONSE_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| UpdateError::network("failed to build HTTP client", e))?;
        Ok(DownloadCache {
            client,
            dir: dir.into(),
            response_timeout: RESPONSE_TIMEOUT,
        })
    }

    /// Bound on the wait for the download's response headers.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, asset: &Asset) -> PathBuf {
        self.dir.join(&asset.name)
    }

    /// Fetch `asset` into the cache, reporting `(downloaded, total)` after
    /// each chunk. `total == 0` means the length is unknown.
    pub fn fetch(
        &self,
        asset: &Asset,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> Result<PathBuf, UpdateError> {
        let remote_size = self.remote_size(&asset.url);
        self.fetch_known_size(asset, remote_size, on_progress)
    }

    /// Remote size from a HEAD request; any failure reads as `0` (unknown).
    pub fn remote_size(&self, url: &str) -> u64 {
        let resp = match self
            .client
            .head(url)
            .header(USER_AGENT, AGENT)
            .timeout(HEAD_TIMEOUT)
            .send()
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("HEAD {} returned {}", url, r.status());
                return 0;
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                return 0;
            }
        };
        // `content_length()` reports the (empty) HEAD body, so read the header.
        resp.headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn fetch_known_size(
        &self,
        asset: &Asset,
        remote_size: u64,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> Result<PathBuf, UpdateError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            UpdateError::filesystem(
                format!("failed to create cache dir {}", self.dir.display()),
                e,
            )
        })?;
        let path = self.entry_path(asset);

        if is_usable(&path, remote_size) {
            info!("reusing cached {}", path.display());
            on_progress(remote_size, remote_size);
            return Ok(path);
        }

        debug!("downloading {} -> {}", asset.url, path.display());
        let mut resp = self.start_download(&asset.url)?;

        let total = resp.content_length().unwrap_or(remote_size);
        let mut out = fs::File::create(&path).map_err(|e| {
            UpdateError::filesystem(format!("failed to create {}", path.display()), e)
        })?;

        let mut buf = vec![0u8; CHUNK];
        let mut downloaded = 0u64;
        loop {
            let n = resp.read(&mut buf).map_err(|e| {
                UpdateError::network(format!("download of {} interrupted", asset.url), e)
            })?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).map_err(|e| {
                UpdateError::filesystem(format!("failed to write {}", path.display()), e)
            })?;
            downloaded += n as u64;
            on_progress(downloaded, total);
        }
        out.flush()
            .map_err(|e| UpdateError::filesystem(format!("failed to write {}", path.display()), e))?;

        info!("downloaded {} bytes to {}", downloaded, path.display());
        Ok(path)
    }
}

impl DownloadCache {
    /// Send the GET and wait at most `response_timeout` for its headers.
    ///
    /// The blocking client cannot bound time-to-headers without also bounding
    /// the body, so the request is sent from a helper thread. A request that
    /// times out is abandoned on that thread.
    fn start_download(&self, url: &str) -> Result<Response, UpdateError> {
        let context = || format!("failed to download {}", url);
        let (tx, rx) = mpsc::channel();
        let req = self.client.get(url).header(USER_AGENT, AGENT);
        thread::spawn(move || {
            let _ = tx.send(req.send());
        });
        match rx.recv_timeout(self.response_timeout) {
            Ok(sent) => sent
                .and_then(|r| r.error_for_status())
                .map_err(|e| UpdateError::network(context(), e)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(UpdateError::network(
                context(),
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "no response within {}s",
                        self.response_timeout.as_secs_f32()
                    ),
                ),
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(UpdateError::network(
                context(),
                io::Error::other("request thread exited"),
            )),
        }
    }
}

/// A cache entry is usable only when the remote size is known and equal.
fn is_usable(path: &Path, remote_size: u64) -> bool {
    if remote_size == 0 {
        return false;
    }
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() == remote_size)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::HEAD;
    use httpmock::prelude::*;
    use std::net::TcpListener;
    use std::time::Instant;
    use tempfile::tempdir;

    fn asset(server: &MockServer) -> Asset {
        Asset {
            name: "FreeCAD_weekly-2024.03.15-Windows-x86_64-py311.7z".into(),
            url: server.url("/dl/build.7z"),
        }
    }

    #[test]
    fn matching_cache_entry_skips_download() {
        let server = MockServer::start();
        let get = server.mock(|when, then| {
            when.method(GET).path("/dl/build.7z");
            then.status(200).body("fresh");
        });
        let td = tempdir().unwrap();
        let cache = DownloadCache::new(td.path()).unwrap();
        let a = asset(&server);
        fs::write(cache.entry_path(&a), b"12345").unwrap();

        let mut calls = Vec::new();
        let p = cache
            .fetch_known_size(&a, 5, &mut |d, t| calls.push((d, t)))
            .unwrap();

        get.assert_hits(0);
        assert_eq!(p, cache.entry_path(&a));
        assert_eq!(calls, vec![(5, 5)]);
        assert_eq!(fs::read(&p).unwrap(), b"12345");
    }

    #[test]
    fn mismatched_size_redownloads_and_overwrites() {
        let server = MockServer::start();
        let get = server.mock(|when, then| {
            when.method(GET).path("/dl/build.7z");
            then.status(200).body("fresh-bytes");
        });
        let td = tempdir().unwrap();
        let cache = DownloadCache::new(td.path().join("downloads")).unwrap();
        let a = asset(&server);
        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(cache.entry_path(&a), b"stale").unwrap();

        let mut last = (0, 0);
        let p = cache
            .fetch_known_size(&a, 11, &mut |d, t| last = (d, t))
            .unwrap();

        get.assert_hits(1);
        assert_eq!(fs::read(&p).unwrap(), b"fresh-bytes");
        assert_eq!(last, (11, 11));
    }

    #[test]
    fn unknown_remote_size_never_trusts_cache() {
        let server = MockServer::start();
        let get = server.mock(|when, then| {
            when.method(GET).path("/dl/build.7z");
            then.status(200).body("abc");
        });
        let td = tempdir().unwrap();
        let cache = DownloadCache::new(td.path()).unwrap();
        let a = asset(&server);
        fs::write(cache.entry_path(&a), b"abc").unwrap();

        cache.fetch_known_size(&a, 0, &mut |_, _| {}).unwrap();
        get.assert_hits(1);
    }

    #[test]
    fn progress_is_monotonic() {
        let server = MockServer::start();
        let body = vec![7u8; CHUNK * 3 + 17];
        server.mock(|when, then| {
            when.method(GET).path("/dl/build.7z");
            then.status(200).body(body.clone());
        });
        let td = tempdir().unwrap();
        let cache = DownloadCache::new(td.path()).unwrap();

        let mut seen = Vec::new();
        let p = cache
            .fetch_known_size(&asset(&server), 0, &mut |d, _| seen.push(d))
            .unwrap();

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(body.len() as u64));
        assert_eq!(fs::metadata(p).unwrap().len(), body.len() as u64);
    }

    #[test]
    fn http_failure_is_network_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/dl/build.7z");
            then.status(404);
        });
        let td = tempdir().unwrap();
        let cache = DownloadCache::new(td.path()).unwrap();
        let err = cache
            .fetch_known_size(&asset(&server), 0, &mut |_, _| {})
            .unwrap_err();
        assert!(err.is_network(), "{err}");
    }

    #[test]
    fn remote_size_is_zero_when_head_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(HEAD).path("/dl/build.7z");
            then.status(500);
        });
        let td = tempdir().unwrap();
        let cache = DownloadCache::new(td.path()).unwrap();
        assert_eq!(cache.remote_size(&server.url("/dl/build.7z")), 0);
        assert_eq!(cache.remote_size("http://127.0.0.1:1/unreachable"), 0);
    }

    #[test]
    fn fetch_reuses_entry_matching_head_size() {
        let server = MockServer::start();
        let head = server.mock(|when, then| {
            when.method(HEAD).path("/dl/build.7z");
            then.status(200).header("content-length", "5");
        });
        let get = server.mock(|when, then| {
            when.method(GET).path("/dl/build.7z");
            then.status(200).body("fresh");
        });
        let td = tempdir().unwrap();
        let cache = DownloadCache::new(td.path()).unwrap();
        let a = asset(&server);
        fs::write(cache.entry_path(&a), b"12345").unwrap();

        assert_eq!(cache.remote_size(&a.url), 5);
        let mut calls = Vec::new();
        let p = cache.fetch(&a, &mut |d, t| calls.push((d, t))).unwrap();

        head.assert_hits(2);
        get.assert_hits(0);
        assert_eq!(p, cache.entry_path(&a));
        assert_eq!(calls, vec![(5, 5)]);
    }

    #[test]
    fn silent_server_times_out_waiting_for_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            // accept and hold the connection without ever answering
            let held: Vec<_> = listener.incoming().take(1).collect();
            thread::sleep(Duration::from_secs(3));
            drop(held);
        });
        let td = tempdir().unwrap();
        let cache = DownloadCache::new(td.path())
            .unwrap()
            .with_response_timeout(Duration::from_millis(300));
        let a = Asset {
            name: "FreeCAD_weekly-2024.03.15-Linux-x86_64-py311.AppImage".into(),
            url: format!("http://{}/dl/build", addr),
        };

        let started = Instant::now();
        let err = cache.fetch_known_size(&a, 0, &mut |_, _| {}).unwrap_err();
        assert!(err.is_network(), "{err}");
        assert!(err.to_string().contains("no response"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }
}
