//! Build cache backend speaking the Tuist cache protocol
//!
//! ```text
//! GET {url}/api/cache/gradle/{key}?account_handle=..&project_handle=..
//!   200 hit (body = entry), 404 miss, 401 expired token
//! PUT same URL, application/octet-stream
//!   200/201/204 stored, 401 expired token
//! ```
//!
//! Entries to store are spooled to an anonymous temporary file once, so the
//! upload and its single retry stream from disk instead of memory.

use crate::client::AuthenticatedClient;
use crate::http::{Body, HttpTransport, Request};
use crate::{Error, Result};
use reqwest::Url;
use std::fmt;
use std::io::{BufWriter, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use tuist_core::CacheConfiguration;

const OCTET_STREAM: &str = "application/octet-stream";

/// Opaque content hash identifying a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildCacheKey(String);

impl BuildCacheKey {
    /// Wrap a hash computed by the build tool.
    #[must_use]
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// The hash string.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receives the bytes of a loaded entry.
pub trait EntryReader {
    /// Consume the entry from `input`.
    ///
    /// # Errors
    ///
    /// Any I/O error while reading or unpacking the entry.
    fn read_from(&mut self, input: &mut dyn Read) -> std::io::Result<()>;
}

/// Produces the bytes of an entry to store.
pub trait EntryWriter {
    /// Write the entry to `output`.
    ///
    /// # Errors
    ///
    /// Any I/O error while packing or writing the entry.
    fn write_to(&self, output: &mut dyn Write) -> std::io::Result<()>;

    /// Size of the entry in bytes.
    fn size(&self) -> u64;
}

impl EntryReader for Vec<u8> {
    fn read_from(&mut self, input: &mut dyn Read) -> std::io::Result<()> {
        input.read_to_end(self).map(|_| ())
    }
}

impl EntryWriter for [u8] {
    fn write_to(&self, output: &mut dyn Write) -> std::io::Result<()> {
        output.write_all(self)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl EntryWriter for Vec<u8> {
    fn write_to(&self, output: &mut dyn Write) -> std::io::Result<()> {
        self.as_slice().write_to(output)
    }

    fn size(&self) -> u64 {
        self.as_slice().size()
    }
}

/// Pluggable remote cache interface of the host build tool.
pub trait BuildCacheService: Send + Sync {
    /// Load the entry for `key` into `reader`.
    ///
    /// Returns `false` on a miss.
    ///
    /// # Errors
    ///
    /// Any failure other than a miss; the host decides whether to fall back
    /// to local execution.
    fn load(&self, key: &BuildCacheKey, reader: &mut dyn EntryReader) -> Result<bool>;

    /// Store the entry produced by `writer` under `key`.
    ///
    /// # Errors
    ///
    /// Any failure to upload the entry.
    fn store(&self, key: &BuildCacheKey, writer: &dyn EntryWriter) -> Result<()>;

    /// Release resources. Called once when the build finishes.
    fn close(&self) {}
}

/// [`BuildCacheService`] backed by the Tuist server.
pub struct TuistBuildCacheService {
    client: Arc<AuthenticatedClient>,
    transport: Arc<dyn HttpTransport>,
    push_enabled: bool,
    allow_insecure_protocol: bool,
    unavailable_reported: AtomicBool,
}

impl TuistBuildCacheService {
    /// Create a read-only service.
    #[must_use]
    pub fn new(client: Arc<AuthenticatedClient>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            client,
            transport,
            push_enabled: false,
            allow_insecure_protocol: false,
            unavailable_reported: AtomicBool::new(false),
        }
    }

    /// Enable or disable uploads.
    #[must_use]
    pub fn with_push(mut self, enabled: bool) -> Self {
        self.push_enabled = enabled;
        self
    }

    /// Allow `http://` cache URLs.
    #[must_use]
    pub fn with_insecure_protocol(mut self, allowed: bool) -> Self {
        self.allow_insecure_protocol = allowed;
        self
    }

    /// Whether [`BuildCacheService::store`] uploads anything.
    #[must_use]
    pub fn is_push_enabled(&self) -> bool {
        self.push_enabled
    }

    fn entry_url(&self, config: &CacheConfiguration, key: &BuildCacheKey) -> Result<Url> {
        cache_url(config, key.hash(), self.allow_insecure_protocol)
    }

    /// Turn "no credentials" into cache-miss behaviour, warning once.
    fn degrade<T>(&self, result: Result<T>, fallback: T) -> Result<T> {
        match result {
            Err(Error::ConfigurationUnavailable) => {
                if !self.unavailable_reported.swap(true, Ordering::SeqCst) {
                    warn!("Tuist: remote cache unavailable for this build; continuing without it");
                }
                Ok(fallback)
            }
            other => other,
        }
    }
}

impl BuildCacheService for TuistBuildCacheService {
    fn load(&self, key: &BuildCacheKey, reader: &mut dyn EntryReader) -> Result<bool> {
        let result = self.client.execute(|config| {
            let url = self.entry_url(config, key)?;
            let mut response = self
                .transport
                .send(Request::get(url, config.token.clone()))?;
            match response.status {
                200 => {
                    reader
                        .read_from(response.body_mut())
                        .map_err(|e| Error::io(e, "read cache entry"))?;
                    Ok(true)
                }
                404 => Ok(false),
                401 => Err(Error::TokenExpired),
                status => Err(Error::UnexpectedStatus {
                    operation: "Loading",
                    status,
                }),
            }
        });

        let hit = self.degrade(result, false)?;
        debug!(key = %key, hit, "Remote cache load");
        Ok(hit)
    }

    fn store(&self, key: &BuildCacheKey, writer: &dyn EntryWriter) -> Result<()> {
        if !self.push_enabled {
            return Ok(());
        }

        // Spooled on the first attempt only, and only once credentials exist
        let mut spooled: Option<Body> = None;
        let result = self.client.execute(|config| {
            let url = self.entry_url(config, key)?;
            let body = if let Some(body) = &spooled {
                body.clone()
            } else {
                let body = spool(writer)?;
                spooled = Some(body.clone());
                body
            };

            let response = self.transport.send(Request::put(
                url,
                config.token.clone(),
                OCTET_STREAM,
                body,
            ))?;
            match response.status {
                200 | 201 | 204 => Ok(()),
                401 => Err(Error::TokenExpired),
                status => Err(Error::UnexpectedStatus {
                    operation: "Storing",
                    status,
                }),
            }
        });

        self.degrade(result, ())?;
        debug!(key = %key, size = writer.size(), "Remote cache store");
        Ok(())
    }

    fn close(&self) {
        // Connections are per request
    }
}

impl fmt::Debug for TuistBuildCacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TuistBuildCacheService")
            .field("push_enabled", &self.push_enabled)
            .field("allow_insecure_protocol", &self.allow_insecure_protocol)
            .finish_non_exhaustive()
    }
}

fn spool(writer: &dyn EntryWriter) -> Result<Body> {
    let file = tempfile::tempfile().map_err(|e| Error::io(e, "create spool file"))?;
    let mut out = BufWriter::new(&file);
    writer
        .write_to(&mut out)
        .and_then(|()| out.flush())
        .map_err(|e| Error::io(e, "write cache entry"))?;
    drop(out);
    Ok(Body::from(file))
}

/// URL of the entry `key` for the project in `config`.
///
/// # Errors
///
/// - [`Error::InvalidUrl`] when the server URL does not parse or cannot
///   carry a path
/// - [`Error::InsecureProtocol`] for `http` without `allow_insecure`
pub fn cache_url(config: &CacheConfiguration, key: &str, allow_insecure: bool) -> Result<Url> {
    let base = config.base_url();
    let mut url = Url::parse(base).map_err(|e| Error::invalid_url(base, e.to_string()))?;
    if url.scheme() == "http" && !allow_insecure {
        return Err(Error::InsecureProtocol {
            url: base.to_string(),
        });
    }

    url.path_segments_mut()
        .map_err(|()| Error::invalid_url(base, "URL cannot be a base"))?
        .pop_if_empty()
        .extend(["api", "cache", "gradle", key]);
    url.query_pairs_mut()
        .clear()
        .append_pair("account_handle", &config.account_handle)
        .append_pair("project_handle", &config.project_handle);
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(url: &str) -> CacheConfiguration {
        CacheConfiguration {
            url: url.to_string(),
            token: "tok".into(),
            account_handle: "acme".to_string(),
            project_handle: "app".to_string(),
        }
    }

    #[test]
    fn test_cache_url() {
        let url = cache_url(&config("https://tuist.dev/"), "abc123", false).unwrap();
        assert_eq!(
            url.as_str(),
            "https://tuist.dev/api/cache/gradle/abc123?account_handle=acme&project_handle=app"
        );
    }

    #[test]
    fn test_cache_url_keeps_base_path() {
        let url = cache_url(&config("https://example.com/tuist"), "k", false).unwrap();
        assert_eq!(url.path(), "/tuist/api/cache/gradle/k");
    }

    #[test]
    fn test_cache_url_encodes_values() {
        let mut cfg = config("https://tuist.dev");
        cfg.project_handle = "my app".to_string();
        let url = cache_url(&cfg, "a/b", false).unwrap();
        assert_eq!(url.path(), "/api/cache/gradle/a%2Fb");
        assert_eq!(url.query(), Some("account_handle=acme&project_handle=my+app"));
    }

    #[test]
    fn test_insecure_protocol_requires_opt_in() {
        let cfg = config("http://localhost:8080");
        assert!(matches!(
            cache_url(&cfg, "k", false),
            Err(Error::InsecureProtocol { .. })
        ));
        assert!(cache_url(&cfg, "k", true).is_ok());
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            cache_url(&config("not a url"), "k", false),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_vec_entries() {
        let mut sink = Vec::<u8>::new();
        sink.read_from(&mut &b"payload"[..]).unwrap();
        assert_eq!(sink, b"payload");

        let mut out = Vec::<u8>::new();
        EntryWriter::write_to(&sink, &mut out).unwrap();
        assert_eq!(out, b"payload");
        assert_eq!(EntryWriter::size(&sink), 7);
    }

    #[test]
    fn test_spooled_entry_matches_writer() {
        let entry = b"packed task outputs".to_vec();
        let body = spool(&entry).unwrap();
        assert!(matches!(body, Body::File(_)));
        assert_eq!(body.to_bytes().unwrap(), entry);
    }
}
