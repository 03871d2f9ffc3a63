//! Blocking HTTP transport
//!
//! Requests go through [`HttpTransport`] so the cache and report code can be
//! driven by an in-memory server in tests. [`ReqwestTransport`] is the real
//! implementation.

use crate::{Error, Result};
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::sync::Arc;
use std::time::Duration;

/// Connection and read timeouts for one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed to establish a connection
    pub connect: Duration,
    /// Time allowed for the response
    pub read: Duration,
}

impl Timeouts {
    /// Timeouts for cache loads and stores.
    pub const CACHE: Self = Self {
        connect: Duration::from_secs(30),
        read: Duration::from_secs(60),
    };

    /// Timeouts for build report submission.
    pub const REPORT: Self = Self {
        connect: Duration::from_secs(10),
        read: Duration::from_secs(10),
    };
}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
}

/// Payload of a request.
#[derive(Clone)]
pub enum Body {
    /// In-memory bytes
    Bytes(Vec<u8>),
    /// Contents of a spooled file, sent from the start on every attempt
    File(Arc<File>),
}

impl Body {
    /// Reader over the whole payload, with its length.
    ///
    /// # Errors
    ///
    /// Any I/O error rewinding or inspecting a spooled file.
    pub fn reader(&self) -> std::io::Result<(Box<dyn Read + Send>, u64)> {
        match self {
            Self::Bytes(bytes) => Ok((
                Box::new(std::io::Cursor::new(bytes.clone())),
                bytes.len() as u64,
            )),
            Self::File(file) => {
                let mut file = file.try_clone()?;
                file.rewind()?;
                let len = file.metadata()?.len();
                Ok((Box::new(file), len))
            }
        }
    }

    /// The whole payload in memory.
    ///
    /// # Errors
    ///
    /// Any I/O error reading a spooled file.
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let (mut reader, len) = self.reader()?;
        let mut buf = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<File> for Body {
    fn from(file: File) -> Self {
        Self::File(Arc::new(file))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::File(_) => f.write_str("File"),
        }
    }
}

/// An authenticated request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method
    pub method: Method,
    /// Absolute URL
    pub url: Url,
    /// Sent as `Authorization: Bearer <token>`
    pub bearer_token: SecretString,
    /// Body content type
    pub content_type: Option<&'static str>,
    /// Request body
    pub body: Option<Body>,
}

impl Request {
    /// GET `url`.
    #[must_use]
    pub fn get(url: Url, token: SecretString) -> Self {
        Self {
            method: Method::Get,
            url,
            bearer_token: token,
            content_type: None,
            body: None,
        }
    }

    /// PUT `body` to `url`.
    #[must_use]
    pub fn put(
        url: Url,
        token: SecretString,
        content_type: &'static str,
        body: impl Into<Body>,
    ) -> Self {
        Self {
            method: Method::Put,
            url,
            bearer_token: token,
            content_type: Some(content_type),
            body: Some(body.into()),
        }
    }

    /// POST `body` to `url`.
    #[must_use]
    pub fn post(
        url: Url,
        token: SecretString,
        content_type: &'static str,
        body: impl Into<Body>,
    ) -> Self {
        Self {
            method: Method::Post,
            url,
            bearer_token: token,
            content_type: Some(content_type),
            body: Some(body.into()),
        }
    }
}

/// A response whose body can be streamed.
pub struct Response {
    /// HTTP status code
    pub status: u16,
    body: Box<dyn Read + Send>,
}

impl Response {
    /// Wrap a streaming body.
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }

    /// Response with an in-memory body.
    #[must_use]
    pub fn from_bytes(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, std::io::Cursor::new(body.into()))
    }

    /// Response without a body.
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self::from_bytes(status, Vec::new())
    }

    /// Body reader.
    pub fn body_mut(&mut self) -> &mut dyn Read {
        &mut self.body
    }

    /// Read the whole body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the body cannot be read.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.body
            .read_to_end(&mut buf)
            .map_err(|e| Error::io(e, "read response body"))?;
        Ok(buf)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends one request and returns the raw response.
///
/// Implementations must not interpret status codes; a 4xx/5xx is still an
/// `Ok` response.
pub trait HttpTransport: Send + Sync {
    /// Send `request`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when no response was received.
    fn send(&self, request: Request) -> Result<Response>;
}

/// [`HttpTransport`] backed by a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Build a client with the given timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the TLS backend fails to initialize.
    pub fn new(timeouts: Timeouts) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("tuist-gradle/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.read)
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: Request) -> Result<Response> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Put => self.client.put(request.url),
            Method::Post => self.client.post(request.url),
        };
        builder = builder.header(
            AUTHORIZATION,
            format!("Bearer {}", request.bearer_token.expose_secret()),
        );
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        match request.body {
            Some(Body::Bytes(bytes)) => builder = builder.body(bytes),
            Some(body @ Body::File(_)) => {
                let (reader, len) = body
                    .reader()
                    .map_err(|e| Error::io(e, "open request body"))?;
                builder = builder.body(reqwest::blocking::Body::sized(reader, len));
            }
            None => {}
        }

        let response = builder.send()?;
        Ok(Response::new(response.status().as_u16(), response))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_response_body() {
        let mut response = Response::from_bytes(200, b"artifact".to_vec());
        let mut buf = String::new();
        response.body_mut().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "artifact");
        assert_eq!(Response::empty(404).into_bytes().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_request_constructors() {
        let url = Url::parse("https://tuist.dev/api").unwrap();
        let request = Request::put(url, "tok".into(), "application/octet-stream", vec![1, 2, 3]);
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.content_type, Some("application/octet-stream"));
        assert_eq!(request.body.unwrap().to_bytes().unwrap(), [1, 2, 3]);
    }

    #[test]
    fn test_request_debug_hides_token() {
        let url = Url::parse("https://tuist.dev/api").unwrap();
        let get = Request::get(url.clone(), "super-secret-token".into());
        let post = Request::post(url, "super-secret-token".into(), "application/json", b"{}".to_vec());

        for rendered in [format!("{get:?}"), format!("{post:?}")] {
            assert!(!rendered.contains("super-secret-token"), "{rendered}");
            assert!(rendered.contains("REDACTED"), "{rendered}");
        }
        assert_eq!(get.bearer_token.expose_secret(), "super-secret-token");
    }

    #[test]
    fn test_file_body_is_resent_from_the_start() {
        let mut file = tempfile::tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"spooled entry").unwrap();
        let body = Body::from(file);

        assert_eq!(body.to_bytes().unwrap(), b"spooled entry");
        let (_, len) = body.reader().unwrap();
        assert_eq!(len, 13);
        assert_eq!(body.clone().to_bytes().unwrap(), b"spooled entry");
    }
}
