//! Remote build cache backend for Tuist
//!
//! The host build tool asks [`BuildCacheService`] to load and store entries
//! by content hash. [`TuistBuildCacheService`] answers those requests against
//! the Tuist server:
//!
//! - credentials come from the Tuist CLI through a
//!   [`tuist_core::ConfigurationProvider`]
//! - [`AuthenticatedClient`] caches them for all build workers and refreshes
//!   them at most once when the server reports an expired token
//! - requests go through the [`HttpTransport`] seam, normally
//!   [`ReqwestTransport`]
//!
//! Use [`create_build_cache_service`] to wire everything from a
//! [`tuist_core::CacheSettings`] block.

pub mod client;
mod error;
pub mod factory;
pub mod http;
pub mod service;

pub use client::AuthenticatedClient;
pub use error::{Error, Result};
pub use factory::create_build_cache_service;
pub use http::{Body, HttpTransport, Method, ReqwestTransport, Request, Response, Timeouts};
pub use service::{
    BuildCacheKey, BuildCacheService, EntryReader, EntryWriter, TuistBuildCacheService, cache_url,
};

/// URL type used for every request
pub use reqwest::Url;
