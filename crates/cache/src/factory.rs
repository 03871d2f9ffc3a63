//! Construction of the cache service from a settings block

use crate::Result;
use crate::client::AuthenticatedClient;
use crate::http::{ReqwestTransport, Timeouts};
use crate::service::TuistBuildCacheService;
use std::sync::Arc;
use tracing::{debug, warn};
use tuist_core::{
    CacheSettings, CommandConfigurationProvider, Error as CoreError, validate_tool_version,
};

/// Build the remote cache service described by `settings`.
///
/// Returns `Ok(None)` when the cache is disabled, or when the Tuist CLI is
/// not installed so the build can continue without a remote cache.
///
/// # Errors
///
/// - [`tuist_core::Error::Configuration`] for a blank project handle
/// - [`tuist_core::Error::UnsupportedVersion`] when the CLI is too old
/// - [`crate::Error::Transport`] if the HTTP client cannot be created
pub fn create_build_cache_service(
    settings: &CacheSettings,
) -> Result<Option<TuistBuildCacheService>> {
    if !settings.enabled {
        debug!("Tuist remote cache disabled");
        return Ok(None);
    }
    settings.validate()?;

    let command = settings.tool_command();
    match validate_tool_version(&command) {
        Ok(()) => {}
        Err(CoreError::ToolNotFound { program }) => {
            warn!(
                %program,
                "Tuist CLI not found. Install Tuist or set executablePath; the remote cache is disabled for this build."
            );
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    }

    let provider = CommandConfigurationProvider::new(settings.full_handle.trim(), command)
        .with_url(settings.url.clone());
    let client = AuthenticatedClient::new(Arc::new(provider));
    let transport = ReqwestTransport::new(Timeouts::CACHE)?;

    debug!(
        full_handle = %settings.full_handle,
        push = settings.push,
        "Tuist remote cache enabled"
    );
    Ok(Some(
        TuistBuildCacheService::new(Arc::new(client), Arc::new(transport))
            .with_push(settings.push)
            .with_insecure_protocol(settings.allow_insecure_protocol),
    ))
}
