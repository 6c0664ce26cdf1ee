//! Stream resolution: turn an opaque stream reference into a fetchable URL.
//!
//! Resolution is best-effort. Only a reference that is not a URL at all is a
//! hard failure; any transport problem falls back to the original reference.

use async_trait::async_trait;
use std::str;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The reference cannot be fetched by anything (fails the job).
    #[error("invalid stream reference '{0}'")]
    Invalid(String),
    /// Redirect lookup failed (recovered by using the reference as-is).
    #[error("stream lookup failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<String, ResolveError>;
}

/// Resolves `reference`, falling back to it unchanged on transport errors.
pub async fn resolve_or_fallback(
    resolver: &dyn StreamResolver,
    reference: &str,
) -> Result<String, ResolveError> {
    match resolver.resolve(reference).await {
        Ok(url) => Ok(url),
        Err(ResolveError::Transport(e)) => {
            tracing::warn!(reference, "stream resolution failed, using reference as-is: {}", e);
            Ok(reference.to_string())
        }
        Err(e) => Err(e),
    }
}

/// Checks the reference parses as an absolute URL with a host.
pub fn validate_reference(reference: &str) -> Result<Url, ResolveError> {
    let url = Url::parse(reference.trim())
        .map_err(|_| ResolveError::Invalid(reference.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ResolveError::Invalid(reference.to_string()));
    }
    Ok(url)
}

/// Follows at most one redirect hop with libcurl.
#[derive(Debug, Clone)]
pub struct CurlResolver {
    headers: Vec<(&'static str, String)>,
    timeout: Duration,
}

impl CurlResolver {
    pub fn new(headers: Vec<(&'static str, String)>) -> Self {
        Self {
            headers,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl StreamResolver for CurlResolver {
    async fn resolve(&self, reference: &str) -> Result<String, ResolveError> {
        let url = validate_reference(reference)?;
        if !matches!(url.scheme(), "http" | "https") || url.path().ends_with(".m3u8") {
            return Ok(reference.to_string());
        }
        let headers = self.headers.clone();
        let timeout = self.timeout;
        let target = url.to_string();
        let redirect = tokio::task::spawn_blocking(move || single_hop(&target, &headers, timeout))
            .await
            .map_err(|e| ResolveError::Transport(format!("resolver task: {}", e)))??;
        Ok(redirect.unwrap_or_else(|| reference.to_string()))
    }
}

/// GET with redirects disabled; the body is aborted as soon as it starts.
/// Returns the redirect target, or None when the response is not a redirect.
/// Runs in the current thread; call from `spawn_blocking` if used from async code.
fn single_hop(
    url: &str,
    headers: &[(&'static str, String)],
    timeout: Duration,
) -> Result<Option<String>, ResolveError> {
    let transport = |e: curl::Error| ResolveError::Transport(e.to_string());

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(|_| ResolveError::Invalid(url.to_string()))?;
    easy.follow_location(false).map_err(transport)?;
    easy.connect_timeout(timeout).map_err(transport)?;
    easy.timeout(timeout).map_err(transport)?;

    let mut list = curl::easy::List::new();
    for (name, value) in headers {
        list.append(&format!("{}: {}", name, value.trim()))
            .map_err(transport)?;
    }
    easy.http_headers(list).map_err(transport)?;

    let performed = {
        let mut transfer = easy.transfer();
        // Returning 0 aborts the body; only the status line and headers matter.
        transfer.write_function(|_| Ok(0)).map_err(transport)?;
        transfer.perform()
    };
    match performed {
        Ok(()) => {}
        Err(e) if e.is_write_error() => {}
        Err(e) => return Err(transport(e)),
    }

    let code = easy.response_code().map_err(transport)?;
    if (300..400).contains(&code) {
        if let Some(location) = easy.redirect_url().map_err(transport)? {
            tracing::debug!(from = url, to = location, code, "stream reference redirected");
            return Ok(Some(location.to_string()));
        }
    }
    Ok(None)
}
