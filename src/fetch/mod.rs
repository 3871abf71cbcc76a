//! HTTP plumbing shared by every feed adapter.

mod api_key;
mod basic;
mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use api_key::ApiKey;
pub use basic::BasicClient;
pub use client::HttpClient;

use reqwest::Url;
use reqwest::header::HeaderMap;

use crate::error::FetchError;

fn request(url: &str, headers: HeaderMap) -> Result<reqwest::Request, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::Url {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let mut req = reqwest::Request::new(reqwest::Method::GET, parsed);
    *req.headers_mut() = headers;
    Ok(req)
}

/// GETs `url` and returns the body. Any non-2xx status is an error.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Vec<u8>, FetchError> {
    fetch_bytes_with(client, url, HeaderMap::new()).await
}

/// Like [`fetch_bytes`], sending extra request headers.
pub async fn fetch_bytes_with<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    headers: HeaderMap,
) -> Result<Vec<u8>, FetchError> {
    let req = request(url, headers)?;
    let resp = client
        .execute(req)
        .await
        .map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = resp.bytes().await.map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })?;
    tracing::debug!(url, bytes = bytes.len(), "Fetched");
    Ok(bytes.to_vec())
}

/// Fetches `url` as text, dropping a leading UTF-8 byte order mark.
pub async fn fetch_text<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<String, FetchError> {
    let bytes = fetch_bytes(client, url).await?;
    Ok(strip_bom(&String::from_utf8_lossy(&bytes)).to_string())
}

pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
