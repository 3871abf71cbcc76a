use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, InvalidHeaderValue};

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
pub struct ApiKey<C> {
    pub inner: C,
    pub header_name: HeaderName,
    pub key: HeaderValue,
}

impl<C> ApiKey<C> {
    /// Sends the key as `x-api-key`, as the bus vehicle feed expects.
    pub fn x_api_key(inner: C, key: &str) -> Result<Self, InvalidHeaderValue> {
        let mut key = HeaderValue::from_str(key)?;
        key.set_sensitive(true);
        Ok(Self {
            inner,
            header_name: HeaderName::from_static("x-api-key"),
            key,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.key.clone());
        self.inner.execute(req).await
    }
}
