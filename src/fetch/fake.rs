use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::HttpClient;

/// A request as the fake saw it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: String,
    pub headers: HeaderMap,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Serves canned bodies by exact URL; anything else is a 404.
#[derive(Default)]
pub struct FakeClient {
    routes: HashMap<String, (u16, String)>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.insert(url.to_string(), (status, body.into()));
        self
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let url = req.url().to_string();
        self.seen.lock().unwrap().push(SeenRequest {
            url: url.clone(),
            headers: req.headers().clone(),
        });

        let (status, body) = self
            .routes
            .get(&url)
            .cloned()
            .unwrap_or((404, String::new()));
        let resp = http::Response::builder()
            .status(status)
            .body(body)
            .unwrap();
        Ok(reqwest::Response::from(resp))
    }
}
