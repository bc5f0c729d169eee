//! HTTP to a remote engine host via `reqwest`.

use engine::{ByteStream, Method, RawResponse, Request, TransportError};
use futures::StreamExt;
use reqwest::header::ACCEPT;

pub(crate) struct RemoteConnector {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteConnector {
    pub(crate) fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn execute(
        &self,
        request: &Request,
        path: &str,
    ) -> Result<RawResponse, TransportError> {
        let response = self.send(request, path).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| TransportError::Body {
            message: e.to_string(),
        })?;
        Ok(RawResponse { status, body })
    }

    pub(crate) async fn stream(
        &self,
        request: &Request,
        path: &str,
    ) -> Result<(u16, ByteStream), TransportError> {
        let response = self.send(request, path).await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| TransportError::Body {
                    message: e.to_string(),
                })
            })
            .boxed();
        Ok((status, body))
    }

    async fn send(&self, request: &Request, path: &str) -> Result<reqwest::Response, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, &url);
        if request.accept_json {
            builder = builder.header(ACCEPT, "application/json");
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| {
            if e.is_connect() {
                TransportError::Connect {
                    endpoint: self.base_url.clone(),
                    source: std::io::Error::other(e),
                }
            } else {
                TransportError::Request {
                    method: request.method.to_string(),
                    path: path.to_owned(),
                    message: e.to_string(),
                }
            }
        })
    }
}
