//! HTTP/1 over the engine's Unix domain socket.
//!
//! Every call dials a fresh connection, performs the handshake, and hands the
//! connection driver to a background task. The engine closes idle
//! connections aggressively, so there is no pooling.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use engine::{ByteStream, Method, RawResponse, Request, TransportError};
use futures::StreamExt;
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::debug;

pub(crate) struct UnixConnector {
    socket_path: PathBuf,
}

impl UnixConnector {
    pub(crate) fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub(crate) fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub(crate) async fn execute(
        &self,
        request: &Request,
        path: &str,
    ) -> Result<RawResponse, TransportError> {
        let response = self.send(request, path).await?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::Body {
                message: e.to_string(),
            })?
            .to_bytes();
        Ok(RawResponse { status, body })
    }

    pub(crate) async fn stream(
        &self,
        request: &Request,
        path: &str,
    ) -> Result<(u16, ByteStream), TransportError> {
        let response = self.send(request, path).await?;
        let status = response.status().as_u16();
        let body = BodyStream::new(response.into_body())
            .filter_map(|frame| async move {
                match frame {
                    Ok(frame) => frame.into_data().ok().map(Ok),
                    Err(e) => Some(Err(TransportError::Body {
                        message: e.to_string(),
                    })),
                }
            })
            .boxed();
        Ok((status, body))
    }

    async fn send(
        &self,
        request: &Request,
        path: &str,
    ) -> Result<hyper::Response<Incoming>, TransportError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: self.socket_path.display().to_string(),
                source,
            })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| TransportError::Handshake {
                message: e.to_string(),
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "engine connection closed");
            }
        });

        let http_request = build_request(request, path)?;
        sender
            .send_request(http_request)
            .await
            .map_err(|e| request_error(request, path, e.to_string()))
    }
}

fn build_request(
    request: &Request,
    path: &str,
) -> Result<hyper::Request<Full<Bytes>>, TransportError> {
    let method = match request.method {
        Method::Get => hyper::Method::GET,
        Method::Post => hyper::Method::POST,
        Method::Put => hyper::Method::PUT,
        Method::Delete => hyper::Method::DELETE,
    };

    let mut builder = hyper::Request::builder()
        .method(method)
        .uri(path)
        .header(HOST, "localhost");
    if request.accept_json {
        builder = builder.header(ACCEPT, "application/json");
    }

    let body = match &request.body {
        Some(value) => {
            let bytes = serde_json::to_vec(value)
                .map_err(|e| request_error(request, path, e.to_string()))?;
            builder = builder.header(CONTENT_TYPE, "application/json");
            Full::new(Bytes::from(bytes))
        }
        None => Full::new(Bytes::new()),
    };

    builder
        .body(body)
        .map_err(|e| request_error(request, path, e.to_string()))
}

fn request_error(request: &Request, path: &str, message: String) -> TransportError {
    TransportError::Request {
        method: request.method.to_string(),
        path: path.to_owned(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_request_with_json_body() {
        let request = Request::post("/containers/create?name=web")
            .with_body(json!({"Image": "nginx"}))
            .accept_json(true);
        let built = build_request(&request, "/v1.24/containers/create?name=web").unwrap();

        assert_eq!(built.method(), hyper::Method::POST);
        assert_eq!(built.uri().path(), "/v1.24/containers/create");
        assert_eq!(built.uri().query(), Some("name=web"));
        assert_eq!(built.headers()[ACCEPT], "application/json");
        assert_eq!(built.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_build_request_without_body() {
        let request = Request::post("/containers/abc/start");
        let built = build_request(&request, "/containers/abc/start").unwrap();
        assert!(built.headers().get(CONTENT_TYPE).is_none());
        assert!(built.headers().get(ACCEPT).is_none());
    }
}
