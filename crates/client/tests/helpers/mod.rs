//! Scripted in-memory engine for client tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use engine::{encode_frame, Method, RawResponse, Request, StreamingResponse, Transport, TransportError};
use futures::channel::mpsc;
use futures::StreamExt;

enum Reply {
    Response(RawResponse),
    Fail,
    Stream(u16, mpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
}

/// Answers requests from a queue, in order, and records every request.
///
/// An exhausted queue answers with a transport error, so an unexpected
/// extra call shows up as a failure envelope rather than a hang.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: u16, body: impl Into<Bytes>) -> Self {
        self.push(Reply::Response(RawResponse::new(status, body)));
        self
    }

    pub fn reply_json(self, status: u16, body: serde_json::Value) -> Self {
        let bytes = serde_json::to_vec(&body).unwrap();
        self.reply(status, bytes)
    }

    pub fn fail(self) -> Self {
        self.push(Reply::Fail);
        self
    }

    /// Queues a streaming reply whose body is fed through the returned sender.
    pub fn open_stream(&self, status: u16) -> mpsc::UnboundedSender<Result<Bytes, TransportError>> {
        let (tx, rx) = mpsc::unbounded();
        self.push(Reply::Stream(status, rx));
        tx
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// `(method, path)` of every recorded request.
    pub fn calls(&self) -> Vec<(Method, String)> {
        self.requests()
            .into_iter()
            .map(|r| (r.method, r.path))
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn next(&self, request: Request) -> Option<Reply> {
        self.requests.lock().unwrap().push(request);
        self.replies.lock().unwrap().pop_front()
    }
}

fn unscripted(request: &Request) -> TransportError {
    TransportError::Request {
        method: request.method.to_string(),
        path: request.path.clone(),
        message: "no scripted reply".to_owned(),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: Request) -> Result<RawResponse, TransportError> {
        let copy = request.clone();
        match self.next(request) {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Stream(status, rx)) => {
                let chunks: Vec<_> = rx.collect().await;
                let mut body = Vec::new();
                for chunk in chunks {
                    body.extend_from_slice(&chunk?);
                }
                Ok(RawResponse::new(status, body))
            }
            Some(Reply::Fail) => Err(TransportError::Handshake {
                message: "connection reset".to_owned(),
            }),
            None => Err(unscripted(&copy)),
        }
    }

    async fn stream(&self, request: Request) -> Result<StreamingResponse, TransportError> {
        let copy = request.clone();
        match self.next(request) {
            Some(Reply::Stream(status, rx)) => Ok(StreamingResponse {
                status,
                body: rx.boxed(),
            }),
            Some(Reply::Response(RawResponse { status, body })) => Ok(StreamingResponse {
                status,
                body: futures::stream::once(async move { Ok(body) }).boxed(),
            }),
            Some(Reply::Fail) => Err(TransportError::Handshake {
                message: "connection reset".to_owned(),
            }),
            None => Err(unscripted(&copy)),
        }
    }

    fn endpoint(&self) -> String {
        "scripted".to_owned()
    }
}

/// Concatenated frames, each `(stream type, payload)`.
pub fn frames(parts: &[(u8, &[u8])]) -> Vec<u8> {
    parts
        .iter()
        .flat_map(|(stream_type, payload)| encode_frame(*stream_type, payload))
        .collect()
}
