//! Create/start/delete flows against a scripted engine.

mod helpers;

use client::DockerClient;
use engine::{ContainerName, ImageRef, Method, FailureKind, TRANSPORT_FAILURE_CODE};
use helpers::{frames, ScriptedTransport};
use serde_json::json;

fn image() -> ImageRef {
    ImageRef::new("ubuntu:latest").unwrap()
}

fn cmd(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_owned()).collect()
}

#[tokio::test]
async fn test_create_and_start() {
    let transport = ScriptedTransport::new()
        .reply_json(201, json!({"Id": "abc123", "Warnings": []}))
        .reply(204, "");
    let client = DockerClient::new(transport);

    let id = client
        .run_container_async(&image(), &cmd(&["echo", "hi"]), None)
        .await;

    assert_eq!(id.as_ref().map(|id| id.as_str()), Some("abc123"));
    let requests = client.transport().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].path, "/containers/create");
    assert_eq!(
        requests[0].body,
        Some(json!({"Image": "ubuntu:latest", "Cmd": ["echo", "hi"]}))
    );
    assert_eq!(requests[1].path, "/containers/abc123/start");
}

#[tokio::test]
async fn test_name_goes_into_query_and_empty_command_is_omitted() {
    let transport = ScriptedTransport::new()
        .reply_json(201, json!({"Id": "abc123"}))
        .reply(204, "");
    let client = DockerClient::new(transport);
    let name = ContainerName::new("web").unwrap();

    assert!(client.run_container_async(&image(), &[], Some(&name)).await.is_some());

    let create = &client.transport().requests()[0];
    assert_eq!(create.path, "/containers/create?name=web");
    assert_eq!(create.body, Some(json!({"Image": "ubuntu:latest"})));
}

#[tokio::test]
async fn test_failed_create_sends_nothing_else() {
    let transport = ScriptedTransport::new()
        .reply_json(404, json!({"message": "No such image: ubuntu:latest"}))
        .reply(204, "")
        .reply(204, "");
    let client = DockerClient::new(transport);

    assert!(client.run_container_async(&image(), &[], None).await.is_none());
    assert_eq!(
        client.transport().calls(),
        vec![(Method::Post, "/containers/create".to_owned())]
    );
}

#[tokio::test]
async fn test_failed_start_force_deletes() {
    let transport = ScriptedTransport::new()
        .reply_json(201, json!({"Id": "abc123"}))
        .reply_json(500, json!({"message": "cannot start container"}))
        .reply(204, "");
    let client = DockerClient::new(transport);

    assert!(client.run_container_async(&image(), &[], None).await.is_none());
    assert_eq!(
        client.transport().calls(),
        vec![
            (Method::Post, "/containers/create".to_owned()),
            (Method::Post, "/containers/abc123/start".to_owned()),
            (Method::Delete, "/containers/abc123?v=false&force=true".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_failed_cleanup_still_returns_none() {
    let transport = ScriptedTransport::new()
        .reply_json(201, json!({"Id": "abc123"}))
        .reply_json(500, json!({"message": "cannot start container"}))
        .fail();
    let client = DockerClient::new(transport);

    assert!(client.run_container_async(&image(), &[], None).await.is_none());
    assert_eq!(client.transport().requests().len(), 3);
}

#[tokio::test]
async fn test_create_body_without_id_is_a_failure() {
    let transport = ScriptedTransport::new().reply_json(201, json!({"Warnings": null}));
    let client = DockerClient::new(transport);

    assert!(client.run_container_async(&image(), &[], None).await.is_none());
    assert_eq!(client.transport().requests().len(), 1);
}

#[tokio::test]
async fn test_create_body_with_empty_id_is_a_failure() {
    let transport = ScriptedTransport::new()
        .reply_json(201, json!({"Id": "", "Warnings": []}))
        .reply(204, "");
    let client = DockerClient::new(transport);

    assert!(client.run_container_async(&image(), &[], None).await.is_none());
    assert_eq!(client.transport().requests().len(), 1);
}

#[tokio::test]
async fn test_run_and_collect() {
    let transport = ScriptedTransport::new()
        .reply_json(201, json!({"Id": "abc123"}))
        .reply(204, "")
        .reply_json(200, json!({"StatusCode": 3}))
        .reply(200, frames(&[(1, b"out "), (2, b"err"), (1, b"put")]))
        .reply(204, "");
    let client = DockerClient::new(transport);

    let output = client
        .run_and_collect(&image(), &cmd(&["sh", "-c", "exit 3"]), None)
        .await
        .unwrap();

    assert_eq!(output.container.as_str(), "abc123");
    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stdout_lossy(), "out put");
    assert_eq!(output.stderr_lossy(), "err");
    assert!(client.sessions().is_empty());

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 5);
    assert_eq!(calls[2], (Method::Post, "/containers/abc123/wait".to_owned()));
    assert!(client.transport().requests()[2].blocking);
    assert_eq!(calls[4], (Method::Delete, "/containers/abc123?v=false&force=true".to_owned()));
}

#[tokio::test]
async fn test_run_and_collect_deletes_after_failed_wait() {
    let transport = ScriptedTransport::new()
        .reply_json(201, json!({"Id": "abc123"}))
        .reply(204, "")
        .fail()
        .reply(204, "");
    let client = DockerClient::new(transport);

    assert!(client.run_and_collect(&image(), &[], None).await.is_none());
    let calls = client.transport().calls();
    assert_eq!(calls.last().unwrap().0, Method::Delete);
    assert_eq!(client.transport().remaining(), 0);
}

#[tokio::test]
async fn test_transport_failure_has_sentinel_code() {
    let client = DockerClient::new(ScriptedTransport::new().fail());
    let envelope = client.version().await;

    assert!(!envelope.success());
    assert_eq!(envelope.code(), Some(TRANSPORT_FAILURE_CODE));
    assert_eq!(envelope.failure().unwrap().kind, FailureKind::Transport);
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({"success": false, "code": 0, "data": {"message": envelope.failure().unwrap().message().unwrap()}})
    );
}
