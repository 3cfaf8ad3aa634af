//! Integration tests for the stdio bridge.
//!
//! These tests drive the `mock-stdio-server` binary built alongside them.

use std::sync::Arc;
use std::time::Duration;

use conduit_bridge::{Bridge, BridgeError, BridgeState, CallToolResult, ProcessConfig};
use futures::future::join_all;
use serde_json::{Value, json};

fn mock_config(args: &[&str]) -> ProcessConfig {
    ProcessConfig::new(env!("CARGO_BIN_EXE_mock-stdio-server"))
        .with_args(args.iter().map(|a| a.to_string()).collect())
        .with_call_timeout(Duration::from_secs(5))
        .with_startup_timeout(Duration::from_secs(5))
}

async fn started(args: &[&str]) -> Arc<Bridge> {
    let bridge = Arc::new(Bridge::new(mock_config(args)));
    bridge.start().await.expect("bridge should start");
    bridge
}

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_start_and_handshake() {
    let bridge = started(&[]).await;
    assert!(bridge.is_ready());

    let status = bridge.status();
    assert_eq!(status.status, BridgeState::Running);
    assert!(status.pid.is_some());
    assert_eq!(status.server.as_ref().unwrap().name, "mock-stdio-server");
    assert_eq!(status.protocol_version.as_deref(), Some("2024-11-05"));
    assert_eq!(status.pending_calls, 0);

    // notifications/initialized was sent after the handshake.
    let stats = bridge.call_tool("stats", json!({})).await.unwrap();
    assert_eq!(stats["initialized"], true);

    bridge.shutdown().await;
    assert!(!bridge.is_ready());
}

#[tokio::test]
async fn test_list_tools() {
    let bridge = started(&[]).await;
    let tools = bridge.list_tools().await.unwrap();
    assert_eq!(tools.len(), 8);
    let echo = tools.iter().find(|t| t.name == "echo").unwrap();
    assert_eq!(echo.description.as_deref(), Some("Echo back the input"));
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_list_tools_follows_pagination() {
    let bridge = started(&["--page-size", "3"]).await;
    let tools = bridge.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["echo", "add", "slow", "ignore", "crash", "fail", "batch", "stats"]
    );
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_call_tool() {
    let bridge = started(&[]).await;

    let result = bridge
        .call_tool("add", json!({"a": 2, "b": 3}))
        .await
        .unwrap();
    let result: CallToolResult = serde_json::from_value(result).unwrap();
    assert_eq!(result.text().as_deref(), Some("5"));

    let err = bridge.call_tool("fail", json!({})).await.unwrap_err();
    match err {
        BridgeError::Rpc { code, message, data } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "tool failed");
            assert_eq!(data, Some(json!({"tool": "fail"})));
        }
        other => panic!("expected rpc error, got {other:?}"),
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    let bridge = started(&["--batch", "5"]).await;

    let calls = (0..5).map(|tag| {
        let bridge = Arc::clone(&bridge);
        async move { (tag, bridge.call_tool("batch", json!({"tag": tag})).await) }
    });
    for (tag, result) in join_all(calls).await {
        assert_eq!(result.unwrap()["tag"], tag);
    }
    assert_eq!(bridge.status().pending_calls, 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_slow_calls_complete_independently() {
    let bridge = started(&[]).await;

    let delays = [150u64, 10, 80, 40];
    let calls = delays.iter().map(|&delay| {
        let bridge = Arc::clone(&bridge);
        async move {
            let result = bridge
                .call_tool("slow", json!({"delay_ms": delay}))
                .await
                .unwrap();
            let result: CallToolResult = serde_json::from_value(result).unwrap();
            (delay, result.text().unwrap())
        }
    });
    for (delay, text) in join_all(calls).await {
        assert_eq!(text, format!("Slept for {} ms", delay));
    }
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_timeout_then_late_response_is_dropped() {
    let bridge = started(&[]).await;

    let params = json!({"name": "slow", "arguments": {"delay_ms": 300}});
    let err = bridge
        .request_with_timeout("tools/call", Some(params), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    let id = match err {
        BridgeError::Timeout { id, .. } => id,
        other => panic!("expected timeout, got {other:?}"),
    };
    assert!(id > 0);
    assert_eq!(bridge.status().pending_calls, 0);

    // Let the late response arrive; it must not be misdelivered.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let result = bridge
        .call_tool("echo", json!({"message": "after"}))
        .await
        .unwrap();
    let result: CallToolResult = serde_json::from_value(result).unwrap();
    assert_eq!(result.text().as_deref(), Some("after"));
    assert_eq!(bridge.status().pending_calls, 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_dropped_caller_leaves_no_pending_entry() {
    let bridge = started(&[]).await;

    let call = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.call_tool("ignore", json!({})).await })
    };
    assert!(wait_for(|| bridge.status().pending_calls == 1).await);
    call.abort();
    let _ = call.await;
    assert!(wait_for(|| bridge.status().pending_calls == 0).await);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_process_exit_rejects_outstanding_calls() {
    let bridge = started(&[]).await;

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.call_tool("ignore", json!({})).await })
        })
        .collect();
    assert!(wait_for(|| bridge.status().pending_calls == 3).await);

    // Notification: nothing awaited, the server exits on receipt.
    let reply = bridge
        .forward_raw(json!({"jsonrpc": "2.0", "method": "test/exit"}))
        .await
        .unwrap();
    assert!(reply.is_none());

    for call in calls {
        let result = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .expect("call should not hang")
            .unwrap();
        assert!(matches!(result, Err(BridgeError::ProcessTerminated)));
    }

    assert!(!bridge.is_ready());
    assert_eq!(bridge.status().status, BridgeState::Stopped);
    assert!(matches!(
        bridge.call_tool("echo", json!({})).await,
        Err(BridgeError::ProcessTerminated)
    ));
}

#[tokio::test]
async fn test_restart_after_crash() {
    let bridge = started(&[]).await;
    let first_pid = bridge.status().pid;

    let err = bridge.call_tool("crash", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::ProcessTerminated));
    assert!(wait_for(|| !bridge.is_ready()).await);

    let status = bridge.restart().await.unwrap();
    assert_eq!(status.status, BridgeState::Running);
    assert_eq!(status.restarts, 1);
    assert_ne!(status.pid, first_pid);

    // Fresh handshake on the new process.
    let stats = bridge.call_tool("stats", json!({})).await.unwrap();
    assert_eq!(stats["initialized"], true);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_forward_raw_restores_caller_id() {
    let bridge = started(&[]).await;

    let response = bridge
        .forward_raw(json!({
            "jsonrpc": "2.0",
            "id": "client-abc",
            "method": "echo",
            "params": {"hello": "world"}
        }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["id"], "client-abc");
    assert_eq!(response["result"], json!({"hello": "world"}));

    // Error responses pass through untouched apart from the id.
    let response = bridge
        .forward_raw(json!({"id": 7, "method": "does/not/exist"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["id"], 7);
    assert_eq!(response["error"]["code"], -32601);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_raw_notifications_reach_the_server() {
    let bridge = started(&[]).await;
    for _ in 0..2 {
        bridge
            .forward_raw(json!({"jsonrpc": "2.0", "method": "test/ping"}))
            .await
            .unwrap();
    }
    let stats: Value = bridge.call_tool("stats", json!({})).await.unwrap();
    assert_eq!(stats["notifications"], 2);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_noisy_and_split_output() {
    let bridge = started(&["--noise", "--split"]).await;

    for i in 0..5 {
        let result = bridge
            .call_tool("echo", json!({"message": format!("msg-{i}")}))
            .await
            .unwrap();
        let result: CallToolResult = serde_json::from_value(result).unwrap();
        assert_eq!(result.text(), Some(format!("msg-{i}")));
    }
    assert!(bridge.is_ready());
    assert_eq!(bridge.status().pending_calls, 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_startup_timeout() {
    let bridge = Bridge::new(
        mock_config(&["--no-init"]).with_startup_timeout(Duration::from_millis(200)),
    );
    let err = bridge.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::StartupFailed(_)));
    assert!(!bridge.is_ready());
    assert!(matches!(
        bridge.list_tools().await,
        Err(BridgeError::NotReady)
    ));
}
