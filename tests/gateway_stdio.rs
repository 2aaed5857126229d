//! End-to-end gateway runs against real child processes.
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{inspector, test_rules, MemorySink, AWS_KEY};
use mcp_gateway::engine_core::models::{Direction, MessageKind, RuleAction};
use mcp_gateway::{Gateway, GatewaySettings, GatewayState};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn gateway(command: &str, args: &[&str], sink: Arc<MemorySink>) -> Gateway {
    let mut settings = GatewaySettings::new(command, args.iter().map(|s| s.to_string()).collect());
    settings.exit_grace = Duration::from_millis(500);
    Gateway::new(settings, inspector(&test_rules(), sink))
}

/// Feed `input` to the gateway as the client, close the client's output,
/// and collect everything the gateway writes back.
async fn exchange(mut gw: Gateway, input: &str) -> (String, i32) {
    let (client, gateway_side) = tokio::io::duplex(256 * 1024);
    let (gw_read, gw_write) = tokio::io::split(gateway_side);
    let (mut client_read, mut client_write) = tokio::io::split(client);

    let run = tokio::spawn(async move {
        let code = gw.run_with_io(gw_read, gw_write).await.unwrap();
        assert_eq!(gw.state(), GatewayState::Stopped);
        code
    });

    client_write.write_all(input.as_bytes()).await.unwrap();
    // Give the echo a moment before signalling end of input.
    tokio::time::sleep(Duration::from_millis(200)).await;
    client_write.shutdown().await.unwrap();

    let mut output = String::new();
    client_read.read_to_string(&mut output).await.unwrap();
    let code = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap();
    (output, code)
}

fn lines(output: &str) -> Vec<Value> {
    output
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_blocked_request_is_answered_and_not_forwarded() {
    let sink = Arc::new(MemorySink::default());
    let input = format!(
        "{{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{{\"arguments\":{{\"key\":\"{}\"}}}}}}\n",
        AWS_KEY
    );
    let (output, code) = exchange(gateway("cat", &[], sink.clone()), &input).await;

    assert_eq!(code, 0);
    assert_eq!(
        output,
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-32000,\"message\":\"Blocked by security policy\",\"data\":{\"rule\":\"aws-access-key\",\"severity\":\"critical\"}}}\n"
    );

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].blocked);
    assert_eq!(entries[0].direction, Direction::ClientToServer);
}

#[tokio::test]
async fn test_clean_traffic_round_trips_through_server() {
    let sink = Arc::new(MemorySink::default());
    let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n";
    let (output, code) = exchange(gateway("cat", &[], sink.clone()), input).await;

    assert_eq!(code, 0);
    assert_eq!(output, input);
    // Each message is audited once per direction.
    assert_eq!(sink.entries().len(), 4);
}

#[tokio::test]
async fn test_blocked_notification_produces_no_bytes() {
    let sink = Arc::new(MemorySink::default());
    let input = format!(
        "{{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\",\"params\":{{\"k\":\"{}\"}}}}\n",
        AWS_KEY
    );
    let (output, _) = exchange(gateway("cat", &[], sink.clone()), &input).await;

    assert!(output.is_empty());
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message_type, MessageKind::Notification);
    assert!(entries[0].blocked);
}

#[tokio::test]
async fn test_server_response_with_email_is_forwarded_and_logged() {
    let sink = Arc::new(MemorySink::default());
    let response = r#"{"jsonrpc":"2.0","id":5,"result":{"owner":"bob@example.com"}}"#;
    let script = format!("printf '%s\\n' '{}'; cat > /dev/null", response);
    let (output, code) = exchange(gateway("sh", &["-c", &script], sink.clone()), "").await;

    assert_eq!(code, 0);
    assert_eq!(output, format!("{}\n", response));

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].direction, Direction::ServerToClient);
    assert!(!entries[0].blocked);
    assert_eq!(entries[0].violations.len(), 1);
    assert_eq!(entries[0].violations[0].action, RuleAction::Log);
}

#[tokio::test]
async fn test_blocked_server_request_is_answered_to_server_only() {
    let sink = Arc::new(MemorySink::default());
    let request = format!(
        r#"{{"jsonrpc":"2.0","id":"srv-1","method":"sampling/createMessage","params":{{"k":"{}"}}}}"#,
        AWS_KEY
    );
    // The server echoes the first line it receives back on stdout, which
    // is the only way anything reaches the client here.
    let script = format!("printf '%s\\n' '{}'; head -n 1", request);
    let (output, code) = exchange(gateway("sh", &["-c", &script], sink.clone()), "").await;

    assert_eq!(code, 0);
    let msgs = lines(&output);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0]["id"], "srv-1");
    assert_eq!(msgs[0]["error"]["code"], -32000);
    assert!(!output.contains(AWS_KEY));

    let entries = sink.entries();
    assert_eq!(entries[0].direction, Direction::ServerToClient);
    assert_eq!(entries[0].message_type, MessageKind::Request);
    assert!(entries[0].blocked);
    assert_eq!(entries[1].message_type, MessageKind::ErrorResponse);
    assert!(!entries[1].blocked);
}

#[tokio::test]
async fn test_redacted_request_reaches_server_redacted() {
    let sink = Arc::new(MemorySink::default());
    let input = "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\"params\":{\"name\":\"lookup\",\"arguments\":{\"ssn\":\"123-45-6789\"}}}\n";
    let (output, _) = exchange(gateway("cat", &[], sink.clone()), input).await;

    let msgs = lines(&output);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0]["params"]["arguments"]["ssn"], "[REDACTED:ssn]");
    assert!(sink.entries()[0].redacted);
    assert_eq!(sink.entries()[0].tool.as_deref(), Some("lookup"));
}

#[tokio::test]
async fn test_batch_partially_blocked() {
    let sink = Arc::new(MemorySink::default());
    let input = format!(
        "[{{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\",\"params\":\"{key}\"}},{{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"b\"}},{{\"jsonrpc\":\"2.0\",\"method\":\"c\",\"params\":\"{key}\"}}]\n",
        key = AWS_KEY
    );
    let (output, _) = exchange(gateway("cat", &[], sink.clone()), &input).await;

    let msgs = lines(&output);
    assert_eq!(msgs.len(), 2);
    // Block responses go out first, the echoed remainder follows.
    let replies = msgs[0].as_array().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[0]["error"]["code"], -32000);
    let echoed = msgs[1].as_array().unwrap();
    assert_eq!(echoed.len(), 1);
    assert_eq!(echoed[0]["id"], 2);
}

#[tokio::test]
async fn test_alert_raised_for_server_output() {
    let sink = Arc::new(MemorySink::default());
    let token = format!("ghp_{}", "a".repeat(36));
    let response = format!(r#"{{"jsonrpc":"2.0","id":1,"result":{{"token":"{}"}}}}"#, token);
    let script = format!("printf '%s\\n' '{}'", response);
    let (output, _) = exchange(gateway("sh", &["-c", &script], sink.clone()), "").await;

    assert_eq!(output, format!("{}\n", response));
    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].violation.rule, "github-token");
    assert_eq!(alerts[0].violation.matched, "ghp_***");
}

#[tokio::test]
async fn test_child_exit_code_is_propagated() {
    let sink = Arc::new(MemorySink::default());
    let mut gw = gateway("sh", &["-c", "exit 7"], sink);

    let (_client, gateway_side) = tokio::io::duplex(1024);
    let (gw_read, gw_write) = tokio::io::split(gateway_side);
    let code = tokio::time::timeout(Duration::from_secs(10), gw.run_with_io(gw_read, gw_write))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, 7);
    assert_eq!(gw.state(), GatewayState::Stopped);
}

#[tokio::test]
async fn test_garbage_is_dropped_and_stream_recovers() {
    let sink = Arc::new(MemorySink::default());
    let input = "this is not json\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
    let (output, _) = exchange(gateway("cat", &[], sink.clone()), input).await;
    assert_eq!(output, "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
}
