//! End-to-end exercise of the server loop over an in-memory transport:
//! initialize handshake, tool listing, tool calls and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use mssql_mcp_core::config::{keys, ConnectionProfile};
use mssql_mcp_core::protocol::ServerInfo;
use mssql_mcp_server::{McpServer, SqlServerTools};
use mssql_mcp_transport::stdio::StreamTransport;

fn profile() -> ConnectionProfile {
    let mut map = HashMap::new();
    map.insert(
        keys::CONNECTION_STRING.to_string(),
        "Server=localhost;Database=app;User Id=sa;Password=x;".to_string(),
    );
    map.insert(keys::ENABLE_START_QUERY.to_string(), "true".to_string());
    ConnectionProfile::from_map(&map).unwrap()
}

fn request(id: i64, method: &str, params: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
        + "\n"
}

#[tokio::test]
async fn serves_lifecycle_tools_and_shutdown() {
    let (mut client_tx, server_rx) = tokio::io::duplex(64 * 1024);
    let (server_tx, client_rx) = tokio::io::duplex(64 * 1024);

    let server = McpServer::new(
        ServerInfo {
            name: "mssql-mcp-server".to_string(),
            version: "0.0.0-test".to_string(),
            description: None,
        },
        Arc::new(SqlServerTools::new(profile())),
    );

    let server_task = tokio::spawn(async move {
        let mut transport = StreamTransport::from_streams(server_rx, server_tx);
        server.run_with_transport(&mut transport).await.unwrap();
    });

    let script = [
        request(
            1,
            "initialize",
            serde_json::json!({"protocolVersion": "2025-06-18", "capabilities": {}}),
        ),
        serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        })
        .to_string()
            + "\n",
        request(2, "tools/list", serde_json::json!({})),
        request(
            3,
            "tools/call",
            serde_json::json!({
                "name": "set_command_timeout",
                "arguments": {"timeoutSeconds": 55}
            }),
        ),
        request(
            4,
            "tools/call",
            serde_json::json!({"name": "get_command_timeout", "arguments": {}}),
        ),
        request(
            5,
            "tools/call",
            serde_json::json!({"name": "no_such_tool", "arguments": {}}),
        ),
        request(6, "shutdown", serde_json::json!({})),
    ];
    for line in script {
        client_tx.write_all(line.as_bytes()).await.unwrap();
    }

    let mut lines = BufReader::new(client_rx).lines();
    let mut responses = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        responses.push(serde_json::from_str::<serde_json::Value>(&line).unwrap());
    }
    server_task.await.unwrap();

    // One response per request; the notification produces none.
    assert_eq!(responses.len(), 6);

    let init = &responses[0]["result"];
    assert_eq!(init["protocolVersion"], "2025-06-18");
    assert_eq!(init["serverInfo"]["name"], "mssql-mcp-server");
    assert!(init["capabilities"]["tools"].is_object());

    let tools = responses[1]["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"server_capabilities"));
    assert!(names.contains(&"start_query"));
    assert!(names.contains(&"stop_session"));
    assert!(!names.contains(&"execute_query"));

    let set_text = responses[2]["result"]["content"][0]["text"].as_str().unwrap();
    assert!(set_text.contains("55"));
    let get_text = responses[3]["result"]["content"][0]["text"].as_str().unwrap();
    assert!(get_text.contains("55"));

    let unknown = &responses[4];
    assert!(unknown["result"].is_null());
    assert_eq!(unknown["error"]["code"], -32601);

    assert_eq!(responses[5]["id"], 6);
    assert!(responses[5]["result"].is_object());
}

#[tokio::test]
async fn malformed_json_gets_a_parse_error_response() {
    let (mut client_tx, server_rx) = tokio::io::duplex(4096);
    let (server_tx, client_rx) = tokio::io::duplex(4096);

    let server = McpServer::new(
        ServerInfo {
            name: "mssql-mcp-server".to_string(),
            version: "0.0.0-test".to_string(),
            description: None,
        },
        Arc::new(SqlServerTools::new(profile())),
    );

    let server_task = tokio::spawn(async move {
        let mut transport = StreamTransport::from_streams(server_rx, server_tx);
        server.run_with_transport(&mut transport).await.unwrap();
    });

    client_tx.write_all(b"{this is not json}\n").await.unwrap();
    client_tx
        .write_all(request(1, "shutdown", serde_json::json!({})).as_bytes())
        .await
        .unwrap();

    let mut lines = BufReader::new(client_rx).lines();
    let first: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(first["error"]["code"], -32700);
    assert!(first["id"].is_null());

    let second: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(second["id"], 1);
    server_task.await.unwrap();
}
