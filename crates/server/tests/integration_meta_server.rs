//! End-to-end tests: spawn the real `mcp-meta-server` binary, connect to it
//! as an upstream MCP client over stdio, and exercise meta-tools and routed
//! dispatch exactly as a real client would. Downstream providers are
//! disposable `python3` fixture scripts, since the command whitelist
//! (`node`, `python3`, ...) rules out spawning an arbitrary compiled test
//! binary directly -- this mirrors how a real provider config looks.

use mcp_meta_test_support::KillOnDrop;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{RoleClient, RunningService, ServiceExt};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::NamedTempFile;

fn server_bin() -> &'static str {
    env!("CARGO_BIN_EXE_mcp-meta-server")
}

/// A standalone line-delimited JSON-RPC stdio server. `tools` is the JSON
/// array returned from `tools/list`; `fail_tool`, if set, makes that tool
/// name always fail `tools/call`.
const FIXTURE_TEMPLATE: &str = r#"
import sys, json

TOOLS = __TOOLS__
FAIL_TOOL = __FAIL_TOOL__
call_count = 0

def reply(id, result=None, error=None):
    msg = {"jsonrpc": "2.0", "id": id}
    if error is not None:
        msg["error"] = error
    else:
        msg["result"] = result
    sys.stdout.write(json.dumps(msg) + "\n")
    sys.stdout.flush()

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        msg = json.loads(line)
    except ValueError:
        continue
    method = msg.get("method")
    if method is None or "id" not in msg:
        continue
    mid = msg["id"]
    if method == "initialize":
        reply(mid, {"protocolVersion": "2024-11-05", "capabilities": {"tools": {}}, "serverInfo": {"name": "fixture", "version": "0"}})
    elif method == "resources/list":
        reply(mid, {"resources": []})
    elif method == "prompts/list":
        reply(mid, {"prompts": []})
    elif method == "tools/list":
        reply(mid, {"tools": TOOLS})
    elif method == "tools/call":
        params = msg.get("params", {})
        name = params.get("name", "")
        names = [t["name"] for t in TOOLS]
        if name not in names:
            reply(mid, error={"code": -32601, "message": "unknown tool " + name})
        elif FAIL_TOOL is not None and name == FAIL_TOOL:
            reply(mid, error={"code": -32000, "message": "fixture failure for " + name})
        else:
            call_count += 1
            body = {"tool": name, "callCount": call_count, "echoedArguments": params.get("arguments", {})}
            reply(mid, {"structuredContent": body, "content": [{"type": "text", "text": json.dumps(body)}]})
    else:
        reply(mid, error={"code": -32601, "message": "method not found"})
"#;

fn write_fixture_script(tools: &Value, fail_tool: Option<&str>) -> anyhow::Result<NamedTempFile> {
    let fail_tool_literal = match fail_tool {
        Some(name) => format!("{name:?}"),
        None => "None".to_string(),
    };
    let source = FIXTURE_TEMPLATE
        .replace("__TOOLS__", &tools.to_string())
        .replace("__FAIL_TOOL__", &fail_tool_literal);
    let mut file = NamedTempFile::new()?;
    use std::io::Write as _;
    write!(file, "{source}")?;
    Ok(file)
}

fn fixture_config(id: &str, script: &NamedTempFile, description: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "command": ["python3", script.path().to_string_lossy().into_owned()],
        "description": description,
    })
}

/// Connect to the meta-server with `MCP_SERVER_CONFIG` set to spawn the
/// given downstream provider configs.
async fn connect_meta_server(configs: Value) -> anyhow::Result<RunningService<RoleClient, ()>> {
    let marshalled = configs.to_string();
    let command = tokio::process::Command::new(server_bin()).configure(|cmd| {
        cmd.env("MCP_SERVER_CONFIG", &marshalled);
        cmd.env("RUST_LOG", "error");
    });
    let transport = TokioChildProcess::new(command)?;
    let running = ().serve(transport).await?;
    Ok(running)
}

#[tokio::test]
async fn lists_meta_tools_and_namespaced_downstream_tools() -> anyhow::Result<()> {
    let echo_tools = json!([{
        "name": "echo",
        "description": "Echo the provided message back",
        "inputSchema": {"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]},
    }]);
    let script = write_fixture_script(&echo_tools, None)?;
    let configs = json!([fixture_config("p1", &script, "echo provider")]);

    let session = connect_meta_server(configs).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let listed = session.peer().list_tools(Default::default()).await?;
    let names: Vec<String> = listed.tools.iter().map(|t| t.name.to_string()).collect();

    for meta_name in [
        "discover_servers",
        "analyze_usage",
        "get_cache_stats",
        "suggest_tools",
        "batch_execute",
        "optimize_routing",
        "configure_deduplication",
        "analyze_tool_similarity",
    ] {
        assert!(names.contains(&meta_name.to_string()), "missing meta-tool {meta_name}");
    }
    assert!(names.iter().any(|n| n == "p1:echo"), "missing namespaced downstream tool, got {names:?}");

    session.cancellation_token().cancel();
    Ok(())
}

#[tokio::test]
async fn dispatches_namespaced_tool_call_to_downstream_provider() -> anyhow::Result<()> {
    let echo_tools = json!([{
        "name": "echo",
        "description": "Echo the provided message back",
        "inputSchema": {"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]},
    }]);
    let script = write_fixture_script(&echo_tools, None)?;
    let configs = json!([fixture_config("p1", &script, "echo provider")]);

    let session = connect_meta_server(configs).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let result = session
        .peer()
        .call_tool(CallToolRequestParam {
            name: "p1:echo".into(),
            arguments: json!({"message": "hi"}).as_object().cloned(),
        })
        .await?;

    assert_ne!(result.is_error, Some(true));
    let structured = result.structured_content.expect("structured content");
    assert_eq!(structured["tool"], "echo");

    session.cancellation_token().cancel();
    Ok(())
}

#[tokio::test]
async fn discover_servers_meta_tool_reports_connected_provider() -> anyhow::Result<()> {
    let echo_tools = json!([{"name": "echo", "description": "echo", "inputSchema": {"type": "object"}}]);
    let script = write_fixture_script(&echo_tools, None)?;
    let configs = json!([fixture_config("p1", &script, "echo provider")]);

    let session = connect_meta_server(configs).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let result = session
        .peer()
        .call_tool(CallToolRequestParam {
            name: "discover_servers".into(),
            arguments: Some(serde_json::Map::new()),
        })
        .await?;

    let structured = result.structured_content.expect("structured content");
    let servers = structured["servers"].as_array().expect("servers array");
    assert!(servers.iter().any(|s| s["id"] == "p1" && s["status"] == "connected"));

    session.cancellation_token().cancel();
    Ok(())
}

#[tokio::test]
async fn merges_similar_tools_from_two_providers_and_routes_around_failure() -> anyhow::Result<()> {
    let read_file_tools = json!([{
        "name": "read_file",
        "description": "Read a file from disk",
        "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]},
    }]);

    let script_a = write_fixture_script(&read_file_tools, Some("read_file"))?;
    let script_b = write_fixture_script(&read_file_tools, None)?;
    let configs = json!([
        fixture_config("a", &script_a, "flaky provider"),
        fixture_config("b", &script_b, "healthy provider"),
    ]);

    let session = connect_meta_server(configs).await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let listed = session.peer().list_tools(Default::default()).await?;
    let names: Vec<String> = listed.tools.iter().map(|t| t.name.to_string()).collect();
    assert!(names.contains(&"read_file".to_string()), "expected a merged read_file tool, got {names:?}");

    let result = session
        .peer()
        .call_tool(CallToolRequestParam {
            name: "read_file".into(),
            arguments: json!({"path": "/tmp/x"}).as_object().cloned(),
        })
        .await?;
    assert_ne!(result.is_error, Some(true), "expected fallback to the healthy provider to succeed");

    session.cancellation_token().cancel();
    Ok(())
}

#[tokio::test]
async fn configure_deduplication_round_trips_settings() -> anyhow::Result<()> {
    let echo_tools = json!([{"name": "echo", "description": "echo", "inputSchema": {"type": "object"}}]);
    let script = write_fixture_script(&echo_tools, None)?;
    let configs = json!([fixture_config("p1", &script, "echo provider")]);

    let session = connect_meta_server(configs).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let result = session
        .peer()
        .call_tool(CallToolRequestParam {
            name: "configure_deduplication".into(),
            arguments: json!({"enabled": false, "getStats": true}).as_object().cloned(),
        })
        .await?;
    assert_ne!(result.is_error, Some(true));
    let structured = result.structured_content.expect("structured content");
    assert_eq!(structured["enabled"], false);

    session.cancellation_token().cancel();
    Ok(())
}

/// Exercises the `KillOnDrop` helper directly, independent of any meta-server
/// session, since most tests above rely on the rmcp session's own shutdown.
#[test]
fn kill_on_drop_terminates_child_process() -> anyhow::Result<()> {
    let child = std::process::Command::new("python3")
        .arg("-c")
        .arg("import time; time.sleep(30)")
        .spawn()?;
    let pid = child.id();
    {
        let _guard = KillOnDrop(child);
    }
    std::thread::sleep(Duration::from_millis(200));
    let still_running = std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    assert!(!still_running, "expected child process to be killed on drop");
    Ok(())
}
