//! Mock MCP servers for tests, written as POSIX `sh` scripts.
//!
//! Request ids are scraped with `sed`; the bridge always serializes `id` as
//! the last field, so `..."id":N}` ends every request line.

use std::path::Path;

use crate::config::{BridgeConfig, ProcessConfig, TimeoutConfig};

#[derive(Debug, Clone, Copy)]
pub enum MockServer {
    /// Answers initialize, tools/list and tools/call.
    Echo,
    /// Like `Echo`, but precedes each tools/list answer with noise and a
    /// response for an id nobody asked about.
    StrayIdsFirst,
    /// Like `Echo`, but sends its own request reusing the caller's id
    /// before each initialize and tools/list answer.
    ServerRequestFirst,
    /// Answers initialize, then never responds again.
    SilentAfterHandshake,
    /// Exits as soon as it starts.
    ExitImmediately,
    /// Like `Echo`, but exits when it receives tools/call.
    ExitOnToolCall,
    /// Reads stdin forever without answering anything.
    NeverReady,
}

const READ_ID: &str = r#"id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\)}$/\1/p')"#;

const INITIALIZE: &str = r##"*'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock-crm","version":"1.0.0"}}}\n' "$id" ;;"##;

const TOOLS_LIST: &str = r##"*'"method":"tools/list"'*)
      count list
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"search_contacts","description":"Search CRM contacts"}]}}\n' "$id" ;;"##;

const TOOLS_LIST_WITH_STRAYS: &str = r##"*'"method":"tools/list"'*)
      count list
      echo 'warming up caches'
      printf '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}\n'
      printf '{"jsonrpc":"2.0","id":9999,"result":{"tools":[]}}\n'
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"search_contacts","description":"Search CRM contacts"}]}}\n' "$id" ;;"##;

const INITIALIZE_WITH_REQUEST: &str = r##"*'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"method":"roots/list"}\n' "$id"
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock-crm","version":"1.0.0"}}}\n' "$id" ;;"##;

const TOOLS_LIST_WITH_REQUEST: &str = r##"*'"method":"tools/list"'*)
      count list
      printf '{"jsonrpc":"2.0","id":%s,"method":"ping"}\n' "$id"
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"search_contacts","description":"Search CRM contacts"}]}}\n' "$id" ;;"##;

const TOOLS_CALL: &str = r##"*'"name":"fail"'*)
      count call
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"Unknown tool"}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      count call
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"ok"}]}}\n' "$id" ;;"##;

const EXIT_ON_CALL: &str = r##"*'"method":"tools/call"'*)
      exit 3 ;;"##;

const UNKNOWN: &str = r##"*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id" ;;"##;

/// Build a request loop whose `case` arms are `arms`.
fn request_loop(arms: &[&str]) -> String {
    format!(
        r#"count() {{ if [ -n "$COUNTER_FILE" ]; then echo "$1" >> "$COUNTER_FILE"; fi; }}
while IFS= read -r line; do
  {READ_ID}
  [ -n "$id" ] || continue
  case "$line" in
    {}
  esac
done"#,
        arms.join("\n    ")
    )
}

pub fn script(kind: MockServer) -> String {
    match kind {
        MockServer::Echo => request_loop(&[INITIALIZE, TOOLS_LIST, TOOLS_CALL, UNKNOWN]),
        MockServer::StrayIdsFirst => {
            request_loop(&[INITIALIZE, TOOLS_LIST_WITH_STRAYS, TOOLS_CALL, UNKNOWN])
        }
        MockServer::ServerRequestFirst => request_loop(&[
            INITIALIZE_WITH_REQUEST,
            TOOLS_LIST_WITH_REQUEST,
            TOOLS_CALL,
            UNKNOWN,
        ]),
        MockServer::SilentAfterHandshake => request_loop(&[INITIALIZE, "*) ;;"]),
        MockServer::ExitImmediately => "exit 1".to_string(),
        MockServer::ExitOnToolCall => {
            request_loop(&[INITIALIZE, TOOLS_LIST, EXIT_ON_CALL, UNKNOWN])
        }
        MockServer::NeverReady => "while IFS= read -r line; do :; done".to_string(),
    }
}

/// A bridge config that runs `kind` with short timers.
///
/// When `counter` is set, the mock appends one line per real tools/list or
/// tools/call invocation to that file.
pub fn mock_config(kind: MockServer, counter: Option<&Path>) -> BridgeConfig {
    let mut process = ProcessConfig::for_command("sh", &["-c", &script(kind)]);
    if let Some(counter) = counter {
        process.env.insert(
            "COUNTER_FILE".to_string(),
            counter.to_string_lossy().into_owned(),
        );
    }

    BridgeConfig {
        process,
        timeouts: TimeoutConfig {
            handshake_delay_ms: 10,
            request_timeout_ms: 3_000,
            ready_poll_interval_ms: 10,
            ready_poll_attempts: 300,
            shutdown_timeout_ms: 200,
        },
        ..BridgeConfig::default()
    }
}
