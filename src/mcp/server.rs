use crate::config::Config;
use crate::error::{CitegraphError, Result};
use crate::graph::CitationGraphBuilder;
use crate::mcp::tools;
use crate::mcp::types::*;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader as AsyncBufReader};

/// MCP server exposing search, metadata and citation graph tools
pub struct McpServer {
    builder: CitationGraphBuilder,
    config: Config,
}

impl McpServer {
    pub fn new(builder: CitationGraphBuilder, config: Config) -> Self {
        Self { builder, config }
    }

    /// Process one JSON-RPC request.
    ///
    /// Returns `Ok(None)` for notifications, which get no response. Handler
    /// failures are turned into JSON-RPC error responses here.
    pub async fn process_mcp_request(
        &self,
        request: JsonRpcRequest,
        initialized: &mut bool,
    ) -> Result<Option<JsonRpcResponse>> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                if request.method == "notifications/initialized" {
                    *initialized = true;
                }
                return Ok(None);
            }
        };

        if request.jsonrpc != "2.0" {
            return Ok(Some(JsonRpcResponse::error(
                id.into(),
                error_codes::INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            )));
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&id, &request.params),
            "tools/list" => self.handle_tools_list(&id),
            "tools/call" => self.handle_tools_call(&id, &request.params).await,
            "shutdown" => Ok(JsonRpcResponse::result(id.clone().into(), Value::Null)),
            _ => Ok(JsonRpcResponse::error(
                id.clone().into(),
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            )),
        };

        match response {
            Ok(resp) => Ok(Some(resp)),
            Err(CitegraphError::McpProtocol(message)) => Ok(Some(JsonRpcResponse::error(
                id.into(),
                error_codes::INVALID_PARAMS,
                message,
            ))),
            Err(e) => {
                let mut resp = JsonRpcResponse::error(
                    id.into(),
                    error_codes::INTERNAL_ERROR,
                    format!("Internal error: {}", e),
                );
                if let JsonRpcResponsePayload::Error { error } = &mut resp.payload {
                    error.data = Some(serde_json::json!({ "details": e.to_string() }));
                }
                Ok(Some(resp))
            }
        }
    }

    /// Run the MCP server over stdin/stdout.
    pub async fn run(&self) -> Result<()> {
        let stdin = AsyncBufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        log::info!("citegraph MCP server v{} starting", env!("CARGO_PKG_VERSION"));
        self.serve(stdin, stdout).await?;
        log::info!("MCP server shutting down");
        Ok(())
    }

    /// Serve newline-delimited JSON-RPC until EOF or `shutdown`.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        let mut initialized = false;

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            // EOF: client disconnected
            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    let id = extract_id_from_line(trimmed).unwrap_or(Value::Null);
                    let error_response =
                        JsonRpcResponse::error(id, error_codes::PARSE_ERROR, format!("Parse error: {}", e));
                    send_response(&mut writer, &error_response).await?;
                    continue;
                }
            };

            let is_shutdown = request.method == "shutdown";
            match self.process_mcp_request(request, &mut initialized).await? {
                Some(response) => send_response(&mut writer, &response).await?,
                None => {
                    if initialized {
                        log::debug!("Client initialized");
                    }
                }
            }
            if is_shutdown {
                break;
            }
        }

        Ok(())
    }

    fn handle_initialize(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: InitializeParams =
            serde_json::from_value(params.clone().unwrap_or(serde_json::json!({})))
                .map_err(|e| CitegraphError::McpProtocol(format!("Invalid initialize params: {}", e)))?;

        if let Some(client) = &params.client_info {
            log::info!("Client connected: {}", client);
        }

        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(&params.protocol_version),
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: ServerInfo {
                name: "citegraph".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(JsonRpcResponse::result(id.clone().into(), serde_json::to_value(&result)?))
    }

    fn handle_tools_list(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        let result = ToolsListResult {
            tools: tools::get_tool_definitions(),
        };
        Ok(JsonRpcResponse::result(id.clone().into(), serde_json::to_value(&result)?))
    }

    async fn handle_tools_call(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: ToolsCallParams = serde_json::from_value(
            params
                .clone()
                .ok_or_else(|| CitegraphError::McpProtocol("Missing params for tools/call".to_string()))?,
        )
        .map_err(|e| CitegraphError::McpProtocol(format!("Invalid tools/call params: {}", e)))?;

        log::debug!("tools/call {} {}", params.name, params.arguments);

        let result = match params.name.as_str() {
            "search_papers" => tools::handle_search(&self.builder, &params.arguments).await?,
            "fetch_paper_metadata" => tools::handle_fetch(&self.builder, &params.arguments).await?,
            "get_citation_graph" => {
                tools::handle_citation_graph(&self.builder, &self.config.graph, &params.arguments).await?
            }
            _ => {
                return Ok(JsonRpcResponse::error(
                    id.clone().into(),
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {}", params.name),
                ));
            }
        };

        Ok(JsonRpcResponse::result(id.clone().into(), serde_json::to_value(&result)?))
    }
}

/// Answer 2024/2025 clients with the stable revision; echo anything else.
fn negotiate_protocol_version(requested: &str) -> String {
    if requested.is_empty() || requested.starts_with("2024") || requested.starts_with("2025") {
        "2024-11-05".to_string()
    } else {
        requested.to_string()
    }
}

/// Send JSON-RPC response (newline-delimited)
async fn send_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Best-effort ID recovery from a line that failed to parse
fn extract_id_from_line(line: &str) -> Option<Value> {
    let id_start = line.find(r#""id":"#)?;
    let id_str = &line[id_start + 5..];
    let id_end = id_str.find([',', '}'])?;
    let id_val = id_str[..id_end].trim();
    if id_val.len() >= 2 && id_val.starts_with('"') && id_val.ends_with('"') {
        Some(Value::String(id_val[1..id_val.len() - 1].to_string()))
    } else {
        id_val.parse::<i64>().ok().map(|n| Value::Number(n.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::ConnectorRegistry;
    use crate::graph::mock::{paper, MockConnector, MockDoiLookup};
    use serde_json::json;
    use std::sync::Arc;

    fn server() -> McpServer {
        let arxiv = MockConnector::new("arxiv")
            .with_paper(paper("arxiv:1111.1111", "Seed"))
            .with_paper(paper("arxiv:2222.2222", "Citer"))
            .with_citing("arxiv:1111.1111", &["arxiv:2222.2222"]);
        let registry = ConnectorRegistry::new().with(Arc::new(arxiv));
        let builder = CitationGraphBuilder::new(registry, Arc::new(MockDoiLookup::new()));
        McpServer::new(builder, Config::default())
    }

    async fn exchange(server: &McpServer, input: &str) -> Vec<Value> {
        let mut output: Vec<u8> = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_extract_id_from_line() {
        let line = r#"{"jsonrpc":"2.0","id":"test-123","method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(json!("test-123")));

        let line = r#"{"jsonrpc":"2.0","id":42,"method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(json!(42)));

        assert_eq!(extract_id_from_line(r#"{"id":7}"#), Some(json!(7)));
        assert_eq!(extract_id_from_line("garbage"), None);
    }

    #[test]
    fn test_json_rpc_request_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.method, "initialize");
        assert_eq!(request.id, Some(JsonRpcId::Number(1)));
    }

    #[test]
    fn test_protocol_negotiation() {
        assert_eq!(negotiate_protocol_version("2025-06-18"), "2024-11-05");
        assert_eq!(negotiate_protocol_version(""), "2024-11-05");
        assert_eq!(negotiate_protocol_version("2026-01-01"), "2026-01-01");
    }

    #[tokio::test]
    async fn test_session_over_stream() {
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_citation_graph","arguments":{"paper_ids":["arxiv:1111.1111"],"depth":1,"max_citations":5,"direction":"citing"}}}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#,
            "{not json",
            r#"{"jsonrpc":"2.0","id":5,"method":"shutdown"}"#,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/list"}"#,
        ]
        .join("\n");

        let responses = exchange(&server(), &input).await;
        // notification gets no response; nothing is read after shutdown
        assert_eq!(responses.len(), 6);

        assert_eq!(responses[0]["result"]["serverInfo"]["name"], json!("citegraph"));
        assert_eq!(responses[0]["result"]["protocolVersion"], json!("2024-11-05"));
        assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 3);

        let text = responses[2]["result"]["content"][0]["text"].as_str().unwrap();
        let graph: Value = serde_json::from_str(text).unwrap();
        assert_eq!(
            graph["links"],
            json!([{"source": "arxiv:2222.2222", "target": "arxiv:1111.1111"}])
        );

        assert_eq!(responses[3]["error"]["code"], json!(error_codes::METHOD_NOT_FOUND));
        assert_eq!(responses[4]["error"]["code"], json!(error_codes::PARSE_ERROR));
        assert_eq!(responses[5]["id"], json!(5));
        assert!(responses[5]["result"].is_null());
    }

    #[tokio::test]
    async fn test_tool_call_errors() {
        let server = server();
        let mut initialized = false;

        let unknown: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": {"name": "summarize_paper", "arguments": {}}
        }))
        .unwrap();
        let resp = server.process_mcp_request(unknown, &mut initialized).await.unwrap().unwrap();
        let value = serde_json::to_value(resp).unwrap();
        assert_eq!(value["error"]["code"], json!(error_codes::INVALID_PARAMS));

        let missing: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call"})).unwrap();
        let resp = server.process_mcp_request(missing, &mut initialized).await.unwrap().unwrap();
        let value = serde_json::to_value(resp).unwrap();
        assert_eq!(value["error"]["code"], json!(error_codes::INVALID_PARAMS));

        let bad_args: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "get_citation_graph", "arguments": {"paper_ids": ["arxiv:1111.1111"], "depth": -2}}
        }))
        .unwrap();
        let resp = server.process_mcp_request(bad_args, &mut initialized).await.unwrap().unwrap();
        let value = serde_json::to_value(resp).unwrap();
        assert_eq!(value["result"]["isError"], json!(true));

        let note: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        assert!(server.process_mcp_request(note, &mut initialized).await.unwrap().is_none());
        assert!(initialized);
    }
}
