use anyhow::Result;
use citegraph::mcp::McpServer;
use citegraph::{CitationGraphBuilder, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // stderr only: stdout carries the MCP stream
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.citegraph.log_level.as_str()),
    )
    .target(env_logger::Target::Stderr)
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("check");

    match command {
        "serve" => run_mcp_server(config).await?,
        "check" => run_check(&config)?,
        other => {
            anyhow::bail!("Unknown command '{}'. Usage: citegraph [serve|check]", other);
        }
    }

    Ok(())
}

/// Run MCP server (stdio transport)
async fn run_mcp_server(config: Config) -> Result<()> {
    let builder = CitationGraphBuilder::connect(&config)?;
    let server = McpServer::new(builder, config);
    server.run().await?;
    Ok(())
}

/// Print the effective configuration and the connectors it registers
fn run_check(config: &Config) -> Result<()> {
    log::info!("Starting citegraph v{}", env!("CARGO_PKG_VERSION"));

    let builder = CitationGraphBuilder::connect(config)?;

    println!("citegraph v{}", env!("CARGO_PKG_VERSION"));
    println!("Connectors (resolution order): {}", builder.registry().names().join(", "));
    println!(
        "Semantic Scholar API key: {}",
        if config.semanticscholar_api_key().is_some() { "set" } else { "not set" }
    );
    println!(
        "Crossref polite pool: {}",
        config.sources.crossref_mailto.as_deref().unwrap_or("off")
    );
    println!(
        "Graph defaults: depth={} max_citations={} direction={}",
        config.graph.default_depth, config.graph.default_max_citations, config.graph.default_direction
    );
    println!(
        "Concurrency: {}  cache capacity: {}  build timeout: {}",
        config.graph.concurrency,
        config.graph.cache_capacity,
        match config.build_timeout() {
            Some(t) => format!("{}s", t.as_secs()),
            None => "none".to_string(),
        }
    );
    println!(
        "HTTP: timeout={}s retries={} user_agent={}",
        config.http.timeout_secs, config.http.max_retries, config.http.user_agent
    );

    Ok(())
}
