use anyhow::Result;
use citegraph::mcp::tools::graph_to_json;
use citegraph::{CitationGraphBuilder, Config, Direction, GraphRequest};
use clap::Parser;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "graph")]
#[command(about = "Build a citation graph around one or more seed papers")]
struct Args {
    /// Seed paper ids (arxiv:2104.08935, doi:10.1145/..., pubmed:12345678, URLs)
    #[arg(required = true)]
    paper_ids: Vec<String>,

    /// Expansion levels (defaults to graph.default_depth)
    #[arg(short, long)]
    depth: Option<usize>,

    /// Neighbors per side for each expanded paper (defaults to graph.default_max_citations)
    #[arg(short, long)]
    max_citations: Option<usize>,

    /// both, citing or cited (defaults to graph.default_direction)
    #[arg(long)]
    direction: Option<String>,

    /// Print the graph as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.citegraph.log_level.as_str()),
    )
    .init();

    let direction: Direction = match &args.direction {
        Some(d) => d.parse()?,
        None => config.default_direction()?,
    };
    let request = GraphRequest::new(
        args.paper_ids.clone(),
        args.depth.unwrap_or(config.graph.default_depth),
        args.max_citations.unwrap_or(config.graph.default_max_citations),
        direction,
    )?;

    let builder = CitationGraphBuilder::connect(&config)?;

    // Ctrl-C aborts the build instead of printing a partial graph
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let start = Instant::now();
    let graph = builder.build_with_cancel(request, cancel).await?;
    let duration = start.elapsed();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&graph_to_json(&graph))?);
        return Ok(());
    }

    println!("Citation graph: {} papers, {} links ({:?})", graph.nodes.len(), graph.links.len(), duration);
    println!();
    for paper in &graph.nodes {
        let year = paper.year().map(|y| y.to_string()).unwrap_or_else(|| "n.d.".to_string());
        println!("[{}] {} ({}, {})", paper.source, paper.title, year, paper.paper_id);
    }
    println!();
    for link in &graph.links {
        println!("{} -> {}", link.source_id, link.target_id);
    }

    let dangling = graph.dangling_ids();
    if !dangling.is_empty() {
        println!();
        println!("Unresolved link endpoints: {}", dangling.join(", "));
    }

    Ok(())
}
