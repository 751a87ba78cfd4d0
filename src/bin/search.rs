use anyhow::Result;
use citegraph::{search_papers, CitationGraphBuilder, Config, SearchQuery, SortBy};
use clap::Parser;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "search")]
#[command(about = "Search papers across the configured sources")]
struct Args {
    /// Free-text query
    query: String,

    /// Sources to search (repeatable); defaults to arxiv, pubmed, semanticscholar
    #[arg(short, long = "source")]
    sources: Vec<String>,

    /// Maximum merged results
    #[arg(short = 'n', long, default_value_t = 20)]
    max_results: usize,

    /// relevance, date or citations
    #[arg(long, default_value = "relevance")]
    sort_by: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.citegraph.log_level.as_str()),
    )
    .init();

    let mut query = SearchQuery::new(args.query);
    if !args.sources.is_empty() {
        query.sources = args.sources;
    }
    query.max_results = args.max_results;
    query.sort_by = args.sort_by.parse::<SortBy>()?;

    let builder = CitationGraphBuilder::connect(&config)?;

    let start = Instant::now();
    let result = search_papers(builder.registry(), &query).await?;
    let duration = start.elapsed();

    println!("Query: \"{}\"", result.query);
    println!("Showing {} of {} results ({:?})", result.papers.len(), result.total_found, duration);
    for outcome in &result.sources {
        match &outcome.error {
            Some(error) => println!("  {}: {:?} ({})", outcome.source, outcome.status, error),
            None => println!("  {}: {} hits", outcome.source, outcome.count),
        }
    }
    println!();

    for (idx, paper) in result.papers.iter().enumerate() {
        let year = paper.year().map(|y| y.to_string()).unwrap_or_else(|| "n.d.".to_string());
        println!("{}. {} ({})", idx + 1, paper.title, year);
        println!("   id: {}", paper.paper_id);
        let authors = paper.author_names();
        if !authors.is_empty() {
            println!("   authors: {}", authors.join(", "));
        }
        if let Some(journal) = &paper.journal {
            println!("   venue: {}", journal);
        }
        if let Some(count) = paper.citations_count {
            println!("   cited by: {}", count);
        }
        if let Some(url) = &paper.url {
            println!("   {}", url);
        }
        println!();
    }

    Ok(())
}
