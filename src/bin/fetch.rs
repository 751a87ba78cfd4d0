use anyhow::{Context, Result};
use citegraph::{CitationGraphBuilder, Config};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fetch")]
#[command(about = "Fetch one paper's metadata, optionally downloading its full text")]
struct Args {
    /// Paper id or URL
    paper_id: String,

    /// Save the PDF to this path
    #[arg(long)]
    pdf: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.citegraph.log_level.as_str()),
    )
    .init();

    let builder = CitationGraphBuilder::connect(&config)?;

    let paper = builder.fetch_paper_metadata(&args.paper_id).await?;
    println!("{}", serde_json::to_string_pretty(&paper)?);

    if let Some(path) = args.pdf {
        let bytes = builder.download_full_text(&paper.paper_id).await?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Saved {} bytes to {}", bytes.len(), path.display());
    }

    Ok(())
}
