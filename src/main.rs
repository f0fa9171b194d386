mod app;
mod config;
mod content;
mod error;
mod event;
mod feed;
mod offline;
mod ui;

use clap::Parser;
use color_eyre::Result;
use content::SortOrder;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sitefeed")]
#[command(about = "A terminal feed reader for the construction professionals network")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sitefeed/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Only show posts in this category
  #[arg(short = 'C', long)]
  category: Option<String>,

  /// Feed ordering
  #[arg(short, long, value_enum)]
  sort: Option<SortOrder>,

  /// Log filter used when RUST_LOG is unset
  #[arg(long, default_value = "info")]
  log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(category) = args.category {
    config.feed.category = Some(category);
  }
  if let Some(sort) = args.sort {
    config.feed.sort = sort;
  }

  // The terminal belongs to the UI, so logs go to a daily file
  let appender = tracing_appender::rolling::daily(config::Config::data_dir()?, "sitefeed.log");
  let (writer, _guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  // Initialize and run the app
  let mut app = app::App::new(config)?;
  app.run().await?;

  Ok(())
}
