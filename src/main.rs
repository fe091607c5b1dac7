mod builder;
mod context;
mod fetch;
mod parser;
mod progress;
mod prune;
mod record;
mod session;
mod settings;
mod store;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

use context::{DealCategory, ListingContext};
use fetch::{HttpFetcher, Offline};
use parser::{HtmlListPage, PageOutcome};
use progress::Progress;
use session::{Pacing, Session};
use settings::{Overrides, Settings};
use store::{CsvSink, HeaderPolicy};

#[derive(Parser)]
#[command(name = "cian_scraper", about = "Flat listings scraper for cian.ru search results")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a range of search-result pages
    Run {
        #[arg(short, long, value_enum, default_value = "sale")]
        category: DealCategory,
        /// Location name written to every record
        #[arg(short, long, default_value = "Москва")]
        location: String,
        /// Site region id used in the search query
        #[arg(short, long, default_value = "1")]
        region: u32,
        #[arg(long)]
        start_page: Option<u32>,
        #[arg(long)]
        end_page: Option<u32>,
        /// Also fetch each offer's own page
        #[arg(long, overrides_with = "no_details")]
        details: bool,
        /// Skip offer pages even if the settings file enables them
        #[arg(long)]
        no_details: bool,
        /// Rewrite the CSV file after every accepted offer
        #[arg(long, overrides_with = "no_csv")]
        csv: bool,
        /// Do not write the CSV file even if the settings file enables it
        #[arg(long)]
        no_csv: bool,
        #[arg(long, value_enum)]
        header_policy: Option<HeaderPolicy>,
        /// Output file (default: derived from category, range, location and time)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Settings file (default: ./cian_scraper.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Rows to print when the run ends
        #[arg(short = 'n', long, default_value = "20")]
        show: usize,
    },
    /// Extract offers from a saved search-result page
    Parse {
        file: PathBuf,
        #[arg(short, long, value_enum, default_value = "sale")]
        category: DealCategory,
        #[arg(short, long, default_value = "Москва")]
        location: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            category,
            location,
            region,
            start_page,
            end_page,
            details,
            no_details,
            csv,
            no_csv,
            header_policy,
            output,
            config,
            show,
        } => {
            let overrides = Overrides {
                start_page,
                end_page,
                fetch_detail_pages: switch(details, no_details),
                persist_incrementally: switch(csv, no_csv),
                header_policy,
            };
            let settings = Settings::load(config.as_deref(), &overrides)?;
            let ctx = ListingContext {
                category,
                location,
                start_page: settings.start_page,
                end_page: settings.end_page,
                fetch_detail_pages: settings.fetch_detail_pages,
                persist_incrementally: settings.persist_incrementally,
            };
            let path = output.unwrap_or_else(|| {
                PathBuf::from(store::file_name(&ctx, chrono::Local::now().naive_local()))
            });

            let http = HttpFetcher::new(&settings.search_url, &settings.user_agent, category, region)?;
            let mut session = Session::new(ctx, settings.pacing(), &http, &http)
                .with_sink(CsvSink::new(&path, settings.header_policy))
                .with_progress(Progress::new());

            println!(
                "Scraping pages {}..={} ({})...",
                settings.start_page,
                settings.end_page,
                category.as_str()
            );
            let summary = session.run().await?;
            println!(
                "Done: {} offers ({} duplicates, {} without id), {} pages ok, {} abandoned, {} requests. Average price: {:.0}",
                summary.accepted,
                summary.duplicates,
                summary.unidentified,
                summary.pages_succeeded.len(),
                summary.pages_abandoned.len(),
                summary.fetches,
                summary.average_price,
            );
            if !summary.pages_abandoned.is_empty() {
                println!("Abandoned pages: {:?}", summary.pages_abandoned);
            }
            if settings.persist_incrementally && !session.results().is_empty() {
                println!("Saved to {}", path.display());
            }
            print_table(session.results().records(), show);
            Ok(())
        }
        Commands::Parse {
            file,
            category,
            location,
        } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let ctx = ListingContext {
                category,
                location,
                start_page: 1,
                end_page: 1,
                fetch_detail_pages: false,
                persist_incrementally: false,
            };
            let pacing = Pacing {
                list_pause: Duration::ZERO,
                detail_pause: Duration::ZERO,
                max_attempts: 1,
            };
            let mut session = Session::new(ctx, pacing, Offline, Offline);
            let outcome = session
                .parse_page(&HtmlListPage::parse(&html), 1, 1, 0)
                .await?;
            match outcome {
                PageOutcome::Success { offers_found } => {
                    for record in session.results().records() {
                        println!("{}", serde_json::to_string(record.as_fields())?);
                    }
                    eprintln!(
                        "{} offers on page, {} records",
                        offers_found,
                        session.results().len()
                    );
                }
                PageOutcome::Blocked { .. } => println!("Page is an anti-bot challenge."),
                PageOutcome::Malformed { .. } => println!("Page has no search-results header."),
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// `--x` / `--no-x` pair as an override; neither leaves the setting alone.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn print_table(records: &[record::OfferRecord], limit: usize) {
    if records.is_empty() || limit == 0 {
        return;
    }

    println!(
        "\n{:>3} | {:<44} | {:>12} | {:>5} | {:>7} | {:<20}",
        "#", "Offer", "Price", "Rooms", "Area", "District"
    );
    println!("{}", "-".repeat(106));

    for (i, r) in records.iter().take(limit).enumerate() {
        let price = r
            .price()
            .map(|p| format!("{:.0}", p))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>3} | {:<44} | {:>12} | {:>5} | {:>7} | {:<20}",
            i + 1,
            truncate(r.url().unwrap_or_default(), 44),
            price,
            cell(r.get("rooms_count")),
            cell(r.get("total_meters")),
            truncate(&cell(r.get("district")), 20),
        );
    }

    if records.len() > limit {
        println!("... {} more", records.len() - limit);
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".into(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
