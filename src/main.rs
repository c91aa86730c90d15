//! Command-line caller for the category analyzer
//!
//! Stands in for the chat-bot front end: takes a category URL, prints
//! progress, and prints the report path or a named error. Ctrl-C cancels the run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use wb_category_analyzer_lib::domain::{FailedFetchPolicy, ParseStage, ProgressEvent, ProgressSink};
use wb_category_analyzer_lib::infrastructure::{
    ConfigManager, ProviderThrottle, ReportFormat, init_logging_with_config,
};
use wb_category_analyzer_lib::{ParsePipeline, ParseRequest};

const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "wb-category-analyzer", version, about = "Wildberries category search-frequency analyzer")]
struct Cli {
    /// Configuration file (JSON or TOML); defaults to the per-user config directory
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze one catalog category and export the ranked table
    Analyze {
        /// Category URL, e.g. https://www.wildberries.ru/catalog/zhenshchinam/odezhda/platya
        url: String,

        /// Identity recorded in the report metadata
        #[arg(long, default_value = "cli")]
        requested_by: String,

        /// Directory for the exported report
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Maximum number of catalog pages to read
        #[arg(long)]
        max_pages: Option<u32>,

        /// Rank failed lookups with frequency 0 instead of dropping them
        #[arg(long)]
        zero_fill: bool,

        /// Write CSV instead of an Excel workbook
        #[arg(long)]
        csv: bool,

        /// Export even when too many lookups failed
        #[arg(long)]
        allow_degraded: bool,

        /// Log at debug level
        #[arg(long, short)]
        verbose: bool,
    },
    /// Write a configuration file with the default values
    InitConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("❌ {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };

    let Command::Analyze {
        url,
        requested_by,
        output_dir,
        max_pages,
        zero_fill,
        csv,
        allow_degraded,
        verbose,
    } = cli.command
    else {
        manager.save_default().await?;
        println!("📝 Default configuration written to {}", manager.config_path().display());
        return Ok(ExitCode::SUCCESS);
    };

    let mut config = manager.load()?;
    if let Some(output_dir) = output_dir {
        config.export.output_dir = output_dir;
    }
    if let Some(max_pages) = max_pages {
        config.catalog.max_pages = max_pages;
    }
    if zero_fill {
        config.pipeline.failed_fetch_policy = FailedFetchPolicy::ZeroFill;
    }
    if csv {
        config.export.format = ReportFormat::Csv;
    }
    if allow_degraded {
        config.pipeline.proceed_on_degraded = true;
    }
    if verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging_with_config(&config.logging)?;

    let throttle = Arc::new(ProviderThrottle::from_config(&config.frequency));
    let pipeline = ParsePipeline::from_config(&config, throttle)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, cancelling");
            ctrl_c.cancel();
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_progress(&event);
        }
    });

    let request = ParseRequest::new(url, requested_by);
    let result = pipeline.run(&request, &cancel, &ProgressSink::new(tx)).await;
    wait_for_printer(printer).await;

    match result {
        Ok(outcome) => {
            println!("📄 {}", outcome.path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            eprintln!("❌ [{}] {}", error.stage().label(), error);
            if error.is_cancelled() {
                Ok(ExitCode::from(EXIT_CANCELLED))
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Returns false when the printer task panicked or was aborted
async fn wait_for_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(join_error) => {
            warn!("Progress printer stopped abnormally: {}", join_error);
            false
        }
    }
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::StageChanged {
            stage: ParseStage::Failed(_),
        } => {}
        ProgressEvent::StageChanged { stage } => println!("▶️ {stage}"),
        ProgressEvent::PageFetched {
            page,
            new_products,
            total_products,
        } => println!("📃 Страница {page}: +{new_products} товаров (всего {total_products})"),
        ProgressEvent::FetchProgress { completed, total } => {
            println!("🔍 Частотность: {completed}/{total}");
        }
        ProgressEvent::CooldownStarted { millis } => {
            println!("⏸️ Лимит запросов Evirma, пауза {millis} мс");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn printer_panic_is_reported_not_propagated() {
        let printer: JoinHandle<()> = tokio::spawn(async { panic!("printer failed") });
        assert!(!wait_for_printer(printer).await);
    }

    #[tokio::test]
    async fn printer_drains_until_senders_drop() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_progress(&event);
            }
        });
        tx.send(ProgressEvent::FetchProgress { completed: 1, total: 2 }).unwrap();
        drop(tx);
        assert!(wait_for_printer(printer).await);
    }

    #[test]
    fn analyze_flags_parse() {
        let cli = Cli::try_parse_from([
            "wb-category-analyzer",
            "analyze",
            "https://www.wildberries.ru/catalog/obuv/muzhskaya",
            "--csv",
            "--zero-fill",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Analyze { csv: true, zero_fill: true, allow_degraded: false, .. }
        ));
    }
}
