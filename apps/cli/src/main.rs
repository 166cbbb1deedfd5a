use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use comlens_core::{
    Advisory, AnalyzeOptions, Backend, HttpTransport, SessionController, Stage, SummaryLength,
    SyncedTokenGateway, TokenGateway,
};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::format::format_result_readable;

mod format;

/// CLI wrapper for SummaryLength (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl From<CliLength> for SummaryLength {
    fn from(cli: CliLength) -> Self {
        match cli {
            CliLength::Short => SummaryLength::Short,
            CliLength::Medium => SummaryLength::Medium,
            CliLength::Long => SummaryLength::Long,
        }
    }
}

#[derive(Clone, Default, ValueEnum)]
enum CliBackend {
    #[default]
    Production,
    Local,
}

#[derive(Parser)]
#[command(name = "comlens")]
#[command(about = "Analyze a YouTube video's comments with an AI backend")]
struct Cli {
    /// Video id. When omitted, a pending handoff record is consumed instead.
    video_id: Option<String>,

    /// Video title shown above the report
    #[arg(short, long)]
    title: Option<String>,

    /// Maximum number of comments the backend should consider
    #[arg(long, default_value_t = 300)]
    limit: u32,

    /// Summary length
    #[arg(long, default_value = "medium")]
    length: CliLength,

    /// Report language (e.g. "en", "de"). Defaults to the video's language.
    #[arg(short = 'l', long)]
    lang: Option<String>,

    /// Bypass any cached result on the backend
    #[arg(long)]
    no_cache: bool,

    /// Use the streaming endpoint with real server progress events
    #[arg(long)]
    stream: bool,

    /// Backend deployment to target
    #[arg(long, default_value = "production")]
    backend: CliBackend,

    /// Override the backend base URL entirely
    #[arg(long)]
    base_url: Option<String>,

    /// Store this bearer token for future runs and exit
    #[arg(long, value_name = "TOKEN")]
    set_token: Option<String>,
}

fn create_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap(),
    );
    bar
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let backend = match (cli.base_url, cli.backend) {
        (Some(url), _) => Backend::Custom(url),
        (None, CliBackend::Local) => Backend::Local,
        (None, CliBackend::Production) => Backend::Production,
    };

    let gateway = Arc::new(SyncedTokenGateway::new());

    if let Some(token) = cli.set_token {
        gateway
            .set_token(token, backend.base_url().to_string())
            .await;
        println!("{} Token saved", style("✓").green().bold());
        return Ok(());
    }

    let transport = Arc::new(HttpTransport::new(backend));
    let controller = SessionController::new(transport, gateway);

    let (video_id, title) = match cli.video_id {
        Some(id) => (id, cli.title),
        None => match controller.take_pending().await {
            Some(pending) => {
                println!(
                    "{} Resuming pending analysis for {}",
                    style("✓").green().bold(),
                    style(&pending.video_id).yellow()
                );
                (pending.video_id, pending.title)
            }
            None => {
                eprintln!(
                    "{} No video id given and no pending analysis found",
                    style("Error:").red().bold()
                );
                std::process::exit(2);
            }
        },
    };

    let opts = AnalyzeOptions {
        comment_limit: cli.limit,
        summary_length: cli.length.into(),
        language: cli.lang,
        no_cache: cli.no_cache,
    };

    println!(
        "\n{}  {}\n",
        style("comlens").cyan().bold(),
        style("Comment Analyzer").dim()
    );

    let bar = create_progress_bar();
    let mut snapshots = controller.subscribe();
    let mut advisories = controller.advisories();

    let runner = controller.clone();
    let run_video_id = video_id.clone();
    let run_title = title.clone();
    let use_stream = cli.stream;
    let run = tokio::spawn(async move {
        if use_stream {
            runner
                .start_analysis_streamed(&run_video_id, run_title, opts)
                .await;
        } else {
            runner
                .start_analysis_with(&run_video_id, run_title, opts)
                .await;
        }
    });

    let canceller = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = snapshots.borrow_and_update().clone();
                bar.set_position(session.progress_current.round() as u64);
                match session.stage {
                    Stage::Fetching => bar.set_message("fetching comments..."),
                    Stage::Analyzing => bar.set_message("analyzing..."),
                    Stage::Complete | Stage::Error | Stage::Idle => break,
                }
            }
            changed = advisories.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(Advisory::Overloaded) = *advisories.borrow_and_update() {
                    bar.println(format!(
                        "{} The server looks overloaded, still waiting...",
                        style("!").yellow().bold()
                    ));
                }
            }
        }
    }

    run.await?;

    let session = controller.snapshot();
    match session.stage {
        Stage::Complete => {
            bar.finish_with_message("done");
            let heading = session.title.clone().unwrap_or_else(|| video_id.clone());
            if let Some(result) = &session.result {
                println!("\n{}", style("─".repeat(60)).dim());
                println!("{}", format_result_readable(result, &heading));
            }
        }
        Stage::Error => {
            bar.abandon_with_message("failed");
            if let Some(error) = &session.error {
                eprintln!("\n{} {}", style("Error:").red().bold(), error);
            }
            std::process::exit(1);
        }
        _ => {
            bar.abandon_with_message("cancelled");
            println!("\n{} Analysis cancelled", style("✗").yellow().bold());
        }
    }

    Ok(())
}
