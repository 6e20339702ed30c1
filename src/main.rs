#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use result_export::config::{TargetSelection, build_targets, load_config};
use result_export::pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "result-export")]
#[command(about = "Canonicalize benchmark results and export them once per distinct content", long_about = None)]
struct Cli {
    /// Result directory, or a tree of them, holding results_<test> archives
    #[arg(long)]
    input: PathBuf,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Export to the OpenSearch summary and time-series indices
    #[arg(long)]
    opensearch: bool,

    /// Export each document as a Horreum run
    #[arg(long)]
    horreum: bool,

    /// Write one {document_id}.json per document into this directory
    #[arg(long, value_name = "DIR")]
    output_json: Option<PathBuf>,

    /// Enable verbose logging (or set RESULT_EXPORT_LOG)
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("RESULT_EXPORT_LOG").unwrap_or_else(|_| {
        if verbose { "result_export=debug".to_string() } else { "result_export=info".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref());
    let selection = TargetSelection {
        opensearch: cli.opensearch,
        horreum: cli.horreum,
        output_json: cli.output_json.clone(),
    };
    let pipeline = Pipeline::new(build_targets(&config, &selection));
    match pipeline.process_all(&cli.input) {
        Ok(stats) => {
            println!("{}", stats.render_summary());
            std::process::exit(stats.exit_code());
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
