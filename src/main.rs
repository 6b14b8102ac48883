//! SAP Analyzer - Entry point
//!
//! Extracts a Statistical Analysis Plan PDF, answers the review questions,
//! writes the results and then takes follow-up questions on stdin.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sap_analyzer::error::ModelCallError;
use sap_analyzer::{
    run, AnalysisConfig, ExtractorBackend, GenerationParams, HttpModel, ModelConfig,
    QuestionSet, RunConfig, RunReport,
};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "sap-analyzer", version, about = "Analyze clinical trial SAP documents")]
struct Cli {
    /// Path to the SAP PDF
    pdf_path: PathBuf,

    /// Password for an encrypted PDF
    #[arg(short, long, env = "SAP_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory for the session output file
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "SAP_MODEL_ENDPOINT", default_value = "http://localhost:11434/v1")]
    endpoint: String,

    /// Model name
    #[arg(long, env = "SAP_MODEL_NAME", default_value = "llama3.1")]
    model: String,

    /// Bearer token for the endpoint
    #[arg(long, env = "SAP_MODEL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = 0.3)]
    temperature: f32,

    /// Sampling temperature for the judge
    #[arg(long, default_value_t = 0.1)]
    judge_temperature: f32,

    /// Completion token limit per answer
    #[arg(long, default_value_t = 1024)]
    max_tokens: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Attempts per model call on transient failures
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Document characters included in each prompt
    #[arg(long, default_value_t = 8000)]
    max_document_chars: usize,

    /// Text extraction backend (auto, pdfium, lopdf)
    #[arg(long, default_value = "auto")]
    backend: ExtractorBackend,

    /// Question set (standard, extended)
    #[arg(long, default_value = "standard")]
    questions: QuestionSet,

    /// Skip the interactive session
    #[arg(long)]
    no_interactive: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts,
            ..Default::default()
        }
    }

    fn run_config(&self) -> RunConfig {
        let defaults = AnalysisConfig::default();
        RunConfig {
            pdf_path: self.pdf_path.clone(),
            password: self.password.clone(),
            output_dir: self.output_dir.clone(),
            backend: self.backend,
            interactive: !self.no_interactive,
            analysis: AnalysisConfig {
                question_set: self.questions,
                answer_params: GenerationParams {
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                },
                judge_params: GenerationParams {
                    temperature: self.judge_temperature,
                    ..defaults.judge_params
                },
                max_document_chars: self.max_document_chars,
                ..defaults
            },
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "sap_analyzer=debug"
    } else {
        "sap_analyzer=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn execute(cli: &Cli) -> anyhow::Result<RunReport> {
    let model = HttpModel::new(cli.model_config()).context("Invalid model configuration")?;
    tracing::info!(endpoint = %model.url(), model = %cli.model, "Model endpoint configured");

    let config = cli.run_config();
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    run(&config, Arc::new(model), stdin, stdout)
        .await
        .with_context(|| format!("Failed to analyze {}", cli.pdf_path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    tracing::info!("Starting SAP Analyzer");

    match execute(&cli).await {
        Ok(report) => {
            println!(
                "\nAnalysis saved to {} ({} answered, {} failed)",
                report.output_path.display(),
                report.answered,
                report.failed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if e.downcast_ref::<ModelCallError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}
