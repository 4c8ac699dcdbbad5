use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulse_agents::{top_k, ComplaintService};
use pulse_core::ComplaintItem;
use pulse_ml::{
    ModelArtifacts, PulseMlStack, StackOptions, TrainingCorpus, TrainingOptions,
    DEFAULT_MODEL_PATH,
};
use pulse_observability::{init_tracing, AppMetrics};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "pulse")]
#[command(about = "ServicePulse complaint triage CLI")]
struct Cli {
    #[arg(long, env = "PULSE_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    model_path: PathBuf,

    #[arg(long, env = "PULSE_KEYWORDS_PATH")]
    keywords_path: Option<PathBuf>,

    /// Train on the built-in demo corpus when no saved model exists.
    #[arg(long)]
    demo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fit a model from a .csv or .jsonl corpus and save it.
    Train {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Classify {
        text: String,
    },
    Predict {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Cluster a JSON array of complaints read from a file.
    Cluster {
        file: PathBuf,
        #[arg(long)]
        clusters: Option<usize>,
    },
    /// One message, or an interactive session when none is given.
    Chat {
        message: Option<String>,
    },
    Labels,
    Diagnose {
        text: String,
    },
}

#[derive(Debug, Serialize)]
struct TrainSummary {
    model_path: String,
    model_version: String,
    examples: usize,
    features: usize,
    labels: Vec<String>,
}

fn main() -> Result<()> {
    init_tracing("pulse_cli");
    let cli = Cli::parse();

    if let Command::Train { data, out } = &cli.command {
        let out = out.clone().unwrap_or_else(|| cli.model_path.clone());
        return run_train(data, out);
    }

    let service = build_service(&cli);

    match cli.command {
        Command::Train { .. } => {}
        Command::Classify { text } => {
            let result = service.classify(&text);
            print_json(&serde_json::json!({
                "category": result.category,
                "confidence": result.confidence,
                "source": result.source,
                "top_k": top_k(&result),
            }))?;
        }
        Command::Predict { title, description } => {
            let prediction = service
                .classify_combined(title.as_deref(), description.as_deref())
                .context("nothing to classify")?;
            print_json(&prediction)?;
        }
        Command::Cluster { file, clusters } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed reading {}", file.display()))?;
            let items: Vec<ComplaintItem> =
                serde_json::from_str(&raw).context("expected a JSON array of complaints")?;
            let report = service
                .cluster(&items, clusters.filter(|k| *k > 0))
                .context("clustering rejected the batch")?;
            print_json(&report)?;
        }
        Command::Chat { message: Some(message) } => {
            print_json(&service.advise_chat(None, &message))?;
        }
        Command::Chat { message: None } => run_chat(&service)?,
        Command::Labels => print_json(&service.list_labels())?,
        Command::Diagnose { text } => print_json(&service.diagnose(&text))?,
    }

    Ok(())
}

fn build_service(cli: &Cli) -> ComplaintService {
    let options = StackOptions {
        model_path: cli.model_path.clone(),
        keywords_path: cli.keywords_path.clone(),
        train_demo: cli.demo,
        ..StackOptions::from_env()
    };
    ComplaintService::new(PulseMlStack::load(&options), AppMetrics::shared())
}

fn run_train(data: &Path, out: PathBuf) -> Result<()> {
    let corpus = TrainingCorpus::from_path(data)
        .with_context(|| format!("failed loading training data from {}", data.display()))?;
    let artifacts = ModelArtifacts::train(&corpus, TrainingOptions::default())
        .context("training failed")?;
    artifacts
        .save(&out)
        .with_context(|| format!("failed writing model to {}", out.display()))?;

    print_json(&TrainSummary {
        model_path: out.display().to_string(),
        model_version: artifacts.model_version.clone(),
        examples: corpus.len(),
        features: artifacts.encoder.dims(),
        labels: artifacts
            .labels()
            .iter()
            .map(|label| label.to_string())
            .collect(),
    })
}

fn run_chat(service: &ComplaintService) -> Result<()> {
    let mut session_id: Option<String> = None;

    println!("ServicePulse chat mode. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }
        if message.is_empty() {
            continue;
        }

        let reply = service.advise_chat(session_id.clone(), message);
        session_id = Some(reply.session_id.clone());

        println!("\n{}\n", reply.advice.reply);
        println!(
            "urgency: {}  suggested: {}",
            reply.advice.urgency,
            reply
                .advice
                .suggested_category
                .as_ref()
                .map(|category| category.as_str())
                .unwrap_or("-")
        );
        println!("prefill title: {}\n", reply.advice.prefill.title);
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
