use clap::{Parser, Subcommand, ValueEnum};
use octofhir_plandefinition::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "plan-apply")]
#[command(about = "Apply FHIR PlanDefinitions to a subject")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    RequestGroup,
    CarePlan,
    Bundle,
}

#[derive(Subcommand)]
enum Commands {
    /// Run $apply for one subject
    Apply {
        /// PlanDefinition JSON file
        #[arg(long, conflicts_with = "canonical", required_unless_present = "canonical")]
        plan: Option<PathBuf>,
        /// Canonical URL of a PlanDefinition in the repository
        #[arg(long)]
        canonical: Option<String>,
        /// Directory of knowledge artifacts (*.json, Bundles are expanded)
        #[arg(short, long)]
        repository: PathBuf,
        /// Subject reference, e.g. Patient/123
        #[arg(short, long)]
        subject: String,
        #[arg(long)]
        encounter: Option<String>,
        #[arg(long)]
        practitioner: Option<String>,
        #[arg(long)]
        organization: Option<String>,
        /// Parameters resource JSON file
        #[arg(long)]
        parameters: Option<PathBuf>,
        /// Bundle JSON file with data about the subject
        #[arg(long)]
        data: Option<PathBuf>,
        /// Expression results JSON file (expression text -> value)
        #[arg(long)]
        expressions: Option<PathBuf>,
        /// ApplyConfig JSON file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Embed resolved resources in the RequestGroup
        #[arg(long)]
        contain: bool,
        #[arg(short, long, value_enum, default_value = "request-group")]
        format: OutputFormat,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Bundle a PlanDefinition with its dependencies as a transaction
    Package {
        #[arg(long)]
        canonical: String,
        #[arg(short, long)]
        repository: PathBuf,
        /// Use PUT entries instead of POST
        #[arg(long)]
        put: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Apply {
            plan,
            canonical,
            repository,
            subject,
            encounter,
            practitioner,
            organization,
            parameters,
            data,
            expressions,
            config,
            contain,
            format,
            output,
        } => {
            let source = match (plan, canonical) {
                (Some(path), _) => PlanSource::Resource(Box::new(PlanDefinition::from_resource(
                    read_json(&path)?,
                )?)),
                (None, Some(canonical)) => PlanSource::Canonical(canonical),
                (None, None) => return Err("either --plan or --canonical is required".into()),
            };

            let mut config = match config {
                Some(path) => ApplyConfig::from_file(path)?,
                None => ApplyConfig::default(),
            };
            if contain {
                config = config.with_containment(true);
            }

            let evaluator = match expressions {
                Some(path) => LiteralExpressionEvaluator::from_file(path)?,
                None => LiteralExpressionEvaluator::new(),
            };
            let processor = PlanDefinitionProcessor::builder(
                Arc::new(InMemoryRepository::from_directory(&repository)?),
                Arc::new(evaluator),
            )
            .with_config(config)
            .build()?;

            let mut request = ApplyRequest::new(source, subject);
            request.encounter = encounter;
            request.practitioner = practitioner;
            request.organization = organization;
            if let Some(path) = parameters {
                request = request.with_parameters(read_json(&path)?);
            }
            if let Some(path) = data {
                request = request.with_data(read_json(&path)?);
            }

            let result = processor.apply(request)?;
            for issue in result.outcome.issues() {
                match issue.severity {
                    IssueSeverity::Error | IssueSeverity::Fatal => {
                        tracing::error!("{}", issue.diagnostics)
                    }
                    _ => tracing::warn!("{}", issue.diagnostics),
                }
            }

            let document = match format {
                OutputFormat::RequestGroup => {
                    let mut group = result.request_group.to_resource()?;
                    flatten_contained(&mut group, &mut OutcomeLog::new());
                    group
                }
                OutputFormat::CarePlan => result.to_care_plan()?,
                OutputFormat::Bundle => result.to_bundle()?,
            };
            write_json(&document, output.as_deref())?;
        }
        Commands::Package {
            canonical,
            repository,
            put,
            output,
        } => {
            let processor = PlanDefinitionProcessor::builder(
                Arc::new(InMemoryRepository::from_directory(&repository)?),
                Arc::new(LiteralExpressionEvaluator::new()),
            )
            .build()?;
            let bundle = processor.package(&PlanSource::Canonical(canonical), put)?;
            write_json(&bundle, output.as_deref())?;
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> std::result::Result<Value, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_json(document: &Value, output: Option<&Path>) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let text = serde_json::to_string_pretty(document)?;
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
