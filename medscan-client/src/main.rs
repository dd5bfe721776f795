use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use medscan_client::{
    AnalysisResult, ClientConfig, ReportFields, ResultRenderer, ScanWorkflow, WorkflowPhase,
    api::decode_analysis,
    export::{export_report, parse_report},
};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "medscan", version, about = "Analyze prescription images")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    upload_url: Option<String>,

    #[arg(long, global = true)]
    analyze_url: Option<String>,

    /// -v for info, -vv for debug
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload and analyze one or more prescription images, one after another
    Analyze {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Save each result as a JSON report
        #[arg(long)]
        export: bool,

        /// Fields to include in the exported report (default: all)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<ExportField>,

        /// Directory for exported reports
        #[arg(long)]
        export_dir: Option<PathBuf>,

        /// Send the image bytes to the analysis endpoint as well
        #[arg(long)]
        include_image: bool,
    },
    /// Render a saved analysis result or exported report
    Show { report: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportField {
    Text,
    Medicines,
    Interactions,
    Recommendations,
}

fn report_fields(selected: &[ExportField]) -> ReportFields {
    if selected.is_empty() {
        return ReportFields::all();
    }
    let mut fields = ReportFields::none();
    for field in selected {
        match field {
            ExportField::Text => fields.extracted_text = true,
            ExportField::Medicines => fields.medicines = true,
            ExportField::Interactions => fields.interactions = true,
            ExportField::Recommendations => fields.recommendations = true,
        }
    }
    fields
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.upload_url {
        config.upload_url = url;
    }
    if let Some(url) = cli.analyze_url {
        config.analyze_url = url;
    }

    match cli.command {
        Command::Analyze {
            images,
            export,
            fields,
            export_dir,
            include_image,
        } => {
            if let Some(dir) = export_dir {
                config.export_dir = dir;
            }
            config.include_image_in_analysis |= include_image;
            let fields = export.then(|| report_fields(&fields));
            analyze(&config, &images, fields).await
        }
        Command::Show { report } => show(&report).await,
    }
}

async fn analyze(
    config: &ClientConfig,
    images: &[PathBuf],
    export: Option<ReportFields>,
) -> anyhow::Result<()> {
    let workflow = ScanWorkflow::from_config(config).await?;
    info!(
        "Uploading to {}, analyzing at {}",
        config.upload_url, config.analyze_url
    );

    let mut failures = 0;
    for (index, path) in images.iter().enumerate() {
        if index > 0 {
            workflow.new_analysis().await?;
            println!();
        }

        match workflow.select_path(path).await {
            Ok(Some(preview)) => println!("Selected {}", preview),
            Ok(None) => {
                println!("Skipped {}: not an image", path.display());
                continue;
            }
            Err(e) => {
                print_notifications(&workflow).await?;
                eprintln!("{}: {}", path.display(), e);
                failures += 1;
                continue;
            }
        }

        let outcome = submit_with_progress(&workflow).await;
        print_notifications(&workflow).await?;

        match outcome {
            Ok(result) => {
                println!("{}", workflow.report().await?);
                if let Some(fields) = export {
                    let saved = export_report(&result, fields, &config.export_dir).await?;
                    println!("Report saved to {}", saved.display());
                }
            }
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!(
            "{} of {} prescriptions could not be analyzed",
            failures,
            images.len()
        );
    }
    Ok(())
}

/// Submit and print each progress phase as it is reached.
async fn submit_with_progress(workflow: &ScanWorkflow) -> medscan_client::Result<AnalysisResult> {
    let mut phases = workflow.phases().subscribe();
    let submit = workflow.submit();
    tokio::pin!(submit);

    let mut watching = true;
    let outcome = loop {
        tokio::select! {
            biased;
            changed = phases.changed(), if watching => match changed {
                Ok(()) => print_phase(&mut phases),
                Err(_) => watching = false,
            },
            outcome = &mut submit => break outcome,
        }
    };

    if phases.has_changed().unwrap_or(false) {
        print_phase(&mut phases);
    }
    outcome
}

fn print_phase(phases: &mut watch::Receiver<WorkflowPhase>) {
    let phase = *phases.borrow_and_update();
    println!("{} - {}", phase, phase.description());
}

async fn print_notifications(workflow: &ScanWorkflow) -> anyhow::Result<()> {
    for notification in workflow.take_notifications().await? {
        println!("{}", notification);
    }
    Ok(())
}

/// Render a saved analysis: an exported report, a bare result or a backend
/// response envelope.
async fn show(path: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let result = decode_analysis(&content)?;

    if let Ok(report) = parse_report(&content) {
        println!("Exported {}", report.timestamp.to_rfc3339());
    }
    println!("{}", ResultRenderer::render(&result));
    Ok(())
}
