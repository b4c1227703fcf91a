use anyhow::{Context, Result};
use iac_verify::cli::commands::{ReportCommand, RunCommand, SelectCommand, StoreArgs, ValidateCommand};
use iac_verify::cli::output::*;
use iac_verify::cli::{Cli, Command};
use iac_verify::execution::{ExecutionEvent, Pipeline, Verification, Verifier, VerifyError, WorkspaceMode};
use iac_verify::persistence::{InMemoryReportStore, ReportStore};
use iac_verify::report::FileReportPublisher;
use iac_verify::runner::{ProcessRunner, ProcessRunnerConfig};
use iac_verify::{RunOutcome, VerifyConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Exit code for a run that completed with a failed step
const EXIT_FAILED: i32 = 1;

/// Exit code for a run aborted because a step could not be launched
const EXIT_LAUNCH_ERROR: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_verification(cmd, &cli.config).await?,
        Command::Validate(cmd) => validate_config(cmd, &cli.config)?,
        Command::Select(cmd) => select_pipeline(cmd, &cli.config)?,
        Command::Report(cmd) => show_reports(cmd).await?,
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<VerifyConfig> {
    VerifyConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

#[cfg(feature = "sqlite")]
async fn open_store(args: &StoreArgs) -> Result<Arc<dyn ReportStore>> {
    use iac_verify::persistence::SqliteReportStore;

    if args.in_memory {
        return Ok(Arc::new(InMemoryReportStore::new()));
    }

    let store = match &args.db {
        Some(path) => {
            let path = path.to_str().context("Database path is not valid UTF-8")?;
            SqliteReportStore::new(path).await?
        }
        None => SqliteReportStore::with_default_path().await?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(args: &StoreArgs) -> Result<Arc<dyn ReportStore>> {
    if args.db.is_some() {
        anyhow::bail!("Built without sqlite support; use --in-memory");
    }
    Ok(Arc::new(InMemoryReportStore::new()))
}

async fn run_verification(cmd: &RunCommand, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let context = cmd.trigger.to_context(&config.default_branch)?;

    println!(
        "{}Verifying change {} ({}: {} -> {})",
        INFO,
        style(&context.change_id).bold(),
        context.event_kind,
        style(&context.source_ref).cyan(),
        style(&context.target_ref).cyan()
    );

    let runner = ProcessRunner::new(ProcessRunnerConfig::new().with_kill_grace(config.kill_grace()));

    // Set up event handler for console output
    let spinner = create_spinner();
    let progress = spinner.clone();
    let pipeline = Pipeline::new(runner).with_event_handler(move |event| {
        if let ExecutionEvent::StepStarted { step_name, index, total } = event {
            progress.set_message(format_step_progress(step_name, *index, *total));
        }
        if let Some(line) = format_execution_event(event) {
            progress.suspend(|| println!("{}", line));
        }
    });

    let store: Arc<dyn ReportStore> = if cmd.no_report {
        Arc::new(InMemoryReportStore::new())
    } else {
        open_store(&cmd.store).await?
    };

    let mut verifier = Verifier::from_config(&config, pipeline, store)?;
    if let Some(dir) = cmd.report_dir.as_ref().filter(|_| !cmd.no_report) {
        verifier = verifier.with_publisher(Arc::new(FileReportPublisher::new(dir)));
    }

    let coordinator = verifier.coordinator().clone();
    let change_id = context.change_id.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run for change {}", change_id);
            coordinator.cancel(&change_id);
        }
    });

    let mode = if cmd.in_place {
        WorkspaceMode::InPlace
    } else {
        WorkspaceMode::Isolated
    };

    let result = verifier.verify(&context, &cmd.workdir, mode).await;
    spinner.finish_and_clear();

    match result {
        Ok(verification) => {
            print_verification(&verification, cmd.json)?;
            if verification.run.outcome != RunOutcome::Passed {
                std::process::exit(EXIT_FAILED);
            }
            Ok(())
        }
        Err(VerifyError::Launch { step, message, run, .. }) => {
            println!(
                "\n{}Step {} could not be launched: {}",
                CROSS,
                style(&step).bold(),
                style(&message).red()
            );
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            }
            error!("Run for change {} aborted", run.context.change_id);
            std::process::exit(EXIT_LAUNCH_ERROR);
        }
        Err(e) => Err(e.into()),
    }
}

fn print_verification(verification: &Verification, json: bool) -> Result<()> {
    let run = &verification.run;

    if json {
        println!("{}", serde_json::to_string_pretty(run)?);
    } else {
        println!(
            "\n{} {} in {}",
            style(&run.pipeline_name).bold(),
            format_outcome(run.outcome),
            style(format_duration_ms(run.total_duration_ms())).dim()
        );
    }

    if let Some(report) = &verification.report {
        println!(
            "{}Report for change {} at revision {}",
            INFO,
            style(&report.change_id).bold(),
            style(report.revision).cyan()
        );
    }
    if let Some(warning) = &verification.report_warning {
        println!("{}Report warning: {}", WARN, style(warning).yellow());
    }

    Ok(())
}

fn validate_config(cmd: &ValidateCommand, config_path: &Path) -> Result<()> {
    println!("{}Validating {}...", INFO, config_path.display());

    match VerifyConfig::from_file(config_path) {
        Ok(config) => {
            println!("{}Configuration is valid!", CHECK);
            println!("  Default branch: {}", style(&config.default_branch).bold());
            for (name, pipeline) in &config.pipelines {
                let steps: Vec<&str> = pipeline.steps.iter().map(|s| s.name.as_str()).collect();
                println!("  Pipeline {}: {}", style(name).bold(), style(steps.join(" -> ")).cyan());
            }
            println!("  Trigger rules: {}", style(config.trigger_rules().len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(EXIT_FAILED);
        }
    }
}

fn select_pipeline(cmd: &SelectCommand, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let context = cmd.trigger.to_context(&config.default_branch)?;
    let gate = config.to_gate(Arc::new(config.to_catalog()?));

    match gate.select_definition(&context) {
        Some(definition) => {
            println!(
                "{}{} {} -> pipeline {}",
                ROCKET,
                context.event_kind,
                style(&context.target_ref).cyan(),
                style(&definition.name).bold()
            );
            for step in &definition.steps {
                let runs = if step.run_if.evaluate(&context) {
                    style("runs").green()
                } else {
                    style("skipped").dim()
                };
                println!("  {} ({}, when {})", style(&step.name).bold(), runs, step.run_if);
            }
        }
        None => {
            println!(
                "{}No pipeline configured for {} into {}",
                WARN, context.event_kind, context.target_ref
            );
        }
    }

    Ok(())
}

async fn show_reports(cmd: &ReportCommand) -> Result<()> {
    let store = open_store(&cmd.store).await?;

    if let Some(change_id) = &cmd.change_id {
        match store.load(change_id).await? {
            Some(stored) if cmd.json => println!("{}", serde_json::to_string_pretty(&stored)?),
            Some(stored) => {
                println!("{}", format_stored_report(&stored));
                if let Some(comment_id) = &stored.comment_id {
                    println!("  Published as {}", style(comment_id).dim());
                }
                println!("\n{}", stored.report.body_text);
            }
            None => println!("{}No report for change {}", WARN, change_id),
        }
        return Ok(());
    }

    let reports = store.list().await?;
    if reports.is_empty() {
        println!("{}No reports stored", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "reports": reports });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{}Stored reports:", INFO);
        for stored in &reports {
            println!("  {}", format_stored_report(stored));
        }
    }

    Ok(())
}
