//! Homework Helper - step-by-step explanations for homework problems
//!
//! CLI entry point: solve one problem, or a batch paced through the request queue.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, bail};
use tracing::{debug, info, warn};

use homework_helper::cli::{Cli, Command, OutputFormat, get_log_dir};
use homework_helper::config::Config;
use homework_helper::llm::create_client;
use homework_helper::queue::{QueueState, SerialRequestQueue};
use homework_helper::{Analyzer, HomeworkProblem, HomeworkService, ProblemStore};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so problems go to stderr
    let log_dir = get_log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("hwh.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(model = %config.llm.model, queue = ?config.queue, "Homework helper loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Solve { text, file, format } => {
            debug!(words = text.len(), ?file, ?format, "main: matched Solve command");
            cmd_solve(&config, text, file.as_deref(), format).await
        }
        Command::Batch { file, format } => {
            debug!(?file, ?format, "main: matched Batch command");
            cmd_batch(&config, &file, format).await
        }
        Command::Config => {
            debug!("main: matched Config command");
            cmd_config(&config)
        }
    }
}

/// Wire the queue, client, analyzer and store together
fn build_service(config: &Config) -> Result<HomeworkService> {
    let queue = SerialRequestQueue::new(config.queue.clone());
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    if llm.is_none() {
        eprintln!(
            "{} {} is not set, using offline explanations",
            "note:".yellow().bold(),
            config.llm.api_key_env
        );
    }

    let analyzer = Analyzer::new(llm, queue, config.llm.clone(), config.analysis.clone());
    Ok(HomeworkService::new(analyzer, Arc::new(ProblemStore::new())))
}

/// Explain a single problem
async fn cmd_solve(config: &Config, words: Vec<String>, file: Option<&Path>, format: OutputFormat) -> Result<()> {
    debug!(?file, ?format, "cmd_solve: called");
    let (source, text) = match file {
        Some(path) => (
            path.display().to_string(),
            fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?,
        ),
        None if !words.is_empty() => ("argument".to_string(), words.join(" ")),
        None => {
            if io::stdin().is_terminal() {
                bail!("No problem given: pass it as arguments, with --file, or on stdin");
            }
            ("stdin".to_string(), io::read_to_string(io::stdin()).context("Failed to read stdin")?)
        }
    };

    let service = build_service(config)?;
    let problem = service.solve(&source, &text).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&problem)?),
        OutputFormat::Text => print_problem(&problem),
    }
    Ok(())
}

/// Explain every line of a file, all submitted at once
async fn cmd_batch(config: &Config, file: &PathBuf, format: OutputFormat) -> Result<()> {
    debug!(?file, ?format, "cmd_batch: called");
    let contents = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let lines: Vec<(usize, &str)> = contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    if lines.is_empty() {
        bail!("No problems found in {}", file.display());
    }
    info!(count = lines.len(), "Submitting batch");

    let service = build_service(config)?;
    let source = file.display().to_string();
    let results = futures::future::join_all(lines.iter().map(|(_, line)| service.solve(&source, line))).await;

    let mut failures = 0;
    for ((line_no, line), result) in lines.iter().zip(results) {
        if let Err(e) = result {
            failures += 1;
            warn!(line = line_no, error = %e, "Batch problem failed");
            eprintln!("{} line {} ({}): {}", "error:".red().bold(), line_no, line, e);
        }
    }

    // Ids follow submission order, so the store lists the batch in file order
    let solved = service.list().await;
    let state = service.analyzer().queue().queue_state();
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "problems": solved,
                "failed": failures,
                "queue": state.stats,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for problem in &solved {
                print_problem(problem);
                println!();
            }
            print_queue_summary(&state);
        }
    }

    if failures > 0 {
        bail!("{} of {} problems failed", failures, lines.len());
    }
    Ok(())
}

/// Print the effective configuration as YAML
fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}

fn print_problem(problem: &HomeworkProblem) {
    println!("{} {}", format!("#{}", problem.id).dimmed(), problem.problem_type.bold());
    if let Some(level) = problem.grade_level {
        println!("{} {}", "Level:".cyan(), level);
    }
    println!("{} {}", "Problem:".cyan(), problem.detected_text);
    println!();
    println!("{}", problem.overview);
    println!();

    for (i, step) in problem.steps.iter().enumerate() {
        println!("{} {}", format!("{}.", i + 1).green().bold(), step.title.bold());
        println!("   {}", step.description);
        if let Some(question) = &step.hint_question {
            println!("   {} {}", "?".yellow(), question);
        }
        if let Some(hint) = &step.hint {
            println!("   {} {}", "hint:".yellow(), hint);
        }
    }

    println!();
    println!("{}", problem.detailed_explanation);
    println!();
    println!("{} {}", "Solution:".green().bold(), problem.solution);
}

fn print_queue_summary(state: &QueueState) {
    println!("Request queue");
    println!("-------------");
    println!("Submitted:    {}", state.stats.submitted);
    println!("Succeeded:    {}", state.stats.succeeded);
    println!("Failed:       {}", state.stats.failed);
    println!("Retried:      {}", state.stats.retried);
    println!("Rate limited: {}", state.stats.rate_limited);
    println!("Panicked:     {}", state.stats.panicked);
    println!("Peak pending: {}", state.stats.peak_pending);
}
