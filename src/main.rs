use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use cli::batch_file::load_batch_file;
use cli::commands::Commands;
use config::Config;

use vloop::batch::AsyncValidationLoop;
use vloop::cache::ValidationCache;
use vloop::llm::{AnthropicClient, LlmClient, MockLlmClient};
use vloop::prompt::parse_input_pairs;
use vloop::runner::{ExecutionRequest, ExecutionResult, ValidationLoop};
use vloop::validation::{ValidationResult, ValidatorRegistry};

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("vloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_client(cli: &Cli, config: &Config) -> Result<Arc<dyn LlmClient>> {
    match &cli.mock {
        Some(reply) => {
            info!("Using mock client");
            Ok(Arc::new(MockLlmClient::always(reply.clone())))
        }
        None => {
            let client = AnthropicClient::new(config.anthropic()).context("Failed to create Anthropic client")?;
            Ok(Arc::new(client))
        }
    }
}

fn build_loop(cli: &Cli, config: &Config) -> Result<ValidationLoop> {
    let client = build_client(cli, config)?;
    let mut runner = ValidationLoop::with_config(client, config.loop_config());
    if let Some(cache_config) = config.cache_config() {
        let cache = Arc::new(ValidationCache::new(cache_config).context("Invalid cache configuration")?);
        if let Some(period) = config.sweep_interval() {
            let _sweeper = cache.spawn_sweeper(period);
        }
        runner = runner.with_cache(cache);
    }
    Ok(runner)
}

async fn run_application(cli: &Cli, config: &Config) -> Result<bool> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let registry = ValidatorRegistry::standard();

    match &cli.command {
        Commands::Run {
            template,
            set,
            validator,
            max_retries,
            log,
        } => {
            let template_text =
                fs::read_to_string(template).context(format!("Failed to read template {}", template.display()))?;
            let input = parse_input_pairs(set).context("Invalid --set value")?;
            let mut request = ExecutionRequest::new(template_text, registry.get(validator)?)
                .with_input(input)
                .with_label(template.display().to_string());
            if let Some(max_retries) = max_retries {
                request = request.with_max_retries(*max_retries);
            }

            let runner = build_loop(cli, config)?;
            let result = runner.run(&request).await.context("Execution failed")?;
            print_result(&result, cli.is_verbose());
            if let Some(path) = log {
                result.save_log(path).context("Failed to write execution log")?;
                println!("{} {}", "Log written:".cyan(), path.display());
            }
            Ok(result.success)
        }
        Commands::Batch {
            file,
            concurrency,
            log_dir,
        } => {
            let base_dir = file.parent().unwrap_or_else(|| Path::new("."));
            let requests = load_batch_file(file)?
                .into_iter()
                .enumerate()
                .map(|(i, entry)| entry.into_request(i, base_dir, &registry))
                .collect::<Result<Vec<_>>>()?;
            let labels: Vec<String> = requests
                .iter()
                .enumerate()
                .map(|(i, r)| r.label.clone().unwrap_or_else(|| format!("request-{}", i)))
                .collect();

            let mut batch_config = config.batch_config();
            if let Some(limit) = concurrency {
                batch_config = batch_config.with_concurrency_limit(*limit);
            }
            let executor = AsyncValidationLoop::new(build_loop(cli, config)?, batch_config)?;
            let results = executor.execute_batch(requests).await;

            let mut all_succeeded = true;
            for (label, result) in labels.iter().zip(&results) {
                match result {
                    Ok(result) => {
                        all_succeeded &= result.success;
                        let status = if result.success {
                            "ok".green()
                        } else {
                            result.status.to_string().red()
                        };
                        println!(
                            "{:<24} {:<10} attempts={} {}ms",
                            label, status, result.total_attempts, result.total_duration_ms
                        );
                        if let Some(dir) = log_dir {
                            result
                                .save_log(&dir.join(format!("{}.json", sanitize(label))))
                                .context("Failed to write execution log")?;
                        }
                    }
                    Err(e) => {
                        all_succeeded = false;
                        println!("{:<24} {:<10} {}", label, "error".red(), e);
                    }
                }
            }
            if let Some(stats) = executor.runner().cache().map(|c| c.stats()) {
                println!(
                    "{} {} hits, {} misses ({:.0}% hit rate), {} entries",
                    "Cache:".cyan(),
                    stats.hits,
                    stats.misses,
                    stats.hit_rate() * 100.0,
                    stats.entries
                );
            }
            Ok(all_succeeded)
        }
        Commands::Validate { file, validator } => {
            let content = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
            let validator = registry.get(validator)?;
            let result = validator
                .validate(&content, None)
                .await
                .context("Validator failed")?
                .normalized();
            print_validation(&result);
            Ok(result.is_valid)
        }
        Commands::Validators => {
            for name in registry.names() {
                println!("{}", name);
            }
            Ok(true)
        }
    }
}

fn print_result(result: &ExecutionResult, verbose: bool) {
    if result.success {
        println!(
            "{} after {} attempt(s) in {}ms",
            "Validated".green(),
            result.total_attempts,
            result.total_duration_ms
        );
    } else {
        println!(
            "{} ({}) after {} attempt(s): {}",
            "Failed".red(),
            result.status,
            result.total_attempts,
            result.final_error.as_deref().unwrap_or("unknown error")
        );
    }
    if verbose {
        for attempt in &result.attempts {
            println!("{} {} ({:?})", "Attempt".cyan(), attempt.ordinal, attempt.outcome);
            print_validation(&attempt.validation);
        }
    }
    if let Some(output) = &result.output {
        println!("{}", output);
    }
}

fn print_validation(result: &ValidationResult) {
    if result.is_valid {
        println!("{}", "valid".green());
    } else {
        println!("{}", "invalid".red());
    }
    for error in &result.errors {
        println!("  {} {}", "error:".red(), error);
    }
    for warning in &result.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    let succeeded = run_application(&cli, &config).await.context("Application failed")?;
    if !succeeded {
        std::process::exit(1);
    }

    Ok(())
}
