//! Command-line interface.
//!
//! Each subcommand maps onto one operation: generation, connection and key
//! checks, saving provider settings, running code, and managing history.
//! Generated code and program output go to stdout; progress, streaming
//! previews and diagnostics go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;

use crate::codegen::CodeGenerator;
use crate::config::AppConfig;
use crate::error::GenerationError;
use crate::history::{EntryMetadata, EntryStatus, HistoryEntry, HistoryRecorder, NewHistoryEntry};
use crate::runner::PythonRunner;
use crate::settings::{load_provider_config, save_provider_config};
use crate::store::{FileStore, Store};
use crate::types::{Provider, ProviderConfig, StreamChunk};
use crate::validation::validate_api_key;

#[derive(Debug, Parser)]
#[command(name = "pyrunner", version, about = "Generate and run Python code with an LLM")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate Python code from a natural-language prompt
    Generate {
        prompt: String,
        /// Show the reply as it arrives
        #[arg(long)]
        stream: bool,
        /// Execute the generated code
        #[arg(long)]
        run: bool,
        /// Also write the code to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Do not record this generation in the history
        #[arg(long)]
        no_history: bool,
    },
    /// Check that the saved provider settings work
    TestConnection,
    /// Check the shape of an API key without contacting the provider
    ValidateKey {
        #[arg(long)]
        provider: String,
        key: String,
    },
    /// Save the provider settings
    Configure {
        #[arg(long)]
        provider: Provider,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        model: Option<String>,
        /// Endpoint of an OpenAI-compatible server
        #[arg(long)]
        base_url: Option<String>,
        /// Run a connection test before saving
        #[arg(long)]
        test: bool,
    },
    /// Print the saved provider settings
    ShowConfig,
    /// Run a Python file through the execution runtime
    Run { file: PathBuf },
    /// Manage the prompt history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    List,
    Search { query: String },
    Show { id: String },
    Delete { id: String },
    Export { file: PathBuf },
    Import { file: PathBuf },
}

pub async fn run(cli: Cli, config: &AppConfig) -> Result<()> {
    let store = FileStore::new(config.store_dir()?);
    tracing::debug!(store = %store.dir().display(), "using store");

    match cli.command {
        Command::Generate {
            prompt,
            stream,
            run,
            output,
            no_history,
        } => {
            let code = generate(config, &store, &prompt, stream, !no_history).await?;
            println!("{}", code);
            if let Some(path) = output {
                std::fs::write(&path, format!("{}\n", code))
                    .with_context(|| format!("Cannot write {}", path.display()))?;
                eprintln!("[Saved] {}", path.display());
            }
            if run {
                run_code(config, &code).await?;
            }
            Ok(())
        }
        Command::TestConnection => test_connection(config, &store).await,
        Command::ValidateKey { provider, key } => validate_key(&provider, &key),
        Command::Configure {
            provider,
            api_key,
            model,
            base_url,
            test,
        } => {
            let mut provider_config = ProviderConfig::new(provider, api_key);
            if let Some(model) = model {
                provider_config = provider_config.with_model(model);
            }
            if let Some(base_url) = base_url {
                provider_config = provider_config.with_base_url(base_url);
            }
            configure(config, &store, provider_config, test).await
        }
        Command::ShowConfig => show_config(&store),
        Command::Run { file } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("Cannot read {}", file.display()))?;
            run_code(config, &code).await
        }
        Command::History { action } => history(&store, action),
    }
}

async fn generate(
    config: &AppConfig,
    store: &dyn Store,
    prompt: &str,
    stream: bool,
    record: bool,
) -> Result<String> {
    let provider_config = load_provider_config(store)?;
    let generator = CodeGenerator::new(config.provider_settings());
    let started = Instant::now();

    let result = if stream {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let preview = tokio::spawn(async move {
            let mut stderr = std::io::stderr();
            while let Some(chunk) = rx.recv().await {
                match chunk {
                    StreamChunk::TextDelta(text) => {
                        let _ = write!(stderr, "{}", text);
                        let _ = stderr.flush();
                    }
                    StreamChunk::Done => break,
                }
            }
            let _ = writeln!(stderr);
        });
        let result = generator
            .generate_code_stream(prompt, provider_config.as_ref(), tx)
            .await;
        let _ = preview.await;
        result
    } else {
        generator.generate_code(prompt, provider_config.as_ref()).await
    };

    let elapsed = started.elapsed().as_secs_f64() * 1000.0;
    // Rejected input never reached a provider, so there is nothing to record.
    if record && !matches!(result, Err(GenerationError::Validation(_))) {
        if let Some(provider_config) = &provider_config {
            record_generation(store, provider_config, prompt, &result, elapsed);
        }
    }

    result.map_err(|e| anyhow::anyhow!("Failed to generate code: {}", e))
}

fn record_generation(
    store: &dyn Store,
    provider_config: &ProviderConfig,
    prompt: &str,
    result: &Result<String, GenerationError>,
    execution_time: f64,
) {
    let (formatted_code, status, error) = match result {
        Ok(code) => (code.clone(), EntryStatus::Success, None),
        Err(e) => (String::new(), EntryStatus::Error, Some(e.to_string())),
    };
    let entry = NewHistoryEntry {
        provider: provider_config.provider.to_string(),
        user_prompt: prompt.to_string(),
        formatted_code,
        metadata: EntryMetadata {
            model_name: provider_config.model().to_string(),
            execution_time,
            status,
            error,
        },
    };
    if let Err(e) = HistoryRecorder::new(store).append(entry) {
        tracing::warn!("Failed to record history entry: {:#}", e);
    }
}

async fn test_connection(config: &AppConfig, store: &dyn Store) -> Result<()> {
    let provider_config = load_provider_config(store)?.context(
        "LLM provider is not configured. Run `pyrunner configure` first",
    )?;
    let status = CodeGenerator::new(config.provider_settings())
        .test_connection(&provider_config)
        .await;
    match status.error {
        None if status.success => {
            println!("Connection to {} succeeded", provider_config.provider);
            Ok(())
        }
        error => bail!(
            "Connection test failed: {}",
            error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

fn validate_key(provider: &str, key: &str) -> Result<()> {
    let check = validate_api_key(provider, key);
    if check.is_valid {
        println!("API key format is valid");
        return Ok(());
    }
    let mut message = check.error.unwrap_or_else(|| "Invalid API key".to_string());
    if let Some(example) = check.example {
        message.push_str(&format!(" (example: {})", example));
    }
    bail!(message)
}

async fn configure(
    config: &AppConfig,
    store: &dyn Store,
    provider_config: ProviderConfig,
    test: bool,
) -> Result<()> {
    provider_config.validate()?;
    if test {
        let status = CodeGenerator::new(config.provider_settings())
            .test_connection(&provider_config)
            .await;
        if !status.success {
            bail!(
                "Connection test failed: {}",
                status.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        eprintln!("[Config] Connection test passed");
    }
    save_provider_config(store, &provider_config)?;
    println!(
        "Saved settings for {} (model: {})",
        provider_config.provider,
        provider_config.model()
    );
    Ok(())
}

fn show_config(store: &dyn Store) -> Result<()> {
    match load_provider_config(store)? {
        Some(provider_config) => {
            println!("Provider: {}", provider_config.provider);
            println!("Model:    {}", provider_config.model());
            println!("API key:  {}", provider_config.masked_key());
            if let Some(base_url) = &provider_config.base_url {
                println!("Base URL: {}", base_url);
            }
        }
        None => println!("No provider configured. Run `pyrunner configure` first."),
    }
    Ok(())
}

async fn run_code(config: &AppConfig, code: &str) -> Result<()> {
    if code.trim().is_empty() {
        bail!("No code to execute");
    }
    let output = PythonRunner::new(&config.runner).run(code).await?;
    let display = output.display();
    if !display.is_empty() {
        println!("{}", display);
    }
    Ok(())
}

fn history(store: &dyn Store, action: HistoryAction) -> Result<()> {
    let recorder = HistoryRecorder::new(store);
    match action {
        HistoryAction::List => print_entries(&recorder.read_all()),
        HistoryAction::Search { query } => print_entries(&recorder.search(&query)),
        HistoryAction::Show { id } => {
            let entry = recorder
                .get(&id)
                .with_context(|| format!("No history entry with id {}", id))?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        HistoryAction::Delete { id } => {
            if !recorder.delete(&id)? {
                bail!("No history entry with id {}", id);
            }
            println!("Deleted {}", id);
        }
        HistoryAction::Export { file } => {
            recorder.export_to(&file)?;
            println!("Exported history to {}", file.display());
        }
        HistoryAction::Import { file } => {
            let count = import_history(&recorder, &file)?;
            println!("Imported {} entries", count);
        }
    }
    Ok(())
}

fn import_history(recorder: &HistoryRecorder<'_>, file: &Path) -> Result<usize> {
    recorder
        .import_from(file)
        .with_context(|| format!("Failed to import history from {}", file.display()))
}

fn print_entries(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No history entries");
        return;
    }
    for entry in entries {
        let status = match entry.metadata.status {
            EntryStatus::Success => "ok",
            EntryStatus::Error => "error",
        };
        println!(
            "{}  {}  {:<17}  {:<5}  {}",
            entry.id,
            entry.timestamp,
            entry.provider,
            status,
            one_line(&entry.prompt.user_prompt, 60)
        );
    }
}

fn one_line(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}
