use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use xsd_bundle::bundle::{BundleIndex, decode_frame};
use xsd_bundle::cli::{Cli, Command, OutputFormat, VerbosityLevel};
use xsd_bundle::config::Config;
use xsd_bundle::output::{FileReport, Output, Summary};
use xsd_bundle::validator::BundleRegistry;
use xsd_bundle::writer::BundleBuilder;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match &cli.command {
        Command::Pack {
            entrypoint,
            out_dir,
            name,
            cache_dir,
        } => pack(cli, &config, entrypoint, out_dir, name.as_deref(), cache_dir.as_deref()),
        Command::Validate {
            bundles,
            paths,
            extension,
            format,
        } => validate(cli, bundles, paths, extension, *format),
        Command::Inspect { bundle, format } => inspect(bundle, *format),
    }
}

fn pack(
    cli: &Cli,
    config: &Config,
    entrypoint: &str,
    out_dir: &Path,
    name: Option<&Path>,
    cache_dir: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let cache_dir = cache_dir.unwrap_or(&config.cache.directory);
    let mut builder = BundleBuilder::new(out_dir)
        .with_cache_dir(cache_dir)
        .with_fetch_options(config.fetch_options());

    match name {
        Some(name) => builder.register_with_filename(entrypoint, out_dir.join(name))?,
        None => builder.register(entrypoint)?,
    }

    let written = builder
        .save()
        .with_context(|| format!("failed to pack '{entrypoint}'"))?;
    if cli.verbosity() > VerbosityLevel::Quiet {
        for path in &written {
            println!("wrote {}", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(
    cli: &Cli,
    bundles: &[PathBuf],
    paths: &[PathBuf],
    extension: &str,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let sources: Vec<Vec<u8>> = bundles
        .iter()
        .map(|path| {
            std::fs::read(path).with_context(|| format!("failed to read bundle {}", path.display()))
        })
        .collect::<anyhow::Result<_>>()?;
    let mut registry = BundleRegistry::try_from_iter(sources.iter())
        .context("failed to load schema bundles")?;

    let files = discover_files(paths, extension)?;
    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        let report = match std::fs::read(&file) {
            Ok(xml) => match registry.validate(&xml) {
                Ok(outcome) => FileReport {
                    path: file,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(e) => FileReport {
                    path: file,
                    outcome: None,
                    error: Some(e.to_string()),
                },
            },
            Err(e) => FileReport {
                path: file,
                outcome: None,
                error: Some(e.to_string()),
            },
        };
        reports.push(report);
    }

    let output = Output::new(cli.verbosity());
    match format {
        OutputFormat::Text => print!("{}", output.format_reports(&reports)),
        OutputFormat::Json => println!("{}", output.format_json(&reports)?),
    }

    if Summary::from_reports(&reports).all_valid() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Expand files and directories into the list of XML files to validate.
fn discover_files(paths: &[PathBuf], extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in ignore::WalkBuilder::new(path).build() {
                let entry = entry?;
                if entry.file_type().is_some_and(|t| t.is_file())
                    && entry
                        .path()
                        .extension()
                        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
                {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    Ok(files)
}

fn inspect(bundle: &Path, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let compressed = std::fs::read(bundle)
        .with_context(|| format!("failed to read bundle {}", bundle.display()))?;
    let buffer = decode_frame(&compressed)?;
    let index = BundleIndex::parse(&buffer)?;

    let mut entries: Vec<_> = index.iter().collect();
    entries.sort_by_key(|(_, range)| range.start);
    let entrypoint = index.entrypoint();

    match format {
        OutputFormat::Text => {
            println!("name:             {}", index.name());
            println!("target namespace: {}", index.target_ns());
            println!("schema location:  {}", index.schema_location());
            println!(
                "payload:          {} byte(s) in {} entr{}",
                index.schemas_region().len(),
                index.len(),
                if index.len() == 1 { "y" } else { "ies" }
            );
            for (name, range) in entries {
                println!(
                    "  {} [{}..{}] {} byte(s){}",
                    name,
                    range.start,
                    range.end,
                    range.len(),
                    if range == entrypoint { " (entrypoint)" } else { "" }
                );
            }
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "name": index.name(),
                "target_namespace": index.target_ns(),
                "schema_location": index.schema_location(),
                "entries": entries
                    .iter()
                    .map(|(name, range)| {
                        serde_json::json!({
                            "name": name,
                            "start": range.start,
                            "end": range.end,
                            "entrypoint": *range == entrypoint,
                        })
                    })
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}
