//! Workspace automation tasks.
//!
//! Run with: `cargo run -p xtask -- <command>`

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

/// Attributes every library crate root must carry.
const REQUIRED_ATTRIBUTES: &[&str] = &["#![forbid(unsafe_code)]", "#![deny(missing_docs)]"];

#[derive(Parser)]
#[command(name = "xtask", about = "Cadence workspace automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all CI checks locally
    Ci,
    /// Validate workspace conventions
    Lint,
    /// Run the scheduler property tests with more cases
    Soak {
        /// Number of proptest cases per property
        #[arg(long, default_value_t = 10_000)]
        cases: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => run_ci(),
        Commands::Lint => run_lint(Path::new("crates")),
        Commands::Soak { cases } => run_soak(cases),
    }
}

fn run_ci() -> Result<()> {
    println!("Running CI checks...\n");

    run_lint(Path::new("crates"))?;
    run_cmd("cargo", &["fmt", "--check"], &[])?;
    run_cmd("cargo", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"], &[])?;
    run_cmd("cargo", &["test", "--workspace"], &[])?;
    run_cmd("cargo", &["doc", "--workspace", "--no-deps"], &[])?;

    println!("\nAll CI checks passed!");
    Ok(())
}

fn run_lint(crates_dir: &Path) -> Result<()> {
    println!("Validating workspace conventions...\n");

    for entry in fs::read_dir(crates_dir).context("failed to list crates")? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !name.starts_with("cadence-") {
            bail!("Crate '{name}' does not follow cadence-* naming");
        }

        let manifest = fs::read_to_string(path.join("Cargo.toml"))
            .with_context(|| format!("{name}: missing Cargo.toml"))?;
        if !manifest.contains("[lints]") {
            bail!("{name}: Cargo.toml must opt into workspace lints");
        }

        let lib = path.join("src/lib.rs");
        if lib.exists() {
            let source = fs::read_to_string(&lib)?;
            for attribute in REQUIRED_ATTRIBUTES {
                if !source.contains(attribute) {
                    bail!("{name}: src/lib.rs is missing {attribute}");
                }
            }
        }
    }

    println!("All conventions validated!");
    Ok(())
}

fn run_soak(cases: u32) -> Result<()> {
    let cases = cases.to_string();
    run_cmd(
        "cargo",
        &["test", "-p", "cadence-subscriptions", "--test", "scheduler_properties", "--release"],
        &[("PROPTEST_CASES", cases.as_str())],
    )
}

fn run_cmd(cmd: &str, args: &[&str], envs: &[(&str, &str)]) -> Result<()> {
    println!("$ {} {}", cmd, args.join(" "));
    let status = Command::new(cmd)
        .args(args)
        .envs(envs.iter().copied())
        .status()
        .with_context(|| format!("Failed to run: {} {}", cmd, args.join(" ")))?;

    if !status.success() {
        bail!("Command failed: {} {}", cmd, args.join(" "));
    }
    Ok(())
}
