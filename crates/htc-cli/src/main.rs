use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use htc_core::verifier::{verify, Severity};

mod client;
mod origin;
mod proxy;
mod runner;

use runner::{RunConfig, Target};

/// HTC, the HTTP Test Case runner
///
/// Drive black-box tests of HTTP proxies from `.htc` scripts.
#[derive(Parser)]
#[command(name = "htc", version, about, long_about = None)]
struct Cli {
    /// Log every step (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script: start the mock origin, send every client, check everything
    Run {
        /// Path to .htc file
        file: PathBuf,
        /// Address of an already running proxy (host:port)
        #[arg(long, value_name = "ADDR", conflicts_with = "proxy_cmd")]
        proxy: Option<String>,
        /// Shell command that starts the proxy under test
        #[arg(long, value_name = "CMD")]
        proxy_cmd: Option<String>,
        /// Port for the mock origin (0 picks a free one)
        #[arg(long, default_value_t = 0)]
        origin_port: u16,
        /// Seconds to wait for the origin and proxy to come up
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        ready_timeout: u64,
    },

    /// Parse and verify a script without sending traffic
    Check {
        /// Path to .htc file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Run {
            file,
            proxy,
            proxy_cmd,
            origin_port,
            ready_timeout,
        } => {
            let target = match (proxy, proxy_cmd) {
                (Some(addr), _) => Target::Address(addr),
                (None, Some(command)) => Target::Command(command),
                (None, None) => Target::Origin,
            };
            cmd_run(RunConfig {
                script: file,
                target,
                origin_port,
                ready_timeout: Duration::from_secs(ready_timeout),
            })
        }
        Commands::Check { file, json } => cmd_check(&file, json),
        Commands::Version => {
            println!("htc {} (htc-core {})", env!("CARGO_PKG_VERSION"), htc_core::VERSION);
            0
        }
    };

    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

// ── Run ───────────────────────────────────────────────────

fn cmd_run(config: RunConfig) -> i32 {
    let outcome = actix_web::rt::System::new().block_on(runner::run(&config));
    let script = config.script.display();

    match outcome {
        Ok(summary) => {
            println!(
                "{} {}: {} client(s), {} assertion(s), {} handler(s)",
                "PASS".green().bold(),
                script,
                summary.clients,
                summary.assertions,
                summary.handlers
            );
            0
        }
        Err(runner::RunError::Failed(report)) => {
            eprintln!("{} {}", "FAIL".red().bold(), script);
            eprintln!("{}", report);
            1
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            e.exit_code()
        }
    }
}

// ── Check ─────────────────────────────────────────────────

fn cmd_check(file: &Path, json: bool) -> i32 {
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: cannot read {}: {}", "error".red().bold(), file.display(), e);
            return 2;
        }
    };

    let program = match htc_core::parse(&source) {
        Ok(program) => program,
        Err(e) => {
            if json {
                println!("{}", serde_json::json!({ "valid": false, "error": e.to_string() }));
            } else {
                eprintln!("{}: {}", "error".red().bold(), e);
            }
            return 2;
        }
    };

    let result = verify(&program);
    let valid = result.is_valid();

    if json {
        let report = serde_json::json!({
            "valid": valid,
            "errors": result.errors().len(),
            "warnings": result.warnings().len(),
            "diagnostics": result.diagnostics,
            "program": program,
        });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("{}: {}", "error".red().bold(), e);
                return 2;
            }
        }
    } else {
        for diagnostic in &result.diagnostics {
            let line = diagnostic.to_string();
            match diagnostic.severity {
                Severity::Error => eprintln!("{}", line.red()),
                Severity::Warning => eprintln!("{}", line.yellow()),
            }
        }
        if valid {
            println!(
                "{} {} is valid ({} handler(s), {} client(s))",
                "✓".green(),
                file.display(),
                program.handlers.len(),
                program.clients.len()
            );
        }
    }

    if valid {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_proxy_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "htc", "run", "x.htc", "--proxy", "127.0.0.1:8080", "--proxy-cmd", "true",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["htc", "run", "x.htc"]).unwrap();
        match cli.command {
            Commands::Run {
                proxy,
                proxy_cmd,
                origin_port,
                ready_timeout,
                ..
            } => {
                assert!(proxy.is_none() && proxy_cmd.is_none());
                assert_eq!(origin_port, 0);
                assert_eq!(ready_timeout, 10);
            }
            _ => panic!("expected run"),
        }
    }
}
