// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! elo - command line driver for the elo scripting language
//!
//! Runs a script file, evaluates an inline snippet, or starts the REPL.
//! With `--disassemble` it prints the compiled bytecode instead.

mod cli;
mod config;
mod repl;

use clap::Parser;
use elo_engine::{AsyncEngine, Value, compile_source};
use owo_colors::OwoColorize;
use std::path::Path;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "ELO_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                report(&e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    let config = config.merge_cli(&cli);
    if config.vm.call_stack_size > 255 {
        warn!(
            "call_stack_size {} exceeds the maximum, using 255",
            config.vm.call_stack_size
        );
    }

    if cli.disassemble {
        disassemble(&cli).await
    } else if let Some(code) = &cli.eval {
        run_eval(code, &config).await
    } else if let Some(path) = &cli.file {
        run_file(path, &config).await
    } else {
        run_repl(&config)
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.trace {
        EnvFilter::new("elo_engine=trace")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints an error as `error: <message>`.
fn report(err: &dyn std::fmt::Display) {
    eprintln!("{}: {}", "error".red().bold(), err);
}

/// Start the interactive REPL
fn run_repl(config: &Config) -> ExitCode {
    match repl::Repl::new(config) {
        Ok(mut repl) => {
            if let Err(e) = repl.run() {
                report(&e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: failed to initialize REPL: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run_file(path: &Path, config: &Config) -> ExitCode {
    let engine = AsyncEngine::with_config(config.engine_config());

    match engine.eval_file(path).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run_eval(code: &str, config: &Config) -> ExitCode {
    let engine = AsyncEngine::with_config(config.engine_config());

    match engine.eval_named(code, "<eval>").await {
        Ok(value) => {
            if !matches!(value, Value::Nil) {
                println!("{}", value);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

/// Compile the script or `-e` snippet and print its listing.
async fn disassemble(cli: &Cli) -> ExitCode {
    let compiled = match (&cli.eval, &cli.file) {
        (Some(code), _) => compile_source(code, "<eval>"),
        (None, Some(path)) => match tokio::fs::read_to_string(path).await {
            Ok(source) => compile_source(&source, &path.display().to_string()),
            Err(e) => Err(e.into()),
        },
        (None, None) => {
            report(&"--disassemble needs a file or -e CODE");
            return ExitCode::FAILURE;
        }
    };

    match compiled {
        Ok(proto) => {
            print!("{}", proto);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}
