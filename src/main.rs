//! certmatrix - run a TLS verification matrix against local HTTPS servers

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use certmatrix::harness::case::DEFAULT_TRUST_ANCHOR;
use certmatrix::harness::{
    default_matrix, load_matrix, JsonRenderer, Renderer, Runner, TextRenderer,
};
use certmatrix::http::tls::TlsVersion;
use clap::{Parser, ValueEnum};
use log::{info, warn};

const TITLE: &str = "Testing using the OpenSSL TLS client";

/// certmatrix - TLS client verification harness
#[derive(Parser, Debug)]
#[command(name = "certmatrix")]
#[command(version, about, long_about = None)]
struct Cli {
    /// PEM file holding the only trusted root certificates
    #[arg(long, env = "CERTMATRIX_TRUST_ANCHOR", default_value = DEFAULT_TRUST_ANCHOR)]
    trust_anchor: PathBuf,

    /// JSON file with test cases (defaults to the built-in matrix)
    #[arg(long)]
    matrix: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Lowest TLS version the client offers (1.2 or 1.3)
    #[arg(long, default_value = "1.2", value_parser = parse_tls_version)]
    min_tls_version: TlsVersion,

    /// Report format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// When to color the text report
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Run all cases concurrently
    #[arg(long)]
    parallel: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn parse_tls_version(s: &str) -> std::result::Result<TlsVersion, String> {
    TlsVersion::parse(s).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn enabled(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => {
                std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal()
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every case passed
fn run(cli: &Cli) -> Result<bool> {
    let cases = match &cli.matrix {
        Some(path) => load_matrix(path)
            .with_context(|| format!("loading test matrix {}", path.display()))?,
        None => default_matrix(),
    };

    if !cli.trust_anchor.is_file() {
        warn!(
            "trust anchor {} is not readable; every case will fail to build its client",
            cli.trust_anchor.display()
        );
    }
    info!(
        "running {} cases with trust anchor {}",
        cases.len(),
        cli.trust_anchor.display()
    );

    let runner = Runner::new(cli.trust_anchor.clone())
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_min_version(cli.min_tls_version);

    let mut renderer: Box<dyn Renderer> = match cli.format {
        Format::Text => Box::new(TextRenderer::new(cli.color.enabled())),
        Format::Json => Box::new(JsonRenderer::new()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    renderer.begin(&mut out, TITLE)?;

    let report = if cli.parallel {
        let report = runner.run_parallel(&cases);
        for case in &report.cases {
            renderer.case(&mut out, case)?;
        }
        report
    } else {
        let mut write_err = None;
        let report = runner.run_each(&cases, |case| {
            if write_err.is_none() {
                if let Err(e) = renderer.case(&mut out, case).and_then(|_| out.flush()) {
                    write_err = Some(e);
                }
            }
        });
        if let Some(e) = write_err {
            return Err(e).context("writing report");
        }
        report
    };

    renderer.finish(&mut out, &report)?;
    out.flush()?;

    Ok(report.all_passed())
}
