use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use daybook::doctor::{self, DoctorCommand};
use std::path::PathBuf;

const USAGE: &str = "usage: daybook [--root DIR] doctor <check|rebuild-index|rebalance-rank|migrate [--dry-run]>";

struct Invocation {
    root: PathBuf,
    command: DoctorCommand,
}

fn parse_args(mut args: Vec<String>) -> anyhow::Result<Invocation> {
    let mut root = std::env::var_os("DAYBOOK_ROOT").map(PathBuf::from);
    if args.first().map(String::as_str) == Some("--root") {
        if args.len() < 2 {
            bail!("--root needs a directory\n{USAGE}");
        }
        root = Some(PathBuf::from(args[1].clone()));
        args.drain(..2);
    }
    if args.first().map(String::as_str) != Some("doctor") {
        bail!("{USAGE}");
    }
    let command = DoctorCommand::parse(&args[1..]).map_err(|error| anyhow!("{error}\n{USAGE}"))?;
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    Ok(Invocation { root, command })
}

fn run() -> anyhow::Result<i32> {
    let log_dir = std::env::var_os("DAYBOOK_LOG_DIR").map(PathBuf::from);
    daybook::init_tracing(log_dir.as_deref()).map_err(|error| anyhow!(error))?;

    let invocation = parse_args(std::env::args().skip(1).collect())?;
    let outcome = doctor::run(&invocation.root, invocation.command, Utc::now())
        .with_context(|| format!("doctor failed for {}", invocation.root.display()))?;
    print!("{}", outcome.output);
    Ok(outcome.exit_code)
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("{error:#}");
            std::process::exit(2);
        }
    }
}
