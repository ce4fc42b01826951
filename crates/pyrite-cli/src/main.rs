//! Pyrite - CLI
//!
//! Command-line interface to execute Python scripts and pre-compiled
//! `.pyc` files on the Pyrite virtual machine.

mod compile;

use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pyrite_core::{run_path, PyriteConfig};

use compile::CpythonCompiler;

#[derive(Parser)]
#[command(name = "pyrite", version, about = "Execute Python bytecode on the Pyrite VM")]
struct Cli {
    /// Script to execute (.py or .pyc)
    script: PathBuf,

    /// Additional module search directories, tried before the script's own
    #[arg(long = "path", value_name = "DIR")]
    path: Vec<PathBuf>,

    /// CPython interpreter used to compile .py sources
    #[arg(long, value_name = "BIN")]
    python: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = PyriteConfig::new();
    let mut sys_path = cli.path;
    match cli.script.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => sys_path.push(dir.to_path_buf()),
        _ => sys_path.push(PathBuf::from(".")),
    }
    config.sys_path = sys_path;

    let compiler = Rc::new(CpythonCompiler::new(cli.python));
    if let Err(e) = run_path(&cli.script, config, compiler) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
