//! Inspection CLI for add-in descriptors.
//!
//! # Responsibility
//! - Load descriptor files in the given order into one extension tree.
//! - Print the merged paths or dump the parsed add-ins as JSON.

use addintree_core::{default_log_level, init_logging, AddIn, AddInTree, LogSettings};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// addintree - inspect merged add-in extension trees
#[derive(Parser)]
#[command(name = "addintree")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Descriptor files, registered in the given order
    #[arg(required = true)]
    descriptors: Vec<PathBuf>,

    /// Only print this extension path
    #[arg(short, long)]
    path: Option<String>,

    /// Print the parsed add-ins as JSON instead of the merged paths
    #[arg(long, conflicts_with = "path")]
    json: bool,

    /// Log level for file logging (trace|debug|info|warn|error)
    #[arg(long, default_value_t = default_log_level().to_string())]
    log_level: String,

    /// Absolute directory for log files; logging is off when omitted
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let started =
            LogSettings::new(&cli.log_level, log_dir).and_then(|settings| init_logging(&settings));
        if let Err(err) = started {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    }

    let tree = AddInTree::new();
    tree.register_builtins();

    let mut failed = false;
    let mut sources = Vec::new();
    for file in &cli.descriptors {
        match std::fs::read_to_string(file) {
            Ok(text) => sources.push((file.display().to_string(), text)),
            Err(err) => {
                eprintln!("error: {}: {err}", file.display());
                failed = true;
            }
        }
    }

    let report = tree.load_all(sources);
    for failure in &report.failures {
        eprintln!("error: {failure}");
        failed = true;
    }

    if cli.json {
        if let Err(err) = print_json(&tree) {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    } else {
        print_tree(&tree, cli.path.as_deref());
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_tree(tree: &AddInTree, only: Option<&str>) {
    let names = match only {
        Some(path) => vec![path.to_string()],
        None => tree.path_names(),
    };

    for name in names {
        let path = tree.get_path(&name);
        println!("{} ({} codons)", path.path, path.len());
        for codon in &path.codons {
            let mut line = format!("  {} id={}", codon.name, codon.id);
            for (key, value) in &codon.attributes {
                line.push_str(&format!(" {key}={value}"));
            }
            if !codon.conditions.is_empty() {
                let conditions: Vec<String> =
                    codon.conditions.iter().map(ToString::to_string).collect();
                line.push_str(&format!(" if [{}]", conditions.join(", ")));
            }
            if !codon.addin_name.is_empty() {
                line.push_str(&format!(" <{}>", codon.addin_name));
            }
            println!("{line}");
        }
    }
}

fn print_json(tree: &AddInTree) -> Result<(), serde_json::Error> {
    let addins = tree.addins();
    let views: Vec<&AddIn> = addins.iter().map(|addin| addin.as_ref()).collect();
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}
