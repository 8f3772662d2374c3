//! Subcommand implementations

pub mod config;
pub mod export;
pub mod generate;
pub mod get;
pub mod label;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use optimize_lib::scan::{parse_documents, Node};

/// Read every manifest from the named files; `-` reads standard input
pub fn read_manifests(files: &[String]) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for file in files {
        let text = if file == "-" {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read standard input")?;
            text
        } else {
            std::fs::read_to_string(file).with_context(|| format!("Failed to read {file}"))?
        };
        nodes.extend(parse_documents(&text).with_context(|| format!("Failed to parse {file}"))?);
    }
    Ok(nodes)
}

/// Directory relative references in a manifest file resolve against
pub fn base_dir(file: &str) -> PathBuf {
    if file == "-" {
        return PathBuf::from(".");
    }
    Path::new(file)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
