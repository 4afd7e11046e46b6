//! Compound archive tool
//!
//! Inspect and edit compound archive files from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use compound_rs::{Archive, ArchiveConfig, Entry};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "compound")]
#[command(about = "Inspect and edit compound archive files")]
struct Args {
    /// TOML file with archive settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new, empty archive
    Create {
        archive: PathBuf,

        /// Block size in bytes (power of two, 512-65536)
        #[arg(short, long)]
        block_size: Option<u32>,
    },

    /// List streams by name prefix
    Ls {
        archive: PathBuf,

        #[arg(default_value = "")]
        prefix: String,

        /// Show length, blocks and modification time
        #[arg(short, long)]
        long: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the tree below a parent name
    Tree {
        archive: PathBuf,

        #[arg(default_value = "")]
        parent: String,
    },

    /// Write a stream to stdout
    Cat { archive: PathBuf, name: String },

    /// Store a file (or stdin) as a stream, replacing existing contents
    Put {
        archive: PathBuf,
        name: String,
        file: Option<PathBuf>,
    },

    /// Delete a stream
    Rm { archive: PathBuf, name: String },

    /// Show archive statistics
    Stat {
        archive: PathBuf,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Check archive structure
    Verify { archive: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ArchiveConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ArchiveConfig::default(),
    };

    match args.command {
        Command::Create {
            archive,
            block_size,
        } => {
            let config = match block_size {
                Some(size) => config.with_block_size(size),
                None => config,
            };
            let created = Archive::create(&archive, config)
                .with_context(|| format!("failed to create {}", archive.display()))?;
            created.close()?;
            info!("Created {}", archive.display());
        }

        Command::Ls {
            archive,
            prefix,
            long,
            json,
        } => {
            let archive = open(&archive, config)?;
            if json {
                let entries = archive.list_entries(&prefix)?;
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if long {
                for entry in archive.list_entries(&prefix)? {
                    let modified = entry
                        .modified()
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!(
                        "{:>12} {:>6} {} {}",
                        entry.length, entry.blocks, modified, entry.name
                    );
                }
            } else {
                for name in archive.list(&prefix)? {
                    println!("{}", name);
                }
            }
        }

        Command::Tree { archive, parent } => {
            let archive = open(&archive, config)?;
            print_tree(&archive, &parent, 0)?;
        }

        Command::Cat { archive, name } => {
            let archive = open(&archive, config)?;
            let data = archive
                .read_stream(&name)
                .with_context(|| format!("failed to read {}", name))?;
            std::io::stdout().write_all(&data)?;
        }

        Command::Put {
            archive,
            name,
            file,
        } => {
            let data = match &file {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };

            let archive = open(&archive, config)?;
            archive
                .write_stream(&name, &data)
                .with_context(|| format!("failed to write {}", name))?;
            archive.close()?;
            info!("Stored {} bytes as {}", data.len(), name);
        }

        Command::Rm { archive, name } => {
            let archive = open(&archive, config)?;
            archive
                .delete_stream(&name)
                .with_context(|| format!("failed to delete {}", name))?;
            archive.close()?;
        }

        Command::Stat { archive, json } => {
            let archive = open(&archive, config)?;
            let stats = archive.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("block size:    {}", stats.block_size);
                println!("total blocks:  {}", stats.total_blocks);
                println!("used blocks:   {}", stats.used_blocks);
                println!("free blocks:   {}", stats.free_blocks);
                println!("streams:       {}", stats.stream_count);
                println!("logical bytes: {}", stats.logical_bytes);
            }
        }

        Command::Verify { archive } => {
            let archive = open(&archive, config)?;
            let report = archive.verify()?;
            println!(
                "{} streams, {} data / {} metadata / {} free / {} unreferenced blocks",
                report.streams,
                report.data_blocks,
                report.metadata_blocks,
                report.free_blocks,
                report.unreferenced_blocks
            );
            if !report.is_ok() {
                for problem in &report.problems {
                    eprintln!("problem: {}", problem);
                }
                bail!("{} problems found", report.problems.len());
            }
            println!("ok");
        }
    }

    Ok(())
}

fn open(path: &Path, config: ArchiveConfig) -> Result<Archive> {
    Archive::open_with_config(path, config)
        .with_context(|| format!("failed to open {}", path.display()))
}

fn print_tree(archive: &Archive, parent: &str, depth: usize) -> Result<()> {
    let children: Vec<Entry> = archive.list_children(parent)?;
    for child in children {
        let indent = "  ".repeat(depth);
        if child.is_dir {
            println!("{}{}/", indent, child.name);
            print_tree(archive, &child.path, depth + 1)?;
        } else {
            println!("{}{} ({} bytes)", indent, child.name, child.size.unwrap_or(0));
        }
    }
    Ok(())
}
