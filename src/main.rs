use std::str::FromStr;

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use log::{LevelFilter, debug, info};

use sysdiagram::editor::StackItem;
use sysdiagram::generator::generate_design_xml;
use sysdiagram::model::DesignDoc;
use sysdiagram::parser::{DesignParser, FsSource, LibraryCatalog};
use sysdiagram::{Diagram, DiagramConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Columns, items and connections as text
    Summary,
    /// Design XML
    Xml,
    /// Design document as JSON
    Json,
    /// Versioned binary snapshot (requires --output)
    Binary,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Load a component design and print the rebuilt document", long_about = None)]
struct Cli {
    /// Design XML file, or a binary snapshot ending in .bin
    #[arg(value_name = "DESIGN")]
    design: Utf8PathBuf,

    /// Library directory to search for component definitions (repeatable)
    #[arg(short = 'L', long = "library", value_name = "DIR")]
    libraries: Vec<Utf8PathBuf>,

    /// TOML file overriding layout constants
    #[arg(long, value_name = "FILE")]
    config: Option<Utf8PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Format::Summary)]
    format: Format,

    /// Write output here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<Utf8PathBuf>,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn load_config(path: Option<&Utf8PathBuf>) -> Result<DiagramConfig> {
    match path {
        None => Ok(DiagramConfig::default()),
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("Read config {}", p))?;
            DiagramConfig::from_toml(&text).with_context(|| format!("Invalid config {}", p))
        }
    }
}

fn load_design(path: &Utf8PathBuf) -> Result<DesignDoc> {
    if path.extension() == Some("bin") {
        DesignDoc::load_from_binary(path).with_context(|| format!("Failed to load {}", path))
    } else {
        let mut parser = DesignParser::new(FsSource);
        parser
            .parse_design_file(path)
            .with_context(|| format!("Failed to parse {}", path))
    }
}

fn summary(diagram: &Diagram) -> String {
    let mut out = String::new();
    out.push_str(&format!("design: {}\n", diagram.name()));
    for column in diagram.columns() {
        let Ok(stack) = diagram.stack(*column) else {
            continue;
        };
        out.push_str(&format!("column {} ({})\n", stack.name, stack.content.as_str()));
        for item in &stack.items {
            match item {
                StackItem::Component(c) => {
                    if let Ok(c) = diagram.component(*c) {
                        let marker = if c.placeholder {
                            " [placeholder]"
                        } else if c.draft {
                            " [draft]"
                        } else {
                            ""
                        };
                        out.push_str(&format!("  {}{}\n", c.name, marker));
                        for child in diagram.children_of(c.id) {
                            if let Ok(child) = diagram.component(child) {
                                out.push_str(&format!("    {}\n", child.name));
                            }
                        }
                    }
                }
                StackItem::Interface(e) => {
                    if let Ok(e) = diagram.endpoint(*e) {
                        out.push_str(&format!("  <{}> {}\n", e.protocol.family(), e.name));
                    }
                }
            }
        }
    }
    for conn in diagram.connections() {
        let off = if conn.off_page { " (off-page)" } else { "" };
        out.push_str(&format!("connection {}{}\n", conn.name, off));
    }
    out
}

fn write_output(cli: &Cli, text: &str) -> Result<()> {
    match &cli.output {
        Some(p) => std::fs::write(p, text).with_context(|| format!("Write {}", p)),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;
    let (catalog, report) = LibraryCatalog::scan(&cli.libraries)?;
    for (path, err) in &report.failed {
        eprintln!("warning: {}: {}", path, err);
    }
    info!(definitions = catalog.len(); "catalog ready");

    let doc = load_design(&cli.design)?;
    let mut diagram = Diagram::load(&doc, &catalog, config);
    for notice in diagram.take_notices() {
        eprintln!("{}", notice);
    }

    match cli.format {
        Format::Summary => write_output(cli, &summary(&diagram)),
        Format::Xml => write_output(cli, &generate_design_xml(&diagram.to_document())),
        Format::Json => {
            let json = serde_json::to_string_pretty(&diagram.to_document())?;
            write_output(cli, &format!("{}\n", json))
        }
        Format::Binary => {
            let Some(path) = &cli.output else {
                bail!("--format binary needs --output");
            };
            diagram
                .to_document()
                .save_to_binary(path)
                .with_context(|| format!("Write {}", path))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = LevelFilter::from_str(&cli.log_level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {}. Using 'warn' instead.", cli.log_level);
        LevelFilter::Warn
    });
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(log_level)
        .init();
    debug!(cli:?; "Parsed arguments");
    run(&cli)
}
