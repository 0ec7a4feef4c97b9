use clap::Parser;
use kumiki::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const WORKSPACE_FILE: &str = "_Workspace.json";

/// Loads a node workspace, parses an asset document into a node graph and
/// optionally writes it back out.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding `_Workspace.json` and one JSON definition per node type
    workspace_dir: PathBuf,
    /// Asset document to parse
    document_path: PathBuf,

    /// Root id to open the document with (defaults to the document's `$WorkspaceID`)
    #[arg(short, long)]
    root: Option<String>,

    /// Print the document re-serialized from the parsed graph
    #[arg(short, long)]
    emit: bool,

    /// Print the parsed graph as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let total_start = Instant::now();

    // --- 1. Workspace Loading ---
    let load_start = Instant::now();
    let catalog = load_catalog(&cli.workspace_dir);
    let load_duration = load_start.elapsed();

    println!(
        "Workspace '{}' loaded: {} node types, {} roots, {} variants",
        catalog.workspace_name().unwrap_or("<unnamed>"),
        catalog.templates().len(),
        catalog.roots().len(),
        catalog.variants().variants().len()
    );
    print_diagnostics("Workspace", &catalog.diagnostic_messages());

    // --- 2. Document Parsing ---
    let text = fs::read_to_string(&cli.document_path).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to read document '{}': {}",
            cli.document_path.display(),
            e
        ))
    });
    let document: Value = serde_json::from_str(&text)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse document JSON: {}", e)));

    let selector = select_root(&catalog, cli.root.as_deref(), &document);
    println!(
        "\nParsing '{}' with root type {}",
        cli.document_path.display(),
        selector.as_deref().unwrap_or("<inferred>")
    );

    let parse_start = Instant::now();
    let graph = DocumentParser::new(&catalog)
        .parse(&document, selector.as_deref())
        .unwrap_or_else(|e| exit_with_error(&format!("Parsing failed: {}", e)));
    let parse_duration = parse_start.elapsed();

    println!("\n--- Graph Summary ---");
    println!("Root Node:   {}", graph.root_node_id);
    for kind in [
        NodeKind::Data,
        NodeKind::Raw,
        NodeKind::Link,
        NodeKind::Group,
        NodeKind::Comment,
    ] {
        let count = graph.nodes.iter().filter(|node| node.kind() == kind).count();
        if count > 0 {
            println!("{:<12} {}", format!("{} nodes:", kind.as_str()), count);
        }
    }
    println!("Edges:       {}", graph.edges.len());
    let messages: Vec<String> = graph.diagnostics.iter().map(ToString::to_string).collect();
    print_diagnostics("Document", &messages);

    if cli.json {
        let rendered = serde_json::to_string_pretty(&graph)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to encode graph: {}", e)));
        println!("\n--- Graph ---\n{}", rendered);
    }

    // --- 3. Serialization ---
    let serialize_start = Instant::now();
    let written = DocumentSerializer::new(&catalog)
        .serialize_to_string(&graph)
        .unwrap_or_else(|e| exit_with_error(&format!("Serialization failed: {}", e)));
    let serialize_duration = serialize_start.elapsed();

    if cli.emit {
        println!("\n--- Document ---\n{}", written);
    }

    println!("\n--- Performance Summary ---");
    println!("Workspace Loading:    {:?}", load_duration);
    println!("Document Parsing:     {:?}", parse_duration);
    println!("Serialization:        {:?}", serialize_duration);
    println!("-----------------------------");
    println!("Total Execution:      {:?}", total_start.elapsed());
    println!();
}

/// Reads `_Workspace.json` and every other `*.json` below `dir`, in path order.
fn load_catalog(dir: &Path) -> TemplateCatalog {
    let mut paths = Vec::new();
    collect_json_files(dir, &mut paths);
    paths.sort();

    let mut config = None;
    let mut definitions = Vec::new();
    for path in paths {
        let value = read_json(&path);
        if path.file_name().and_then(|name| name.to_str()) == Some(WORKSPACE_FILE) {
            config = Some(value);
        } else {
            let source_name = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .display()
                .to_string();
            definitions.push((source_name, value));
        }
    }

    let config = config.unwrap_or_else(|| {
        exit_with_error(&format!(
            "No {} found in '{}'",
            WORKSPACE_FILE,
            dir.display()
        ))
    });
    TemplateCatalog::builder(config)
        .with_definitions(definitions)
        .build()
}

fn collect_json_files(dir: &Path, paths: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to read workspace directory '{}': {}",
            dir.display(),
            e
        ))
    });
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_json_files(&path, paths);
        } else if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            paths.push(path);
        }
    }
}

fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        exit_with_error(&format!("Failed to read '{}': {}", path.display(), e))
    });
    serde_json::from_str(&text).unwrap_or_else(|e| {
        exit_with_error(&format!("Failed to parse '{}': {}", path.display(), e))
    })
}

/// The explicit root, else the root the document was saved with, else the
/// workspace's first root.
fn select_root(catalog: &TemplateCatalog, root_id: Option<&str>, document: &Value) -> Option<String> {
    if let Some(root_id) = root_id {
        let root = catalog
            .root(root_id)
            .or_else(|| catalog.root_by_menu_name(root_id))
            .unwrap_or_else(|| exit_with_error(&format!("Unknown root '{}'", root_id)));
        return Some(root.root_node_type.clone());
    }

    document
        .get(kumiki::keys::NODE_EDITOR_METADATA)
        .and_then(|metadata| metadata.get(kumiki::keys::WORKSPACE_ID))
        .and_then(Value::as_str)
        .and_then(|workspace_id| catalog.root_by_menu_name(workspace_id))
        .or_else(|| catalog.roots().first())
        .map(|root| root.root_node_type.clone())
}

fn print_diagnostics(section: &str, messages: &[String]) {
    if messages.is_empty() {
        return;
    }
    println!("\n{} diagnostics ({}):", section, messages.len());
    for message in messages {
        println!("  - {}", message);
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
