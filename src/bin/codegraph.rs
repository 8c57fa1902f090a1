use anyhow::{Context, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use codegraph::{
    CancelToken, CodeGraph, Config, EdgeKind, IndexProgress, NodeId, NodeKind, Store,
};
use env_logger::Env;
use is_terminal::IsTerminal;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Parser)]
#[command(name = "codegraph", version, about = "Local-first semantic code knowledge graph")]
struct Args {
    /// Project root directory
    #[arg(long = "root", global = true, default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, global = true, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize .codegraph/ for this project
    Init {
        /// Include glob (repeatable); defaults cover common source trees
        #[arg(long = "include")]
        include: Vec<String>,
        /// Exclude glob (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        /// Maximum file size in bytes
        #[arg(long = "max-file-size")]
        max_file_size: Option<u64>,
        /// Explicitly enable a framework resolver (repeatable); default auto-detect
        #[arg(long = "framework")]
        framework: Vec<String>,
        /// Run a full index right after initializing
        #[arg(long = "index", default_value_t = false)]
        index: bool,
    },
    /// Incremental refresh: index changed files only
    Sync,
    /// Re-index everything, or an explicit list of paths
    Index {
        /// Repo-relative paths; empty means full re-index
        paths: Vec<String>,
    },
    /// Full-text search over names, docs and signatures
    Search {
        query: String,
        /// Node kind filter (repeatable), e.g. function, class, method
        #[arg(long = "kind")]
        kind: Vec<String>,
        #[arg(long = "limit", default_value_t = 20)]
        limit: usize,
    },
    /// Index statistics
    Stats,
    /// Graph queries over the persisted index
    Query {
        #[command(subcommand)]
        q: QueryCmd,
    },
    /// Remove .codegraph/ entirely
    Uninit {
        #[arg(long = "force", default_value_t = false)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
enum QueryCmd {
    /// Functions calling the target (recursive up to depth)
    Callers {
        target: String,
        #[arg(long = "depth", default_value_t = 1)]
        depth: u32,
    },
    /// Functions the target calls
    Callees {
        target: String,
        #[arg(long = "depth", default_value_t = 1)]
        depth: u32,
    },
    /// Call graph in both directions
    Graph {
        target: String,
        #[arg(long = "depth", default_value_t = 2)]
        depth: u32,
    },
    /// Type hierarchy via extends/implements
    Hierarchy { target: String },
    /// All incoming edges of the target
    Uses { target: String },
    /// Everything reachable by incoming edges within depth
    Impact {
        target: String,
        #[arg(long = "depth", default_value_t = 3)]
        depth: u32,
    },
    /// Shortest path between two nodes
    Path {
        from: String,
        to: String,
        /// Edge kind filter (repeatable)
        #[arg(long = "edge")]
        edge: Vec<String>,
    },
    /// Ancestors, children and relationships of a node
    Context { target: String },
    /// Containment chain up to the file
    Ancestors { target: String },
    /// Direct containment children
    Children { target: String },
    /// Circular file dependencies
    Cycles,
    /// Nodes with no incoming edges
    DeadCode {
        /// Node kind filter (repeatable); default function, method, class
        #[arg(long = "kind")]
        kind: Vec<String>,
    },
    /// Files a file imports
    Deps { path: String },
    /// Files importing a file
    Rdeps { path: String },
}

fn main() {
    env_logger::Builder::from_env(Env::default().filter_or("CODEGRAPH_LOG", "warn")).init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    match args.cmd {
        Command::Init {
            ref include,
            ref exclude,
            max_file_size,
            ref framework,
            index,
        } => {
            let mut cfg = Config::default();
            if !include.is_empty() {
                cfg.include = include.clone();
            }
            if !exclude.is_empty() {
                cfg.exclude.extend(exclude.iter().cloned());
            }
            if let Some(m) = max_file_size {
                cfg.max_file_size = m;
            }
            if !framework.is_empty() {
                cfg.frameworks = Some(framework.clone());
            }
            let mut graph = CodeGraph::init(&args.root, cfg)?;
            if index {
                let report = graph.index_all(progress_sink(args.quiet), &CancelToken::new())?;
                print_value(&args.format, &report)?;
            } else {
                print_value(
                    &args.format,
                    &serde_json::json!({"initialized": graph.root()}),
                )?;
            }
            Ok(())
        }
        Command::Sync => {
            let mut graph = CodeGraph::open(&args.root)?;
            let report = graph.sync(progress_sink(args.quiet), &CancelToken::new())?;
            print_value(&args.format, &report)
        }
        Command::Index { ref paths } => {
            let mut graph = CodeGraph::open(&args.root)?;
            let report = if paths.is_empty() {
                graph.index_all(progress_sink(args.quiet), &CancelToken::new())?
            } else {
                graph.index_files(paths)?
            };
            print_value(&args.format, &report)
        }
        Command::Search {
            ref query,
            ref kind,
            limit,
        } => {
            let graph = CodeGraph::open(&args.root)?;
            let kinds = parse_node_kinds(kind)?;
            let hits = graph.search(query, kinds.as_deref(), limit)?;
            print_value(&args.format, &hits)
        }
        Command::Stats => {
            let graph = CodeGraph::open(&args.root)?;
            print_value(&args.format, &graph.stats()?)
        }
        Command::Query { ref q } => {
            let graph = CodeGraph::open(&args.root)?;
            query(&graph, q, &args.format)
        }
        Command::Uninit { force } => {
            if !force && !confirm_uninit(&args.root)? {
                bail!("aborted; pass --force to skip confirmation");
            }
            CodeGraph::uninit(&args.root)?;
            print_value(&args.format, &serde_json::json!({"uninitialized": args.root}))
        }
        Command::Completions { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(shell, &mut cmd, "codegraph", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn query(graph: &CodeGraph, q: &QueryCmd, format: &OutputFormat) -> anyhow::Result<()> {
    let t = graph.traverser();
    match q {
        QueryCmd::Callers { target, depth } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.callers(&id, *depth)?)
        }
        QueryCmd::Callees { target, depth } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.callees(&id, *depth)?)
        }
        QueryCmd::Graph { target, depth } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.call_graph(&id, *depth)?)
        }
        QueryCmd::Hierarchy { target } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.type_hierarchy(&id)?)
        }
        QueryCmd::Uses { target } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.find_usages(&id)?)
        }
        QueryCmd::Impact { target, depth } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.impact_radius(&id, *depth)?)
        }
        QueryCmd::Path { from, to, edge } => {
            let a = resolve_target(graph.store(), from)?;
            let b = resolve_target(graph.store(), to)?;
            let kinds = parse_edge_kinds(edge)?;
            print_value(format, &t.find_path(&a, &b, kinds.as_deref())?)
        }
        QueryCmd::Context { target } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.get_context(&id)?)
        }
        QueryCmd::Ancestors { target } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.ancestors(&id)?)
        }
        QueryCmd::Children { target } => {
            let id = resolve_target(graph.store(), target)?;
            print_value(format, &t.children(&id)?)
        }
        QueryCmd::Cycles => print_value(format, &t.find_circular_dependencies()?),
        QueryCmd::DeadCode { kind } => {
            let kinds = parse_node_kinds(kind)?;
            print_value(format, &t.find_dead_code(kinds.as_deref())?)
        }
        QueryCmd::Deps { path } => print_value(format, &t.file_dependencies(path)?),
        QueryCmd::Rdeps { path } => print_value(format, &t.file_dependents(path)?),
    }
}

/// Accepts a node id, a qualified name, or a unique simple name.
fn resolve_target(store: &Store, target: &str) -> anyhow::Result<NodeId> {
    let as_id = NodeId(target.to_string());
    if store.get_node(&as_id)?.is_some() {
        return Ok(as_id);
    }
    if let Some(node) = store.get_node_by_qualified(target)? {
        return Ok(node.id);
    }
    let by_name = store.nodes_by_name(target)?;
    match by_name.as_slice() {
        [] => bail!("no node matches {target:?}; try `codegraph search`"),
        [only] => Ok(only.id.clone()),
        many => {
            let mut msg = format!("{target:?} is ambiguous; candidates:\n");
            for n in many.iter().take(10) {
                msg.push_str(&format!("  {}  ({})\n", n.qualified_name, n.kind.as_str()));
            }
            bail!(msg)
        }
    }
}

fn parse_node_kinds(raw: &[String]) -> anyhow::Result<Option<Vec<NodeKind>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut out = Vec::new();
    for s in raw {
        out.push(NodeKind::parse(s).with_context(|| format!("unknown node kind {s:?}"))?);
    }
    Ok(Some(out))
}

fn parse_edge_kinds(raw: &[String]) -> anyhow::Result<Option<Vec<EdgeKind>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut out = Vec::new();
    for s in raw {
        out.push(EdgeKind::parse(s).with_context(|| format!("unknown edge kind {s:?}"))?);
    }
    Ok(Some(out))
}

fn print_value<T: serde::Serialize>(format: &OutputFormat, value: &T) -> anyhow::Result<()> {
    let out = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{out}");
    Ok(())
}

fn confirm_uninit(root: &std::path::Path) -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(false);
    }
    eprint!("remove {}/.codegraph and its index? [y/N] ", root.display());
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

/// Best-effort progress on stderr; prints on phase transitions.
fn progress_sink(quiet: bool) -> Option<&'static dyn Fn(IndexProgress)> {
    if quiet {
        return None;
    }
    static LAST: Mutex<Option<codegraph::IndexPhase>> = Mutex::new(None);
    static SINK: fn(IndexProgress) = |p: IndexProgress| {
        let mut last = LAST.lock().unwrap_or_else(|e| e.into_inner());
        if *last != Some(p.phase) {
            *last = Some(p.phase);
            if p.total > 0 {
                eprintln!("{:?}: {}/{}", p.phase, p.current, p.total);
            } else {
                eprintln!("{:?}...", p.phase);
            }
        }
    };
    Some(&SINK)
}
