use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use isochron::loader::{self, DatasetReader};
use isochron::relax::{CpuRelaxation, Relaxation, relax_to_convergence};
use isochron::{DisplayMode, EngineConfig, Graph, Hour, Session, server, sssp};

/// Travel-time reachability over road networks.
#[derive(Parser)]
#[command(name = "isochron")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Where the dataset comes from
#[derive(Args, Debug, Clone)]
struct DatasetArgs {
    /// JSON dataset with `nodes` and `edges`
    #[arg(long, conflicts_with_all = ["nodes", "edges"])]
    dataset: Option<PathBuf>,

    /// Nodes CSV (`id,lat,lon`)
    #[arg(long, requires = "edges")]
    nodes: Option<PathBuf>,

    /// Edges JSON (array or object keyed by edge id)
    #[arg(long, requires = "nodes")]
    edges: Option<PathBuf>,

    /// Engine configuration (YAML)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Which single-source query to run
#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// Source node id (defaults to the first node)
    #[arg(short, long)]
    source: Option<String>,

    /// Hour of day, 0-23
    #[arg(long, default_value = "0")]
    hour: u8,

    /// Relaxation pass ceiling (overrides the config file)
    #[arg(long)]
    max_passes: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// Dijkstra with bearing/projection output
    Sequential,
    /// CPU lane-parallel relaxation
    Parallel,
    /// wgpu compute-shader relaxation (feature `gpu`)
    Gpu,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute one source/hour and write the result as JSON
    Compute {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[command(flatten)]
        query: QueryArgs,

        #[arg(short, long, value_enum, default_value = "parallel")]
        engine: EngineKind,

        /// Display mode for the frame written by relaxation engines
        #[arg(short, long, value_enum, default_value = "none")]
        mode: DisplayMode,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run both CPU engines to convergence and compare their travel times
    Compare {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[command(flatten)]
        query: QueryArgs,

        /// Largest accepted relative difference
        #[arg(long, default_value = "1e-6")]
        tolerance: f64,
    },
    /// Print how many nodes each relaxation pass has reached
    Animate {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[command(flatten)]
        query: QueryArgs,

        #[arg(short, long, value_enum, default_value = "parallel")]
        engine: EngineKind,
    },
    /// Serve the JSON API and reload when the dataset changes
    Serve {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Port to run the server on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "isochron=debug" } else { "isochron=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl DatasetArgs {
    fn reader(&self) -> anyhow::Result<Box<dyn DatasetReader + Send + Sync>> {
        Ok(loader::reader_for(
            self.dataset.as_deref(),
            self.nodes.as_deref(),
            self.edges.as_deref(),
        )?)
    }

    fn config(&self, max_passes: Option<usize>) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_yaml_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(max_passes) = max_passes {
            config.max_passes = max_passes;
        }
        config.validate()?;
        Ok(config)
    }
}

impl QueryArgs {
    fn hour(&self) -> anyhow::Result<Hour> {
        Ok(Hour::new(self.hour)?)
    }

    fn source(&self, graph: &Graph) -> anyhow::Result<usize> {
        match &self.source {
            Some(id) => Ok(graph.require_index(id)?),
            None if graph.is_empty() => bail!("the dataset has no nodes"),
            None => Ok(0),
        }
    }
}

fn engine(kind: EngineKind, max_passes: usize) -> anyhow::Result<Box<dyn Relaxation + Send>> {
    match kind {
        EngineKind::Parallel => Ok(Box::new(CpuRelaxation::new(
            0,
            Default::default(),
            max_passes,
        )?)),
        #[cfg(feature = "gpu")]
        EngineKind::Gpu => Ok(Box::new(isochron::gpu::GpuRelaxation::new(max_passes)?)),
        #[cfg(not(feature = "gpu"))]
        EngineKind::Gpu => bail!("this build does not include the `gpu` feature"),
        EngineKind::Sequential => bail!("the sequential engine does not run in passes"),
    }
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "result written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn compute(
    dataset: &DatasetArgs,
    query: &QueryArgs,
    kind: EngineKind,
    mode: DisplayMode,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let config = dataset.config(query.max_passes)?;
    let graph = dataset.reader()?.load_graph()?;
    let source = query.source(&graph)?;
    let hour = query.hour()?;

    if kind == EngineKind::Sequential {
        let paths = sssp::shortest_paths(&graph, source, hour, &config)?;
        return write_json(&paths, output);
    }

    let relaxation = engine(kind, config.max_passes)?;
    let mut session = Session::with_engine(graph, config.clone(), relaxation)?;
    session.set_transition(false);
    session.set_hour(hour)?;
    session.set_source(source)?;
    session.set_mode(mode);
    session.tick()?;
    write_json(&session.frame()?, output)
}

fn compare(dataset: &DatasetArgs, query: &QueryArgs, tolerance: f64) -> anyhow::Result<()> {
    let config = dataset.config(query.max_passes)?;
    let graph = dataset.reader()?.load_graph()?;
    let source = query.source(&graph)?;
    let hour = query.hour()?;

    // Without an explicit ceiling, allow enough passes for exact convergence.
    let max_passes = query
        .max_passes
        .unwrap_or_else(|| graph.hop_diameter_bound().max(1));

    let sequential = sssp::shortest_paths(&graph, source, hour, &config)?.to_field();
    let parallel = relax_to_convergence(&graph, source, hour, max_passes)?;

    let Some(difference) = sequential.max_relative_difference(&parallel) else {
        bail!("engines disagree on which nodes are reachable");
    };
    println!(
        "reached {} of {} nodes; max relative difference {difference:e}",
        sequential.reached_count(),
        sequential.len()
    );
    if difference > tolerance {
        bail!("difference {difference:e} exceeds tolerance {tolerance:e}");
    }
    Ok(())
}

fn animate(dataset: &DatasetArgs, query: &QueryArgs, kind: EngineKind) -> anyhow::Result<()> {
    let config = dataset.config(query.max_passes)?;
    let graph = dataset.reader()?.load_graph()?;
    let source = query.source(&graph)?;
    let hour = query.hour()?;

    let relaxation = engine(kind, config.max_passes)?;
    let mut session = Session::with_engine(graph, config.clone(), relaxation)?;
    session.set_hour(hour)?;
    session.set_source(source)?;
    session.set_transition(true);

    let total = session.graph().node_count();
    let mut stdout = std::io::stdout().lock();
    while session.is_animating() {
        session.tick()?;
        let reached = session.field()?.reached_count();
        writeln!(
            stdout,
            "pass {:>4}  reached {reached:>8}/{total}  distortion {:.3}",
            session.passes_run(),
            session.distortion()
        )?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Compute {
            dataset,
            query,
            engine,
            mode,
            output,
        } => compute(&dataset, &query, engine, mode, output.as_deref())?,
        Commands::Compare {
            dataset,
            query,
            tolerance,
        } => compare(&dataset, &query, tolerance)?,
        Commands::Animate {
            dataset,
            query,
            engine,
        } => animate(&dataset, &query, engine)?,
        Commands::Serve { dataset, port } => {
            let config = dataset.config(None)?;
            server::serve(dataset.reader()?, config, port).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_compute_with_defaults() {
        let cli = Cli::try_parse_from(["isochron", "compute", "--dataset", "city.json"]).unwrap();
        match cli.command {
            Commands::Compute {
                dataset,
                query,
                engine,
                mode,
                output,
            } => {
                assert_eq!(dataset.dataset, Some(PathBuf::from("city.json")));
                assert_eq!(query.hour, 0);
                assert!(query.source.is_none());
                assert_eq!(engine, EngineKind::Parallel);
                assert_eq!(mode, DisplayMode::None);
                assert!(output.is_none());
            }
            _ => panic!("Expected Compute command"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_split_dataset_and_mode() {
        let cli = Cli::try_parse_from([
            "isochron",
            "compute",
            "--nodes",
            "nodes.csv",
            "--edges",
            "edges.json",
            "--source",
            "311",
            "--hour",
            "17",
            "--mode",
            "node-distance",
            "--engine",
            "sequential",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Compute {
                dataset,
                query,
                engine,
                mode,
                ..
            } => {
                assert_eq!(dataset.nodes, Some(PathBuf::from("nodes.csv")));
                assert_eq!(query.source.as_deref(), Some("311"));
                assert_eq!(query.hour, 17);
                assert_eq!(engine, EngineKind::Sequential);
                assert_eq!(mode, DisplayMode::NodeDistance);
            }
            _ => panic!("Expected Compute command"),
        }
    }

    #[test]
    fn cli_rejects_mixed_dataset_sources() {
        assert!(
            Cli::try_parse_from([
                "isochron",
                "compare",
                "--dataset",
                "a.json",
                "--nodes",
                "n.csv",
                "--edges",
                "e.json",
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["isochron", "animate", "--nodes", "n.csv"]).is_err());
    }

    #[test]
    fn cli_parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "isochron",
            "serve",
            "--dataset",
            "city.json",
            "--port",
            "8080",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve { port, .. } => assert_eq!(port, 8080),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn cli_parses_compare_tolerance() {
        let cli = Cli::try_parse_from([
            "isochron",
            "compare",
            "--dataset",
            "city.json",
            "--tolerance",
            "1e-3",
            "--max-passes",
            "50",
        ])
        .unwrap();
        match cli.command {
            Commands::Compare { tolerance, query, .. } => {
                assert_eq!(tolerance, 1e-3);
                assert_eq!(query.max_passes, Some(50));
            }
            _ => panic!("Expected Compare command"),
        }
    }
}
