//! Service composition CLI.
//!
//! Provides the `svcgraph` binary. `construct` builds one composition graph
//! for the task in a problem file; `mutate` builds one and then runs a number
//! of local mutation rounds on it. All randomness comes from `--seed`, so a
//! run is reproducible.

mod problem;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use svcgraph_core::{CompositionGraph, Taxonomy, TaxonomyIndex, Weights};
use svcgraph_evolve::{construct, discover_relevant, mutate, CandidateSource, MutationReport};

use crate::problem::Problem;

/// Service composition graph builder.
#[derive(Parser)]
#[command(name = "svcgraph", about = "Build and mutate service composition graphs")]
struct Cli {
    /// Log construction and mutation steps.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a composition graph for the task.
    Construct {
        /// Path to the problem file (JSON).
        #[arg(short, long)]
        problem: PathBuf,

        /// Seed for the priority weights.
        #[arg(short, long, default_value_t = 0)]
        seed: u64,

        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Build a composition graph, then mutate it.
    Mutate {
        /// Path to the problem file (JSON).
        #[arg(short, long)]
        problem: PathBuf,

        /// Seed for the weights, root selection and replacement weights.
        #[arg(short, long, default_value_t = 0)]
        seed: u64,

        /// Maximum number of nodes replaced per round.
        #[arg(short = 'k', long, default_value = "1")]
        size: NonZeroUsize,

        /// Number of mutation rounds.
        #[arg(short, long, default_value_t = 1)]
        rounds: usize,

        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let exit_code = match cli.command {
        Commands::Construct {
            problem,
            seed,
            format,
        } => run_construct(&problem, seed, format),
        Commands::Mutate {
            problem,
            seed,
            size,
            rounds,
            format,
        } => run_mutate(&problem, seed, size, rounds, format),
    };
    process::exit(exit_code);
}

/// `SVCGRAPH_LOG` overrides the default filter.
fn init_logger(verbose: bool) {
    let default = if verbose { "svcgraph=debug" } else { "svcgraph=info" };
    let filter = EnvFilter::try_from_env("SVCGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

/// A graph ready to be printed.
#[derive(Serialize)]
struct GraphSummary<'a> {
    edges: String,
    fingerprint: String,
    /// End labels that are goal outputs of the task.
    goal_outputs: Vec<String>,
    graph: &'a CompositionGraph,
}

impl<'a> GraphSummary<'a> {
    fn new(graph: &'a CompositionGraph, taxonomy: &TaxonomyIndex) -> Self {
        let goal_outputs = graph
            .end()
            .and_then(|end| graph.node(end))
            .map(|end| {
                end.inputs
                    .iter()
                    .filter(|label| taxonomy.is_goal_output(label))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        GraphSummary {
            edges: graph.edge_list(),
            fingerprint: graph.fingerprint().to_hex().to_string(),
            goal_outputs,
            graph,
        }
    }

    fn print_text(&self) {
        println!("graph: {}", self.edges);
        println!(
            "nodes: {}, edges: {}",
            self.graph.node_count(),
            self.graph.edge_count()
        );
        println!("goal outputs: {}", self.goal_outputs.join(", "));
        println!("fingerprint: {}", self.fingerprint);
    }
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum Round {
    Committed(MutationReport),
    Aborted { error: String },
}

#[derive(Serialize)]
struct MutationRun<'a> {
    rounds: Vec<Round>,
    #[serde(flatten)]
    result: GraphSummary<'a>,
}

/// Load the problem and its catalog, reporting failures on stderr.
///
/// Exit codes: 2 = invalid catalog, 3 = I/O or parse error.
fn load(path: &Path) -> Result<(Problem, TaxonomyIndex), i32> {
    let problem = match Problem::load(path) {
        Ok(problem) => problem,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(3);
        }
    };
    match problem.taxonomy() {
        Ok(taxonomy) => Ok((problem, taxonomy)),
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(2)
        }
    }
}

/// Build the initial graph for the task.
///
/// Returns exit code 1 if the task is unconstructable.
fn build(problem: &Problem, taxonomy: &TaxonomyIndex, rng: &mut ChaCha8Rng) -> Result<CompositionGraph, i32> {
    let start = problem.start();
    let relevant = discover_relevant(taxonomy, &start.outputs);
    info!(
        services = taxonomy.service_count(),
        relevant = relevant.len(),
        goal = ?taxonomy.goal(),
        "loaded catalog"
    );
    let weights = Weights::random(taxonomy.service_count(), rng);

    construct(
        &start,
        &problem.end(),
        taxonomy,
        CandidateSource::Taxonomy {
            relevant: &relevant,
        },
        weights,
    )
    .map_err(|e| {
        eprintln!("Construction failed: {}", e);
        1
    })
}

/// Execute the construct subcommand.
///
/// Returns exit code: 0 = success, 1 = construction failure,
/// 2 = invalid catalog, 3 = I/O error.
fn run_construct(path: &Path, seed: u64, format: Format) -> i32 {
    let (problem, taxonomy) = match load(path) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let graph = match build(&problem, &taxonomy, &mut rng) {
        Ok(graph) => graph,
        Err(code) => return code,
    };

    let summary = GraphSummary::new(&graph, &taxonomy);
    match format {
        Format::Text => summary.print_text(),
        Format::Json => print_json(&summary),
    }
    0
}

/// Execute the mutate subcommand.
///
/// Aborted rounds are reported and leave the graph as it was; they do not
/// change the exit code. Exit codes are those of `construct`.
fn run_mutate(path: &Path, seed: u64, size: NonZeroUsize, rounds: usize, format: Format) -> i32 {
    let (problem, taxonomy) = match load(path) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut graph = match build(&problem, &taxonomy, &mut rng) {
        Ok(graph) => graph,
        Err(code) => return code,
    };
    let relevant = discover_relevant(&taxonomy, &problem.start().outputs);

    let mut outcomes = Vec::with_capacity(rounds);
    for round in 1..=rounds {
        let outcome = match mutate(&mut graph, size, &taxonomy, &relevant, &mut rng) {
            Ok(report) => {
                info!(round, root = %report.root, inserted = ?report.inserted, "mutation committed");
                Round::Committed(report)
            }
            Err(e) => Round::Aborted {
                error: e.to_string(),
            },
        };
        if format == Format::Text {
            print_round(round, &outcome);
        }
        outcomes.push(outcome);
    }

    let summary = GraphSummary::new(&graph, &taxonomy);
    match format {
        Format::Text => summary.print_text(),
        Format::Json => print_json(&MutationRun {
            rounds: outcomes,
            result: summary,
        }),
    }
    0
}

fn print_round(round: usize, outcome: &Round) {
    match outcome {
        Round::Committed(report) => println!(
            "round {}: replaced [{}] around {} with [{}] ({} pruned)",
            round,
            report.region.join(", "),
            report.root,
            report.inserted.join(", "),
            report.pruned.len()
        ),
        Round::Aborted { error } => println!("round {}: aborted: {}", round, error),
    }
}

fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}
