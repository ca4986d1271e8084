//! `vgraph` CLI entry-point.
//!
//! Available sub-commands:
//! - `demo`: build the sample login graph and run one traversal.
//! - `check`: verify that a response script contains the code that routes to `$output`.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::task::LocalSet;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vgraph_engine::{EventArgs, EventKind, Graph, GraphConfig};
use vgraph_nodes::mock::MockNode;
use vgraph_nodes::{Node, NodeName, NodeWork, Status, VectorKey, Work};

/// Response that routes INPUT to OUTPUT.
const DONE: i64 = 204;

#[derive(Parser)]
#[command(name = "vgraph", about = "Status-driven graph traversal engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sample login graph once and print its result.
    Demo {
        /// Comma-separated responses the INPUT node cycles through.
        #[arg(long, env = "VGRAPH_RESPONSES", default_value = "200,0,401,204")]
        responses: String,
        /// Delay of the asynchronous "lost" and "auth" nodes.
        #[arg(long, env = "VGRAPH_DELAY_MS", default_value_t = 50)]
        delay_ms: u64,
        /// JSON file with the graph configuration.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check that a response script contains 204, the only code routed to OUTPUT.
    Check {
        #[arg(long, env = "VGRAPH_RESPONSES", default_value = "200,0,401,204")]
        responses: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Demo {
            responses,
            delay_ms,
            config,
        } => {
            let responses = parse_responses(&responses)?;
            ensure_terminates(&responses)?;
            let config = match config {
                Some(path) => load_config(&path)?,
                None => GraphConfig::default(),
            };

            let graph = sample_graph(config, responses, Duration::from_millis(delay_ms))?;
            log_events(&graph);

            let result = LocalSet::new().run_until(graph.run(0)).await?;
            match result {
                Some(status) => println!("result: {status}"),
                None => println!("result: none (no edge matched)"),
            }
        }
        Command::Check { responses } => {
            let responses = parse_responses(&responses)?;
            ensure_terminates(&responses)?;
            println!("ok: {} responses, {DONE} routes to $output", responses.len());
        }
    }

    Ok(())
}

fn parse_responses(raw: &str) -> anyhow::Result<Vec<i64>> {
    let responses = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<i64>().with_context(|| format!("invalid response code '{part}'")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if responses.is_empty() {
        bail!("at least one response code is required");
    }
    Ok(responses)
}

fn ensure_terminates(responses: &[i64]) -> anyhow::Result<()> {
    if !responses.contains(&DONE) {
        bail!("responses never include {DONE}; the traversal would cycle forever");
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<GraphConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("cannot read config {}", path.display()))?;
    GraphConfig::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// The login flow:
///
/// ```text
/// $input --0--> lost --401--> auth --200--> $input
///   |  ^          |            |  ^
///   |  +--else----+            +--+ error
///   +--204--> $output
/// ```
fn sample_graph(config: GraphConfig, responses: Vec<i64>, delay: Duration) -> anyhow::Result<Graph<i64>> {
    let graph = Graph::with_config(config);

    let fetch: Rc<dyn NodeWork<i64>> = Rc::new(MockNode::cycling("fetch", responses));
    graph.add([Node::with_work(NodeName::Input, fetch)?.with_vectors([
        (VectorKey::Literal(0), NodeName::from("lost")),
        (VectorKey::Literal(401), NodeName::from("auth")),
        (VectorKey::Literal(DONE), NodeName::Output),
        (VectorKey::Else, NodeName::Input),
    ])]);

    graph
        .add_node("lost", move |_ctx| {
            Ok(Work::pending(async move {
                tokio::time::sleep(delay).await;
                Ok::<_, anyhow::Error>(401)
            }))
        })?
        .add_vector(401, "auth")
        .on_else(NodeName::Input);

    // The first login attempt fails; the error edge retries it.
    let attempts = Rc::new(Cell::new(0u32));
    graph
        .add_node("auth", move |_ctx| {
            let attempt = attempts.get() + 1;
            attempts.set(attempt);
            Ok(Work::pending(async move {
                tokio::time::sleep(delay).await;
                if attempt == 1 {
                    bail!("token expired");
                }
                Ok(200)
            }))
        })?
        .add_vector(200, NodeName::Input)
        .on_error("auth");

    Ok(graph)
}

fn log_events(graph: &Graph<i64>) {
    for kind in EventKind::ALL {
        graph.on(kind, move |event| {
            let node = event
                .context
                .node_name()
                .map_or_else(|| "-".to_string(), ToString::to_string);
            let status = event.context.status().map(Status::to_string);
            match event.args {
                EventArgs::Error(err) => info!(event = %kind, %node, "work failed: {err}"),
                EventArgs::End(result) => info!(event = %kind, %node, result = ?result, "traversal finished"),
                EventArgs::None => info!(
                    event = %kind,
                    %node,
                    step = event.context.step(),
                    started = %event.context.started_at(),
                    status = ?status
                ),
            }
            Ok(())
        });
    }
}
