//! Engine services: dispatch, graph execution, pooling, and supporting
//! plumbing.

pub mod agents;
pub mod config;
pub mod context;
pub mod dag_builder;
pub mod dag_executor;
pub mod dispatcher;
pub mod output;
pub mod progress;
pub mod race;
pub mod review;
pub mod worker_pool;
pub mod workspace;

pub use agents::discover_agents;
pub use config::{ConfigError, RunnerConfig};
pub use dag_builder::{build_graph, TaskGraph};
pub use dag_executor::{GraphExecutor, GraphRunOutcome, READ_ONLY_TOOLS};
pub use dispatcher::Dispatcher;
pub use output::{cap_output, cap_output_within, ShapedOutput, MAX_OUTPUT_BYTES, MAX_OUTPUT_LINES};
pub use progress::ProgressTracker;
pub use race::{race_to_success, RaceOutcome};
pub use review::{parse_decision, ReviewDecision};
pub use worker_pool::{clamp_concurrency, map_bounded, PoolOutcome, MAX_CONCURRENCY};
pub use workspace::TeamWorkspace;
