//! ARNav Deterministic Replay Harness
//!
//! Runs the intelligence layer against a simulated pedestrian whose true
//! position is known, so every estimate can be scored.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock that moves only between ticks or when the
//!   tick loop sleeps
//! - **Sensors**: GPS, inertial, camera and VPS readings synthesized from
//!   ground truth with seeded noise
//! - **Randomness**: every stream derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ScenarioRunner                        │
//! │  ┌──────────────┐   TickInput   ┌─────────────────────┐  │
//! │  │    Walker    │──────────────►│    Orchestrator     │  │
//! │  │ (truth+noise)│               │  <SimContext clock> │  │
//! │  └──────┬───────┘               └──────────┬──────────┘  │
//! │         │ GroundTruth          TickOutput  │             │
//! │         └──────────►ValidationSession◄─────┘             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use arnav_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::MallEntry)?;
//! result.report.print();
//! ```

mod context;
mod error;
mod exporter;
mod runner;
mod venue;
mod walker;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{PoseFrame, SimEvent, SimExport, SimFrame, TruthFrame};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use venue::{compass_heading, Venue, FEATURE_DIM};
pub use walker::{SensorFrame, TruthState, Walker, WalkerConfig};
