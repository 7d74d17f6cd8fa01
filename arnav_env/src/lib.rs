//! ARNav Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the ARNav
//! intelligence layer to run both on a device (tokio) and inside the
//! deterministic replay harness (`arnav_sim`).
//!
//! # Core Concept
//!
//! Everything that would make a tick non-reproducible is intercepted:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task scheduling (`spawn()`)
//!
//! # Example
//!
//! ```ignore
//! use arnav_env::{NavContext, TokioContext};
//!
//! async fn tick_loop<Ctx: NavContext>(ctx: &Ctx) {
//!     loop {
//!         let started = ctx.now();
//!         run_tick(ctx.now_ms());
//!         ctx.sleep(period.saturating_sub(ctx.now() - started)).await;
//!     }
//! }
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;

pub use context::NavContext;
pub use types::SessionId;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
