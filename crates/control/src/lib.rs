//! Drover controller: holds the task queue and hands work to every worker
//! that dials in.
//!
//! Each accepted connection gets its own handler ([`Dispatcher::handle_connection`])
//! sharing only the [`TaskQueue`], the [`ResultSink`] and the [`RunState`]. A
//! task taken by a handler is either acknowledged with a result or returned
//! to the queue.

pub use {
    audit::{AuditEvent, AuditLog, MemoryAudit, TracingAudit},
    config::{ControlConfig, DispatchConfig, SeedConfig, ServerConfig},
    dispatch::{ConnectionReport, DispatchSettings, Dispatcher, EmptyQueuePolicy, Outcome},
    operator::{Operator, OperatorCommand},
    queue::TaskQueue,
    results::{Completed, ResultSink},
    serve::{ServeHandle, serve, serve_with},
    state::{RunMode, RunState},
};

pub mod audit;
pub mod config;
mod dispatch;
pub mod operator;
mod queue;
pub mod range;
mod results;
pub mod serve;
mod state;
