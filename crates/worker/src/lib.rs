//! Drover worker: dials the controller, executes each task it receives as an
//! external command and sends back the captured output.

pub use {
    config::WorkerConfig,
    exec::{ExecError, Executor},
    runner::{Worker, WorkerError, WorkerSummary},
};

pub mod config;
mod exec;
mod runner;
