//! drover command-line application: `drover serve` runs the controller with
//! an operator console on stdin, `drover work` runs a worker.

pub use cmd::{Cli, Command};

pub mod cmd;
pub mod config;
