//! Drover wire protocol shared between the controller and its workers.
//!
//! Every message exchange starts with a fresh RSA handshake ([`Session::handshake`]),
//! after which exactly one hybrid-encrypted, signed frame travels in each
//! direction. Payloads are JSON-encoded [`Task`] and [`TaskResult`] values.

pub use {
    config::SecurityConfig,
    crypto::{Credentials, SharedSecret},
    error::{FailureKind, ProtocolError},
    session::Session,
    task::{Task, TaskResult, TaskStatus},
};

pub mod config;
pub mod crypto;
mod error;
pub mod session;
mod task;
pub mod utils;

/// Default controller port.
pub const DEFAULT_PORT: u16 = 1234;
