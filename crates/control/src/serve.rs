//! TCP accept loop and the serve entrypoint used by the binary.

use crate::{
    ControlConfig,
    audit::{AuditLog, TracingAudit},
    dispatch::Dispatcher,
    state::RunMode,
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

/// Accept worker connections until shutdown is signalled, one task per
/// connection. Connections are numbered from 1 in accept order.
pub async fn accept_loop<A: AuditLog>(
    listener: TcpListener,
    dispatcher: Dispatcher<A>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut next_id: u64 = 0;
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        next_id += 1;
                        let worker_id = next_id;
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!("worker {worker_id}: set_nodelay failed: {e}");
                        }
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            dispatcher
                                .handle_connection(stream, worker_id, &addr.to_string())
                                .await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("failed to accept connection: {e}");
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle returned by [`serve`]: the bound address, the shared controller
/// state and the shutdown trigger.
pub struct ServeHandle<A = TracingAudit> {
    /// Address the listener is bound to.
    pub addr: SocketAddr,
    /// Shared queue, results and run state.
    pub dispatcher: Dispatcher<A>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl<A: AuditLog> ServeHandle<A> {
    /// Stop accepting connections and switch the run state to shutdown so
    /// connected workers are told to exit at their next exchange.
    pub async fn shutdown(mut self) -> Result<()> {
        self.dispatcher.run_state().set(RunMode::Shutdown);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.await?;
        }
        Ok(())
    }
}

/// Build the dispatcher from `config`, bind the listener and start serving.
pub async fn serve(config: &ControlConfig) -> Result<ServeHandle> {
    let dispatcher = Dispatcher::from_config(config)?;
    serve_with(dispatcher, &config.server.bind).await
}

/// Serve an already-built dispatcher on `bind`.
pub async fn serve_with<A: AuditLog>(
    dispatcher: Dispatcher<A>,
    bind: &str,
) -> Result<ServeHandle<A>> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let addr = listener.local_addr()?;
    tracing::info!(
        "controller listening on {addr} ({} tasks queued, run state {})",
        dispatcher.queue().len(),
        dispatcher.run_state().get()
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(accept_loop(listener, dispatcher.clone(), shutdown_rx));

    Ok(ServeHandle {
        addr,
        dispatcher,
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
    })
}
