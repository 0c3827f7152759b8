//! Editor protocol server for refit
//!
//! Serves hover, definition, references, rename and refactoring code actions
//! over the Language Server Protocol, backed by one [`RefactorEngine`].

use refit_services::RefactorEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_lsp::{LspService, Server};
use tracing::info;

mod actions;
mod backend;
mod commands;
mod convert;
mod navigation;

pub use actions::{advertised_kinds, schema, APPLY_COMMAND};
pub use backend::Backend;
pub use commands::{Apply, Work};

/// Serve one editor over stdin/stdout
pub async fn run_stdio(engine: Arc<RefactorEngine>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(move |client| Backend::new(client, engine));
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

/// Accept a single editor connection on `addr` and serve it
pub async fn run_tcp(engine: Arc<RefactorEngine>, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Editor server listening");

    let (stream, peer) = listener.accept().await?;
    info!(%peer, "Editor connected");
    let (read, write) = tokio::io::split(stream);

    let (service, socket) = LspService::new(move |client| Backend::new(client, engine));
    Server::new(read, write, socket).serve(service).await;

    Ok(())
}
