use std::net::TcpListener;
use std::thread;

use axum::Router;
use camino::Utf8PathBuf;
use tokio::runtime::Runtime;
use tower_http::services::ServeDir;

use crate::error::ServerError;

/// Serves `dist` on an already bound listener from a background thread.
pub(super) fn start(listener: TcpListener, dist: Utf8PathBuf) -> Result<(), ServerError> {
    listener.set_nonblocking(true)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::spawn(move || {
        if let Err(e) = serve(runtime, listener, dist) {
            tracing::error!("HTTP server stopped: {e}");
        }
    });

    Ok(())
}

fn serve(runtime: Runtime, listener: TcpListener, dist: Utf8PathBuf) -> std::io::Result<()> {
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::from_std(listener)?;

        let router = Router::new().fallback_service(ServeDir::new(dist.as_std_path()));

        axum::serve(listener, router).await
    })
}
