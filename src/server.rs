//! Development server.
//!
//! Serves the output directory over HTTP and keeps a WebSocket open to
//! every browser tab showing it. Completion notifications of the
//! orchestrator are forwarded to all tabs as `"reload"` or `"refresh"`
//! text frames. The script injected into pages by the HTML transform
//! reacts to them.

#[cfg(feature = "server")]
mod http;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

use camino::Utf8PathBuf;
use tungstenite::WebSocket;

use crate::config::ServerConfig;
use crate::core::Notification;
use crate::error::ServerError;

/// Connections beyond this are closed, oldest first.
const MAX_CLIENTS: usize = 10;

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

pub struct DevServer {
    http_addr: SocketAddr,
    live_port: u16,
    notifier: Sender<Notification>,
}

impl DevServer {
    /// Binds both sockets and starts serving. Fails right away when the
    /// HTTP port is taken, the live-reload socket falls back to any free
    /// port instead.
    pub fn start(
        config: &ServerConfig,
        dist: impl Into<Utf8PathBuf>,
    ) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(addr.as_str())
            .map_err(|source| ServerError::Bind { addr, source })?;
        let http_addr = listener.local_addr()?;

        let (live, live_port) = reserve_port(&config.host, config.live_port)?;

        let clients = Clients::default();
        new_thread_ws_incoming(live, clients.clone());
        let notifier = new_thread_ws_reload(clients);

        #[cfg(feature = "server")]
        {
            http::start(listener, dist.into())?;
            tracing::info!(
                url = %console::style(format!("http://{}:{}/", config.host, http_addr.port())).yellow(),
                "serving"
            );
        }

        #[cfg(not(feature = "server"))]
        {
            let _: Utf8PathBuf = dist.into();
            drop(listener);
            tracing::warn!("built without the `server` feature, only live reload is available");
        }

        tracing::debug!("live reload on port {live_port}");

        Ok(Self {
            http_addr,
            live_port,
            notifier,
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn live_port(&self) -> u16 {
        self.live_port
    }

    /// Channel for the orchestrator's completion notifications.
    pub fn notifier(&self) -> Sender<Notification> {
        self.notifier.clone()
    }

    /// Pushes a notification to every connected client.
    pub fn notify(&self, notification: Notification) {
        let _ = self.notifier.send(notification);
    }
}

fn reserve_port(host: &str, preferred: u16) -> Result<(TcpListener, u16), ServerError> {
    let listener = match TcpListener::bind((host, preferred)) {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind((host, 0)).map_err(|source| ServerError::Bind {
            addr: format!("{host}:0"),
            source,
        })?,
    };

    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

fn new_thread_ws_incoming(server: TcpListener, clients: Clients) {
    thread::spawn(move || {
        for stream in server.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("live reload connection failed: {e}");
                    continue;
                }
            };

            match tungstenite::accept(stream) {
                Ok(socket) => match clients.lock() {
                    Ok(mut clients) => clients.push(socket),
                    Err(_) => break,
                },
                Err(e) => tracing::warn!("live reload handshake failed: {e}"),
            }
        }
    });
}

fn new_thread_ws_reload(clients: Clients) -> Sender<Notification> {
    let (tx, rx) = std::sync::mpsc::channel::<Notification>();

    thread::spawn(move || {
        while let Ok(notification) = rx.recv() {
            let Ok(mut clients) = clients.lock() else {
                break;
            };

            tracing::debug!(
                "sending {} to {} client(s)",
                notification.as_str(),
                clients.len()
            );

            let mut broken = vec![];
            for (i, socket) in clients.iter_mut().enumerate() {
                if let Err(e) = socket.send(notification.as_str().into()) {
                    tracing::debug!("dropping live reload client: {e}");
                    broken.push(i);
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            let len = clients.len();
            if len > MAX_CLIENTS {
                for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                    socket.close(None).ok();
                }
            }
        }
    });

    tx
}
