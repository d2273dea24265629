/// A 32-byte BLAKE3 hash of file contents.
///
/// Used as the fingerprint that keys the optimized image cache: a source
/// file whose hash is already in the cache is never re-encoded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// Selects which variant of each transform runs. Fixed for the lifetime of
/// the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Readable output with source maps, used while developing.
    #[default]
    Development,
    /// Minified output without source maps.
    Production,
}

impl Mode {
    pub fn is_production(self) -> bool {
        matches!(self, Mode::Production)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

/// Live-update signal pushed to connected browsers after a task succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notification {
    /// Full page reload, used after script or markup changes.
    Reload,
    /// Swap stylesheets in place without losing client-side state.
    Refresh,
}

impl Notification {
    pub fn as_str(self) -> &'static str {
        match self {
            Notification::Reload => "reload",
            Notification::Refresh => "refresh",
        }
    }
}

/// Process-wide settings handed to every transform invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Environment {
    pub mode: Mode,
    /// Port of the live-reload WebSocket, set only while watching.
    pub live_port: Option<u16>,
}

impl Environment {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            live_port: None,
        }
    }

    pub fn with_live_port(mut self, port: u16) -> Self {
        self.live_port = Some(port);
        self
    }

    /// Returns the client script which connects to the live-reload socket,
    /// if one is running.
    pub fn live_script(&self) -> Option<String> {
        self.live_port.map(|port| {
            format!(
                r#"<script>
(function () {{
  const socket = new WebSocket("ws://" + location.hostname + ":{port}");
  socket.addEventListener("message", event => {{
    if (event.data === "refresh") {{
      for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {{
        const url = new URL(link.href);
        url.searchParams.set("v", Date.now());
        link.href = url.toString();
      }}
    }} else {{
      window.location.reload();
    }}
  }});
}})();
</script>"#
            )
        })
    }
}
