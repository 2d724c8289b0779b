use crate::mock_server::hyper::run_server;
use crate::session::{Session, SessionConfig};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::watch;

/// An HTTP web-server running in the background, answering requests according to the
/// expectations of its current [`Session`].
///
/// `BareMockServer` is the actual mock server behind the publicly-exposed `MockServer`, which
/// is instead a thin facade over a `BareMockServer` retrieved from a pool - see `get_pooled_mock_server`
/// for more details.
pub(crate) struct BareMockServer {
    session: Arc<Session>,
    server_address: SocketAddr,
    // When `_shutdown_trigger` gets dropped the listening server terminates.
    _shutdown_trigger: watch::Sender<()>,
}

impl BareMockServer {
    /// Start a new instance of a `BareMockServer` listening on the specified
    /// [`TcpListener`](std::net::TcpListener).
    ///
    /// The server runs on its own thread, driven by a single-threaded `tokio` runtime: it does
    /// not depend on the runtime (if any) of the test using it.
    pub(super) async fn start(listener: TcpListener, config: SessionConfig) -> Self {
        let (shutdown_trigger, shutdown_receiver) = watch::channel(());
        let session = Arc::new(Session::new(config));
        let server_address = listener
            .local_addr()
            .expect("Failed to get server address.");

        let server_session = session.clone();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Cannot build local tokio runtime");

            runtime.block_on(run_server(listener, server_session, shutdown_receiver))
        });
        // The listener is already bound: connections queue up in the backlog until the
        // server thread starts accepting them.

        Self {
            session,
            server_address,
            _shutdown_trigger: shutdown_trigger,
        }
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    /// Start over with a clean session.
    ///
    /// It *must* be called if you plan to reuse a `BareMockServer` instance (i.e. in our
    /// `MockServerPoolManager`).
    pub(crate) fn reset(&self) {
        self.session.start();
    }

    /// Return the base uri of this running instance of `BareMockServer`, e.g. `http://127.0.0.1:4372`.
    ///
    /// Use this method to compose uris when interacting with this instance of `BareMockServer` via
    /// an HTTP client.
    pub(crate) fn uri(&self) -> String {
        format!("http://{}", self.server_address)
    }

    /// Return the socket address of this running instance of `BareMockServer`, e.g. `127.0.0.1:4372`.
    ///
    /// Use this method to interact with the `BareMockServer` using `TcpStream`s.
    pub(crate) fn address(&self) -> &SocketAddr {
        &self.server_address
    }
}
