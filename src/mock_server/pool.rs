use crate::mock_server::bare_server::BareMockServer;
use crate::MockServer;
use deadpool::managed::{Metrics, Object, Pool};
use once_cell::sync::Lazy;
use std::convert::Infallible;

/// A pool of `BareMockServer`s.
///
/// ## Design constraints
///
/// Pooling is meant to be an invisible optimisation: users of the crate should never have to
/// reason about it.
///
/// ## Motivation
///
/// Pooling `BareMockServer`s reduces the number of `TcpListener`s (and server threads) that are
/// opened and closed over a test suite, mitigating the risk of hitting OS limits on the number
/// of open connections (e.g. ulimit on Linux).
static MOCK_SERVER_POOL: Lazy<Pool<MockServerPoolManager>> = Lazy::new(|| {
    // We are choosing an arbitrarily high max_size because we never want a test to "wait" for
    // a `BareMockServer` instance to become available.
    Pool::builder(MockServerPoolManager)
        .max_size(1000)
        .build()
        .expect("Building a server pool is not expected to fail. Please report an issue")
});

pub(crate) type PooledMockServer = Object<MockServerPoolManager>;

/// Retrieve a `BareMockServer` from the pool.
/// The operation should never fail.
pub(crate) async fn get_pooled_mock_server() -> PooledMockServer {
    MOCK_SERVER_POOL
        .get()
        .await
        .expect("Failed to get a MockServer from the pool")
}

/// The `BareMockServer` pool manager.
///
/// It:
/// - creates a new `BareMockServer` if there is none to borrow from the pool;
/// - starts a fresh session on used `BareMockServer`s before making them available again.
#[derive(Debug)]
pub(crate) struct MockServerPoolManager;

impl deadpool::managed::Manager for MockServerPoolManager {
    type Error = Infallible;
    type Type = BareMockServer;

    async fn create(&self) -> Result<BareMockServer, Infallible> {
        // All servers in the pool use the default configuration
        Ok(MockServer::builder().build_bare().await)
    }

    async fn recycle(
        &self,
        mock_server: &mut BareMockServer,
        _metrics: &Metrics,
    ) -> deadpool::managed::RecycleResult<Infallible> {
        // Expectations, recorded requests and failures of the previous test are forgotten.
        mock_server.reset();
        Ok(())
    }
}
