//! The worker's view of the network.

use std::future::Future;
use std::sync::Arc;

use crate::request::{Request, Response};
use crate::Result;

/// Performs real network fetches on behalf of the worker.
///
/// A rejected fetch (`Err`) is a network failure: strategies fall back to the
/// cache. A resolved fetch with any status is a network success.
pub trait Network: Send + Sync + 'static {
    /// Fetch a request.
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

impl<N: Network> Network for Arc<N> {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
        (**self).fetch(request)
    }
}
