//! Scoped connection helper
//!
//! Connect, run a body against the open transport, and always disconnect,
//! whether the body succeeded or failed.

use crate::stream::StreamAccessor;
use crate::stream::TransportLayer;
use crate::tcp::{TcpSettings, TcpTransport};
use futures::future::BoxFuture;
use ne500_core::PumpResult;

/// Run `body` with a freshly connected [`TcpTransport`]
///
/// The transport is closed after the body finishes. The body's error wins over
/// a close error; a close error is only returned when the body succeeded.
///
/// ```rust,no_run
/// # async fn demo() -> ne500_core::PumpResult<()> {
/// use ne500_transport::{with_connection, StreamAccessor, TcpSettings};
///
/// let written = with_connection(TcpSettings::new("192.168.0.10", 100), |transport| {
///     Box::pin(async move { transport.write(b"01 STP\r").await })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_connection<R, F>(settings: TcpSettings, body: F) -> PumpResult<R>
where
    F: for<'t> FnOnce(&'t mut TcpTransport) -> BoxFuture<'t, PumpResult<R>>,
{
    let mut transport = TcpTransport::new(settings);
    transport.open().await?;
    run_scoped(&mut transport, body).await
}

/// Run `body` against an already open transport and close it afterwards
pub async fn run_scoped<T, R, F>(transport: &mut T, body: F) -> PumpResult<R>
where
    T: StreamAccessor,
    F: for<'t> FnOnce(&'t mut T) -> BoxFuture<'t, PumpResult<R>>,
{
    let result = body(transport).await;
    let closed = transport.close().await;
    if let Err(e) = &closed {
        log::warn!("Closing transport failed: {}", e);
    }
    match (result, closed) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(value), Ok(())) => Ok(value),
    }
}
