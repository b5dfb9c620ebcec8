//! One pump network behind one gateway connection

use crate::pump::{PumpSession, SessionSettings};
use crate::sequencer::{SequencePlan, SequenceReport, Sequencer, SequencerSettings};
use futures::future::BoxFuture;
use ne500_core::PumpResult;
use ne500_transport::{run_scoped, StreamAccessor, TcpTransport, TransportLayer};
use tokio_util::sync::CancellationToken;

/// Owns the gateway transport and the settings of the layers above it
///
/// Created by [`ConnectionBuilder`](crate::ConnectionBuilder). Sessions and
/// sequencers borrow the transport; only the network opens and closes it.
#[derive(Debug)]
pub struct PumpNetwork {
    transport: TcpTransport,
    session: SessionSettings,
    sequencer: SequencerSettings,
    cancel: Option<CancellationToken>,
}

impl PumpNetwork {
    pub(crate) fn new(
        transport: TcpTransport,
        session: SessionSettings,
        sequencer: SequencerSettings,
        cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            transport,
            session,
            sequencer,
            cancel,
        }
    }

    /// Connect to the gateway
    pub async fn open(&mut self) -> PumpResult<()> {
        self.transport.open().await
    }

    /// Disconnect; a no-op when already closed
    pub async fn close(&mut self) -> PumpResult<()> {
        self.transport.close().await
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn transport(&mut self) -> &mut TcpTransport {
        &mut self.transport
    }

    pub fn session_settings(&self) -> &SessionSettings {
        &self.session
    }

    /// A device session over this network's connection
    pub fn session(&mut self) -> PumpSession<'_, TcpTransport> {
        PumpSession::new(&mut self.transport, self.session.clone())
    }

    /// A sequencer with this network's settings and cancellation token
    pub fn sequencer(&self) -> Sequencer {
        let sequencer = Sequencer::new(self.sequencer.clone());
        match &self.cancel {
            Some(token) => sequencer.with_cancellation(token.clone()),
            None => sequencer,
        }
    }

    /// Run a sequence plan on the open connection
    pub async fn run_sequence(&mut self, plan: &SequencePlan) -> PumpResult<SequenceReport> {
        let mut sequencer = self.sequencer();
        let mut session = self.session();
        sequencer.run(&mut session, plan).await
    }

    /// Open, run `body` with a device session, and close again
    ///
    /// The connection is closed on every exit path; the body's error wins
    /// over a close error.
    pub async fn scoped<R, F>(&mut self, body: F) -> PumpResult<R>
    where
        F: for<'s> FnOnce(PumpSession<'s, TcpTransport>) -> BoxFuture<'s, PumpResult<R>>,
    {
        self.transport.open().await?;
        let settings = self.session.clone();
        run_scoped(&mut self.transport, move |transport| body(PumpSession::new(transport, settings))).await
    }
}
