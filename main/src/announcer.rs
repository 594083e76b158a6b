use crate::network::udp_sender::BroadcastSender;
use crate::network::udp_sender::TokioBroadcastSender;
use farol_protocol::encode_frame;
use farol_protocol::ServerDescriptor;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const INITIAL_DELAY: Duration = Duration::from_millis(1000);
const ANNOUNCE_INTERVAL: Duration = Duration::from_millis(2000);

/// Active side of the presence protocol: keeps broadcasting a framed
/// encoding of one server descriptor.
///
/// The frame is encoded once and cached; [`update`](Self::update) re-encodes
/// it after the descriptor changed. Sending failures never stop the
/// heartbeat, the next round simply tries again.
#[derive(Debug)]
pub struct Announcer {
    payload: Arc<Mutex<Arc<[u8]>>>,
    cancellation: CancellationToken,
}

impl Announcer {
    /// Starts announcing on the given port.
    ///
    /// The first send happens before this returns, so a finder that is
    /// already listening sees the server without waiting for the first
    /// heartbeat.
    pub async fn start(server: &ServerDescriptor, port: u16) -> Result<Self, AnnounceError> {
        Self::start_internal(server, port, TokioBroadcastSender).await
    }

    async fn start_internal(
        server: &ServerDescriptor,
        port: u16,
        sender: impl BroadcastSender + Send + 'static,
    ) -> Result<Self, AnnounceError> {
        if port == 0 {
            return Err(AnnounceError::InvalidPort);
        }
        let destination = crate::broadcast_address(port);
        let frame: Arc<[u8]> = encode_frame(server).into();

        if let Err(e) = sender.send(destination, frame.clone()).await {
            log::warn!("Failed to send the initial announcement: {}", e);
        }

        let payload = Arc::new(Mutex::new(frame));
        let cancellation = CancellationToken::new();
        tokio::spawn(run(
            sender,
            destination,
            payload.clone(),
            cancellation.clone(),
        ));
        Ok(Self {
            payload,
            cancellation,
        })
    }

    /// Re-encodes the descriptor, replacing the cached frame used by all
    /// following heartbeats. Sends already in flight are unaffected.
    pub fn update(&self, server: &ServerDescriptor) {
        let frame: Arc<[u8]> = encode_frame(server).into();
        *self
            .payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = frame;
    }

    /// Stops the heartbeat. The loop observes the signal at its next sleep
    /// boundary, not merely at its next scheduled wake.
    pub fn stop(&self) {
        self.cancellation.cancel();
    }
}

impl Drop for Announcer {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn run(
    sender: impl BroadcastSender,
    destination: SocketAddrV4,
    payload: Arc<Mutex<Arc<[u8]>>>,
    cancellation: CancellationToken,
) {
    tokio::select! {
        _ = cancellation.cancelled() => return,
        _ = tokio::time::sleep(INITIAL_DELAY) => {}
    }
    loop {
        let frame = payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        sender.send_detached(destination, frame);
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = tokio::time::sleep(ANNOUNCE_INTERVAL) => {}
        }
    }
    log::debug!("Announcer towards {} stopped", destination);
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AnnounceError {
    #[error("Invalid announcement port")]
    InvalidPort,
}
