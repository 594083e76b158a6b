use crate::announcement::AnnouncementReceiver;
use crate::network::udp_receiver::TokioBroadcastReceiver;
use crate::registry::DiscoveredServer;
use crate::registry::Registry;
use futures_channel::mpsc::UnboundedSender;
use futures_util::Stream;
use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const DEFAULT_DEAD_THRESHOLD: Duration = Duration::from_millis(10_000);

/// Passive side of the presence protocol: listens for announcements on a
/// port and keeps a registry of every server heard.
///
/// Binding happens in the background; if the port is taken, the finder keeps
/// retrying and starts listening as soon as it frees up. Must be created
/// inside a Tokio runtime.
#[derive(Debug)]
pub struct Finder {
    registry: Arc<Registry>,
    subscribers: Arc<Mutex<Vec<UnboundedSender<DiscoveredServer>>>>,
    cancellation: CancellationToken,
}

impl Finder {
    pub fn new(port: u16) -> Result<Self, FindError> {
        Self::new_internal(port, TokioBroadcastReceiver)
    }

    fn new_internal(
        port: u16,
        receiver: impl AnnouncementReceiver + Send + 'static,
    ) -> Result<Self, FindError> {
        if port == 0 {
            return Err(FindError::InvalidPort);
        }
        let registry = Arc::new(Registry::new(DEFAULT_DEAD_THRESHOLD));
        let subscribers = Arc::new(Mutex::new(Vec::new()));
        let cancellation = CancellationToken::new();
        tokio::spawn(run(
            receiver,
            port,
            registry.clone(),
            subscribers.clone(),
            cancellation.clone(),
        ));
        Ok(Self {
            registry,
            subscribers,
            cancellation,
        })
    }

    /// Discovery notifications: one item per first sight of a name and one
    /// per revival of a record that had aged past the dead threshold.
    pub fn discovered(&self) -> impl Stream<Item = DiscoveredServer> {
        let (sender, receiver) = futures_channel::mpsc::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Live view of the registry, computed fresh on every call: every record
    /// whose last announcement is younger than the dead threshold.
    pub fn servers(&self) -> Vec<DiscoveredServer> {
        self.registry.live(Instant::now())
    }

    /// How long a server may stay silent before it disappears from
    /// [`servers`](Self::servers).
    pub fn dead_threshold(&self) -> Duration {
        self.registry.dead_threshold()
    }

    pub fn set_dead_threshold(&self, dead_threshold: Duration) -> Result<(), FindError> {
        if dead_threshold.is_zero() {
            return Err(FindError::InvalidDeadThreshold);
        }
        self.registry.set_dead_threshold(dead_threshold);
        Ok(())
    }

    /// Stops listening. The receive task observes the signal at its next
    /// iteration and releases the socket; discovered records stay readable.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }
}

impl Drop for Finder {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn run(
    receiver: impl AnnouncementReceiver,
    port: u16,
    registry: Arc<Registry>,
    subscribers: Arc<Mutex<Vec<UnboundedSender<DiscoveredServer>>>>,
    cancellation: CancellationToken,
) {
    let mut announcements = receiver.receive(port);
    loop {
        let next = tokio::select! {
            _ = cancellation.cancelled() => break,
            next = announcements.next() => next,
        };
        match next {
            Some(Ok((server, source))) => {
                let discovered = registry.observe(server, source.ip(), Instant::now());
                if let Some(snapshot) = discovered {
                    notify(&subscribers, snapshot);
                }
            }
            Some(Err(e)) => log::warn!("Error while receiving announcements: {}", e),
            None => break,
        }
    }
    log::debug!("Finder on port {} stopped listening", port);
}

fn notify(
    subscribers: &Mutex<Vec<UnboundedSender<DiscoveredServer>>>,
    snapshot: DiscoveredServer,
) {
    subscribers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|subscriber| subscriber.unbounded_send(snapshot.clone()).is_ok());
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FindError {
    #[error("Invalid discovery port")]
    InvalidPort,

    #[error("Dead threshold must be positive")]
    InvalidDeadThreshold,
}
