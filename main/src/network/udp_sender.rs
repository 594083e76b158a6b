use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mockall::automock;
use std::net::SocketAddrV4;
use std::sync::Arc;
use tokio::net::UdpSocket;

#[automock]
pub trait BroadcastSender {
    /// Confirmed send: the returned future resolves once the datagram has
    /// been handed to the OS.
    fn send(&self, destination: SocketAddrV4, data: Arc<[u8]>)
        -> BoxFuture<'static, std::io::Result<()>>;

    /// Fire-and-forget send: failures are logged and swallowed.
    fn send_detached(&self, destination: SocketAddrV4, data: Arc<[u8]>);
}

pub struct TokioBroadcastSender;

impl TokioBroadcastSender {
    async fn send(destination: SocketAddrV4, data: Arc<[u8]>) -> std::io::Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        log::debug!("Created `BroadcastSender` socket at {:?}", socket.local_addr()?);
        socket.send_to(&data, destination).await?;
        Ok(())
    }
}

impl BroadcastSender for TokioBroadcastSender {
    fn send(
        &self,
        destination: SocketAddrV4,
        data: Arc<[u8]>,
    ) -> BoxFuture<'static, std::io::Result<()>> {
        Self::send(destination, data).boxed()
    }

    fn send_detached(&self, destination: SocketAddrV4, data: Arc<[u8]>) {
        tokio::spawn(async move {
            if let Err(e) = Self::send(destination, data).await {
                log::debug!("Failed to send a broadcast datagram: {}", e);
            }
        });
    }
}
