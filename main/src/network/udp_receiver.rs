use futures_util::Stream;
use futures_util::TryFutureExt;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::codec::Decoder;
use tokio_util::udp::UdpFramed;

const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(2000);

pub trait BroadcastReceiver {
    fn receive<T, C, E>(
        &self,
        port: u16,
        decoder: C,
    ) -> impl Stream<Item = Result<(T, SocketAddr), E>> + Send + 'static
    where
        C: Decoder<Item = T, Error = E> + Send + 'static,
        E: From<std::io::Error> + 'static;
}

pub struct TokioBroadcastReceiver;

impl TokioBroadcastReceiver {
    async fn new_socket<C>(port: u16, decoder: C) -> std::io::Result<UdpFramed<C>> {
        let bind_address = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let socket = Self::bind_until_it_works(bind_address).await;
        log::info!("`BroadcastReceiver` socket listening at {}", bind_address);
        Ok(UdpFramed::new(socket, decoder))
    }

    /// The port may be held by another process right now. Retrying on a fixed
    /// interval until the bind succeeds keeps a freshly started finder useful
    /// without any caller intervention; dropping the stream stops the loop.
    async fn bind_until_it_works(address: SocketAddrV4) -> UdpSocket {
        loop {
            match UdpSocket::bind(address).await {
                Ok(socket) => return socket,
                Err(e) => {
                    log::warn!(
                        "Failed to bind `BroadcastReceiver` socket at {}, retrying in {:?}: {}",
                        address,
                        BIND_RETRY_INTERVAL,
                        e
                    );
                    tokio::time::sleep(BIND_RETRY_INTERVAL).await;
                }
            }
        }
    }
}

impl BroadcastReceiver for TokioBroadcastReceiver {
    fn receive<T, C, E>(
        &self,
        port: u16,
        decoder: C,
    ) -> impl Stream<Item = Result<(T, SocketAddr), E>> + Send + 'static
    where
        C: Decoder<Item = T, Error = E> + Send + 'static,
        E: From<std::io::Error> + 'static,
    {
        Self::new_socket(port, decoder)
            .err_into()
            .try_flatten_stream()
    }
}
