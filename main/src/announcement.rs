use crate::network::udp_receiver::BroadcastReceiver;
use farol_protocol::FrameDecoder;
use farol_protocol::FrameError;
use farol_protocol::ServerDescriptor;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use mockall::automock;
use std::net::SocketAddr;

/// Announcements already stripped of framing: invalid datagrams never make
/// it past this seam, matching the protocol's silent-drop rule.
#[automock]
pub trait AnnouncementReceiver {
    fn receive(&self, port: u16)
        -> BoxStream<'static, std::io::Result<(ServerDescriptor, SocketAddr)>>;
}

impl<T> AnnouncementReceiver for T
where
    T: BroadcastReceiver + Send,
{
    fn receive(
        &self,
        port: u16,
    ) -> BoxStream<'static, std::io::Result<(ServerDescriptor, SocketAddr)>> {
        self.receive(port, FrameDecoder::default())
            .filter_map(|r| async { strip_frame_error(r) })
            .boxed()
    }
}

fn strip_frame_error(
    result: Result<(ServerDescriptor, SocketAddr), FrameError>,
) -> Option<std::io::Result<(ServerDescriptor, SocketAddr)>> {
    match result {
        Ok(inner) => Some(Ok(inner)),
        Err(FrameError::Io(e)) => Some(Err(e)),
        Err(e) => {
            log::debug!("Dropping an invalid announcement frame: {}", e);
            None
        }
    }
}
