use crate::checksum;
use crate::codec;
use crate::codec::DecodeError;
use crate::descriptor::ServerDescriptor;
use thiserror::Error;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Size of the checksum prefix in every frame.
pub const CHECKSUM_LENGTH: usize = 4;

/// Builds the datagram payload for one descriptor: a little-endian CRC-32
/// of the encoded bytes, then the encoded bytes themselves.
pub fn encode_frame(server: &ServerDescriptor) -> Vec<u8> {
    let payload = codec::encode(server);
    let mut frame = Vec::with_capacity(CHECKSUM_LENGTH + payload.len());
    frame.extend_from_slice(&checksum::of(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Decodes whole datagrams into descriptors.
///
/// Every call consumes the entire buffer; a datagram is never split across
/// frames on the wire.
#[derive(Default)]
pub struct FrameDecoder;

impl Decoder for FrameDecoder {
    type Item = ServerDescriptor;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let datagram = src.split_to(src.len());
        if datagram.len() <= CHECKSUM_LENGTH {
            return Err(FrameError::TooShort(datagram.len()));
        }

        let mut declared = [0; CHECKSUM_LENGTH];
        declared.copy_from_slice(&datagram[..CHECKSUM_LENGTH]);
        let declared = u32::from_le_bytes(declared);

        let payload = &datagram[CHECKSUM_LENGTH..];
        let computed = checksum::of(payload);
        if declared != computed {
            return Err(FrameError::ChecksumMismatch { declared, computed });
        }

        codec::decode(payload).map(Some).map_err(Into::into)
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Error in network I/O")]
    Io(#[from] std::io::Error),

    #[error("Frame of {0} bytes is too short to carry a checksum and a payload")]
    TooShort(usize),

    #[error("Checksum mismatch: frame declares {declared:08x}, payload hashes to {computed:08x}")]
    ChecksumMismatch { declared: u32, computed: u32 },

    #[error("Failed to decode the descriptor payload")]
    Descriptor(#[from] DecodeError),
}
