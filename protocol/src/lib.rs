//! Wire format of the presence protocol.
//!
//! A frame is a 4-byte little-endian CRC-32 followed by an XML fragment
//! describing one server. This crate only deals in bytes; it never touches
//! the network.

pub mod checksum;

mod codec;
mod descriptor;
mod frame;

pub use codec::decode;
pub use codec::encode;
pub use codec::DecodeError;
pub use descriptor::ServerDescriptor;
pub use descriptor::ServiceDescriptor;
pub use frame::encode_frame;
pub use frame::FrameDecoder;
pub use frame::FrameError;
pub use frame::CHECKSUM_LENGTH;
