pub mod error;
pub mod inbound;
pub mod outbound;

pub use error::ProtocolError;
pub use inbound::InboundFrame;
pub use outbound::OutboundFrame;
