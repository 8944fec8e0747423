pub mod error;
pub mod framing;
pub mod message;
pub mod topology;
pub mod transport;

pub use error::NetError;
pub use framing::{read_frame, write_frame, MAX_FRAME_LEN};
pub use message::{
    Envelope, HeartbeatData, MessageType, MinerInfo, PeerAddr, PeerList, RegisterData,
};
pub use topology::load_neighbors;
pub use transport::{request, send, IO_TIMEOUT};
