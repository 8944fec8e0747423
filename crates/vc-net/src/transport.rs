use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::{
    framing::{read_frame, write_frame},
    Envelope, NetError,
};

/// Connect + I/O window for one outbound message. Failures inside it are
/// best-effort: the caller logs and drops the message.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot send: fresh connection, one frame, close.
pub async fn send(addr: &str, envelope: &Envelope) -> Result<(), NetError> {
    timeout(IO_TIMEOUT, async {
        let mut stream = TcpStream::connect(addr).await?;
        write_frame(&mut stream, envelope).await
    })
    .await
    .map_err(|_| NetError::Timeout)?
}

/// Send one frame and read one framed reply on the same connection.
/// Used for `CHAIN_REQUEST` and `GET_MINER`.
pub async fn request(addr: &str, envelope: &Envelope) -> Result<Envelope, NetError> {
    timeout(IO_TIMEOUT, async {
        let mut stream = TcpStream::connect(addr).await?;
        write_frame(&mut stream, envelope).await?;
        read_frame(&mut stream).await
    })
    .await
    .map_err(|_| NetError::Timeout)?
}
