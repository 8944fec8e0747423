use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Envelope, NetError};

/// Frames above this size are rejected as malformed.
pub const MAX_FRAME_LEN: u32 = 8 * 1024 * 1024;

/// Write one wire frame: a 4-byte big-endian length followed by exactly
/// that many bytes of UTF-8 JSON envelope.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
) -> Result<(), NetError> {
    let body = serde_json::to_vec(envelope)?;
    if body.len() > MAX_FRAME_LEN as usize {
        return Err(NetError::FrameTooLarge(body.len()));
    }

    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one wire frame and parse the envelope.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Envelope, NetError> {
    let mut length_bytes = [0u8; 4];
    reader.read_exact(&mut length_bytes).await?;

    let length = u32::from_be_bytes(length_bytes);
    if length > MAX_FRAME_LEN {
        return Err(NetError::FrameTooLarge(length as usize));
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use crate::MessageType;

    use super::*;

    #[tokio::test]
    async fn frames_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let envelope = Envelope::new(
            MessageType::NewTransaction,
            Some(serde_json::json!({"k": "v"})),
            "127.0.0.1:5001",
        );
        write_frame(&mut client, &envelope).await.unwrap();

        let received = read_frame(&mut server).await.unwrap();
        assert_eq!(received.kind, MessageType::NewTransaction);
        assert_eq!(received.sender, "127.0.0.1:5001");
        assert_eq!(received.data, envelope.data);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client
            .write_all(&(MAX_FRAME_LEN + 1).to_be_bytes())
            .await
            .unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(NetError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn truncated_body_is_an_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client.write_all(&16u32.to_be_bytes()).await.unwrap();
        client.write_all(b"short").await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server).await,
            Err(NetError::Io(_))
        ));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client.write_all(&4u32.to_be_bytes()).await.unwrap();
        client.write_all(b"{{{{").await.unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(NetError::Malformed(_))
        ));
    }
}
