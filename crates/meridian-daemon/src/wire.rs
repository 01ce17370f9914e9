//! Framed envelope I/O over a transport connection.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use meridian_proto::{
    Codec, Envelope, FrameHeader, MessageType, ProtocolError, Request, Response,
    FRAME_HEADER_SIZE,
};

use crate::error::Result;

/// Writes one request frame.
pub async fn write_request<W: AsyncWrite + Unpin>(
    conn: &mut W,
    envelope: &Envelope<Request>,
) -> Result<()> {
    let mut codec = Codec::new();
    let bytes = codec.encode(envelope, MessageType::Request)?;
    conn.write_all(bytes).await.map_err(ProtocolError::Io)?;
    conn.flush().await.map_err(ProtocolError::Io)?;
    Ok(())
}

/// Writes one response frame.
pub async fn write_response<W: AsyncWrite + Unpin>(
    conn: &mut W,
    envelope: &Envelope<Response>,
) -> Result<()> {
    let mut codec = Codec::new();
    let bytes = codec.encode(envelope, MessageType::Response)?;
    conn.write_all(bytes).await.map_err(ProtocolError::Io)?;
    conn.flush().await.map_err(ProtocolError::Io)?;
    Ok(())
}

/// Reads one request frame.
pub async fn read_request<R: AsyncRead + Unpin>(conn: &mut R) -> Result<Envelope<Request>> {
    let payload = read_payload(conn, MessageType::Request).await?;
    Ok(Codec::decode(&payload)?)
}

/// Reads one response frame.
pub async fn read_response<R: AsyncRead + Unpin>(conn: &mut R) -> Result<Envelope<Response>> {
    let payload = read_payload(conn, MessageType::Response).await?;
    Ok(Codec::decode(&payload)?)
}

async fn read_payload<R: AsyncRead + Unpin>(
    conn: &mut R,
    expected: MessageType,
) -> Result<Vec<u8>> {
    let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
    conn.read_exact(&mut header_bytes)
        .await
        .map_err(ProtocolError::Io)?;

    let header = FrameHeader::decode(&header_bytes)?;
    if !header.is_version_supported() {
        return Err(ProtocolError::UnsupportedVersion(header.version).into());
    }
    if header.message_type != expected {
        return Err(ProtocolError::UnknownMessageType(header.message_type.as_u16()).into());
    }
    header.validate_payload_len()?;

    let mut payload = vec![0u8; header.payload_len as usize];
    conn.read_exact(&mut payload)
        .await
        .map_err(ProtocolError::Io)?;
    Ok(payload)
}
