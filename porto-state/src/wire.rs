//! Length-delimited protobuf framing.
//!
//! Every message on the supervisor socket is a base-128 varint length
//! followed by that many bytes of encoded protobuf.

use std::io;

use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted from the peer.
pub const MAX_FRAME_LEN: u64 = 64 * 1024 * 1024;

/// Encode and write one framed message.
pub async fn write_message<W, M>(writer: &mut W, msg: &M) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let buf = msg.encode_length_delimited_to_vec();
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Read one framed message.
///
/// Returns `Ok(None)` if the peer closed the stream cleanly before sending
/// anything.
pub async fn read_message<R, M>(reader: &mut R) -> io::Result<Option<M>>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let len = match read_varint(reader).await? {
        Some(len) => len,
        None => return Ok(None),
    };

    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit of {}", len, MAX_FRAME_LEN),
        ));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;

    M::decode(buf.as_slice())
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn read_varint<R>(reader: &mut R) -> io::Result<Option<u64>>
where
    R: AsyncRead + Unpin,
{
    let mut value: u64 = 0;

    for i in 0..10 {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte).await? == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated length prefix",
            ));
        }

        value |= u64::from(byte[0] & 0x7f) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok(Some(value));
        }
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "length prefix longer than 10 bytes",
    ))
}
