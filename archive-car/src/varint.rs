// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! LEB128 unsigned-varint framing shared by the CAR header and section
//! prefixes. Byte framing (detecting EOF, finding where a varint ends) is
//! done here since `unsigned_varint` has no `tokio`-async reader; the actual
//! LEB128 decode/encode is delegated to `unsigned_varint`.

use crate::error::CarError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads a uvarint-prefixed length, or `None` on a clean EOF before any byte is read.
pub async fn read_uvarint_async<R>(reader: &mut R) -> Result<Option<u64>, CarError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 10];
    let mut len = 0usize;
    loop {
        let mut byte = [0u8; 1];
        let n = reader.read(&mut byte).await.map_err(|e| CarError::Io {
            backend: "file",
            offset: 0,
            len: 1,
            cause: e.to_string(),
        })?;
        if n == 0 {
            return if len == 0 { Ok(None) } else { Err(CarError::BadVarint(0)) };
        }
        if len >= buf.len() {
            return Err(CarError::BadVarint(0));
        }
        let continues = byte[0] & 0x80 != 0;
        buf[len] = byte[0];
        len += 1;
        if !continues {
            let (value, _) = unsigned_varint::decode::u64(&buf[..len]).map_err(|_| CarError::BadVarint(0))?;
            return Ok(Some(value));
        }
    }
}

pub async fn write_uvarint_async<W>(writer: &mut W, value: u64) -> Result<(), CarError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = unsigned_varint::encode::u64_buffer();
    let encoded = unsigned_varint::encode::u64(value, &mut buf);
    writer.write_all(encoded).await.map_err(|e| CarError::Io {
        backend: "file",
        offset: 0,
        len: encoded.len() as u64,
        cause: e.to_string(),
    })
}

/// Parses a uvarint out of an in-memory slice, returning the value and the number of bytes consumed.
pub fn read_uvarint_sync(bytes: &[u8]) -> Result<(u64, usize), CarError> {
    let (value, rest) =
        unsigned_varint::decode::u64(bytes).map_err(|_| CarError::BadVarint(bytes.len() as u64))?;
    Ok((value, bytes.len() - rest.len()))
}

pub fn uvarint_len(value: u64) -> usize {
    let mut buf = unsigned_varint::encode::u64_buffer();
    unsigned_varint::encode::u64(value, &mut buf).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip() {
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX >> 1] {
            let mut buf = Vec::new();
            write_uvarint_async(&mut buf, v).await.unwrap();
            assert_eq!(buf.len(), uvarint_len(v));
            let mut cursor = std::io::Cursor::new(buf.clone());
            let got = read_uvarint_async(&mut cursor).await.unwrap().unwrap();
            assert_eq!(got, v);
            let (got_sync, consumed) = read_uvarint_sync(&buf).unwrap();
            assert_eq!(got_sync, v);
            assert_eq!(consumed, buf.len());
        }
    }

    #[tokio::test]
    async fn clean_eof_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert_eq!(read_uvarint_async(&mut cursor).await.unwrap(), None);
    }
}
