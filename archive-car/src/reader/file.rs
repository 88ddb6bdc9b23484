// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Local-file archive backend: buffered positional reads via
//! [`std::os::unix::fs::FileExt::read_at`] on a blocking-pool thread, so
//! concurrent readers never contend on a shared file cursor.

use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::cid::Cid;
use crate::error::CarError;
use crate::reader::{parse_header_sync, ArchiveReader, CarHeader};

pub struct FileArchiveReader {
    file: Arc<std::fs::File>,
    header: CarHeader,
}

impl FileArchiveReader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CarError> {
        let path = path.as_ref().to_owned();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path).map_err(|e| CarError::Io {
                backend: "file",
                offset: 0,
                len: 0,
                cause: e.to_string(),
            })?;
            // A generous prefix comfortably covers the varint length and the
            // CBOR-encoded `{roots, version}` header for realistic root counts.
            let mut prefix = vec![0u8; 4096];
            let n = file.read_at(&mut prefix, 0).map_err(|e| CarError::Io {
                backend: "file",
                offset: 0,
                len: prefix.len() as u64,
                cause: e.to_string(),
            })?;
            prefix.truncate(n);
            let header = parse_header_sync(&prefix)?;
            Ok(FileArchiveReader {
                file: Arc::new(file),
                header,
            })
        })
        .await
        .map_err(|e| CarError::Io {
            backend: "file",
            offset: 0,
            len: 0,
            cause: e.to_string(),
        })?
    }
}

#[async_trait::async_trait]
impl ArchiveReader for FileArchiveReader {
    fn roots(&self) -> &[Cid] {
        &self.header.roots
    }

    fn header_size(&self) -> u64 {
        self.header.header_size
    }

    async fn read_at(&self, offset: u64, len: u64) -> Result<Bytes, CarError> {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len as usize];
            file.read_exact_at(&mut buf, offset)
                .map_err(|e| CarError::Io {
                    backend: "file",
                    offset,
                    len,
                    cause: e.to_string(),
                })?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| CarError::Io {
            backend: "file",
            offset,
            len,
            cause: e.to_string(),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::objects::{Epoch, Node};
    use crate::varint::write_uvarint_async;

    #[tokio::test]
    async fn reads_sections_back() {
        let epoch = Node::Epoch(Epoch {
            epoch: 7,
            network: "testnet".into(),
            subsets: vec![],
        });
        let payload = codec::encode_node(&epoch).unwrap();
        let cid = Cid::from_payload(&payload);

        let mut bytes = Vec::new();
        #[derive(serde::Serialize)]
        struct Hdr {
            roots: Vec<Cid>,
            version: u64,
        }
        let header_bytes = cbor4ii::serde::to_vec(
            Vec::new(),
            &Hdr {
                roots: vec![cid],
                version: 1,
            },
        )
        .unwrap();
        write_uvarint_async(&mut bytes, header_bytes.len() as u64)
            .await
            .unwrap();
        bytes.extend_from_slice(&header_bytes);
        let header_size = bytes.len() as u64;

        let mut section = cid.to_bytes();
        section.extend_from_slice(&payload);
        write_uvarint_async(&mut bytes, section.len() as u64)
            .await
            .unwrap();
        bytes.extend_from_slice(&section);

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &bytes).unwrap();

        let reader = FileArchiveReader::open(tmp.path()).await.unwrap();
        assert_eq!(reader.header_size(), header_size);
        assert_eq!(reader.roots(), &[cid]);

        let (got_cid, got_payload, _len) = reader.read_section_at(header_size).await.unwrap();
        assert_eq!(got_cid, cid);
        assert_eq!(got_payload, payload);
    }
}
