// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Remote HTTP archive backend: issues `Range` requests, verifies
//! `Content-Length`, retries transient failures with exponential backoff,
//! and coalesces overlapping in-flight reads through a small range cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use hashlink::LruCache;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::cid::Cid;
use crate::error::CarError;
use crate::reader::{parse_header, ArchiveReader, CarHeader};

const MAX_RETRIES: usize = 3;
const RANGE_CACHE_CAPACITY: usize = 256;

type RangeKey = (u64, u64);
type InFlight = Arc<OnceCell<Result<Bytes, String>>>;

pub struct HttpArchiveReader {
    client: reqwest::Client,
    url: String,
    header: CarHeader,
    cache: Mutex<LruCache<RangeKey, Bytes>>,
    in_flight: Mutex<HashMap<RangeKey, InFlight>>,
}

impl HttpArchiveReader {
    pub async fn open(client: reqwest::Client, url: impl Into<String>) -> Result<Self, CarError> {
        let url = url.into();
        let prefix = fetch_range(&client, &url, 0, 4096).await?;
        let mut cursor = std::io::Cursor::new(prefix.as_ref());
        let header = parse_header(&mut cursor).await?;
        Ok(Self {
            client,
            url,
            header,
            cache: Mutex::new(LruCache::new(RANGE_CACHE_CAPACITY)),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    async fn fetch_with_cache(&self, offset: u64, len: u64) -> Result<Bytes, CarError> {
        let key = (offset, len);
        if let Some(hit) = self.cache.lock().get(&key).cloned() {
            return Ok(hit);
        }

        let cell = {
            let mut inflight = self.in_flight.lock();
            inflight
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_init(|| async {
                fetch_range_with_retry(&self.client, &self.url, offset, len)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await
            .clone();

        self.in_flight.lock().remove(&key);

        let bytes = result.map_err(|cause| CarError::Io {
            backend: "http",
            offset,
            len,
            cause,
        })?;
        self.cache.lock().insert(key, bytes.clone());
        Ok(bytes)
    }
}

pub(crate) async fn fetch_range_with_retry(
    client: &reqwest::Client,
    url: &str,
    offset: u64,
    len: u64,
) -> Result<Bytes, CarError> {
    let backoff = ExponentialBuilder::default()
        .with_max_times(MAX_RETRIES)
        .with_min_delay(Duration::from_millis(100));

    (|| fetch_range(client, url, offset, len))
        .retry(backoff)
        .when(is_transient)
        .await
}

fn is_transient(err: &CarError) -> bool {
    // Never retry on a definitive client error such as 404; only on
    // network failures and 5xx-shaped `UnexpectedEOF`/timeout conditions.
    match err {
        CarError::Io { cause, .. } => !cause.contains("404"),
        _ => false,
    }
}

pub(crate) async fn fetch_range(
    client: &reqwest::Client,
    url: &str,
    offset: u64,
    len: u64,
) -> Result<Bytes, CarError> {
    let range = format!("bytes={}-{}", offset, offset + len.saturating_sub(1));
    let resp = client
        .get(url)
        .header(reqwest::header::RANGE, range)
        .send()
        .await
        .map_err(|e| CarError::Io {
            backend: "http",
            offset,
            len,
            cause: e.to_string(),
        })?;

    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(CarError::Io {
            backend: "http",
            offset,
            len,
            cause: "404".to_string(),
        });
    }
    if !resp.status().is_success() {
        return Err(CarError::Io {
            backend: "http",
            offset,
            len,
            cause: format!("unexpected status {}", resp.status()),
        });
    }

    let declared_len = resp.content_length();
    let bytes = resp.bytes().await.map_err(|e| CarError::Io {
        backend: "http",
        offset,
        len,
        cause: e.to_string(),
    })?;

    validate_range_response(declared_len, bytes.len() as u64, len).map_err(|cause| CarError::Io {
        backend: "http",
        offset,
        len,
        cause,
    })?;
    Ok(bytes)
}

/// Checks a ranged response against what was asked for: the declared
/// `Content-Length` must match the body actually received, and both must
/// match the requested range length. A server that quietly truncates a
/// range (e.g. serves 60 bytes of a well-formed response to a 64-byte
/// request) fails the second check even though the first one passes.
fn validate_range_response(declared_len: Option<u64>, body_len: u64, requested_len: u64) -> Result<(), String> {
    if let Some(declared) = declared_len {
        if declared != body_len {
            return Err("UnexpectedEOF".to_string());
        }
    }
    if body_len != requested_len {
        return Err("UnexpectedEOF".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_range_with_matching_content_length_passes() {
        assert!(validate_range_response(Some(64), 64, 64).is_ok());
    }

    #[test]
    fn content_length_mismatch_is_rejected() {
        assert!(validate_range_response(Some(64), 60, 64).is_err());
    }

    #[test]
    fn well_formed_but_truncated_response_is_rejected() {
        // Content-Length: 60, body 60 bytes, but 64 bytes were requested.
        assert!(validate_range_response(Some(60), 60, 64).is_err());
    }

    #[test]
    fn missing_content_length_still_checks_against_requested_len() {
        assert!(validate_range_response(None, 60, 64).is_err());
        assert!(validate_range_response(None, 64, 64).is_ok());
    }
}

#[async_trait::async_trait]
impl ArchiveReader for HttpArchiveReader {
    fn roots(&self) -> &[Cid] {
        &self.header.roots
    }

    fn header_size(&self) -> u64 {
        self.header.header_size
    }

    async fn read_at(&self, offset: u64, len: u64) -> Result<Bytes, CarError> {
        self.fetch_with_cache(offset, len).await
    }
}
