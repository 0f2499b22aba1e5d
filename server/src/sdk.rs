//! Sidecar client: typed calls against the sidecar's local HTTP gateway
//!
//! Every operation reports `success` as a plain boolean and never surfaces
//! transport errors to the caller. Failures are logged at debug level and
//! absorbed by the retry/circuit-breaker policy in [`crate::resilience`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use shared::{GameServer, WatchEvent};
use tokio_util::sync::CancellationToken;

use crate::config::{RetryPolicy, SidecarConfig};
use crate::error::{is_transient_status, SdkError};
use crate::resilience::CircuitBreaker;

const EMPTY_BODY: &str = "{}";

/// The sidecar operations this server knows how to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ready,
    Allocate,
    Shutdown,
    Health,
    GetGameServer,
    WatchGameServer,
    Reserve,
    SetLabel,
    SetAnnotation,
}

impl Operation {
    pub fn path(self) -> &'static str {
        match self {
            Operation::Ready => "/ready",
            Operation::Allocate => "/allocate",
            Operation::Shutdown => "/shutdown",
            Operation::Health => "/health",
            Operation::GetGameServer => "/gameserver",
            Operation::WatchGameServer => "/watch/gameserver",
            Operation::Reserve => "/reserve",
            Operation::SetLabel => "/metadata/label",
            Operation::SetAnnotation => "/metadata/annotation",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Operation::GetGameServer | Operation::WatchGameServer => Method::GET,
            Operation::SetLabel | Operation::SetAnnotation => Method::PUT,
            _ => Method::POST,
        }
    }

    /// Streaming endpoints only have their first event read.
    fn is_stream(self) -> bool {
        self == Operation::WatchGameServer
    }
}

#[derive(Debug, Serialize)]
struct ReserveBody {
    #[serde(rename = "Seconds")]
    seconds: i32,
}

#[derive(Debug, Serialize)]
struct KeyValueBody<'a> {
    #[serde(rename = "Key")]
    key: &'a str,
    #[serde(rename = "Value")]
    value: &'a str,
}

/// A fully built request: operation, verb and JSON body.
#[derive(Debug, Clone)]
pub struct SidecarRequest {
    operation: Operation,
    body: Option<Bytes>,
}

impl SidecarRequest {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn method(&self) -> Method {
        self.operation.method()
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Outcome of one sidecar operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarResponse<T> {
    pub ok: bool,
    pub payload: Option<T>,
}

impl<T> SidecarResponse<T> {
    pub fn success(payload: Option<T>) -> Self {
        Self { ok: true, payload }
    }

    pub fn failure() -> Self {
        Self {
            ok: false,
            payload: None,
        }
    }
}

/// Pre-serialized request bodies, shared between concurrent callers.
///
/// Racing inserts for the same key store equal bytes, so the loser of a race
/// simply overwrites an identical value.
#[derive(Debug, Default)]
pub struct BodyCache {
    bodies: RwLock<HashMap<String, Bytes>>,
}

impl BodyCache {
    pub fn with_empty_body() -> Self {
        let cache = Self::default();
        cache.get_or_insert(EMPTY_BODY);
        cache
    }

    pub fn get_or_insert(&self, json: &str) -> Bytes {
        if let Some(body) = self
            .bodies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(json)
        {
            return body.clone();
        }

        let body = Bytes::copy_from_slice(json.as_bytes());
        self.bodies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(json.to_string(), body.clone());
        body
    }

    pub fn len(&self) -> usize {
        self.bodies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the dispatcher and health reporter need from the sidecar.
#[async_trait]
pub trait SidecarApi: Send + Sync {
    async fn ready(&self) -> bool;
    async fn allocate(&self) -> bool;
    async fn shutdown(&self) -> bool;
    async fn health(&self) -> bool;
    async fn game_server(&self) -> SidecarResponse<GameServer>;
    /// Reads the first event of the watch stream as a single snapshot.
    async fn watch_game_server(&self) -> SidecarResponse<GameServer>;
    async fn reserve(&self, seconds: i32) -> bool;
    async fn set_label(&self, key: &str, value: &str) -> bool;
    async fn set_annotation(&self, key: &str, value: &str) -> bool;
}

/// HTTP implementation of [`SidecarApi`].
pub struct SidecarClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    cache: BodyCache,
    closed: CancellationToken,
}

impl SidecarClient {
    pub fn new(config: SidecarConfig) -> Result<Self, SdkError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(SidecarClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            breaker: CircuitBreaker::new(config.breaker),
            cache: BodyCache::with_empty_body(),
            closed: CancellationToken::new(),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn body_cache(&self) -> &BodyCache {
        &self.cache
    }

    /// Tears the client down. Pending back-offs are abandoned and every later
    /// call fails with [`SdkError::Closed`].
    pub fn stop(&self) {
        self.closed.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Builds the request for a body-less (`{}`) operation.
    pub fn request(&self, operation: Operation) -> SidecarRequest {
        let body = match operation.method() {
            Method::GET => None,
            _ => Some(self.cache.get_or_insert(EMPTY_BODY)),
        };
        SidecarRequest { operation, body }
    }

    pub fn reserve_request(&self, seconds: i32) -> Result<SidecarRequest, SdkError> {
        let json = serde_json::to_vec(&ReserveBody { seconds }).map_err(SdkError::Encode)?;
        Ok(SidecarRequest {
            operation: Operation::Reserve,
            body: Some(Bytes::from(json)),
        })
    }

    pub fn metadata_request(
        &self,
        operation: Operation,
        key: &str,
        value: &str,
    ) -> Result<SidecarRequest, SdkError> {
        if key.is_empty() {
            return Err(SdkError::EmptyKey);
        }
        let json = serde_json::to_vec(&KeyValueBody { key, value }).map_err(SdkError::Encode)?;
        Ok(SidecarRequest {
            operation,
            body: Some(Bytes::from(json)),
        })
    }

    /// Sends `request` and decodes a non-empty body as `T`.
    pub async fn send<T: DeserializeOwned>(&self, request: &SidecarRequest) -> SidecarResponse<T> {
        let path = request.operation.path();
        match self.execute::<T>(request).await {
            Ok(payload) => {
                debug!("Sidecar request ok: {}", path);
                SidecarResponse::success(payload)
            }
            Err(e) => {
                debug!("Sidecar request failed: {} {}", path, e);
                SidecarResponse::failure()
            }
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: &SidecarRequest,
    ) -> Result<Option<T>, SdkError> {
        let mut attempt = 0;
        loop {
            if self.closed.is_cancelled() {
                return Err(SdkError::Closed);
            }

            match self.attempt(request).await {
                Err(e) if e.is_transient() && attempt < self.retry.retries => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    debug!(
                        "Retrying {} in {:?} (attempt {}/{}): {}",
                        request.operation.path(),
                        delay,
                        attempt,
                        self.retry.retries,
                        e
                    );
                    tokio::select! {
                        _ = self.closed.cancelled() => return Err(SdkError::Closed),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
                Ok(body) => return decode(&body),
            }
        }
    }

    /// One network attempt, gated by the circuit breaker.
    async fn attempt(&self, request: &SidecarRequest) -> Result<Bytes, SdkError> {
        self.breaker.acquire().await?;

        let url = format!("{}{}", self.base_url, request.operation.path());
        let mut builder = self
            .http
            .request(request.method(), url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                self.breaker.record_failure().await;
                return Err(SdkError::Http(e));
            }
        };

        let status = response.status();
        if is_transient_status(status) {
            self.breaker.record_failure().await;
            return Err(SdkError::Status(status));
        }
        self.breaker.record_success().await;

        if status != StatusCode::OK {
            return Err(SdkError::Status(status));
        }

        if request.operation.is_stream() {
            read_first_event(response).await
        } else {
            Ok(response.bytes().await?)
        }
    }

    async fn send_empty(&self, operation: Operation) -> bool {
        let request = self.request(operation);
        self.send::<IgnoredAny>(&request).await.ok
    }

    async fn send_metadata(&self, operation: Operation, key: &str, value: &str) -> bool {
        match self.metadata_request(operation, key, value) {
            Ok(request) => self.send::<IgnoredAny>(&request).await.ok,
            Err(e) => {
                warn!("Not sending {}: {}", operation.path(), e);
                false
            }
        }
    }
}

/// Reads up to the first newline of a streamed body, or the whole body if
/// the stream ends earlier. The connection is dropped afterwards.
async fn read_first_event(mut response: reqwest::Response) -> Result<Bytes, SdkError> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        buffer.extend_from_slice(&chunk);
        if let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
            buffer.truncate(newline);
            break;
        }
    }
    Ok(buffer.freeze())
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, SdkError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(SdkError::Decode)
}

#[async_trait]
impl SidecarApi for SidecarClient {
    async fn ready(&self) -> bool {
        debug!("Calling sidecar ready");
        self.send_empty(Operation::Ready).await
    }

    async fn allocate(&self) -> bool {
        debug!("Calling sidecar allocate");
        self.send_empty(Operation::Allocate).await
    }

    async fn shutdown(&self) -> bool {
        debug!("Calling sidecar shutdown");
        self.send_empty(Operation::Shutdown).await
    }

    async fn health(&self) -> bool {
        debug!("Calling sidecar health");
        self.send_empty(Operation::Health).await
    }

    async fn game_server(&self) -> SidecarResponse<GameServer> {
        debug!("Calling sidecar gameserver");
        let request = self.request(Operation::GetGameServer);
        self.send(&request).await
    }

    async fn watch_game_server(&self) -> SidecarResponse<GameServer> {
        debug!("Calling sidecar watch gameserver");
        let request = self.request(Operation::WatchGameServer);
        let response = self.send::<WatchEvent>(&request).await;
        SidecarResponse {
            ok: response.ok,
            payload: response.payload.map(GameServer::from),
        }
    }

    async fn reserve(&self, seconds: i32) -> bool {
        debug!("Calling sidecar reserve for {}s", seconds);
        match self.reserve_request(seconds) {
            Ok(request) => self.send::<IgnoredAny>(&request).await.ok,
            Err(e) => {
                warn!("Not sending reserve: {}", e);
                false
            }
        }
    }

    async fn set_label(&self, key: &str, value: &str) -> bool {
        debug!("Calling sidecar set label {}={}", key, value);
        self.send_metadata(Operation::SetLabel, key, value).await
    }

    async fn set_annotation(&self, key: &str, value: &str) -> bool {
        debug!("Calling sidecar set annotation {}={}", key, value);
        self.send_metadata(Operation::SetAnnotation, key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn client() -> SidecarClient {
        SidecarClient::new(SidecarConfig::default()).unwrap()
    }

    #[test]
    fn test_operation_routes() {
        let cases = vec![
            (Operation::Ready, "/ready", Method::POST),
            (Operation::Allocate, "/allocate", Method::POST),
            (Operation::Shutdown, "/shutdown", Method::POST),
            (Operation::Health, "/health", Method::POST),
            (Operation::GetGameServer, "/gameserver", Method::GET),
            (Operation::WatchGameServer, "/watch/gameserver", Method::GET),
            (Operation::Reserve, "/reserve", Method::POST),
            (Operation::SetLabel, "/metadata/label", Method::PUT),
            (Operation::SetAnnotation, "/metadata/annotation", Method::PUT),
        ];

        for (operation, path, method) in cases {
            assert_eq!(operation.path(), path);
            assert_eq!(operation.method(), method);
        }
    }

    #[test]
    fn test_empty_operations_share_cached_body() {
        let client = client();
        let ready = client.request(Operation::Ready);
        let health = client.request(Operation::Health);

        assert_eq!(ready.body().map(|b| b.as_ref()), Some(&b"{}"[..]));
        assert_eq!(ready.body(), health.body());
        assert_eq!(client.body_cache().len(), 1);
    }

    #[test]
    fn test_get_requests_have_no_body() {
        let client = client();
        assert!(client.request(Operation::GetGameServer).body().is_none());
        assert!(client.request(Operation::WatchGameServer).body().is_none());
    }

    #[test]
    fn test_request_bodies() {
        let client = client();

        let reserve = client.reserve_request(30).unwrap();
        assert_eq!(reserve.operation(), Operation::Reserve);
        assert_eq!(reserve.body().unwrap().as_ref(), br#"{"Seconds":30}"#);

        let label = client
            .metadata_request(Operation::SetLabel, "mode", "test")
            .unwrap();
        assert_eq!(label.method(), Method::PUT);
        assert_eq!(
            label.body().unwrap().as_ref(),
            br#"{"Key":"mode","Value":"test"}"#
        );
    }

    #[test]
    fn test_empty_metadata_key_is_rejected() {
        let client = client();
        assert!(matches!(
            client.metadata_request(Operation::SetAnnotation, "", "value"),
            Err(SdkError::EmptyKey)
        ));
    }

    #[test]
    fn test_body_cache_concurrent_population() {
        let cache = Arc::new(BodyCache::default());
        assert!(cache.is_empty());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_insert("{}"))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().as_ref(), b"{}");
        }
        assert!(!cache.is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_decode_empty_and_invalid_bodies() {
        assert!(matches!(decode::<IgnoredAny>(b""), Ok(None)));
        assert!(matches!(decode::<IgnoredAny>(b"  \n"), Ok(None)));
        assert!(matches!(decode::<IgnoredAny>(b"{}"), Ok(Some(_))));
        assert!(matches!(
            decode::<GameServer>(b"not json"),
            Err(SdkError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_stopped_client_fails_fast() {
        let client = client();
        client.stop();

        assert!(client.is_stopped());
        assert!(!client.health().await);
        assert!(!client.game_server().await.ok);
    }
}
