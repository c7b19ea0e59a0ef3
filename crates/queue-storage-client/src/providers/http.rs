//! Queue service client over the storage REST API.
//!
//! Requests are made with `reqwest` and authenticated with Shared Key
//! signing, so the same client talks to a hosted storage account or to a local
//! emulator. XML bodies are handled by the sibling `xml` module.
//!
//! ## Authentication
//!
//! Every request carries an `Authorization: SharedKey <account>:<signature>`
//! header. The signature is an HMAC-SHA256, keyed with the decoded account
//! key, over a string built from the verb, the standard content headers, the
//! `x-ms-` headers and the canonicalized resource.
//!
//! ## Errors
//!
//! Failed responses are mapped from the service error code (`<Code>` in the
//! body, or `x-ms-error-code` when there is no body) onto [`QueueError`]. A
//! refused TCP connection becomes [`QueueError::ConnectionRefused`] so callers
//! can tell that nothing is listening on the endpoint.

use super::xml;
use crate::client::QueueServiceClient;
use crate::error::{ConfigurationError, QueueError, ValidationError};
use crate::message::{
    validate_message_count, validate_visibility_timeout, ContinuationToken, GetMessagesOptions,
    ListQueuesOptions, MessageId, PeekedMessage, PopReceipt, QueueMessage, QueueName,
    QueueProperties, QueueSegment, Timestamp, UpdatedMessage,
};
use crate::properties::{
    validate_signed_identifiers, ServiceProperties, ServiceStats, SignedIdentifiers,
};
use crate::provider::{ProviderType, StorageAccount};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Duration;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Method, StatusCode};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::error::Error as _;
use std::fmt;
use tracing::debug;
use url::Url;

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

/// REST API version sent with every request
pub const SERVICE_VERSION: &str = "2020-10-02";

const METADATA_HEADER_PREFIX: &str = "x-ms-meta-";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";

// ============================================================================
// Shared Key Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Shared Key signer for request authentication
///
/// The string to sign is:
///
/// ```text
/// VERB
/// Content-Encoding
/// Content-Language
/// Content-Length      (empty when zero)
/// Content-MD5
/// Content-Type
/// Date                (empty, x-ms-date is sent instead)
/// If-Modified-Since
/// If-Match
/// If-None-Match
/// If-Unmodified-Since
/// Range
/// CanonicalizedHeaders
/// CanonicalizedResource
/// ```
#[derive(Clone)]
struct SharedKeySigner {
    account_name: String,
    key: Vec<u8>,
}

impl SharedKeySigner {
    /// Create signer from the base64 encoded account key
    fn new(account_name: &str, account_key: &str) -> Result<Self, ConfigurationError> {
        let key = STANDARD
            .decode(account_key)
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("account key is not valid base64: {}", e),
            })?;

        Ok(Self {
            account_name: account_name.to_string(),
            key,
        })
    }

    /// Value of the `Authorization` header for a request
    fn authorization(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        content_length: usize,
    ) -> String {
        let string_to_sign = self.string_to_sign(method, url, headers, content_length);
        format!("SharedKey {}:{}", self.account_name, self.sign(&string_to_sign))
    }

    fn string_to_sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        content_length: usize,
    ) -> String {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
        };
        let content_length = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };

        format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n\n{}\n{}\n{}\n{}\n{}\n{}{}",
            method.as_str(),
            header("content-encoding"),
            header("content-language"),
            content_length,
            header("content-md5"),
            header("content-type"),
            header("if-modified-since"),
            header("if-match"),
            header("if-none-match"),
            header("if-unmodified-since"),
            header("range"),
            canonicalized_headers(headers),
            self.canonicalized_resource(url),
        )
    }

    /// `/{account}{path}` followed by one `name:values` line per query parameter
    fn canonicalized_resource(&self, url: &Url) -> String {
        let mut resource = format!("/{}{}", self.account_name, url.path());

        let mut parameters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url.query_pairs() {
            parameters
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(value.into_owned());
        }

        for (name, mut values) in parameters {
            values.sort();
            resource.push('\n');
            resource.push_str(&name);
            resource.push(':');
            resource.push_str(&values.join(","));
        }

        resource
    }

    fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// `x-ms-` headers sorted by name, one `name:value\n` line each
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: Vec<(&str, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| {
            (
                name.as_str(),
                value.to_str().unwrap_or_default().trim().to_string(),
            )
        })
        .collect();
    ms_headers.sort_by(|a, b| a.0.cmp(b.0));

    ms_headers
        .into_iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect()
}

// ============================================================================
// Requests and Responses
// ============================================================================

/// A single call to the service, described before it is signed and sent
struct ServiceRequest<'a> {
    method: Method,
    path: Vec<String>,
    query: Vec<(&'static str, String)>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    use_secondary: bool,
    queue: Option<&'a QueueName>,
    message_id: Option<&'a MessageId>,
}

impl<'a> ServiceRequest<'a> {
    /// Request against the account root
    fn service(method: Method) -> Self {
        Self {
            method,
            path: Vec::new(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            use_secondary: false,
            queue: None,
            message_id: None,
        }
    }

    /// Request against a queue
    fn queue(method: Method, queue: &'a QueueName) -> Self {
        let mut request = Self::service(method);
        request.path.push(queue.to_string());
        request.queue = Some(queue);
        request
    }

    /// Request against the messages of a queue
    fn messages(method: Method, queue: &'a QueueName) -> Self {
        let mut request = Self::queue(method, queue);
        request.path.push("messages".to_string());
        request
    }

    /// Request against one message of a queue
    fn message(method: Method, queue: &'a QueueName, message_id: &'a MessageId) -> Self {
        let mut request = Self::messages(method, queue);
        request.path.push(message_id.to_string());
        request.message_id = Some(message_id);
        request
    }

    fn query(mut self, name: &'static str, value: impl ToString) -> Self {
        self.query.push((name, value.to_string()));
        self
    }

    fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    fn secondary(mut self) -> Self {
        self.use_secondary = true;
        self
    }

    /// Map a failed response onto the error for this request's target
    fn error_for(&self, status: StatusCode, code: String, message: String) -> QueueError {
        let queue_name = || self.queue.map(ToString::to_string).unwrap_or_default();
        let message_id = || self.message_id.map(ToString::to_string).unwrap_or_default();

        match code.as_str() {
            "QueueNotFound" => QueueError::QueueNotFound {
                queue_name: queue_name(),
            },
            "QueueAlreadyExists" => QueueError::QueueAlreadyExists {
                queue_name: queue_name(),
            },
            "QueueBeingDeleted" => QueueError::QueueBeingDeleted {
                queue_name: queue_name(),
            },
            "MessageNotFound" => QueueError::MessageNotFound {
                message_id: message_id(),
            },
            "PopReceiptMismatch" => QueueError::PopReceiptMismatch {
                message_id: message_id(),
            },
            "AuthenticationFailed" | "AuthorizationFailure" => QueueError::AuthenticationFailed {
                message: format!("{}: {}", code, message),
            },
            _ if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                QueueError::AuthenticationFailed {
                    message: format!("{}: {}", code, message),
                }
            }
            _ if status == StatusCode::NOT_FOUND && self.message_id.is_some() => {
                QueueError::MessageNotFound {
                    message_id: message_id(),
                }
            }
            _ if status == StatusCode::NOT_FOUND && self.queue.is_some() => {
                QueueError::QueueNotFound {
                    queue_name: queue_name(),
                }
            }
            _ => QueueError::ServiceError {
                status: status.as_u16(),
                code,
                message,
            },
        }
    }
}

/// Successful response with its body read to a string
struct ServiceResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl ServiceResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn required_header(&self, name: &str) -> Result<&str, QueueError> {
        self.header(name).ok_or_else(|| QueueError::InvalidResponse {
            message: format!("response is missing the {} header", name),
        })
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, QueueError> {
    HeaderValue::from_str(value).map_err(|_| {
        ValidationError::InvalidFormat {
            field: name.to_string(),
            message: "value is not a valid HTTP header value".to_string(),
        }
        .into()
    })
}

/// Whether a transport error was caused by the peer refusing the connection
fn is_connection_refused(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = err.source();
    }
    false
}

fn transport_error(error: reqwest::Error, endpoint: &Url) -> QueueError {
    if error.is_timeout() {
        QueueError::Timeout {
            message: format!("{}: {}", endpoint, error),
        }
    } else if is_connection_refused(&error) {
        QueueError::ConnectionRefused {
            endpoint: endpoint.to_string(),
        }
    } else if error.is_connect() {
        QueueError::ConnectionFailed {
            message: format!("could not connect to {}: {}", endpoint, error),
        }
    } else {
        QueueError::ConnectionFailed {
            message: format!("HTTP request failed: {}", error),
        }
    }
}

// ============================================================================
// HTTP Queue Service Client
// ============================================================================

/// Queue service client for a storage account reached over HTTP
///
/// The client holds a pooled `reqwest` client and is safe to share across
/// tasks behind an `Arc`.
pub struct HttpQueueServiceClient {
    http_client: HttpClient,
    signer: SharedKeySigner,
    account: StorageAccount,
}

impl HttpQueueServiceClient {
    /// Create client for a storage account
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the account key is not base64 or the
    /// HTTP client cannot be built.
    pub fn new(
        account: StorageAccount,
        request_timeout: std::time::Duration,
    ) -> Result<Self, QueueError> {
        let signer = SharedKeySigner::new(&account.account_name, account.account_key())?;

        let http_client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            signer,
            account,
        })
    }

    /// Get the account this client talks to
    pub fn account(&self) -> &StorageAccount {
        &self.account
    }

    fn request_url(&self, request: &ServiceRequest<'_>) -> Result<Url, QueueError> {
        let endpoint = if request.use_secondary {
            self.account
                .secondary_queue_endpoint
                .as_ref()
                .ok_or_else(|| ConfigurationError::Missing {
                    key: "secondary queue endpoint".to_string(),
                })?
        } else {
            &self.account.queue_endpoint
        };

        let mut url = endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| ConfigurationError::Invalid {
                message: format!("queue endpoint '{}' cannot carry a path", endpoint),
            })?;
            segments.pop_if_empty();
            if request.path.is_empty() {
                segments.push("");
            } else {
                segments.extend(&request.path);
            }
        }

        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
        }

        Ok(url)
    }

    /// Sign and send a request, returning the response on success
    async fn execute(&self, request: ServiceRequest<'_>) -> Result<ServiceResponse, QueueError> {
        let url = self.request_url(&request)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-ms-date"),
            header_value("x-ms-date", &Timestamp::now().to_rfc1123())?,
        );
        headers.insert(
            HeaderName::from_static("x-ms-version"),
            HeaderValue::from_static(SERVICE_VERSION),
        );
        for (name, value) in &request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| ValidationError::InvalidFormat {
                    field: name.clone(),
                    message: "not a valid HTTP header name".to_string(),
                })?;
            headers.insert(header_name, header_value(name, value)?);
        }

        let body = request.body.clone().unwrap_or_default();
        if !body.is_empty() {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/xml; charset=utf-8"),
            );
        }

        let authorization = self
            .signer
            .authorization(&request.method, &url, &headers, body.len());
        headers.insert(AUTHORIZATION, header_value("authorization", &authorization)?);

        debug!(method = %request.method, url = %url, "Sending queue service request");

        let mut builder = self
            .http_client
            .request(request.method.clone(), url.clone())
            .headers(headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, &self.endpoint_of(&request)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| QueueError::ConnectionFailed {
            message: format!("failed to read response body: {}", e),
        })?;

        debug!(status = status.as_u16(), "Received queue service response");

        if !status.is_success() {
            let (code, message) = xml::parse_error(&body)
                .or_else(|| {
                    headers
                        .get(ERROR_CODE_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(|code| (code.to_string(), String::new()))
                })
                .unwrap_or_else(|| {
                    (
                        status.canonical_reason().unwrap_or("Unknown").to_string(),
                        String::new(),
                    )
                });
            return Err(request.error_for(status, code, message));
        }

        Ok(ServiceResponse {
            status,
            headers,
            body,
        })
    }

    fn endpoint_of(&self, request: &ServiceRequest<'_>) -> Url {
        match (&self.account.secondary_queue_endpoint, request.use_secondary) {
            (Some(secondary), true) => secondary.clone(),
            _ => self.account.queue_endpoint.clone(),
        }
    }
}

impl fmt::Debug for HttpQueueServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpQueueServiceClient")
            .field("account", &self.account)
            .finish()
    }
}

#[async_trait]
impl QueueServiceClient for HttpQueueServiceClient {
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, QueueError> {
        let request = ServiceRequest::queue(Method::PUT, queue);
        match self.execute(request).await {
            // 201 for a new queue, 204 when it already existed
            Ok(response) => Ok(response.status == StatusCode::CREATED),
            Err(QueueError::QueueAlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        self.execute(ServiceRequest::queue(Method::DELETE, queue))
            .await
            .map(|_| ())
    }

    async fn list_queues_segmented(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&ContinuationToken>,
        options: &ListQueuesOptions,
    ) -> Result<QueueSegment, QueueError> {
        let mut request = ServiceRequest::service(Method::GET).query("comp", "list");
        if let Some(prefix) = prefix {
            request = request.query("prefix", prefix);
        }
        if let Some(token) = continuation_token {
            request = request.query("marker", token.as_str());
        }
        if let Some(max_results) = options.max_results {
            request = request.query("maxresults", max_results);
        }
        if options.include_metadata {
            request = request.query("include", "metadata");
        }

        let response = self.execute(request).await?;
        xml::parse_queue_segment(&response.body)
    }

    async fn set_queue_metadata(
        &self,
        queue: &QueueName,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), QueueError> {
        let mut request = ServiceRequest::queue(Method::PUT, queue).query("comp", "metadata");
        for (name, value) in metadata {
            request = request.header(format!("{}{}", METADATA_HEADER_PREFIX, name), value);
        }

        self.execute(request).await.map(|_| ())
    }

    async fn get_queue_metadata(&self, queue: &QueueName) -> Result<QueueProperties, QueueError> {
        let request = ServiceRequest::queue(Method::GET, queue).query("comp", "metadata");
        let response = self.execute(request).await?;

        let metadata = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix(METADATA_HEADER_PREFIX)?;
                Some((key.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();

        let approximate_message_count = match response.header("x-ms-approximate-messages-count") {
            Some(count) => count.parse().map_err(|_| QueueError::InvalidResponse {
                message: format!("approximate message count '{}' is not a number", count),
            })?,
            None => 0,
        };

        Ok(QueueProperties {
            metadata,
            approximate_message_count,
        })
    }

    async fn create_message(&self, queue: &QueueName, text: &str) -> Result<(), QueueError> {
        let request = ServiceRequest::messages(Method::POST, queue).body(xml::write_message(text));
        self.execute(request).await.map(|_| ())
    }

    async fn get_messages(
        &self,
        queue: &QueueName,
        options: &GetMessagesOptions,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        options.validate()?;

        let request = ServiceRequest::messages(Method::GET, queue)
            .query("numofmessages", options.number_of_messages)
            .query(
                "visibilitytimeout",
                options.visibility_timeout.num_seconds(),
            );

        let response = self.execute(request).await?;
        xml::parse_dequeued_messages(&response.body)
    }

    async fn peek_messages(
        &self,
        queue: &QueueName,
        count: u32,
    ) -> Result<Vec<PeekedMessage>, QueueError> {
        validate_message_count(count)?;

        let request = ServiceRequest::messages(Method::GET, queue)
            .query("peekonly", "true")
            .query("numofmessages", count);

        let response = self.execute(request).await?;
        xml::parse_peeked_messages(&response.body)
    }

    async fn update_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
        visibility_timeout: Duration,
        text: &str,
    ) -> Result<UpdatedMessage, QueueError> {
        validate_visibility_timeout(visibility_timeout)?;

        let request = ServiceRequest::message(Method::PUT, queue, message_id)
            .query("popreceipt", pop_receipt.as_str())
            .query("visibilitytimeout", visibility_timeout.num_seconds())
            .body(xml::write_message(text));

        let response = self.execute(request).await?;
        let next_visible = response.required_header("x-ms-time-next-visible")?;

        Ok(UpdatedMessage {
            pop_receipt: PopReceipt::new(response.required_header("x-ms-popreceipt")?),
            time_next_visible: Timestamp::parse_rfc1123(next_visible).map_err(|e| {
                QueueError::InvalidResponse {
                    message: e.to_string(),
                }
            })?,
        })
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        let request = ServiceRequest::message(Method::DELETE, queue, message_id)
            .query("popreceipt", pop_receipt.as_str());
        self.execute(request).await.map(|_| ())
    }

    async fn set_queue_acl(
        &self,
        queue: &QueueName,
        identifiers: &SignedIdentifiers,
    ) -> Result<(), QueueError> {
        validate_signed_identifiers(identifiers)?;

        let request = ServiceRequest::queue(Method::PUT, queue)
            .query("comp", "acl")
            .body(xml::write_signed_identifiers(identifiers));
        self.execute(request).await.map(|_| ())
    }

    async fn get_queue_acl(&self, queue: &QueueName) -> Result<SignedIdentifiers, QueueError> {
        let request = ServiceRequest::queue(Method::GET, queue).query("comp", "acl");
        let response = self.execute(request).await?;
        xml::parse_signed_identifiers(&response.body)
    }

    async fn get_service_properties(&self) -> Result<ServiceProperties, QueueError> {
        let request = ServiceRequest::service(Method::GET)
            .query("restype", "service")
            .query("comp", "properties");
        let response = self.execute(request).await?;
        xml::parse_service_properties(&response.body)
    }

    async fn set_service_properties(
        &self,
        properties: &ServiceProperties,
    ) -> Result<(), QueueError> {
        properties.validate()?;

        let request = ServiceRequest::service(Method::PUT)
            .query("restype", "service")
            .query("comp", "properties")
            .body(xml::write_service_properties(properties));
        self.execute(request).await.map(|_| ())
    }

    async fn get_service_stats(&self) -> Result<ServiceStats, QueueError> {
        let request = ServiceRequest::service(Method::GET)
            .query("restype", "service")
            .query("comp", "stats")
            .secondary();
        let response = self.execute(request).await?;
        xml::parse_service_stats(&response.body)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Http
    }
}
