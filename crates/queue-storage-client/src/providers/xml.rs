//! XML bodies exchanged with the queue service REST API.
//!
//! Responses are read into a small element tree with `quick-xml` events and
//! then picked apart per operation. Request bodies are written as strings with
//! escaped text content.

use crate::error::QueueError;
use crate::message::{
    ContinuationToken, MessageId, PeekedMessage, PopReceipt, QueueInfo, QueueMessage,
    QueueSegment, Timestamp,
};
use crate::properties::{
    AccessPolicy, CorsRule, GeoReplication, LoggingProperties, MetricsProperties,
    RetentionPolicy, ServiceProperties, ServiceStats, SignedIdentifiers,
};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[cfg(test)]
#[path = "xml_tests.rs"]
mod tests;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

// ============================================================================
// Element Tree
// ============================================================================

/// Parsed XML element with its text and child elements
#[derive(Debug, Default)]
pub(crate) struct XmlElement {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Parse a document and return its root element
    pub fn parse(xml: &str) -> Result<Self, QueueError> {
        let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    stack.push(XmlElement::named(name));
                }
                Ok(Event::Empty(ref e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    attach(&mut stack, &mut root, XmlElement::named(name));
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = stack.last_mut() {
                        let text = e.unescape().map_err(|e| invalid(format!(
                            "XML text could not be unescaped: {}",
                            e
                        )))?;
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| invalid("unbalanced closing tag".to_string()))?;
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(invalid(format!("XML parsing error: {}", e))),
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(invalid("document ended inside an element".to_string()));
        }
        root.ok_or_else(|| invalid("document has no root element".to_string()))
    }

    /// First child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every child with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child with the given name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    fn required_child(&self, name: &str) -> Result<&XmlElement, QueueError> {
        self.child(name)
            .ok_or_else(|| invalid(format!("<{}> is missing <{}>", self.name, name)))
    }

    fn required_text(&self, name: &str) -> Result<&str, QueueError> {
        self.required_child(name).map(|c| c.text.as_str())
    }

    fn expect_root(self, name: &str) -> Result<Self, QueueError> {
        if self.name == name {
            Ok(self)
        } else {
            Err(invalid(format!(
                "expected <{}> document, found <{}>",
                name, self.name
            )))
        }
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn invalid(message: String) -> QueueError {
    QueueError::InvalidResponse { message }
}

fn parse_bool(element: &XmlElement, name: &str) -> Result<bool, QueueError> {
    match element.required_text(name)?.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(invalid(format!("<{}> is not a boolean: '{}'", name, other))),
    }
}

fn parse_number<T: std::str::FromStr>(text: &str, name: &str) -> Result<T, QueueError> {
    text.trim()
        .parse()
        .map_err(|_| invalid(format!("<{}> is not a number: '{}'", name, text)))
}

fn parse_http_date(element: &XmlElement, name: &str) -> Result<Timestamp, QueueError> {
    Timestamp::parse_rfc1123(element.required_text(name)?.trim())
        .map_err(|e| invalid(e.to_string()))
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Error code and message of a failed request
pub(crate) fn parse_error(xml: &str) -> Option<(String, String)> {
    let root = XmlElement::parse(xml).ok()?;
    let code = root.child_text("Code")?.trim().to_string();
    let message = root
        .child_text("Message")
        .map(|m| m.lines().next().unwrap_or_default().trim().to_string())
        .unwrap_or_default();
    Some((code, message))
}

/// `List Queues` response
pub(crate) fn parse_queue_segment(xml: &str) -> Result<QueueSegment, QueueError> {
    let root = XmlElement::parse(xml)?.expect_root("EnumerationResults")?;

    let entries = match root.child("Queues") {
        Some(queues) => queues
            .children_named("Queue")
            .map(|queue| {
                let name = queue.required_text("Name")?.to_string();
                let metadata = queue
                    .child("Metadata")
                    .map(|m| {
                        m.children
                            .iter()
                            .map(|entry| (entry.name.clone(), entry.text.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(QueueInfo { name, metadata })
            })
            .collect::<Result<Vec<_>, QueueError>>()?,
        None => Vec::new(),
    };

    let continuation_token = root
        .child_text("NextMarker")
        .map(str::trim)
        .filter(|marker| !marker.is_empty())
        .map(ContinuationToken::new);

    Ok(QueueSegment {
        entries,
        continuation_token,
    })
}

/// `Get Messages` response
pub(crate) fn parse_dequeued_messages(xml: &str) -> Result<Vec<QueueMessage>, QueueError> {
    let root = XmlElement::parse(xml)?.expect_root("QueueMessagesList")?;

    root.children_named("QueueMessage")
        .map(|message| {
            Ok(QueueMessage {
                message_id: parse_message_id(message)?,
                pop_receipt: PopReceipt::new(message.required_text("PopReceipt")?),
                message_text: message.required_text("MessageText")?.to_string(),
                insertion_time: parse_http_date(message, "InsertionTime")?,
                expiration_time: parse_http_date(message, "ExpirationTime")?,
                time_next_visible: parse_http_date(message, "TimeNextVisible")?,
                dequeue_count: parse_number(message.required_text("DequeueCount")?, "DequeueCount")?,
            })
        })
        .collect()
}

/// `Peek Messages` response
pub(crate) fn parse_peeked_messages(xml: &str) -> Result<Vec<PeekedMessage>, QueueError> {
    let root = XmlElement::parse(xml)?.expect_root("QueueMessagesList")?;

    root.children_named("QueueMessage")
        .map(|message| {
            Ok(PeekedMessage {
                message_id: parse_message_id(message)?,
                message_text: message.required_text("MessageText")?.to_string(),
                insertion_time: parse_http_date(message, "InsertionTime")?,
                expiration_time: parse_http_date(message, "ExpirationTime")?,
                dequeue_count: parse_number(message.required_text("DequeueCount")?, "DequeueCount")?,
            })
        })
        .collect()
}

fn parse_message_id(message: &XmlElement) -> Result<MessageId, QueueError> {
    message
        .required_text("MessageId")?
        .trim()
        .parse()
        .map_err(|e: crate::error::ValidationError| invalid(e.to_string()))
}

/// `Get Queue ACL` response
pub(crate) fn parse_signed_identifiers(xml: &str) -> Result<SignedIdentifiers, QueueError> {
    if xml.trim().is_empty() {
        return Ok(SignedIdentifiers::new());
    }
    let root = XmlElement::parse(xml)?.expect_root("SignedIdentifiers")?;

    let mut identifiers = BTreeMap::new();
    for identifier in root.children_named("SignedIdentifier") {
        let id = identifier.required_text("Id")?.trim().to_string();
        let policy = identifier.child("AccessPolicy");

        let iso_date = |name: &str| -> Result<Option<Timestamp>, QueueError> {
            match policy.and_then(|p| p.child_text(name)).map(str::trim) {
                Some(text) if !text.is_empty() => text
                    .parse::<Timestamp>()
                    .map(Some)
                    .map_err(|e| invalid(format!("<{}> is not a date: {}", name, e))),
                _ => Ok(None),
            }
        };

        let permissions = policy
            .and_then(|p| p.child_text("Permission"))
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|e: crate::error::ValidationError| invalid(e.to_string()))?;

        identifiers.insert(
            id,
            AccessPolicy {
                start: iso_date("Start")?,
                expiry: iso_date("Expiry")?,
                permissions,
            },
        );
    }

    Ok(identifiers)
}

/// `Get Queue Service Properties` response
pub(crate) fn parse_service_properties(xml: &str) -> Result<ServiceProperties, QueueError> {
    let root = XmlElement::parse(xml)?.expect_root("StorageServiceProperties")?;

    let logging = root
        .child("Logging")
        .map(|logging| {
            Ok::<_, QueueError>(LoggingProperties {
                version: logging.required_text("Version")?.trim().to_string(),
                delete: parse_bool(logging, "Delete")?,
                read: parse_bool(logging, "Read")?,
                write: parse_bool(logging, "Write")?,
                retention_policy: parse_retention_policy(logging)?,
            })
        })
        .transpose()?;

    let cors = root
        .child("Cors")
        .map(|cors| {
            cors.children_named("CorsRule")
                .map(|rule| {
                    Ok(CorsRule {
                        allowed_origins: split_list(rule.required_text("AllowedOrigins")?),
                        allowed_methods: split_list(rule.required_text("AllowedMethods")?),
                        allowed_headers: split_list(rule.child_text("AllowedHeaders").unwrap_or_default()),
                        exposed_headers: split_list(rule.child_text("ExposedHeaders").unwrap_or_default()),
                        max_age_in_seconds: parse_number(
                            rule.required_text("MaxAgeInSeconds")?,
                            "MaxAgeInSeconds",
                        )?,
                    })
                })
                .collect::<Result<Vec<_>, QueueError>>()
        })
        .transpose()?;

    Ok(ServiceProperties {
        logging,
        hour_metrics: root.child("HourMetrics").map(parse_metrics).transpose()?,
        minute_metrics: root.child("MinuteMetrics").map(parse_metrics).transpose()?,
        cors,
    })
}

fn parse_metrics(metrics: &XmlElement) -> Result<MetricsProperties, QueueError> {
    let include_apis = match metrics.child("IncludeAPIs") {
        Some(_) => Some(parse_bool(metrics, "IncludeAPIs")?),
        None => None,
    };

    Ok(MetricsProperties {
        version: metrics.required_text("Version")?.trim().to_string(),
        enabled: parse_bool(metrics, "Enabled")?,
        include_apis,
        retention_policy: parse_retention_policy(metrics)?,
    })
}

fn parse_retention_policy(parent: &XmlElement) -> Result<RetentionPolicy, QueueError> {
    let policy = parent.required_child("RetentionPolicy")?;
    let days = match policy.child_text("Days") {
        Some(days) => Some(parse_number(days, "Days")?),
        None => None,
    };

    Ok(RetentionPolicy {
        enabled: parse_bool(policy, "Enabled")?,
        days,
    })
}

/// `Get Queue Service Stats` response
pub(crate) fn parse_service_stats(xml: &str) -> Result<ServiceStats, QueueError> {
    let root = XmlElement::parse(xml)?.expect_root("StorageServiceStats")?;
    let replication = root.required_child("GeoReplication")?;

    let last_sync_time = match replication.child_text("LastSyncTime").map(str::trim) {
        Some(text) if !text.is_empty() => {
            Some(Timestamp::parse_rfc1123(text).map_err(|e| invalid(e.to_string()))?)
        }
        _ => None,
    };

    Ok(ServiceStats {
        geo_replication: GeoReplication {
            status: replication.required_text("Status")?.trim().to_string(),
            last_sync_time,
        },
    })
}

// ============================================================================
// Request Bodies
// ============================================================================

fn push_element(out: &mut String, name: &str, text: &str) {
    let _ = write!(out, "<{0}>{1}</{0}>", name, escape(text));
}

/// Body of `Put Message` and `Update Message`
pub(crate) fn write_message(text: &str) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<QueueMessage>");
    push_element(&mut out, "MessageText", text);
    out.push_str("</QueueMessage>");
    out
}

/// Body of `Set Queue ACL`
pub(crate) fn write_signed_identifiers(identifiers: &SignedIdentifiers) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<SignedIdentifiers>");
    for (id, policy) in identifiers {
        out.push_str("<SignedIdentifier>");
        push_element(&mut out, "Id", id);
        out.push_str("<AccessPolicy>");
        if let Some(start) = &policy.start {
            push_element(&mut out, "Start", &start.to_iso8601());
        }
        if let Some(expiry) = &policy.expiry {
            push_element(&mut out, "Expiry", &expiry.to_iso8601());
        }
        push_element(&mut out, "Permission", &policy.permissions.to_string());
        out.push_str("</AccessPolicy></SignedIdentifier>");
    }
    out.push_str("</SignedIdentifiers>");
    out
}

/// Body of `Set Queue Service Properties`
pub(crate) fn write_service_properties(properties: &ServiceProperties) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<StorageServiceProperties>");

    if let Some(logging) = &properties.logging {
        out.push_str("<Logging>");
        push_element(&mut out, "Version", &logging.version);
        push_element(&mut out, "Delete", &logging.delete.to_string());
        push_element(&mut out, "Read", &logging.read.to_string());
        push_element(&mut out, "Write", &logging.write.to_string());
        write_retention_policy(&mut out, &logging.retention_policy);
        out.push_str("</Logging>");
    }

    if let Some(metrics) = &properties.hour_metrics {
        write_metrics(&mut out, "HourMetrics", metrics);
    }
    if let Some(metrics) = &properties.minute_metrics {
        write_metrics(&mut out, "MinuteMetrics", metrics);
    }

    if let Some(rules) = &properties.cors {
        out.push_str("<Cors>");
        for rule in rules {
            out.push_str("<CorsRule>");
            push_element(&mut out, "AllowedOrigins", &rule.allowed_origins.join(","));
            push_element(&mut out, "AllowedMethods", &rule.allowed_methods.join(","));
            push_element(&mut out, "MaxAgeInSeconds", &rule.max_age_in_seconds.to_string());
            push_element(&mut out, "ExposedHeaders", &rule.exposed_headers.join(","));
            push_element(&mut out, "AllowedHeaders", &rule.allowed_headers.join(","));
            out.push_str("</CorsRule>");
        }
        out.push_str("</Cors>");
    }

    out.push_str("</StorageServiceProperties>");
    out
}

fn write_metrics(out: &mut String, name: &str, metrics: &MetricsProperties) {
    let _ = write!(out, "<{}>", name);
    push_element(out, "Version", &metrics.version);
    push_element(out, "Enabled", &metrics.enabled.to_string());
    // Rejected by the service while metrics are disabled
    if metrics.enabled {
        if let Some(include_apis) = metrics.include_apis {
            push_element(out, "IncludeAPIs", &include_apis.to_string());
        }
    }
    write_retention_policy(out, &metrics.retention_policy);
    let _ = write!(out, "</{}>", name);
}

fn write_retention_policy(out: &mut String, policy: &RetentionPolicy) {
    out.push_str("<RetentionPolicy>");
    push_element(out, "Enabled", &policy.enabled.to_string());
    if policy.enabled {
        if let Some(days) = policy.days {
            push_element(out, "Days", &days.to_string());
        }
    }
    out.push_str("</RetentionPolicy>");
}
