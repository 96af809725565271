//! Trace context and its HTTP header representation.
//!
//! A [`TraceContext`] identifies one span of a distributed trace. It is
//! written into outgoing request headers with [`TraceHeaderNames::to_headers`]
//! and recovered on the receiving side with [`TraceHeaderNames::from_headers`].
//! Ids are rendered as 16 lowercase hex digits. The span name and process id
//! are free text and travel percent-encoded as UTF-8.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode, utf8_percent_encode};

/// Trace id shared by every span of one trace.
pub const TRACE_ID_HEADER: &str = "x-b3-traceid";
/// Id of the span the request belongs to.
pub const SPAN_ID_HEADER: &str = "x-b3-spanid";
/// Id of the calling span. Absent on a root span.
pub const PARENT_ID_HEADER: &str = "x-b3-parentspanid";
/// Sampling decision, [`SAMPLED`] or [`NOT_SAMPLED`].
pub const SAMPLED_HEADER: &str = "x-b3-sampled";
/// Span name, percent-encoded.
pub const SPAN_NAME_HEADER: &str = "x-span-name";
/// Id of the process that created the span, percent-encoded.
pub const PROCESS_ID_HEADER: &str = "x-process-id";

/// Bytes escaped in text headers. Non-ASCII bytes are always escaped.
const TEXT_ESCAPES: &AsciiSet = &CONTROLS.add(b' ').add(b'%');

/// Value of the sampled header for a sampled span.
pub const SAMPLED: &str = "1";
/// Value of the sampled header for a span that is not exported.
pub const NOT_SAMPLED: &str = "0";

/// Identity of one span in a distributed trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub sampled: bool,
    pub process_id: Option<String>,
}

impl TraceContext {
    /// Create a sampled root context whose span id equals its trace id.
    pub fn root(trace_id: u64, name: impl Into<String>) -> Self {
        Self {
            trace_id,
            span_id: trace_id,
            parent_id: None,
            name: name.into(),
            sampled: true,
            process_id: None,
        }
    }

    /// Create a context for a child span of `self`.
    pub fn child(&self, span_id: u64, name: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id,
            parent_id: Some(self.span_id),
            name: name.into(),
            sampled: self.sampled,
            process_id: self.process_id.clone(),
        }
    }

    /// Set the sampling decision.
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = sampled;
        self
    }

    /// Set the process id reported alongside the span.
    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = Some(process_id.into());
        self
    }
}

/// Errors recovering a [`TraceContext`] from headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceHeaderError {
    #[error("trace header {header} is missing")]
    Missing { header: HeaderName },

    #[error("trace header {header} is not a valid id: {value:?}")]
    InvalidId { header: HeaderName, value: String },

    #[error("trace header {header} is not valid visible ASCII")]
    NotAscii { header: HeaderName },

    #[error("trace header {header} is not percent-encoded UTF-8")]
    InvalidText { header: HeaderName },
}

/// Names of the headers carrying a [`TraceContext`].
///
/// The defaults are the B3 names plus span-name and process-id headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceHeaderNames {
    pub trace_id: HeaderName,
    pub span_id: HeaderName,
    pub parent_id: HeaderName,
    pub sampled: HeaderName,
    pub span_name: HeaderName,
    pub process_id: HeaderName,
}

impl Default for TraceHeaderNames {
    fn default() -> Self {
        Self {
            trace_id: HeaderName::from_static(TRACE_ID_HEADER),
            span_id: HeaderName::from_static(SPAN_ID_HEADER),
            parent_id: HeaderName::from_static(PARENT_ID_HEADER),
            sampled: HeaderName::from_static(SAMPLED_HEADER),
            span_name: HeaderName::from_static(SPAN_NAME_HEADER),
            process_id: HeaderName::from_static(PROCESS_ID_HEADER),
        }
    }
}

impl TraceHeaderNames {
    /// Write `context` into `headers`.
    ///
    /// With no context only the sampled header is written, set to
    /// [`NOT_SAMPLED`], so downstream services do not start a sampled trace.
    /// [`from_headers`](Self::from_headers) recovers exactly what was written.
    pub fn to_headers(&self, context: Option<&TraceContext>, headers: &mut HeaderMap) {
        let Some(context) = context else {
            headers.insert(
                self.sampled.clone(),
                HeaderValue::from_static(NOT_SAMPLED),
            );
            return;
        };

        headers.insert(self.trace_id.clone(), id_value(context.trace_id));
        headers.insert(self.span_id.clone(), id_value(context.span_id));
        headers.insert(
            self.sampled.clone(),
            HeaderValue::from_static(if context.sampled { SAMPLED } else { NOT_SAMPLED }),
        );
        headers.insert(self.span_name.clone(), text_value(&context.name));
        if let Some(parent_id) = context.parent_id {
            headers.insert(self.parent_id.clone(), id_value(parent_id));
        }
        if let Some(process_id) = &context.process_id {
            headers.insert(self.process_id.clone(), text_value(process_id));
        }
    }

    /// Recover a context from `headers`.
    ///
    /// Returns `Ok(None)` when the span id header is absent or empty, which is
    /// what a request carrying only the not-sampled marker looks like.
    pub fn from_headers(&self, headers: &HeaderMap) -> Result<Option<TraceContext>, TraceHeaderError> {
        let span_id = match self.ascii(headers, &self.span_id)? {
            Some(value) if !value.is_empty() => parse_id(&self.span_id, value)?,
            _ => return Ok(None),
        };
        let trace_id = match self.ascii(headers, &self.trace_id)? {
            Some(value) => parse_id(&self.trace_id, value)?,
            None => {
                return Err(TraceHeaderError::Missing {
                    header: self.trace_id.clone(),
                });
            }
        };
        let parent_id = match self.ascii(headers, &self.parent_id)? {
            Some(value) if !value.is_empty() => Some(parse_id(&self.parent_id, value)?),
            _ => None,
        };
        let sampled = self.ascii(headers, &self.sampled)? == Some(SAMPLED);
        let name = self.text(headers, &self.span_name)?.unwrap_or_default();
        let process_id = self.text(headers, &self.process_id)?;

        Ok(Some(TraceContext {
            trace_id,
            span_id,
            parent_id,
            name,
            sampled,
            process_id,
        }))
    }

    /// An id or flag header, surrounding whitespace ignored.
    fn ascii<'a>(
        &self,
        headers: &'a HeaderMap,
        name: &HeaderName,
    ) -> Result<Option<&'a str>, TraceHeaderError> {
        headers
            .get(name)
            .map(|value| {
                value
                    .to_str()
                    .map(str::trim)
                    .map_err(|_| TraceHeaderError::NotAscii {
                        header: name.clone(),
                    })
            })
            .transpose()
    }

    /// A percent-encoded text header, taken verbatim.
    fn text(
        &self,
        headers: &HeaderMap,
        name: &HeaderName,
    ) -> Result<Option<String>, TraceHeaderError> {
        headers
            .get(name)
            .map(|value| {
                percent_decode(value.as_bytes())
                    .decode_utf8()
                    .map(|text| text.into_owned())
                    .map_err(|_| TraceHeaderError::InvalidText {
                        header: name.clone(),
                    })
            })
            .transpose()
    }
}

/// Render an id as 16 lowercase hex digits.
pub fn id_to_hex(id: u64) -> String {
    format!("{id:016x}")
}

/// Parse a hex id of at most 16 digits.
pub fn hex_to_id(value: &str) -> Option<u64> {
    if value.is_empty() || value.len() > 16 {
        return None;
    }
    u64::from_str_radix(value, 16).ok()
}

fn id_value(id: u64) -> HeaderValue {
    // Hex digits are always a valid header value.
    HeaderValue::from_str(&id_to_hex(id)).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

fn text_value(text: &str) -> HeaderValue {
    let encoded = utf8_percent_encode(text, TEXT_ESCAPES).to_string();
    // Only visible ASCII remains after encoding.
    HeaderValue::from_str(&encoded).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn parse_id(header: &HeaderName, value: &str) -> Result<u64, TraceHeaderError> {
    hex_to_id(value).ok_or_else(|| TraceHeaderError::InvalidId {
        header: header.clone(),
        value: value.to_string(),
    })
}
