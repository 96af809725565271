//! Trace spans around calls and their propagation through headers.
//!
//! A [`Tracer`] creates and finishes [`Span`]s. The [`TracePropagator`] owns
//! an optional tracer plus the header names used on the wire, and hands out a
//! [`SpanGuard`] for each call. The guard closes its span exactly once, on the
//! first of an explicit [`SpanGuard::close`] or drop.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::HeaderMap;
use jsonrpc_http_core::{TraceContext, TraceHeaderError, TraceHeaderNames};

/// Event recorded just before the request is sent.
pub const CLIENT_SEND: &str = "cs";

/// Event recorded once the response has been read.
pub const CLIENT_RECV: &str = "cr";

/// Tag holding the serialized call arguments.
pub const PARAMS_TAG: &str = "params";

/// Tag holding the serialized call result.
pub const RESULT_TAG: &str = "result";

/// A timed event inside a span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanEvent {
    pub name: String,
    /// Offset from the start of the span.
    pub offset: Duration,
}

/// An open span.
#[derive(Clone, Debug)]
pub struct Span {
    context: TraceContext,
    tags: Vec<(String, String)>,
    events: Vec<SpanEvent>,
    started: Instant,
}

impl Span {
    pub fn new(context: TraceContext) -> Self {
        Self {
            context,
            tags: Vec::new(),
            events: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Set a tag. A later value for the same key replaces the earlier one.
    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    /// Get the value of a tag.
    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// Record a timed event.
    pub fn event(&mut self, name: impl Into<String>) {
        self.events.push(SpanEvent {
            name: name.into(),
            offset: self.started.elapsed(),
        });
    }

    pub fn events(&self) -> &[SpanEvent] {
        &self.events
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|event| event.name == name)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Creates and finishes spans.
///
/// Implementations must be cheap to call; both methods run on the call path.
pub trait Tracer: Send + Sync {
    /// Start a span named `name`, as a child of `parent` when one is given.
    fn start_span(&self, name: &str, parent: Option<&TraceContext>) -> Span;

    /// Finish a span. Called exactly once per started span.
    fn close_span(&self, span: Span);
}

impl<T: Tracer + ?Sized> Tracer for Arc<T> {
    fn start_span(&self, name: &str, parent: Option<&TraceContext>) -> Span {
        (**self).start_span(name, parent)
    }

    fn close_span(&self, span: Span) {
        (**self).close_span(span)
    }
}

/// Tracer that assigns random ids and logs finished spans.
///
/// Finished spans are written at `debug` level on the
/// `jsonrpc_http_client::tracer` target when the `tracing` feature is on.
#[derive(Clone, Debug)]
pub struct LogTracer {
    process_id: Option<String>,
    sampled: bool,
}

impl Default for LogTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogTracer {
    /// Create a tracer that samples every root span.
    pub fn new() -> Self {
        Self {
            process_id: None,
            sampled: true,
        }
    }

    /// Report `process_id` on every span.
    pub fn process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = Some(process_id.into());
        self
    }

    /// Sampling decision for root spans. Child spans follow their parent.
    pub fn sampled(mut self, sampled: bool) -> Self {
        self.sampled = sampled;
        self
    }
}

impl Tracer for LogTracer {
    fn start_span(&self, name: &str, parent: Option<&TraceContext>) -> Span {
        let mut context = match parent {
            Some(parent) => parent.child(next_id(), name),
            None => TraceContext::root(next_id(), name).with_sampled(self.sampled),
        };
        if let Some(process_id) = &self.process_id {
            context.process_id = Some(process_id.clone());
        }
        Span::new(context)
    }

    fn close_span(&self, span: Span) {
        #[cfg(feature = "tracing")]
        {
            let context = span.context();
            tracing::debug!(
                trace_id = %jsonrpc_http_core::id_to_hex(context.trace_id),
                span_id = %jsonrpc_http_core::id_to_hex(context.span_id),
                parent_id = ?context.parent_id.map(jsonrpc_http_core::id_to_hex),
                name = %context.name,
                sampled = context.sampled,
                elapsed_ms = span.elapsed().as_millis() as u64,
                tags = ?span.tags(),
                events = ?span.events().iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
                "span closed"
            );
        }
        #[cfg(not(feature = "tracing"))]
        drop(span);
    }
}

/// Random non-zero id.
fn next_id() -> u64 {
    loop {
        let id = rand::random::<u64>();
        if id != 0 {
            return id;
        }
    }
}

/// Starts spans for calls and moves their context in and out of headers.
#[derive(Clone, Default)]
pub struct TracePropagator {
    tracer: Option<Arc<dyn Tracer>>,
    names: TraceHeaderNames,
}

impl fmt::Debug for TracePropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracePropagator")
            .field("tracer", &self.tracer.is_some())
            .field("names", &self.names)
            .finish()
    }
}

impl TracePropagator {
    pub fn new(tracer: Option<Arc<dyn Tracer>>, names: TraceHeaderNames) -> Self {
        Self { tracer, names }
    }

    /// A propagator without a tracer. It only ever emits the not-sampled
    /// marker.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    pub fn names(&self) -> &TraceHeaderNames {
        &self.names
    }

    /// Start a span for one call.
    ///
    /// Without a tracer the returned guard is empty and every operation on it
    /// is a no-op.
    pub fn start_span(&self, name: &str, parent: Option<&TraceContext>) -> SpanGuard {
        let span = self
            .tracer
            .as_ref()
            .map(|tracer| tracer.start_span(name, parent));
        SpanGuard {
            tracer: self.tracer.clone(),
            span,
        }
    }

    /// Write the headers for `context`, or the not-sampled marker alone.
    pub fn to_headers(&self, context: Option<&TraceContext>, headers: &mut HeaderMap) {
        self.names.to_headers(context, headers);
    }

    /// Recover a context written by [`to_headers`](Self::to_headers).
    pub fn from_headers(&self, headers: &HeaderMap) -> Result<Option<TraceContext>, TraceHeaderError> {
        self.names.from_headers(headers)
    }
}

/// Owns the span of one call and closes it exactly once.
pub struct SpanGuard {
    tracer: Option<Arc<dyn Tracer>>,
    span: Option<Span>,
}

impl fmt::Debug for SpanGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanGuard").field("span", &self.span).finish()
    }
}

impl SpanGuard {
    /// A guard that holds no span.
    pub fn none() -> Self {
        Self {
            tracer: None,
            span: None,
        }
    }

    /// Context of the open span, if any.
    pub fn context(&self) -> Option<&TraceContext> {
        self.span.as_ref().map(Span::context)
    }

    pub fn is_open(&self) -> bool {
        self.span.is_some()
    }

    pub fn tag(&mut self, key: &str, value: impl Into<String>) {
        if let Some(span) = self.span.as_mut() {
            span.tag(key, value);
        }
    }

    pub fn event(&mut self, name: &str) {
        if let Some(span) = self.span.as_mut() {
            span.event(name);
        }
    }

    /// Close the span now.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(span) = self.span.take() {
            if let Some(tracer) = &self.tracer {
                tracer.close_span(span);
            }
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.finish();
    }
}
