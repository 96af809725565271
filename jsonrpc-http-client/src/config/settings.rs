//! Serde-loadable client settings.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client settings as they appear in a configuration file.
///
/// Exactly one of `url` and `service_id` must be set. Timeouts are in
/// milliseconds; `0` disables the timeout and an absent value keeps the
/// default. `max_response_bytes` follows the same rule.
///
/// ```json
/// {
///   "service_id": "calc-service",
///   "service_path": "calculator",
///   "headers": { "x-caller": "billing" },
///   "read_timeout_ms": 5000
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Static endpoint URL.
    pub url: Option<String>,
    /// Service id looked up in the discovery registry.
    pub service_id: Option<String>,
    /// Logical path of the service when `service_id` is set.
    pub service_path: Option<String>,
    pub content_type: Option<String>,
    /// Default headers sent with every call.
    pub headers: BTreeMap<String, String>,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    /// HTTP forward proxy, `http://host:port`.
    pub proxy: Option<String>,
    pub follow_redirects: Option<bool>,
    pub max_redirects: Option<usize>,
    pub max_response_bytes: Option<usize>,
    pub danger_accept_invalid_hostnames: bool,
    pub danger_accept_invalid_certs: bool,
}

impl ClientSettings {
    pub(crate) fn connect_timeout(&self) -> Option<Option<Duration>> {
        self.connect_timeout_ms.map(millis)
    }

    pub(crate) fn read_timeout(&self) -> Option<Option<Duration>> {
        self.read_timeout_ms.map(millis)
    }

    pub(crate) fn max_response_size(&self) -> Option<Option<usize>> {
        self.max_response_bytes.map(|max| (max > 0).then_some(max))
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
