//! Resolved backend targets.

use std::fmt;

use metrics::Histogram;
use url::Url;

use crate::observability::metrics::TARGET_REQUEST_DURATION;

/// A backend base URL selected by the routing table.
///
/// Each target carries its own latency instrument, labelled with the name
/// of the route it belongs to.
pub struct Target {
    name: String,
    url: Url,
    timer: Histogram,
}

impl Target {
    /// Create a target. `url` must be an absolute base URL.
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        let name = name.into();
        let timer = metrics::histogram!(TARGET_REQUEST_DURATION, "target" => name.clone());
        Self { name, url, timer }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Per-target latency instrument.
    pub fn timer(&self) -> &Histogram {
        &self.timer
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .finish()
    }
}
