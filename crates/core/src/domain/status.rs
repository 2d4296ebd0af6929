use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connectivity summary derived from store traffic. `connected` mirrors the
/// outcome of the messaging client's most recent call; the watermarks only
/// ever move forward.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_inbound: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outbound: Option<DateTime<Utc>>,
}

impl Status {
    /// Advances the inbound watermark, never letting it regress.
    pub fn record_inbound(&mut self, at: DateTime<Utc>) {
        self.last_inbound = Some(self.last_inbound.map_or(at, |prior| prior.max(at)));
    }

    /// Advances the outbound watermark, never letting it regress.
    pub fn record_outbound(&mut self, at: DateTime<Utc>) {
        self.last_outbound = Some(self.last_outbound.map_or(at, |prior| prior.max(at)));
    }
}
