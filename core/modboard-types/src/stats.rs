//! Dashboard aggregates.

use serde::{Deserialize, Serialize};

/// Headline counters shown on the dashboard. Counters the backend omits
/// read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_posts: u64,
    pub total_communities: u64,
    pub total_events: u64,
    pub total_locations: u64,
    pub total_views: u64,
    pub total_likes: u64,
    pub growth_rate: f64,
}

impl DashboardStats {
    /// Reads stats from a payload, tolerating missing or mistyped counters.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        let counter = |name: &str| value.get(name).and_then(serde_json::Value::as_u64).unwrap_or(0);
        Self {
            total_users: counter("totalUsers"),
            total_posts: counter("totalPosts"),
            total_communities: counter("totalCommunities"),
            total_events: counter("totalEvents"),
            total_locations: counter("totalLocations"),
            total_views: counter("totalViews"),
            total_likes: counter("totalLikes"),
            growth_rate: value
                .get("growthRate")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0),
        }
    }
}

/// Time window for analytics queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl TimeRange {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Quarter => "90d",
            Self::Year => "1y",
        }
    }
}

/// One analytics endpoint. Every panel takes the same `range` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsPanel {
    Stats,
    UserGrowth,
    PostEngagement,
    TopCommunities,
    RecentActivity,
}

impl AnalyticsPanel {
    pub const ALL: [AnalyticsPanel; 5] = [
        Self::Stats,
        Self::UserGrowth,
        Self::PostEngagement,
        Self::TopCommunities,
        Self::RecentActivity,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stats => "stats",
            Self::UserGrowth => "user-growth",
            Self::PostEngagement => "post-engagement",
            Self::TopCommunities => "top-communities",
            Self::RecentActivity => "recent-activity",
        }
    }

    /// `/admin/analytics/{panel}?range={range}`
    #[must_use]
    pub fn path(&self, range: TimeRange) -> String {
        format!("/admin/analytics/{}?range={}", self.as_str(), range.as_str())
    }
}
