//! Terminal rendering and argument parsing for the Modboard console.

use modboard_sync::{Action, Renderer};
use modboard_types::{AnalyticsPanel, DashboardStats, EntityKind, Record, RecordId, TimeRange};
use serde_json::{Map, Value};
use std::fmt::Write as _;

// Fields tried in order when labelling a record.
const LABEL_FIELDS: &[&str] = &["name", "title", "username", "businessName", "email", "reason"];

/// Fields matched by `search` for each screen.
pub fn search_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Users => &["name", "username", "email"],
        EntityKind::Posts => &["title", "content", "author"],
        EntityKind::Communities => &["name", "description"],
        EntityKind::Events => &["title", "location", "organizer"],
        EntityKind::Locations => &["name", "address", "city"],
        EntityKind::Advertising => &["title", "advertiser"],
        EntityKind::Reports => &["reason", "type", "reportedBy"],
        EntityKind::Verification => &["name", "email", "type"],
        EntityKind::Business => &["businessName", "owner", "category"],
    }
}

/// Short human label for a record.
pub fn label(record: &Record) -> &str {
    LABEL_FIELDS
        .iter()
        .find_map(|field| record.get_str(field).filter(|s| !s.is_empty()))
        .unwrap_or("-")
}

/// One screen as plain text: a header line, then one line per record.
pub fn render_screen(kind: EntityKind, records: &[Record]) -> String {
    let mut out = format!("== {kind} ({}) ==\n", records.len());
    for record in records {
        let status = record.status().unwrap_or("");
        let _ = writeln!(out, "{:>8}  {:<10}  {}", record.id(), status, label(record));
    }
    out
}

/// Dashboard counters as plain text.
pub fn render_stats(stats: &DashboardStats) -> String {
    let rows = [
        ("users", stats.total_users),
        ("posts", stats.total_posts),
        ("communities", stats.total_communities),
        ("events", stats.total_events),
        ("locations", stats.total_locations),
        ("views", stats.total_views),
        ("likes", stats.total_likes),
    ];
    let mut out = String::new();
    for (name, count) in rows {
        let _ = writeln!(out, "{name:<12} {count}");
    }
    let _ = writeln!(out, "{:<12} {:.1}%", "growth", stats.growth_rate);
    out
}

/// Redraws the whole screen on stdout after every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn render(&self, kind: EntityKind, records: &[Record]) {
        println!("{}", render_screen(kind, records));
    }
}

/// Parses `7d`, `30d`, `90d` or `1y`.
pub fn parse_range(s: &str) -> Result<TimeRange, String> {
    match s {
        "7d" => Ok(TimeRange::Week),
        "30d" => Ok(TimeRange::Month),
        "90d" => Ok(TimeRange::Quarter),
        "1y" => Ok(TimeRange::Year),
        other => Err(format!("unknown range `{other}` (expected 7d, 30d, 90d or 1y)")),
    }
}

/// Parses an analytics panel name such as `top-communities`.
pub fn parse_panel(s: &str) -> Result<AnalyticsPanel, String> {
    AnalyticsPanel::ALL
        .into_iter()
        .find(|panel| panel.as_str() == s)
        .ok_or_else(|| {
            let names: Vec<&str> = AnalyticsPanel::ALL.iter().map(|p| p.as_str()).collect();
            format!("unknown panel `{s}` (expected one of {})", names.join(", "))
        })
}

/// Parses a `field=value` assignment. The value is read as JSON when it
/// parses, otherwise as a plain string.
pub fn parse_assignment(s: &str) -> Result<(String, Value), String> {
    let (field, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got `{s}`"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("empty field name in `{s}`"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field.to_string(), value))
}

/// Maps a CLI verb on a screen to a moderation action.
pub fn build_action(
    kind: EntityKind,
    verb: &str,
    id: RecordId,
    fields: Map<String, Value>,
) -> Result<Action, String> {
    let action = match (verb, kind) {
        ("delete", _) => Action::Delete(id),
        ("update", _) if fields.is_empty() => {
            return Err("update needs at least one --set field=value".to_string());
        }
        ("update", _) => Action::Update(id, fields),
        ("ban", EntityKind::Users) => Action::BanUser(id),
        ("unban", EntityKind::Users) => Action::UnbanUser(id),
        ("approve", EntityKind::Posts) => Action::ApprovePost(id),
        ("approve", EntityKind::Verification) => Action::ApproveVerification(id),
        ("flag", EntityKind::Posts) => Action::FlagPost(id),
        ("resolve", EntityKind::Reports) => Action::ResolveReport(id),
        ("dismiss", EntityKind::Reports) => Action::DismissReport(id),
        ("reject", EntityKind::Verification) => Action::RejectVerification(id),
        ("verify", EntityKind::Business) => Action::VerifyBusiness(id),
        ("assign", EntityKind::Business) => Action::AssignBusiness(id),
        ("unassign", EntityKind::Business) => Action::UnassignBusiness(id),
        (verb, kind) => return Err(format!("`{verb}` is not available on {kind}")),
    };
    Ok(action)
}
