use modboard_console::{
    build_action, label, parse_assignment, parse_panel, parse_range, render_screen, render_stats,
    search_fields,
};
use modboard_store::EntityStore;
use modboard_sync::Action;
use modboard_types::{AnalyticsPanel, DashboardStats, EntityKind, Record, RecordId, TimeRange};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};

fn record(value: Value) -> Record {
    Record::from_json(value).unwrap()
}

// ── Rendering ────────────────────────────────────────────────────

#[test]
fn screen_lists_id_status_and_label() {
    let records = vec![
        record(json!({"id": 1, "status": "pending", "title": "Hello"})),
        record(json!({"id": "u-2", "email": "a@b.c"})),
    ];
    let text = render_screen(EntityKind::Posts, &records);
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "== posts (2) ==");
    assert_eq!(lines[1], "       1  pending     Hello");
    assert_eq!(lines[2], "     u-2              a@b.c");
}

#[test]
fn empty_screen_has_only_header() {
    assert_eq!(render_screen(EntityKind::Reports, &[]), "== reports (0) ==\n");
}

#[test]
fn label_prefers_name_then_falls_back() {
    assert_eq!(label(&record(json!({"id": 1, "title": "T", "name": "N"}))), "N");
    assert_eq!(label(&record(json!({"id": 1, "name": "", "username": "mod"}))), "mod");
    assert_eq!(label(&record(json!({"id": 1}))), "-");
}

#[test]
fn stats_render_every_counter() {
    let stats = DashboardStats {
        total_users: 12,
        growth_rate: 3.25,
        ..DashboardStats::default()
    };
    let text = render_stats(&stats);
    assert!(text.contains("users        12"));
    assert!(text.contains("likes        0"));
    assert!(text.contains("growth       3.2%") || text.contains("growth       3.3%"));
}

// ── Argument parsing ─────────────────────────────────────────────

#[test]
fn ranges() {
    assert_eq!(parse_range("7d"), Ok(TimeRange::Week));
    assert_eq!(parse_range("1y"), Ok(TimeRange::Year));
    assert!(parse_range("2w").is_err());
}

#[test]
fn panels() {
    assert_eq!(parse_panel("top-communities"), Ok(AnalyticsPanel::TopCommunities));
    assert_eq!(parse_panel("stats"), Ok(AnalyticsPanel::Stats));
    let err = parse_panel("growth").unwrap_err();
    assert!(err.contains("user-growth"), "{err}");
}

#[test]
fn assignments_read_json_or_text() {
    assert_eq!(parse_assignment("verified=true"), Ok(("verified".into(), json!(true))));
    assert_eq!(parse_assignment("capacity=40"), Ok(("capacity".into(), json!(40))));
    assert_eq!(parse_assignment("title=Spring fair"), Ok(("title".into(), json!("Spring fair"))));
    assert_eq!(parse_assignment("note=a=b"), Ok(("note".into(), json!("a=b"))));
    assert!(parse_assignment("novalue").is_err());
    assert!(parse_assignment("=x").is_err());
}

#[test]
fn verbs_resolve_per_screen() {
    let id = RecordId::from(3);
    assert_eq!(
        build_action(EntityKind::Posts, "approve", id.clone(), Map::new()),
        Ok(Action::ApprovePost(id.clone()))
    );
    assert_eq!(
        build_action(EntityKind::Verification, "approve", id.clone(), Map::new()),
        Ok(Action::ApproveVerification(id.clone()))
    );
    assert_eq!(
        build_action(EntityKind::Locations, "delete", id.clone(), Map::new()),
        Ok(Action::Delete(id.clone()))
    );
    assert_eq!(
        build_action(EntityKind::Business, "assign", id.clone(), Map::new()),
        Ok(Action::AssignBusiness(id.clone()))
    );
    assert_eq!(
        build_action(EntityKind::Business, "unassign", id.clone(), Map::new()),
        Ok(Action::UnassignBusiness(id.clone()))
    );
    assert!(build_action(EntityKind::Users, "assign", id.clone(), Map::new()).is_err());
    assert!(build_action(EntityKind::Posts, "ban", id.clone(), Map::new()).is_err());
    assert!(build_action(EntityKind::Events, "update", id.clone(), Map::new()).is_err());

    let mut fields = Map::new();
    fields.insert("title".into(), json!("x"));
    assert_eq!(
        build_action(EntityKind::Events, "update", id.clone(), fields.clone()),
        Ok(Action::Update(id, fields))
    );
}

// ── Search ───────────────────────────────────────────────────────

#[test]
fn search_uses_screen_fields() {
    let mut store = EntityStore::new(EntityKind::Users);
    store.replace_all(vec![
        record(json!({"id": 1, "name": "Ada", "email": "ada@example.com"})),
        record(json!({"id": 2, "name": "Grace", "bio": "ada fan"})),
    ]);

    let hits = store.search("ADA", search_fields(EntityKind::Users));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id(), &RecordId::from(1));
}
