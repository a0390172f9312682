//! End-to-end scenarios against the in-memory engine.

use structlink_core::{AdapterConfig, PushMode, SyncAction, SyncError};
use structlink_model::{AttributeValue, DomainObject, Kind, Point3, Vector3};
use structlink_testkit::prelude::*;

fn endpoint(bar: &DomainObject, attribute: &str) -> DomainObject {
    match bar.attribute(attribute) {
        Some(AttributeValue::Object(node)) => (**node).clone(),
        other => panic!("{attribute} is not an embedded node: {other:?}"),
    }
}

fn ring_objects() -> Vec<DomainObject> {
    let (mut objects, bars) = ring();
    objects.extend(bars);
    objects
}

fn external_names(objects: &[DomainObject]) -> Vec<String> {
    let mut names: Vec<String> = objects
        .iter()
        .filter_map(|o| o.external_name().map(str::to_string))
        .collect();
    names.sort();
    names
}

#[test]
fn ring_round_trip() {
    init_tracing();
    let fixture = TestEngine::new();
    let mut objects = ring_objects();
    let expected: Vec<Point3> = objects[..4].iter().filter_map(DomainObject::position).collect();

    let report = fixture.push(&mut objects).unwrap();
    assert!(report.is_success());
    assert_eq!(report.count(SyncAction::Created), 8);
    assert_eq!(fixture.engine.object_count(Kind::Node), 4);
    assert_eq!(fixture.engine.object_count(Kind::Bar), 4);

    let pulled = fixture.pull(Kind::Bar, None).unwrap();
    assert!(pulled.is_success());
    assert_eq!(pulled.objects.len(), 4);
    for (i, bar) in pulled.objects.iter().enumerate() {
        let start = endpoint(bar, "start").position().unwrap();
        let end = endpoint(bar, "end").position().unwrap();
        assert!(start.distance(&expected[i]) <= 1e-3);
        assert!(end.distance(&expected[(i + 1) % 4]) <= 1e-3);
    }

    // Consecutive bars embed the same pulled node
    for i in 0..4 {
        let end = endpoint(&pulled.objects[i], "end");
        let next_start = endpoint(&pulled.objects[(i + 1) % 4], "start");
        assert_eq!(end.id(), next_start.id());
        assert_eq!(end.external_name(), next_start.external_name());
    }

    let again = fixture.pull(Kind::Bar, None).unwrap();
    assert_eq!(external_names(&pulled.objects), external_names(&again.objects));
}

#[test]
fn second_push_is_a_no_op() {
    let fixture = TestEngine::new();
    let mut objects = ring_objects();
    fixture.push(&mut objects).unwrap();
    fixture.engine.reset_calls();

    let report = fixture.push(&mut objects).unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(SyncAction::Unchanged), 8);
    assert_eq!(fixture.engine.calls().mutating(), 0);
    assert_eq!(fixture.engine.object_count(Kind::Node), 4);
}

#[test]
fn unchanged_frame_pushed_by_a_new_session_is_matched() {
    let fixture = TestEngine::new();
    fixture.push(&mut ring_objects()).unwrap();

    // Fresh objects, fresh adapter: nothing is known but the geometry.
    let adapter = fixture.reopen(AdapterConfig::default());
    fixture.engine.reset_calls();
    let mut objects = ring_objects();
    let report = adapter.push(&mut objects).unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(SyncAction::Unchanged), 8);
    assert_eq!(fixture.engine.calls().mutating(), 0);
    assert_eq!(fixture.engine.object_count(Kind::Bar), 4);
}

#[test]
fn story_shift_uses_one_transform() {
    let fixture = TestEngine::new();
    let mut nodes = story_grid(3, 3, 5.0, 0.0);
    fixture.push(&mut nodes).unwrap();
    fixture.engine.reset_calls();

    shift(&mut nodes, Vector3::new(0.0, 0.0, 3.0));
    let report = fixture.push(&mut nodes).unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(SyncAction::Updated), 9);
    assert_eq!(report.transform_groups.len(), 1);
    assert_eq!(report.transform_groups[0].members.len(), 9);
    assert_eq!(fixture.engine.calls().transform, 1);
    assert_eq!(fixture.engine.calls().set, 0);
    assert_eq!(fixture.engine.calls().mutating(), 1);
    for node in &nodes {
        let name = node.external_name().unwrap();
        let stored = fixture.engine.attributes_of(Kind::Node, name).unwrap()["position"]
            .as_point()
            .unwrap();
        assert!(stored.distance(&node.position().unwrap()) <= 1e-9);
    }
}

#[test]
fn mixed_shift_groups_by_axis() {
    let fixture = TestEngine::new();
    let mut nodes = story_grid(3, 3, 5.0, 0.0);
    fixture.push(&mut nodes).unwrap();
    fixture.engine.reset_calls();

    shift(&mut nodes[..4], Vector3::new(1.0, 0.0, 3.0));
    shift(&mut nodes[4..], Vector3::new(0.0, 0.0, 3.0));
    let report = fixture.push(&mut nodes).unwrap();

    assert!(report.is_success());
    assert_eq!(fixture.engine.calls().transform, 2);
    assert_eq!(fixture.stats().transform_calls, 2);
}

fn stored_position(fixture: &TestEngine, node: &DomainObject) -> Point3 {
    let name = node.external_name().unwrap();
    fixture.engine.attributes_of(Kind::Node, name).unwrap()["position"]
        .as_point()
        .unwrap()
}

#[test]
fn small_diagonal_move_is_pushed() {
    let fixture = TestEngine::new();
    let mut nodes = vec![DomainObject::node(Point3::ORIGIN)];
    fixture.push(&mut nodes).unwrap();

    // Each component is under the tolerance but the distance is not.
    shift(&mut nodes, Vector3::new(9e-4, 9e-4, 9e-4));
    let report = fixture.push(&mut nodes).unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(SyncAction::Updated), 1);
    let target = nodes[0].position().unwrap();
    assert!(stored_position(&fixture, &nodes[0]).distance(&target) <= 1e-9);

    // A new session sees the moved node as already in place.
    let adapter = fixture.reopen(AdapterConfig::default());
    fixture.engine.reset_calls();
    let mut fresh = vec![DomainObject::node(target)];
    let again = adapter.push(&mut fresh).unwrap();
    assert_eq!(again.count(SyncAction::Unchanged), 1);
    assert_eq!(fixture.engine.calls().mutating(), 0);
    assert_eq!(fixture.engine.object_count(Kind::Node), 1);
}

#[test]
fn small_diagonal_move_agrees_without_batching() {
    let fixture = TestEngine::with_config(AdapterConfig::default().with_batch_position_updates(false));
    let mut nodes = vec![DomainObject::node(Point3::ORIGIN)];
    fixture.push(&mut nodes).unwrap();

    shift(&mut nodes, Vector3::new(9e-4, 9e-4, 9e-4));
    let report = fixture.push(&mut nodes).unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(SyncAction::Updated), 1);
    assert!(stored_position(&fixture, &nodes[0]).distance(&nodes[0].position().unwrap()) <= 1e-9);
}

#[test]
fn failed_group_leaves_selection_empty() {
    let fixture = TestEngine::new();
    let mut nodes = story_grid(6, 1, 2.0, 0.0);
    fixture.push(&mut nodes).unwrap();
    fixture.engine.reset_calls();
    fixture.engine.fail_transform_call(2);

    shift(&mut nodes[0..2], Vector3::new(1.0, 0.0, 0.0));
    shift(&mut nodes[2..4], Vector3::new(0.0, 1.0, 0.0));
    shift(&mut nodes[4..6], Vector3::new(0.0, 0.0, 1.0));
    let report = fixture.push(&mut nodes).unwrap();

    assert!(!report.is_success());
    assert!(fixture.engine.selection().is_empty());
    assert_eq!(report.transform_groups.len(), 3);
    assert_eq!(
        report.transform_groups.iter().filter(|g| !g.is_success()).count(),
        1
    );
    assert_eq!(report.count(SyncAction::Updated), 4);
    assert_eq!(report.failures.len(), 2);
    for node in &nodes[2..4] {
        assert!(matches!(
            report.failure_of(node.id()).unwrap().error,
            SyncError::TransformFailed { .. }
        ));
        let name = node.external_name().unwrap();
        let stored = fixture.engine.attributes_of(Kind::Node, name).unwrap()["position"]
            .as_point()
            .unwrap();
        assert_eq!(stored.y, 0.0);
    }
}

#[test]
fn names_stay_unique_across_sessions() {
    let fixture = TestEngine::new();
    fixture.push(&mut story_grid(3, 1, 1.0, 0.0)).unwrap();

    let other = fixture.reopen(AdapterConfig::default());
    other.push(&mut story_grid(2, 1, 1.0, 10.0)).unwrap();

    let mut late = vec![DomainObject::node(Point3::new(0.0, 0.0, 20.0))];
    fixture.push(&mut late).unwrap();

    let names = fixture.engine.names(Kind::Node);
    assert_eq!(names.len(), 6);
    assert_eq!(late[0].external_name(), Some("6"));
}

#[test]
fn stale_counter_recovers_from_collision() {
    let fixture = TestEngine::with_config(AdapterConfig::new().with_refresh_ids_per_push(false));
    fixture.push(&mut story_grid(3, 1, 1.0, 0.0)).unwrap();

    let other = fixture.reopen(AdapterConfig::default());
    other.push(&mut story_grid(2, 1, 1.0, 10.0)).unwrap();

    let mut late = vec![DomainObject::node(Point3::new(0.0, 0.0, 20.0))];
    let report = fixture.push(&mut late).unwrap();

    assert!(report.is_success());
    assert!(!report.warnings.is_empty());
    assert_eq!(late[0].external_name(), Some("6"));
    assert_eq!(fixture.engine.object_count(Kind::Node), 6);
}

#[test]
fn tolerance_chain_keeps_first_seen() {
    let fixture = TestEngine::new();
    let mut nodes = vec![
        DomainObject::node(Point3::new(0.0, 0.0, 0.0)),
        DomainObject::node(Point3::new(0.0008, 0.0, 0.0)),
        DomainObject::node(Point3::new(0.0016, 0.0, 0.0)),
    ];

    let report = fixture.push(&mut nodes).unwrap();

    assert!(report.is_success());
    assert_eq!(fixture.engine.object_count(Kind::Node), 2);
    assert_eq!(report.outcome_of(nodes[1].id()).unwrap().action, SyncAction::Merged);
    assert_eq!(nodes[1].external_name(), nodes[0].external_name());
    assert_ne!(nodes[2].external_name(), nodes[0].external_name());
}

#[test]
fn bars_alone_bring_their_nodes() {
    let fixture = TestEngine::new();
    let (_, mut bars) = ring();

    let report = fixture.push(&mut bars).unwrap();

    assert!(report.is_success());
    assert_eq!(fixture.engine.object_count(Kind::Node), 4);
    assert_eq!(report.count(SyncAction::Created), 8);
    for bar in &bars {
        assert!(endpoint(bar, "start").external_name().is_some());
        assert!(endpoint(bar, "end").external_name().is_some());
    }

    let removed = fixture.remove_objects(&mut bars).unwrap();
    assert_eq!(removed.count(SyncAction::Removed), 4);
    assert_eq!(fixture.engine.object_count(Kind::Bar), 0);
    assert_eq!(fixture.engine.object_count(Kind::Node), 4);
}

#[test]
fn pulled_objects_can_be_updated() {
    let fixture = TestEngine::new();
    let (mut nodes, _) = FrameFixture::from_json(PORTAL_JSON).unwrap().build();
    fixture.push(&mut nodes).unwrap();

    let mut pulled = fixture.pull(Kind::Node, None).unwrap().objects;
    let top = pulled
        .iter_mut()
        .find(|n| n.position() == Some(Point3::new(5.0, 0.0, 3.0)))
        .unwrap();
    top.set_attribute("support", "pinned");

    let report = fixture.update(Kind::Node, &mut pulled).unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(SyncAction::Updated), 1);
    assert_eq!(report.count(SyncAction::Unchanged), 5);
}

#[test]
fn create_non_existing_only_adds_missing() {
    let fixture = TestEngine::new();
    fixture.push(&mut story_grid(2, 1, 1.0, 0.0)).unwrap();
    fixture.engine.reset_calls();

    let mut nodes = story_grid(3, 1, 1.0, 0.0);
    let report = fixture
        .push_with_mode(&mut nodes, PushMode::CreateNonExisting)
        .unwrap();

    assert_eq!(report.count(SyncAction::Unchanged), 2);
    assert_eq!(report.count(SyncAction::Created), 1);
    assert_eq!(fixture.engine.calls().add, 1);
}

#[test]
fn failed_listing_fails_only_that_kind() {
    let fixture = TestEngine::new();
    fixture.engine.fail_list_names(Kind::Bar);
    let mut objects = ring_objects();

    let report = fixture.push(&mut objects).unwrap();

    assert_eq!(report.count(SyncAction::Created), 4);
    assert_eq!(report.failures.len(), 4);
    assert!(report.failures.iter().all(|f| f.kind == Kind::Bar));
    assert_eq!(fixture.engine.object_count(Kind::Node), 4);
    assert_eq!(fixture.engine.object_count(Kind::Bar), 0);
}

#[test]
fn kind_names_from_callers() {
    let fixture = TestEngine::new();
    let kind: Kind = "Bar".parse().unwrap();
    assert!(fixture.pull(kind, None).unwrap().is_success());

    let err: SyncError = "Beam".parse::<Kind>().unwrap_err().into();
    assert_eq!(err, SyncError::UnsupportedKind("Beam".into()));
}

#[test]
fn engine_going_away_aborts() {
    let fixture = TestEngine::new();
    let mut objects = ring_objects();
    fixture.push(&mut objects).unwrap();
    fixture.engine.set_ready(false);

    assert_eq!(fixture.push(&mut objects), Err(SyncError::EngineNotReady));
    assert_eq!(fixture.pull(Kind::Bar, None), Err(SyncError::EngineNotReady));
}
