use reslink_core::db::open_db_in_memory;
use reslink_core::{
    DeleteOutcome, ItemCategory, ItemRef, PropagationMode, Resource, ResourceChanges,
    ResourceDraft, ResourceKind, ResourceServiceError, ResourceSession, SessionOptions,
    SharedField, UpdateOutcome,
};
use rusqlite::Connection;
use uuid::Uuid;

struct Chain {
    v1: Resource,
    v2: Resource,
    v3: Resource,
}

/// V1 on item A, imported into B as V2, and V2 imported into C as V3.
fn import_chain(session: &mut ResourceSession<'_>, kind: ResourceKind) -> Chain {
    let v1 = session
        .create_resource(kind, Uuid::new_v4(), draft_for(kind))
        .unwrap();
    let v2 = session.import_resource(kind, v1.id, Uuid::new_v4()).unwrap();
    let v3 = session.import_resource(kind, v2.id, Uuid::new_v4()).unwrap();
    Chain { v1, v2, v3 }
}

fn draft_for(kind: ResourceKind) -> ResourceDraft {
    match kind {
        ResourceKind::Variable => ResourceDraft::variable("userName", "string"),
        ResourceKind::Function => ResourceDraft::function("loadUser", "Promise<User>"),
        ResourceKind::Object => ResourceDraft::object("User", "interface"),
        ResourceKind::Effect => ResourceDraft::effect("[userId]", "loadUser(userId)"),
    }
}

fn edited_field(kind: ResourceKind) -> SharedField {
    match kind {
        ResourceKind::Variable => SharedField::DataType,
        ResourceKind::Function => SharedField::ReturnType,
        ResourceKind::Object => SharedField::Properties,
        ResourceKind::Effect => SharedField::Code,
    }
}

fn stored(conn: &Connection, kind: ResourceKind, id: Uuid) -> Option<Resource> {
    let session = ResourceSession::open(conn, SessionOptions::default()).unwrap();
    session
        .service(kind)
        .load_lineage(id)
        .unwrap()
        .into_iter()
        .find(|row| row.id == id)
}

#[test]
fn import_flattens_lineage_to_root() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let Chain { v1, v2, v3 } = import_chain(&mut session, ResourceKind::Variable);

    assert!(v2.is_imported);
    assert_eq!(v2.source_id, Some(v1.id));
    assert_eq!(v2.source_item_id, Some(v1.owner_item_id));
    assert_eq!(v3.source_id, Some(v1.id));
    assert_eq!(v3.source_item_id, Some(v1.owner_item_id));
    assert_eq!(v3.content, v1.content);
    assert_eq!(v3.is_return, Some(false));

    let lineage = session.lineage_group(ResourceKind::Variable, v1.id);
    assert_eq!(lineage.len(), 3);
}

#[test]
fn import_flattening_holds_for_every_kind() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();

    for kind in ResourceKind::ALL {
        let Chain { v1, v3, .. } = import_chain(&mut session, kind);
        assert_eq!(v3.source_id, Some(v1.id), "{kind} import must point at root");
        assert_eq!(v3.kind, kind);
    }
}

#[test]
fn import_resets_source_return_marker() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let root = session
        .create_resource(
            ResourceKind::Function,
            Uuid::new_v4(),
            draft_for(ResourceKind::Function),
        )
        .unwrap();
    session
        .update_resource(
            ResourceKind::Function,
            root.id,
            ResourceChanges::new().with_return_marker(true),
        )
        .unwrap();

    let copy = session
        .import_resource(ResourceKind::Function, root.id, Uuid::new_v4())
        .unwrap();
    assert_eq!(copy.is_return, Some(false));
}

#[test]
fn update_on_import_propagates_to_whole_lineage() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Variable;
    let Chain { v1, v2, v3 } = import_chain(&mut session, kind);
    session
        .update_resource(kind, v3.id, ResourceChanges::new().with_return_marker(true))
        .unwrap();

    let outcome = session
        .update_resource(
            kind,
            v2.id,
            ResourceChanges::new().set(SharedField::DataType, "number"),
        )
        .unwrap();
    assert_eq!(outcome, UpdateOutcome { propagated: 2 });

    for id in [v1.id, v2.id, v3.id] {
        let cached = session.get(kind, id).unwrap();
        assert_eq!(cached.field(SharedField::DataType), Some("number"));
        let persisted = stored(&conn, kind, id).unwrap();
        assert_eq!(persisted.field(SharedField::DataType), Some("number"));
    }
    assert_eq!(session.get(kind, v1.id).unwrap().is_return, Some(false));
    assert_eq!(session.get(kind, v3.id).unwrap().is_return, Some(true));
    assert_eq!(stored(&conn, kind, v3.id).unwrap().is_return, Some(true));
}

#[test]
fn propagation_reaches_every_member_for_every_kind() {
    for propagation in [PropagationMode::Sequential, PropagationMode::Transactional] {
        let conn = open_db_in_memory().unwrap();
        let mut session = ResourceSession::open(&conn, SessionOptions { propagation }).unwrap();

        for kind in ResourceKind::ALL {
            let Chain { v1, v2, v3 } = import_chain(&mut session, kind);
            let field = edited_field(kind);

            session
                .update_resource(kind, v1.id, ResourceChanges::new().set(field, "edited"))
                .unwrap();

            for id in [v1.id, v2.id, v3.id] {
                assert_eq!(
                    stored(&conn, kind, id).unwrap().field(field),
                    Some("edited"),
                    "{kind} {propagation:?}"
                );
                assert_eq!(session.get(kind, id).unwrap().field(field), Some("edited"));
            }
        }
    }
}

#[test]
fn clearing_optional_field_propagates() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Object;
    let root = session
        .create_resource(
            kind,
            Uuid::new_v4(),
            draft_for(kind).with(SharedField::Description, "account owner"),
        )
        .unwrap();
    let copy = session.import_resource(kind, root.id, Uuid::new_v4()).unwrap();
    assert_eq!(copy.field(SharedField::Description), Some("account owner"));

    session
        .update_resource(
            kind,
            root.id,
            ResourceChanges::new().clear(SharedField::Description),
        )
        .unwrap();

    assert_eq!(stored(&conn, kind, copy.id).unwrap().field(SharedField::Description), None);
    assert_eq!(session.get(kind, copy.id).unwrap().field(SharedField::Description), None);
}

#[test]
fn return_marker_update_stays_on_target() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Function;
    let Chain { v1, v2, v3 } = import_chain(&mut session, kind);
    let before_v1 = stored(&conn, kind, v1.id).unwrap();
    let before_v3 = stored(&conn, kind, v3.id).unwrap();

    let outcome = session
        .update_resource(kind, v2.id, ResourceChanges::new().with_return_marker(true))
        .unwrap();
    assert_eq!(outcome.propagated, 0);

    assert_eq!(stored(&conn, kind, v2.id).unwrap().is_return, Some(true));
    assert_eq!(session.get(kind, v2.id).unwrap().is_return, Some(true));
    for before in [before_v1, before_v3] {
        let after = stored(&conn, kind, before.id).unwrap();
        assert_eq!(after.is_return, Some(false));
        assert_eq!(after.content, before.content);
        assert_eq!(session.get(kind, before.id).unwrap().is_return, Some(false));
    }
}

#[test]
fn return_marker_on_effect_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Effect;
    let effect = session
        .create_resource(kind, Uuid::new_v4(), draft_for(kind))
        .unwrap();

    let err = session
        .update_resource(kind, effect.id, ResourceChanges::new().with_return_marker(true))
        .unwrap_err();
    assert!(matches!(err, ResourceServiceError::Validation(_)));
}

#[test]
fn deleting_root_cascades_to_all_imports() {
    for propagation in [PropagationMode::Sequential, PropagationMode::Transactional] {
        let conn = open_db_in_memory().unwrap();
        let mut session = ResourceSession::open(&conn, SessionOptions { propagation }).unwrap();
        let kind = ResourceKind::Variable;
        let Chain { v1, v2, v3 } = import_chain(&mut session, kind);

        let outcome = session.delete_resource(kind, v1.id).unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted { cascaded: 2 });

        for row in [&v1, &v2, &v3] {
            assert!(stored(&conn, kind, row.id).is_none());
            assert!(session.get(kind, row.id).is_none());
            session.refresh_owner(kind, row.owner_item_id).unwrap();
            assert!(session.by_owner(kind, row.owner_item_id).is_empty());
        }
    }
}

#[test]
fn deleting_import_keeps_root_and_siblings() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Variable;
    let Chain { v1, v2, v3 } = import_chain(&mut session, kind);

    let outcome = session.delete_resource(kind, v2.id).unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted { cascaded: 0 });

    assert!(stored(&conn, kind, v2.id).is_none());
    assert!(session.get(kind, v2.id).is_none());
    for survivor in [v1.id, v3.id] {
        assert!(stored(&conn, kind, survivor).is_some());
        assert!(session.get(kind, survivor).is_some());
    }
}

#[test]
fn delete_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Object;
    let Chain { v1, v2, .. } = import_chain(&mut session, kind);

    session.delete_resource(kind, v2.id).unwrap();
    let cached_before = session.all(kind).to_vec();

    let outcome = session.delete_resource(kind, v2.id).unwrap();
    assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
    assert_eq!(session.all(kind), cached_before.as_slice());
    assert!(stored(&conn, kind, v1.id).is_some());
}

#[test]
fn importing_missing_source_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Variable;
    let missing = Uuid::new_v4();

    let err = session
        .import_resource(kind, missing, Uuid::new_v4())
        .unwrap_err();
    match err {
        ResourceServiceError::NotFound { kind: err_kind, id } => {
            assert_eq!(err_kind, kind);
            assert_eq!(id, missing);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(session.all(kind).is_empty());
    session.refresh_all(kind).unwrap();
    assert!(session.all(kind).is_empty());
}

#[test]
fn updating_missing_resource_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();

    let err = session
        .update_resource(
            ResourceKind::Variable,
            Uuid::new_v4(),
            ResourceChanges::new().set(SharedField::Name, "ghost"),
        )
        .unwrap_err();
    assert!(matches!(err, ResourceServiceError::NotFound { .. }));
}

#[test]
fn duplicate_imports_into_same_item_are_allowed() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Variable;
    let root = session
        .create_resource(kind, Uuid::new_v4(), draft_for(kind))
        .unwrap();
    let target = Uuid::new_v4();

    let first = session.import_resource(kind, root.id, target).unwrap();
    let second = session.import_resource(kind, root.id, target).unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(session.by_owner(kind, target).len(), 2);
}

#[test]
fn broken_import_row_is_reported_as_invalid_state() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let broken = Uuid::new_v4();
    conn.execute(
        "INSERT INTO variables (id, item_id, name, type, is_imported)
         VALUES (?1, ?2, 'orphan', 'string', 1);",
        [broken.to_string(), Uuid::new_v4().to_string()],
    )
    .unwrap();

    let err = session
        .import_resource(ResourceKind::Variable, broken, Uuid::new_v4())
        .unwrap_err();
    match err {
        ResourceServiceError::InvalidState { kind, id } => {
            assert_eq!(kind, ResourceKind::Variable);
            assert_eq!(id, broken);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn refresh_project_loads_rows_of_registered_items() {
    let conn = open_db_in_memory().unwrap();
    let mut writer = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let project = Uuid::new_v4();
    let screen = ItemRef::new(project, ItemCategory::Screen, "Profile");
    let api = ItemRef::new(project, ItemCategory::Api, "GET /user");
    writer.register_item(&screen).unwrap();
    writer.register_item(&api).unwrap();

    let variable = writer
        .create_resource(ResourceKind::Variable, screen.id, draft_for(ResourceKind::Variable))
        .unwrap();
    writer
        .import_resource(ResourceKind::Variable, variable.id, api.id)
        .unwrap();
    writer
        .create_resource(ResourceKind::Effect, api.id, draft_for(ResourceKind::Effect))
        .unwrap();
    writer
        .create_resource(
            ResourceKind::Object,
            Uuid::new_v4(),
            draft_for(ResourceKind::Object),
        )
        .unwrap();

    let mut reader = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    assert_eq!(reader.refresh_project(project).unwrap(), 3);
    assert_eq!(reader.all(ResourceKind::Variable).len(), 2);
    assert_eq!(reader.all(ResourceKind::Effect).len(), 1);
    assert!(reader.all(ResourceKind::Object).is_empty());
    assert_eq!(reader.item(api.id).unwrap(), Some(api));
}

#[test]
fn import_candidates_exclude_target_and_filter_by_query() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Variable;
    let target = Uuid::new_v4();

    let user_name = session
        .create_resource(kind, Uuid::new_v4(), ResourceDraft::variable("userName", "string"))
        .unwrap();
    let user_age = session
        .create_resource(
            kind,
            Uuid::new_v4(),
            ResourceDraft::variable("age", "number").with(SharedField::Description, "User age"),
        )
        .unwrap();
    session
        .create_resource(kind, target, ResourceDraft::variable("userToken", "string"))
        .unwrap();
    session
        .create_resource(kind, Uuid::new_v4(), ResourceDraft::variable("theme", "string"))
        .unwrap();

    let mut matched = session
        .import_candidates(kind, target, Some("  USER "))
        .into_iter()
        .map(|row| row.id)
        .collect::<Vec<_>>();
    matched.sort();
    let mut expected = vec![user_name.id, user_age.id];
    expected.sort();
    assert_eq!(matched, expected);

    assert_eq!(session.import_candidates(kind, target, None).len(), 3);
    assert_eq!(session.import_candidates(kind, target, Some("")).len(), 3);
}

#[test]
fn resource_serializes_with_column_names() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let Chain { v1, v2, .. } = import_chain(&mut session, ResourceKind::Variable);

    let value = serde_json::to_value(&v2).unwrap();
    assert_eq!(value["kind"], "variable");
    assert_eq!(value["item_id"], v2.owner_item_id.to_string());
    assert_eq!(value["source_id"], v1.id.to_string());
    assert_eq!(value["is_imported"], true);
    assert_eq!(value["is_return"], false);
    assert_eq!(value["content"]["name"], "userName");
    assert_eq!(value["content"]["type"], "string");

    let decoded: Resource = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, v2);
}

#[test]
fn cached_rows_carry_storage_timestamps_after_update() {
    let conn = open_db_in_memory().unwrap();
    let mut session = ResourceSession::open(&conn, SessionOptions::default()).unwrap();
    let kind = ResourceKind::Variable;
    let Chain { v1, v2, v3 } = import_chain(&mut session, kind);
    conn.execute_batch("UPDATE variables SET created_at = 1000, updated_at = 1000;")
        .unwrap();
    session.refresh_all(kind).unwrap();

    session
        .update_resource(
            kind,
            v2.id,
            ResourceChanges::new().set(SharedField::DataType, "number"),
        )
        .unwrap();
    session
        .update_resource(kind, v3.id, ResourceChanges::new().with_return_marker(true))
        .unwrap();

    for id in [v1.id, v2.id, v3.id] {
        let persisted = stored(&conn, kind, id).unwrap();
        assert!(persisted.updated_at > 1000);
        assert_eq!(session.get(kind, id), Some(&persisted));
    }
}
