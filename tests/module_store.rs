use compose_store::StoreError;
use compose_store::construct::{Database, Field, FieldSet, Module, ModuleFilter, PersistenceMode};
use compose_store::datatype::Json;
use compose_store::store::FIELD_LOOKUP_CHUNK;
use serde_json::json;

fn db() -> Database {
    Database::new(PersistenceMode::InMemory).expect("db")
}

#[test]
fn create_stamps_identity_and_creation_time() {
    let db = db();
    let mut module = Module::new(7, "orders", "Orders");
    module.json = Json(json!({"admin": {"recordList": {"columns": ["id"]}}}));
    module.updated_at = Some(chrono::Utc::now());
    let created = db.modules().create(module).unwrap();
    assert_ne!(created.id, 0);
    assert!(created.updated_at.is_none());

    let found = db.modules().find_by_id(7, created.id).unwrap();
    assert_eq!(found, created);
    assert_eq!(found.json.value()["admin"]["recordList"]["columns"][0], "id");
}

#[test]
fn lookups_by_handle_and_name_ignore_case_and_whitespace() {
    let db = db();
    let store = db.modules();
    let created = store.create(Module::new(7, "Orders", "Sales Orders")).unwrap();
    assert_eq!(store.find_by_handle(7, "  ORDERS ").unwrap().id, created.id);
    assert_eq!(store.find_by_name(7, "sales orders\n").unwrap().id, created.id);
    assert!(matches!(store.find_by_handle(8, "orders"), Err(StoreError::NotFound)));
    assert!(matches!(store.find_by_name(7, "orders"), Err(StoreError::NotFound)));
}

#[test]
fn handle_must_be_unique_per_namespace() {
    let db = db();
    let store = db.modules();
    store.create(Module::new(7, "orders", "Orders")).unwrap();
    let err = store.create(Module::new(7, "ORDERS", "Other orders")).unwrap_err();
    assert!(matches!(err, StoreError::HandleNotUnique), "got {err}");
    // another namespace is fine
    store.create(Module::new(8, "orders", "Orders")).unwrap();
}

#[test]
fn name_must_be_unique_per_namespace() {
    let db = db();
    let store = db.modules();
    store.create(Module::new(7, "orders", "Orders")).unwrap();
    let err = store.create(Module::new(7, "orders_2", "orders")).unwrap_err();
    assert!(matches!(err, StoreError::NameNotUnique), "got {err}");
}

#[test]
fn empty_handles_do_not_collide() {
    let db = db();
    let store = db.modules();
    store.create(Module::new(7, "", "First")).unwrap();
    store.create(Module::new(7, "", "Second")).unwrap();
}

#[test]
fn deleted_modules_disappear_and_free_their_handle() {
    let db = db();
    let store = db.modules();
    let created = store.create(Module::new(7, "orders", "Orders")).unwrap();
    store.delete_by_id(7, created.id).unwrap();

    assert!(matches!(store.find_by_id(7, created.id), Err(StoreError::NotFound)));
    assert!(matches!(store.find_by_handle(7, "orders"), Err(StoreError::NotFound)));

    let again = store.create(Module::new(7, "orders", "Orders")).unwrap();
    assert_ne!(again.id, created.id);
    assert_eq!(store.find_by_handle(7, "orders").unwrap().id, again.id);
}

#[test]
fn delete_is_scoped_to_namespace_and_tolerates_missing_rows() {
    let db = db();
    let store = db.modules();
    let created = store.create(Module::new(7, "orders", "Orders")).unwrap();
    store.delete_by_id(8, created.id).unwrap();
    assert!(store.find_by_id(7, created.id).is_ok());
    store.delete_by_id(7, 123456789).unwrap();
}

#[test]
fn find_by_id_requires_matching_namespace() {
    let db = db();
    let store = db.modules();
    let created = store.create(Module::new(7, "orders", "Orders")).unwrap();
    assert!(matches!(store.find_by_id(8, created.id), Err(StoreError::NotFound)));
    assert!(matches!(store.find_by_id(7, created.id + 1), Err(StoreError::NotFound)));
}

#[test]
fn update_writes_merged_changes() {
    let db = db();
    let store = db.modules();
    let mut module = store.create(Module::new(7, "orders", "Orders")).unwrap();
    module.name = "Purchase Orders".to_string();
    module.json = Json(json!({"color": "blue"}));
    let updated = store.update(module).unwrap();
    assert!(updated.updated_at.is_some());

    let found = store.find_by_id(7, updated.id).unwrap();
    assert_eq!(found.name, "Purchase Orders");
    assert_eq!(found.json, Json(json!({"color": "blue"})));
    assert_eq!(found.updated_at, updated.updated_at);
}

#[test]
fn update_into_a_taken_handle_fails() {
    let db = db();
    let store = db.modules();
    store.create(Module::new(7, "orders", "Orders")).unwrap();
    let mut other = store.create(Module::new(7, "invoices", "Invoices")).unwrap();
    other.handle = "Orders".to_string();
    assert!(matches!(store.update(other), Err(StoreError::HandleNotUnique)));
}

#[test]
fn find_fields_orders_by_module_then_place() {
    let db = db();
    let store = db.modules();
    let first = store.create(Module::new(7, "a", "A")).unwrap();
    let second = store.create(Module::new(7, "b", "B")).unwrap();
    let mut b_fields: FieldSet = vec![Field::new("b0", "String"), Field::new("b1", "String")].into_iter().collect();
    let mut a_fields: FieldSet = vec![Field::new("a0", "String"), Field::new("a1", "String")].into_iter().collect();
    store.update_fields(second.id, &mut b_fields, false).unwrap();
    store.update_fields(first.id, &mut a_fields, false).unwrap();

    let all = store.find_fields(&[second.id, first.id]).unwrap();
    assert_eq!(all.names(), vec!["a0", "a1", "b0", "b1"]);
    assert!(store.find_fields(&[]).unwrap().is_empty());
}

#[test]
fn load_fields_attaches_each_modules_own_fields() {
    let db = db();
    let store = db.modules();
    let first = store.create(Module::new(7, "a", "A")).unwrap();
    let second = store.create(Module::new(7, "b", "B")).unwrap();
    let mut fields: FieldSet = vec![Field::new("only", "String")].into_iter().collect();
    store.update_fields(second.id, &mut fields, false).unwrap();

    let mut modules = vec![first, second];
    store.load_fields(&mut modules).unwrap();
    assert!(modules[0].fields.is_empty());
    assert_eq!(modules[1].fields.names(), vec!["only"]);
}

#[test]
fn lookups_and_uniqueness_fold_non_ascii_case() {
    let db = db();
    let store = db.modules();
    let created = store.create(Module::new(7, "Éclair", "Ärger")).unwrap();
    assert_eq!(store.find_by_name(7, "ärger").unwrap().id, created.id);
    assert_eq!(store.find_by_name(7, "Ärger").unwrap().id, created.id);
    assert_eq!(store.find_by_handle(7, " ÉCLAIR ").unwrap().id, created.id);

    let (set, filter) = store
        .find(ModuleFilter { namespace_id: 7, name: "ärger".into(), ..Default::default() })
        .unwrap();
    assert_eq!(filter.count, 1);
    assert_eq!(set.ids(), vec![created.id]);
    let (set, _) = store
        .find(ModuleFilter { namespace_id: 7, query: "ÄRG".into(), ..Default::default() })
        .unwrap();
    assert_eq!(set.ids(), vec![created.id]);

    let err = store.create(Module::new(7, "other", "ärger")).unwrap_err();
    assert!(matches!(err, StoreError::NameNotUnique), "got {err}");
    let err = store.create(Module::new(7, "éclair", "Other")).unwrap_err();
    assert!(matches!(err, StoreError::HandleNotUnique), "got {err}");
}

#[test]
fn find_fields_handles_more_ids_than_one_lookup_binds() {
    let db = db();
    let store = db.modules();
    let first = store.create(Module::new(7, "a", "A")).unwrap();
    let second = store.create(Module::new(7, "b", "B")).unwrap();
    let mut a_fields: FieldSet = vec![Field::new("a0", "String"), Field::new("a1", "String")].into_iter().collect();
    let mut b_fields: FieldSet = vec![Field::new("b0", "String"), Field::new("b1", "String")].into_iter().collect();
    store.update_fields(first.id, &mut a_fields, false).unwrap();
    store.update_fields(second.id, &mut b_fields, false).unwrap();

    // unknown ids in between push the two modules into different lookups
    let mut ids = vec![second.id];
    ids.extend((1..=2 * FIELD_LOOKUP_CHUNK as u64).map(|offset| first.id + offset));
    ids.push(first.id);
    ids.push(second.id);
    let all = store.find_fields(&ids).unwrap();
    assert_eq!(all.names(), vec!["a0", "a1", "b0", "b1"]);
}
