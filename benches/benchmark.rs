use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use compose_store::construct::{Database, Field, FieldSet, Module, ModuleFilter, PersistenceMode};

fn reconcile(c: &mut Criterion) {
    let db = Database::new(PersistenceMode::InMemory).unwrap();
    let store = db.modules();
    let module = store.create(Module::new(1, "bench", "Bench")).unwrap();
    let mut fields: FieldSet = (0..50).map(|i| Field::new(&format!("f{i}"), "String")).collect();
    store.update_fields(module.id, &mut fields, false).unwrap();

    c.bench_function("reconcile 50 unchanged fields", |b| {
        b.iter(|| {
            let mut again = fields.clone();
            store.update_fields(black_box(module.id), &mut again, true).unwrap();
        })
    });
    c.bench_function("reconcile 50 reversed fields", |b| {
        b.iter(|| {
            let mut reversed: FieldSet = fields.iter().rev().cloned().collect();
            store.update_fields(black_box(module.id), &mut reversed, false).unwrap();
        })
    });
}

fn find(c: &mut Criterion) {
    let db = Database::new(PersistenceMode::InMemory).unwrap();
    let store = db.modules();
    for i in 0..500 {
        store
            .create(Module::new(i % 5, &format!("module_{i}"), &format!("Module {i}")))
            .unwrap();
    }
    c.bench_function("find substring page", |b| {
        b.iter(|| {
            let filter = ModuleFilter {
                namespace_id: 2,
                query: black_box("ule_1".to_string()),
                sort: "name DESC".to_string(),
                page: 2,
                per_page: 10,
                ..Default::default()
            };
            store.find(filter).unwrap()
        })
    });
}

criterion_group!(benches, reconcile, find);
criterion_main!(benches);
