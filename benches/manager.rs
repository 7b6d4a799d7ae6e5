//! Benchmarks for the attribute manager hot paths.
//!
//! Measures the operations an embedding application performs in bulk:
//! - Scalar set/get through descriptor resolution
//! - Collection append with and without backref extensions
//! - History computation for medium-sized collections
//! - Commit over a batch of dirty instances
//! - Snapshot serialization of a small graph

extern crate attrscope;

use std::hint::black_box;
use std::rc::Rc;

use attrscope::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion};

/// A three-level hierarchy so descriptor resolution walks a realistic chain.
fn deep_schema() -> (AttributeManager, ClassId) {
    let mut mgr = AttributeManager::new();
    let base = mgr.declare_class("Base", None).unwrap();
    let mid = mgr.declare_class("Mid", Some(base)).unwrap();
    let leaf = mgr.declare_class("Leaf", Some(mid)).unwrap();
    mgr.register(base, "name", Cardinality::Scalar, AttributeOptions::new())
        .unwrap();
    mgr.register(base, "items", Cardinality::Collection, AttributeOptions::new())
        .unwrap();
    (mgr, leaf)
}

/// Benchmark a set/get pair resolved through an inherited descriptor.
fn bench_scalar_set_get(c: &mut Criterion) {
    let (mut mgr, leaf) = deep_schema();
    let instance = mgr.new_instance(leaf).unwrap();

    c.bench_function("manager_scalar_set_get", |b| {
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            let value = if toggle { "a" } else { "b" };
            mgr.set(instance, "name", Value::from(value)).unwrap();
            black_box(mgr.get(instance, "name").unwrap())
        });
    });
}

/// Benchmark appending distinct members to a plain collection.
fn bench_collection_append(c: &mut Criterion) {
    let (mut mgr, leaf) = deep_schema();

    c.bench_function("manager_collection_append_100", |b| {
        b.iter(|| {
            let instance = mgr.new_instance(leaf).unwrap();
            for i in 0..100i64 {
                mgr.append(instance, "items", Value::from(i)).unwrap();
            }
            mgr.drop_instance(instance).unwrap();
        });
    });
}

/// Benchmark appending members through a bidirectional backref pair.
fn bench_backref_append(c: &mut Criterion) {
    let mut mgr = AttributeManager::new();
    let course = mgr.declare_class("Course", None).unwrap();
    let student = mgr.declare_class("Student", None).unwrap();
    mgr.register(
        course,
        "students",
        Cardinality::Collection,
        AttributeOptions::new()
            .track_parent(true)
            .extension(Rc::new(BackrefExtension::new("course"))),
    )
    .unwrap();
    mgr.register(
        student,
        "course",
        Cardinality::Scalar,
        AttributeOptions::new().extension(Rc::new(BackrefExtension::new("students"))),
    )
    .unwrap();

    c.bench_function("manager_backref_append_50", |b| {
        b.iter(|| {
            let c1 = mgr.new_instance(course).unwrap();
            let students: Vec<_> = (0..50)
                .map(|_| mgr.new_instance(student).unwrap())
                .collect();
            for &s in &students {
                mgr.append(c1, "students", Value::Ref(s)).unwrap();
            }
            for &s in &students {
                mgr.drop_instance(s).unwrap();
            }
            mgr.drop_instance(c1).unwrap();
        });
    });
}

/// Benchmark the history diff of a collection with mixed changes.
fn bench_history(c: &mut Criterion) {
    let (mut mgr, leaf) = deep_schema();
    let instance = mgr.new_instance(leaf).unwrap();
    for i in 0..100i64 {
        mgr.append(instance, "items", Value::from(i)).unwrap();
    }
    mgr.commit(&[instance]).unwrap();
    for i in 0..20i64 {
        mgr.remove(instance, "items", &Value::from(i)).unwrap();
    }
    for i in 100..120i64 {
        mgr.append(instance, "items", Value::from(i)).unwrap();
    }

    c.bench_function("manager_history_collection_100", |b| {
        b.iter(|| black_box(mgr.history(instance, "items").unwrap()));
    });
}

/// Benchmark committing a batch of dirty instances.
fn bench_commit_batch(c: &mut Criterion) {
    let (mut mgr, leaf) = deep_schema();
    let instances: Vec<_> = (0..100)
        .map(|_| mgr.new_instance(leaf).unwrap())
        .collect();

    c.bench_function("manager_commit_100", |b| {
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            let value = if toggle { "x" } else { "y" };
            for &i in &instances {
                mgr.set(i, "name", Value::from(value)).unwrap();
            }
            mgr.commit(black_box(&instances)).unwrap();
        });
    });
}

/// Benchmark serializing a committed graph of one owner and fifty members.
fn bench_serialize_graph(c: &mut Criterion) {
    let (mut mgr, leaf) = deep_schema();
    let owner = mgr.new_instance(leaf).unwrap();
    for _ in 0..50 {
        let member = mgr.new_instance(leaf).unwrap();
        mgr.set(member, "name", Value::from("member")).unwrap();
        mgr.append(owner, "items", Value::Ref(member)).unwrap();
    }
    mgr.commit(&[owner]).unwrap();

    c.bench_function("manager_serialize_graph_50", |b| {
        b.iter(|| black_box(mgr.serialize_graph(black_box(&[owner])).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_scalar_set_get,
    bench_collection_append,
    bench_backref_append,
    bench_history,
    bench_commit_batch,
    bench_serialize_graph
);
criterion_main!(benches);
