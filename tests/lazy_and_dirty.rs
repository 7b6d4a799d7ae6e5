//! Integration tests for lazy population and dirty detection.
//!
//! Covers loader consumption semantics (exactly once, cancelled by
//! assignment), loader arity validation, optimistic membership answers, and
//! the mutable-scalar copy strategy.

use std::{cell::Cell, rc::Rc};

use attrscope::prelude::*;

#[test]
fn loader_runs_exactly_once_on_first_read() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let doc = mgr.declare_class("Document", None)?;
    let calls = Rc::new(Cell::new(0u32));
    let counter = calls.clone();
    mgr.register(
        doc,
        "body",
        Cardinality::Scalar,
        AttributeOptions::new().loader(Rc::new(move |_| {
            counter.set(counter.get() + 1);
            Loaded::Scalar(Value::from("stored body"))
        })),
    )?;
    let d = mgr.new_instance(doc)?;

    assert_eq!(mgr.get(d, "body")?, Value::from("stored body"));
    assert_eq!(mgr.get(d, "body")?, Value::from("stored body"));
    assert_eq!(calls.get(), 1);

    // the loaded value is the baseline, so the instance is clean
    assert!(!mgr.is_modified(d)?);
    Ok(())
}

#[test]
fn set_cancels_a_pending_load_without_invoking_the_loader() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let doc = mgr.declare_class("Document", None)?;
    let calls = Rc::new(Cell::new(0u32));
    let counter = calls.clone();
    mgr.register(
        doc,
        "body",
        Cardinality::Scalar,
        AttributeOptions::new().loader(Rc::new(move |_| {
            counter.set(counter.get() + 1);
            Loaded::Scalar(Value::from("stored body"))
        })),
    )?;
    let d = mgr.new_instance(doc)?;

    mgr.set(d, "body", Value::from("fresh body"))?;
    assert_eq!(mgr.get(d, "body")?, Value::from("fresh body"));
    assert_eq!(calls.get(), 0);

    // no baseline was ever established, so the assignment counts as added
    assert_eq!(mgr.history(d, "body")?.added, vec![Value::from("fresh body")]);
    Ok(())
}

#[test]
fn lazily_loaded_collection_tracks_subsequent_mutations() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let doc = mgr.declare_class("Document", None)?;
    mgr.register(
        doc,
        "tags",
        Cardinality::Collection,
        AttributeOptions::new().loader(Rc::new(|_| {
            Loaded::Sequence(vec![Value::from("draft"), Value::from("internal")])
        })),
    )?;
    let d = mgr.new_instance(doc)?;

    // appending triggers the load first, then applies the mutation on top
    mgr.append(d, "tags", Value::from("urgent"))?;
    assert_eq!(
        mgr.collection_items(d, "tags")?,
        vec![Value::from("draft"), Value::from("internal"), Value::from("urgent")]
    );

    let history = mgr.history(d, "tags")?;
    assert_eq!(history.added, vec![Value::from("urgent")]);
    assert_eq!(
        history.unchanged,
        vec![Value::from("draft"), Value::from("internal")]
    );
    Ok(())
}

#[test]
fn history_never_forces_a_pending_load() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let doc = mgr.declare_class("Document", None)?;
    let calls = Rc::new(Cell::new(0u32));
    let counter = calls.clone();
    mgr.register(
        doc,
        "tags",
        Cardinality::Collection,
        AttributeOptions::new().loader(Rc::new(move |_| {
            counter.set(counter.get() + 1);
            Loaded::Sequence(vec![Value::from("draft")])
        })),
    )?;
    let d = mgr.new_instance(doc)?;

    assert!(mgr.history(d, "tags")?.is_empty());
    assert!(!mgr.is_modified(d)?);
    assert_eq!(calls.get(), 0);
    Ok(())
}

#[test]
fn loader_arity_mismatch_is_a_configuration_error() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let doc = mgr.declare_class("Document", None)?;
    // registration is permissive; the mismatch surfaces at first load
    mgr.register(
        doc,
        "body",
        Cardinality::Scalar,
        AttributeOptions::new().loader(Rc::new(|_| Loaded::Sequence(vec![]))),
    )?;
    let d = mgr.new_instance(doc)?;

    assert!(matches!(
        mgr.get(d, "body"),
        Err(Error::Configuration(_))
    ));
    Ok(())
}

#[test]
fn optimistic_has_parent_answers_without_loading() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let folder = mgr.declare_class("Folder", None)?;
    let file = mgr.declare_class("File", None)?;
    let f = mgr.new_instance(file)?;
    let loaded_member = Value::Ref(f);
    mgr.register(
        folder,
        "files",
        Cardinality::Collection,
        AttributeOptions::new()
            .track_parent(true)
            .loader(Rc::new(move |_| Loaded::Sequence(vec![loaded_member.clone()]))),
    )?;
    let dir = mgr.new_instance(folder)?;

    // unknown membership with an unconsumed loader: optimistic says yes,
    // strict says no, and neither forces the load
    assert!(mgr.has_parent(dir, "files", f, true)?);
    assert!(!mgr.has_parent(dir, "files", f, false)?);

    // loading makes both answers authoritative
    mgr.collection_items(dir, "files")?;
    assert!(mgr.has_parent(dir, "files", f, false)?);

    let stranger = mgr.new_instance(file)?;
    assert!(!mgr.has_parent(dir, "files", stranger, true)?);
    Ok(())
}

#[test]
fn mutable_scalar_dirty_detection_sees_in_place_mutation() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let doc = mgr.declare_class("Document", None)?;
    mgr.register(
        doc,
        "payload",
        Cardinality::Scalar,
        AttributeOptions::new().mutable_scalar_copy(Rc::new(Value::deep_copy)),
    )?;
    let d = mgr.new_instance(doc)?;

    let payload = Value::blob(vec![1, 2, 3]);
    mgr.set(d, "payload", payload.clone())?;
    mgr.commit(&[d])?;
    assert!(!mgr.is_modified(d)?);

    // mutate the payload in place, without going through set
    if let Value::Blob(cell) = &payload {
        cell.borrow_mut().push(4);
    }
    assert!(mgr.is_modified(d)?);
    assert!(mgr.is_attribute_modified(d, "payload")?);
    Ok(())
}

#[test]
fn shared_by_reference_commit_never_reports_dirty() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let doc = mgr.declare_class("Document", None)?;
    // no copy strategy: commit shares the payload cell with the live value
    mgr.register(doc, "payload", Cardinality::Scalar, AttributeOptions::new())?;
    let d = mgr.new_instance(doc)?;

    let payload = Value::blob(vec![1, 2, 3]);
    mgr.set(d, "payload", payload.clone())?;
    mgr.commit(&[d])?;

    if let Value::Blob(cell) = &payload {
        cell.borrow_mut().push(4);
    }
    assert!(!mgr.is_modified(d)?);
    Ok(())
}

#[test]
fn rollback_of_a_loaded_attribute_restores_the_loaded_baseline() -> Result<()> {
    let mut mgr = AttributeManager::new();
    let doc = mgr.declare_class("Document", None)?;
    mgr.register(
        doc,
        "body",
        Cardinality::Scalar,
        AttributeOptions::new().loader(Rc::new(|_| Loaded::Scalar(Value::from("stored")))),
    )?;
    let d = mgr.new_instance(doc)?;

    mgr.get(d, "body")?; // consume the loader
    mgr.set(d, "body", Value::from("edited"))?;
    mgr.rollback(&[d])?;
    assert_eq!(mgr.get(d, "body")?, Value::from("stored"));
    Ok(())
}
