use std::sync::Arc;

use oak_model_rust::{
    Cardinality, Instance, LeafQuery, Notification, NotificationKind, PathAddress, SchemaBuilder,
    SchemaValidator, SchemaValue, TreeModel, Value, ValueKind,
};
use parking_lot::Mutex;

// Catalog with categories and items whose categoryRef picks a category name
fn catalog_model() -> TreeModel {
    let mut builder = SchemaBuilder::new().with_description("Product catalog");
    let catalog = builder.add_node("Catalog").unwrap();
    let category = builder.add_node("Category").unwrap();
    let item = builder.add_node("Item").unwrap();
    builder
        .add_value_as_key(category, SchemaValue::new("name", ValueKind::String))
        .unwrap();
    builder
        .add_value(item, SchemaValue::new("label", ValueKind::String))
        .unwrap();
    builder
        .add_value(
            item,
            SchemaValue::new("categoryRef", ValueKind::String)
                .with_options_query(LeafQuery::parse("P;C{Category};name").unwrap())
                .options_only(true),
        )
        .unwrap();
    builder
        .add_container(catalog, category, Cardinality::unbounded())
        .unwrap();
    builder
        .add_container(catalog, item, Cardinality::unbounded())
        .unwrap();
    TreeModel::with_schema(builder.build())
}

fn add_category(root: &Instance, name: &str) -> Instance {
    let category = root.insert_child("Category", root.child_count("Category"));
    assert!(category.set_value("name", name));
    category
}

fn add_item(root: &Instance, label: &str, category: &str) -> Instance {
    let item = root.insert_child("Item", root.child_count("Item"));
    assert!(item.set_value("label", label));
    assert!(item.set_value("categoryRef", category));
    item
}

fn record_all(model: &TreeModel) -> Arc<Mutex<Vec<Notification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    model.subscribe(
        &[],
        Arc::new(move |_: &TreeModel, notification: &Notification| {
            sink.lock().push(notification.clone());
        }),
    );
    seen
}

#[test]
fn test_rename_updates_matching_dependents_only() {
    let model = catalog_model();
    assert_eq!(model.options_observers().len(), 1);
    assert!(model.options_observers()[0].is_connected());

    let root = model.create_new_root_document();
    let fruit = add_category(&root, "Fruit");
    add_category(&root, "Dairy");
    let apple = add_item(&root, "Apple", "Fruit");
    let milk = add_item(&root, "Milk", "Dairy");
    let banana = add_item(&root, "Banana", "Fruit");

    assert_eq!(
        apple.entry("categoryRef").options(),
        vec![Value::from("Fruit"), Value::from("Dairy")]
    );
    assert!(!apple.set_value("categoryRef", "Bakery"));

    assert!(fruit.set_value("name", "Produce"));

    assert_eq!(apple.value("categoryRef"), Value::from("Produce"));
    assert_eq!(banana.value("categoryRef"), Value::from("Produce"));
    assert_eq!(milk.value("categoryRef"), Value::from("Dairy"));
    assert!(!model.is_dispatching());
}

#[test]
fn test_first_name_does_not_claim_unset_dependents() {
    let model = catalog_model();
    let root = model.create_new_root_document();
    let item = root.insert_child("Item", 0);
    add_category(&root, "Fruit");
    assert_eq!(item.value("categoryRef"), Value::Undefined);
}

#[test]
fn test_dependent_writes_follow_the_source_pair() {
    let model = catalog_model();
    let root = model.create_new_root_document();
    let fruit = add_category(&root, "Fruit");
    let apple = add_item(&root, "Apple", "Fruit");
    let seen = record_all(&model);

    fruit.set_value("name", "Produce");

    let fruit_path = fruit.path().unwrap();
    let apple_path = apple.path().unwrap();
    assert_eq!(
        *seen.lock(),
        vec![
            Notification::ValueChangeBefore {
                path: fruit_path.clone(),
                value_name: "name".to_string(),
            },
            Notification::ValueChangeAfter {
                path: fruit_path.clone(),
                value_name: "name".to_string(),
            },
            Notification::KeyValueChangeAfter {
                path: fruit_path,
                value_name: "name".to_string(),
            },
            Notification::ValueChangeBefore {
                path: apple_path.clone(),
                value_name: "categoryRef".to_string(),
            },
            Notification::ValueChangeAfter {
                path: apple_path,
                value_name: "categoryRef".to_string(),
            },
        ]
    );
}

#[test]
fn test_current_dependent_gets_forced_refresh() {
    let model = catalog_model();
    let root = model.create_new_root_document();
    let fruit = add_category(&root, "Fruit");
    add_category(&root, "Dairy");
    let milk = add_item(&root, "Milk", "Dairy");

    assert!(model.set_current(&milk, false));
    let seen = record_all(&model);
    fruit.set_value("name", "Produce");

    let last = seen.lock().last().cloned();
    assert_eq!(
        last,
        Some(Notification::CurrentChanged {
            path: milk.path(),
            forced: true,
        })
    );
    assert_eq!(model.current(), milk);
}

#[test]
fn test_structural_edit_rejected_during_dispatch() {
    let model = catalog_model();
    let root = model.create_new_root_document();
    let fruit = add_category(&root, "Fruit");

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let target = root.clone();
    model.subscribe(
        &[NotificationKind::ValueChangeAfter],
        Arc::new(move |model: &TreeModel, _: &Notification| {
            assert!(model.is_dispatching());
            sink.lock().push(target.insert_child("Category", 0).is_null());
        }),
    );

    fruit.set_value("name", "Produce");
    assert_eq!(*results.lock(), vec![true]);
    assert_eq!(root.child_count("Category"), 1);
}

#[test]
fn test_current_instance_lifecycle() {
    let model = catalog_model();
    let root = model.create_new_root_document();
    add_category(&root, "Fruit");
    let apple = add_item(&root, "Apple", "Fruit");

    assert!(model.set_current(&apple, false));
    assert!(!model.set_current(&apple, false));
    assert!(model.set_current(&apple, true));

    assert!(root.remove_child("Item", 0));
    assert_eq!(model.current(), root);
    assert_eq!(model.current().path(), Some(PathAddress::root()));
}

#[test]
fn test_schema_and_root_notifications() {
    let model = TreeModel::new();
    let seen = record_all(&model);
    let schema = catalog_model().schema().unwrap();

    model.set_schema(Some(schema));
    let root = model.create_new_root_document();
    assert!(!root.is_null());
    model.set_schema(None);

    let kinds: Vec<NotificationKind> = seen.lock().iter().map(Notification::kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::SchemaChanged,
            NotificationKind::RootChanged,
            NotificationKind::SchemaChanged,
        ]
    );
    assert!(model.root().is_null());
    assert!(model.options_observers().is_empty());
}

#[test]
fn test_disconnected_observer_stops_syncing() {
    let model = catalog_model();
    let root = model.create_new_root_document();
    let fruit = add_category(&root, "Fruit");
    let apple = add_item(&root, "Apple", "Fruit");

    let observer = model.options_observers()[0].clone();
    observer.disconnect(&model);
    assert!(!observer.is_connected());

    fruit.set_value("name", "Produce");
    assert_eq!(apple.value("categoryRef"), Value::from("Fruit"));

    observer.connect(&model);
    fruit.set_value("name", "Fresh");
    // Apple no longer matched the old name
    assert_eq!(apple.value("categoryRef"), Value::from("Fruit"));
}

#[test]
fn test_drop_emits_destroyed() {
    let model = catalog_model();
    let root = model.create_new_root_document();
    let destroyed = Arc::new(Mutex::new(0));
    let sink = destroyed.clone();
    model.subscribe(
        &[NotificationKind::Destroyed],
        Arc::new(move |_: &TreeModel, _: &Notification| {
            *sink.lock() += 1;
        }),
    );

    let handle = model.clone();
    drop(model);
    assert_eq!(*destroyed.lock(), 0);
    drop(handle);
    assert_eq!(*destroyed.lock(), 1);
    assert!(root.tree_model().is_none());
}

// Sections live in archives and in documents; only documents carry headers
fn shared_section_model() -> TreeModel {
    let mut builder = SchemaBuilder::new();
    let workspace = builder.add_node("Workspace").unwrap();
    let archive = builder.add_node("Archive").unwrap();
    let document = builder.add_node("Document").unwrap();
    let header = builder.add_node("Header").unwrap();
    let section = builder.add_node("Section").unwrap();
    builder
        .add_value_as_key(header, SchemaValue::new("name", ValueKind::String))
        .unwrap();
    builder
        .add_value(
            section,
            SchemaValue::new("headerRef", ValueKind::String)
                .with_options_query(LeafQuery::parse("P;C{Header};name").unwrap()),
        )
        .unwrap();
    for (host, child) in [
        (workspace, archive),
        (workspace, document),
        (archive, section),
        (document, header),
        (document, section),
    ] {
        builder
            .add_container(host, child, Cardinality::unbounded())
            .unwrap();
    }
    TreeModel::with_schema(builder.build())
}

#[test]
fn test_rename_reaches_dependents_under_any_parent_type() {
    let model = shared_section_model();
    let observers = model.options_observers();
    assert_eq!(observers.len(), 1);
    let schema = model.schema().unwrap();
    assert_eq!(observers[0].source_def(), schema.find("Header").unwrap());
    assert_eq!(observers[0].inverse_queries()[0].to_string(), "P;C{Section};headerRef");
    assert!(SchemaValidator::validate_schema(&schema).valid);

    let root = model.create_new_root_document();
    root.insert_child("Archive", 0).insert_child("Section", 0);
    let document = root.insert_child("Document", 0);
    let header = document.insert_child("Header", 0);
    assert!(header.set_value("name", "A"));
    let section = document.insert_child("Section", 0);
    assert!(section.set_value("headerRef", "A"));

    assert!(header.set_value("name", "B"));
    assert_eq!(section.value("headerRef"), Value::from("B"));
}
