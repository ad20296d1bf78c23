use std::sync::Arc;

use oak_model_rust::{
    Cardinality, Instance, MemoryBackend, NodeDefId, NodeQuery, Notification, NotificationKind,
    QueryBuilder, QueryStep, Schema, SchemaBuilder, SchemaValidator, SchemaValue, TreeModel, Value,
    ValueKind,
};
use parking_lot::Mutex;

struct Library {
    schema: Arc<Schema>,
    library: NodeDefId,
    book: NodeDefId,
    novel: NodeDefId,
}

fn library_schema() -> Library {
    let mut builder = SchemaBuilder::new();
    let library = builder.add_node("Library").unwrap();
    let shelf = builder.add_node("Shelf").unwrap();
    let label = builder.add_node("Label").unwrap();
    let book = builder.add_node("Book").unwrap();
    builder
        .add_value_as_key(shelf, SchemaValue::new("code", ValueKind::String))
        .unwrap();
    builder
        .add_value(label, SchemaValue::new("text", ValueKind::String))
        .unwrap();
    builder
        .add_value_as_key(book, SchemaValue::new("title", ValueKind::String))
        .unwrap();
    builder
        .add_value_as_derived_id(book, SchemaValue::new("type", ValueKind::String))
        .unwrap();
    let novel = builder.add_derived_node(book, "Novel").unwrap();
    builder
        .add_value(novel, SchemaValue::new("author", ValueKind::String))
        .unwrap();
    builder
        .add_container(library, shelf, Cardinality::unbounded())
        .unwrap();
    builder
        .add_container(shelf, label, Cardinality::new(0, 1))
        .unwrap();
    builder
        .add_container(shelf, book, Cardinality::unbounded())
        .unwrap();
    Library {
        schema: builder.build(),
        library,
        book,
        novel,
    }
}

/// Three shelves holding two, one and zero books
fn filled_library(fixture: &Library) -> Instance {
    let root = Instance::new(
        fixture.schema.clone(),
        fixture.library,
        MemoryBackend::new_document("Library"),
    );
    for (index, titles) in [vec!["Dune", "Emma"], vec!["Ulysses"], vec![]].into_iter().enumerate() {
        let shelf = root.insert_child("Shelf", index);
        shelf.set_value("code", format!("S{}", index));
        for (position, title) in titles.into_iter().enumerate() {
            let book = shelf.insert_child("Book", position);
            book.set_value("title", title);
        }
    }
    root
}

fn all_books(root: &Instance) -> Vec<Instance> {
    NodeQuery::parse("C{Shelf};C{Book}").unwrap().evaluate(root)
}

#[test]
fn test_inverse_queries_lead_back_to_origin() {
    let fixture = library_schema();
    let root = filled_library(&fixture);
    let books = all_books(&root);
    assert_eq!(books.len(), 3);

    for text in ["P;P;C{Shelf};C{Book}", "P;S;C{Book}", "P"] {
        let query = NodeQuery::parse(text).unwrap();
        let inverse = QueryBuilder::create_inverse(&query, &fixture.schema, fixture.book).unwrap();
        for origin in &books {
            for result in query.evaluate(origin) {
                assert!(
                    inverse.evaluate(&result).contains(origin),
                    "'{}' from {:?} did not lead back through '{}'",
                    inverse,
                    result,
                    query
                );
            }
        }
    }

    let down = NodeQuery::parse("C{Shelf};C{Book}").unwrap();
    let up = QueryBuilder::create_inverse(&down, &fixture.schema, fixture.library).unwrap();
    assert_eq!(up.steps(), &[QueryStep::Parent, QueryStep::Parent]);
    for book in &books {
        assert_eq!(up.evaluate(book), vec![root.clone()]);
    }
}

#[test]
fn test_single_slot_container() {
    let fixture = library_schema();
    let root = filled_library(&fixture);
    let shelf = root.first_child("Shelf");

    assert!(shelf.can_insert_child("Label", 0));
    let label = shelf.insert_child("Label", 0);
    assert!(!label.is_null());
    assert!(!shelf.can_insert_child("Label", 0));
    assert!(!shelf.can_insert_child("Label", 1));
    assert!(shelf.insert_child("Label", 1).is_null());

    let query = NodeQuery::parse("C{Shelf};C{Label}").unwrap();
    assert!(!query.can_insert(&root, 0));
    assert!(SchemaValidator::validate_tree(&root).valid);
}

#[test]
fn test_mini_language() {
    let leaf = QueryBuilder::create_leaf_query("C{Row};C{Cell};value").unwrap();
    assert_eq!(
        leaf.query.steps(),
        &[
            QueryStep::Children("Row".to_string()),
            QueryStep::Children("Cell".to_string())
        ]
    );
    assert_eq!(leaf.value_name, "value");

    let leaf = QueryBuilder::create_leaf_query("P;value").unwrap();
    assert_eq!(leaf.query.steps(), &[QueryStep::Parent]);
    assert_eq!(leaf.value_name, "value");

    assert!(QueryBuilder::create_leaf_query("C{Row").is_none());
    assert!(QueryBuilder::create_node_query("Children{Row};Parent;Siblings").is_some());
    assert!(QueryBuilder::create_node_query("X").is_none());

    let built = QueryBuilder::new().parent().children("Category").build();
    assert_eq!(built.to_string(), "P;C{Category}");
}

#[test]
fn test_variant_follows_derived_id() {
    let fixture = library_schema();
    let root = filled_library(&fixture);
    let shelf = root.first_child("Shelf");
    let dune = shelf.first_child("Book");
    assert_eq!(dune.def(), Some(fixture.book));
    assert_eq!(dune.value("type"), Value::from("Book"));

    assert!(!dune.set_value("type", "Magazine"));
    assert!(!dune.set_value("author", "Herbert"));
    assert!(dune.set_value("type", "Novel"));

    let novel = dune.resolved();
    assert_eq!(novel.def(), Some(fixture.novel));
    assert!(novel.set_value("author", "Herbert"));
    assert_eq!(shelf.first_child("Book").def(), Some(fixture.novel));
    assert_eq!(shelf.first_child("Book").value("title"), Value::from("Dune"));

    let inserted = shelf.insert_child_variant("Book", 2, fixture.novel);
    assert_eq!(inserted.value("type"), Value::from("Novel"));
    assert_eq!(shelf.child("Book", 2).def(), Some(fixture.novel));
}

#[test]
fn test_edits_through_queries() {
    let fixture = library_schema();
    let root = filled_library(&fixture);
    let books = NodeQuery::parse("C{Shelf};C{Book}").unwrap();

    // Edits land in the first shelf
    let inserted = books.insert(&root, 1);
    assert!(!inserted.is_null());
    assert_eq!(root.first_child("Shelf").child_index("Book", &inserted), Some(1));

    let ulysses = root.child("Shelf", 1).first_child("Book");
    let moved = books.move_into(&root, 0, &ulysses);
    assert_eq!(moved.value("title"), Value::from("Ulysses"));
    assert_eq!(root.child("Shelf", 1).child_count("Book"), 0);
    assert_eq!(root.first_child("Shelf").child_count("Book"), 4);

    let copy = books.clone_into(&root, 4, &moved);
    assert_eq!(copy.value("title"), Value::from("Ulysses"));
    assert_ne!(copy, moved);

    assert!(books.can_remove(&root, 4));
    assert!(books.remove(&root, 4));
    assert!(!books.can_remove(&root, 4));
    assert_eq!(all_books(&root).len(), 4);
}

#[test]
fn test_iterator_matches_evaluation_and_reseeds() {
    let fixture = library_schema();
    let root = filled_library(&fixture);
    let query = NodeQuery::parse("C{Shelf};C{Book}").unwrap();

    let mut iter = query.iter(&root);
    let lazy: Vec<Instance> = iter.by_ref().collect();
    assert_eq!(lazy, query.evaluate(&root));
    assert!(iter.next().is_none());

    root.child("Shelf", 2).insert_child("Book", 0);
    iter.reset(&root);
    assert_eq!(iter.count(), 4);
}

#[test]
fn test_removing_an_ancestor_moves_current_to_the_host() {
    let fixture = library_schema();
    let model = TreeModel::with_schema(fixture.schema.clone());
    let root = model.create_new_root_document();
    let shelf = root.insert_child("Shelf", 0);
    let book = shelf.insert_child("Book", 0);
    assert!(book.set_value("title", "Dune"));
    assert!(model.set_current(&book, false));

    let moves = Arc::new(Mutex::new(Vec::new()));
    let sink = moves.clone();
    model.subscribe(
        &[NotificationKind::CurrentChanged],
        Arc::new(move |_: &TreeModel, notification: &Notification| {
            sink.lock().push(notification.clone());
        }),
    );

    assert!(root.remove_child("Shelf", 0));
    assert!(book.is_null());
    assert_eq!(model.current(), root);
    assert_eq!(
        *moves.lock(),
        vec![Notification::CurrentChanged {
            path: root.path(),
            forced: false,
        }]
    );
}
