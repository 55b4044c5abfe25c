use orchestra_persistence::{
    open_engine_in_memory, Context, ContextSpec, Crud, FieldMap, FieldValue, Node, NodeSpec,
    RepoError,
};
use serde::Serialize;
use serde_json::json;

#[test]
fn save_then_find_by_roundtrips_field_values() {
    let engine = open_engine_in_memory().unwrap();
    let context = Context::new("ctx1", "created", "/t.yaml", "{\"replicas\":2}");
    context.save(&engine).unwrap();

    let loaded = Context::find_by(&engine, &[("name", FieldValue::from("ctx1"))])
        .unwrap()
        .unwrap();
    assert_eq!(
        loaded.jsonify(),
        json!({
            "name": "ctx1",
            "status": "created",
            "template_path": "/t.yaml",
            "inputs": "{\"replicas\":2}",
        })
    );
}

#[test]
fn save_upserts_existing_row() {
    let engine = open_engine_in_memory().unwrap();
    let mut context = Context::new("ctx1", "created", "/t.yaml", "{}");
    context.save(&engine).unwrap();

    context.status = "deployed".to_string();
    context.save(&engine).unwrap();

    let all = Context::list(&engine).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, "deployed");
}

#[test]
fn creating_same_context_twice_keeps_one_row() {
    let engine = open_engine_in_memory().unwrap();
    Context::create(&spec("ctx1", &[]), &engine).unwrap();

    let err = Context::create(&spec("ctx1", &[]), &engine).unwrap_err();
    assert!(matches!(err, RepoError::Constraint(_)));

    let matching = Context::get_all_by(&engine, &[("name", FieldValue::from("ctx1"))]).unwrap();
    assert_eq!(matching.len(), 1);
}

#[test]
fn deleting_context_leaves_its_nodes() {
    let engine = open_engine_in_memory().unwrap();
    let context = Context::create(&spec("ctx1", &["n1", "n2"]), &engine).unwrap();

    context.delete(&engine).unwrap();

    assert!(Context::find(&engine, "ctx1").unwrap().is_none());
    let orphans = Node::get_all_by(&engine, &[("context", FieldValue::from("ctx1"))]).unwrap();
    let names: Vec<_> = orphans.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, ["n1", "n2"]);
}

#[test]
fn delete_of_missing_row_reports_not_found() {
    let engine = open_engine_in_memory().unwrap();
    let ghost = Context::new("ghost", "created", "/t.yaml", "{}");

    let err = ghost.delete(&engine).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { table: "context", .. }));
}

#[test]
fn update_ignores_unknown_fields_and_persists_known_ones() {
    let engine = open_engine_in_memory().unwrap();
    let mut context = Context::create(&spec("ctx1", &[]), &engine).unwrap();

    let mut values = FieldMap::new();
    values.insert("status".to_string(), FieldValue::from("deployed"));
    values.insert("no_such_field".to_string(), FieldValue::from("ignored"));
    let updated = context.update(&engine, &values).unwrap();

    assert_eq!(updated.status, "deployed");
    assert_eq!(context.status, "deployed");
    let stored = Context::find(&engine, "ctx1").unwrap().unwrap();
    assert_eq!(stored, updated);
}

#[test]
fn update_with_only_unknown_fields_is_a_no_op() {
    let engine = open_engine_in_memory().unwrap();
    let mut context = Context::create(&spec("ctx1", &[]), &engine).unwrap();
    let before = context.clone();

    let mut values = FieldMap::new();
    values.insert("colour".to_string(), FieldValue::from("blue"));
    let updated = context.update(&engine, &values).unwrap();

    assert_eq!(updated, before);
}

#[test]
fn update_rejects_mistyped_values() {
    let engine = open_engine_in_memory().unwrap();
    let mut context = Context::create(&spec("ctx1", &[]), &engine).unwrap();

    let before = context.clone();

    let mut values = FieldMap::new();
    values.insert("name".to_string(), FieldValue::from("ctx2"));
    values.insert("status".to_string(), FieldValue::Bool(true));
    let err = context.update(&engine, &values).unwrap_err();

    assert!(matches!(err, RepoError::InvalidField(_)));
    assert_eq!(context, before);
    assert_eq!(
        Context::find(&engine, "ctx1").unwrap().unwrap().status,
        "created"
    );

    context.status = "deployed".to_string();
    context.save(&engine).unwrap();
    let stored = Context::list(&engine).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "ctx1");
    assert_eq!(stored[0].status, "deployed");
}

#[test]
fn failed_update_leaves_the_entity_unchanged() {
    let engine = open_engine_in_memory().unwrap();
    let mut context = Context::create(&spec("ctx1", &[]), &engine).unwrap();
    Context::create(&spec("ctx2", &[]), &engine).unwrap();
    let before = context.clone();

    let mut values = FieldMap::new();
    values.insert("name".to_string(), FieldValue::from("ctx2"));
    values.insert("status".to_string(), FieldValue::from("deployed"));
    let err = context.update(&engine, &values).unwrap_err();

    assert!(matches!(err, RepoError::Constraint(_)));
    assert_eq!(context, before);
}

#[test]
fn update_of_name_renames_the_stored_row() {
    let engine = open_engine_in_memory().unwrap();
    let mut context = Context::create(&spec("ctx1", &[]), &engine).unwrap();

    let mut values = FieldMap::new();
    values.insert("name".to_string(), FieldValue::from("ctx2"));
    let updated = context.update(&engine, &values).unwrap();

    assert_eq!(updated.name, "ctx2");
    assert!(Context::find(&engine, "ctx1").unwrap().is_none());
    assert_eq!(Context::list(&engine).unwrap().len(), 1);
}

#[test]
fn lookups_distinguish_absent_from_empty() {
    let engine = open_engine_in_memory().unwrap();
    Context::create(&spec("ctx1", &[]), &engine).unwrap();

    let none = Context::find_by(&engine, &[("status", FieldValue::from("deleted"))]).unwrap();
    assert!(none.is_none());

    let empty = Context::get_all_by(&engine, &[("status", FieldValue::from("deleted"))]).unwrap();
    assert!(empty.is_empty());
}

#[test]
fn filters_require_every_pair_to_match() {
    let engine = open_engine_in_memory().unwrap();
    Context::new("a", "created", "/a.yaml", "{}").save(&engine).unwrap();
    Context::new("b", "created", "/b.yaml", "{}").save(&engine).unwrap();
    Context::new("c", "deployed", "/a.yaml", "{}").save(&engine).unwrap();

    let matches = Context::get_all_by(
        &engine,
        &[
            ("status", FieldValue::from("created")),
            ("template_path", FieldValue::from("/a.yaml")),
        ],
    )
    .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].name, "a");
}

#[test]
fn filters_reject_undeclared_fields() {
    let engine = open_engine_in_memory().unwrap();

    let err = Context::find_by(&engine, &[("owner", FieldValue::from("x"))]).unwrap_err();
    assert!(matches!(
        err,
        RepoError::UnknownField { table: "context", .. }
    ));
}

#[test]
fn create_writes_nodes_in_description_order() {
    let engine = open_engine_in_memory().unwrap();
    let context = Context::create(&spec("ctx1", &["A", "B", "C"]), &engine).unwrap();

    let nodes = context.nodes(&engine).unwrap();
    let names: Vec<_> = nodes.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, ["A", "B", "C"]);
    assert!(nodes
        .iter()
        .all(|node| node.context.as_deref() == Some("ctx1")));
}

#[test]
fn create_keeps_nodes_written_before_a_failure() {
    let engine = open_engine_in_memory().unwrap();
    Context::create(&spec("other", &["taken"]), &engine).unwrap();

    let err = Context::create(&spec("ctx1", &["first", "taken", "last"]), &engine).unwrap_err();
    assert!(matches!(err, RepoError::Constraint(_)));

    let nodes = Node::get_all_by(&engine, &[("context", FieldValue::from("ctx1"))]).unwrap();
    let names: Vec<_> = nodes.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, ["first"]);
    assert!(Context::find(&engine, "ctx1").unwrap().is_some());
}

#[test]
fn create_accepts_any_serializable_description() {
    #[derive(Serialize)]
    struct Deployment<'a> {
        name: &'a str,
        status: &'a str,
        template_path: &'a str,
        inputs: String,
        nodes: Vec<serde_json::Value>,
        extra: u32,
    }

    let engine = open_engine_in_memory().unwrap();
    let description = Deployment {
        name: "ctx1",
        status: "created",
        template_path: "/t.yaml",
        inputs: json!({"region": "eu"}).to_string(),
        nodes: vec![json!({
            "__name": "n1",
            "is_provisioned": false,
            "__properties": "{}",
            "__attributes": null,
            "runtime_properties": null,
        })],
        extra: 7,
    };

    let context = Context::create(&description, &engine).unwrap();
    assert_eq!(context.inputs, "{\"region\":\"eu\"}");
    assert_eq!(context.nodes(&engine).unwrap().len(), 1);
}

#[test]
fn create_rejects_description_without_nodes() {
    let engine = open_engine_in_memory().unwrap();
    let description = json!({
        "name": "ctx1",
        "status": "created",
        "template_path": "/t.yaml",
        "inputs": "{}",
    });

    let err = Context::create(&description, &engine).unwrap_err();
    assert!(matches!(err, RepoError::InvalidDescription(_)));
    assert!(Context::list(&engine).unwrap().is_empty());
}

#[test]
fn assemble_combines_context_and_nodes() {
    let engine = open_engine_in_memory().unwrap();
    Context::create(&spec("ctx1", &["n1"]), &engine).unwrap();

    let assembled = Context::assemble("ctx1", &engine).unwrap().unwrap();
    assert_eq!(
        assembled.jsonify(),
        json!({
            "name": "ctx1",
            "status": "created",
            "template_path": "/t.yaml",
            "inputs": "{}",
            "path": "/t.yaml",
            "nodes": [{
                "name": "n1",
                "is_provisioned": false,
                "__properties": null,
                "__attributes": null,
                "runtime_properties": null,
            }],
        })
    );
}

#[test]
fn assemble_of_unknown_context_is_absent() {
    let engine = open_engine_in_memory().unwrap();

    assert!(Context::assemble("missing", &engine).unwrap().is_none());
}

#[test]
fn assemble_only_collects_own_nodes() {
    let engine = open_engine_in_memory().unwrap();
    Context::create(&spec("ctx1", &["a1", "a2"]), &engine).unwrap();
    Context::create(&spec("ctx2", &["b1"]), &engine).unwrap();

    let assembled = Context::assemble("ctx2", &engine).unwrap().unwrap();
    assert_eq!(assembled.nodes.len(), 1);
    assert_eq!(assembled.nodes[0].name, "b1");
}

fn spec(name: &str, node_names: &[&str]) -> ContextSpec {
    ContextSpec {
        name: name.to_string(),
        status: "created".to_string(),
        template_path: "/t.yaml".to_string(),
        inputs: "{}".to_string(),
        nodes: node_names
            .iter()
            .map(|node_name| NodeSpec {
                name: (*node_name).to_string(),
                is_provisioned: false,
                properties: None,
                attributes: None,
                runtime_properties: None,
            })
            .collect(),
    }
}
