use laminate_core::schema::{
    Cardinality, Definition, Element, KeyRef, Relation, RelationPayload, ScalarType, Schema,
    SynthesizedKey,
};
use laminate_core::{codes, lower, Diagnostics, Level, Options};

use pretty_assertions::assert_eq;

fn scalar(name: &str) -> Element {
    Element::scalar(name, ScalarType::string(None))
}

fn key_scalar(name: &str, ty: ScalarType) -> Element {
    let mut element = Element::scalar(name, ty);
    element.key = true;
    element.not_null = true;
    element
}

fn item_order_schema() -> Schema {
    let mut schema = Schema::new();

    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID", ScalarType::uuid()));
    item.push_element(Element::relation("order", Relation::association("shop.Order")));
    schema.insert(item);

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID", ScalarType::string(Some(36))));
    schema.insert(order);

    schema
}

#[test]
fn synthesizes_foreign_key_after_the_relation() {
    let schema = item_order_schema();
    let mut diag = Diagnostics::new();

    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();
    let item = lowered.schema.expect_definition("shop.Item");

    let names: Vec<&str> = item
        .elements
        .values()
        .map(|element| element.name.as_str())
        .collect();
    assert_eq!(names, ["ID", "order", "order_ID"]);

    // Type facets are copied verbatim from the target leaf.
    let fk = item.element("order_ID").unwrap();
    assert_eq!(fk.as_scalar().unwrap(), &ScalarType::string(Some(36)));
    assert_eq!(fk.origin.as_deref(), Some("order"));

    let relation = item.element("order").unwrap().expect_relation();
    assert_eq!(
        relation.synthesized,
        [SynthesizedKey {
            name: "order_ID".into(),
            parent: "ID".into(),
        }]
    );
}

#[test]
fn key_count_matches_the_flattened_primary_key_of_the_target() {
    let mut schema = Schema::new();

    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID", ScalarType::uuid()));
    item.push_element(Element::relation("order", Relation::association("shop.Order")));
    schema.insert(item);

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID", ScalarType::uuid()));
    let mut code = Element::structured("code", vec![scalar("region"), scalar("serial")]);
    code.key = true;
    order.push_element(code);
    schema.insert(order);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();

    let item = lowered.schema.expect_definition("shop.Item");
    let relation = item.element("order").unwrap().expect_relation();

    let key_names: Vec<&str> = relation
        .synthesized
        .iter()
        .map(|synthesized| synthesized.name.as_str())
        .collect();
    assert_eq!(key_names, ["order_ID", "order_code_region", "order_code_serial"]);

    let order = lowered.schema.expect_definition("shop.Order");
    let pk_leaves = order.key_elements().count();
    assert_eq!(relation.synthesized.len(), pk_leaves);
}

#[test]
fn chains_through_relationships_used_as_keys() {
    let mut schema = Schema::new();

    // Forward references: `a` is defined before either of its targets.
    let mut a = Definition::entity("app.A");
    a.push_element(key_scalar("ID", ScalarType::uuid()));
    a.push_element(Element::relation("to_b", Relation::association("app.B")));
    schema.insert(a);

    let mut b = Definition::entity("app.B");
    let mut to_c = Element::relation("to_c", Relation::association("app.C"));
    to_c.key = true;
    to_c.not_null = true;
    b.push_element(to_c);
    schema.insert(b);

    let mut c = Definition::entity("app.C");
    c.push_element(key_scalar("ID", ScalarType::uuid()));
    schema.insert(c);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();

    let b = lowered.schema.expect_definition("app.B");
    assert!(b.element("to_c_ID").unwrap().key);

    let a = lowered.schema.expect_definition("app.A");
    let relation = a.element("to_b").unwrap().expect_relation();
    assert_eq!(
        relation.synthesized,
        [SynthesizedKey {
            name: "to_b_to_c_ID".into(),
            parent: "to_c_ID".into(),
        }]
    );
}

#[test]
fn cyclic_key_definitions_are_reported_not_looped() {
    let mut schema = Schema::new();

    let mut x = Definition::entity("app.X");
    let mut to_y = Element::relation("to_y", Relation::association("app.Y"));
    to_y.key = true;
    x.push_element(to_y);
    schema.insert(x);

    let mut y = Definition::entity("app.Y");
    let mut to_x = Element::relation("to_x", Relation::association("app.X"));
    to_x.key = true;
    y.push_element(to_x);
    schema.insert(y);

    let mut diag = Diagnostics::new();
    let err = lower(&schema, &Options::default(), &mut diag).unwrap_err();

    let cycles = err
        .diagnostics()
        .iter()
        .filter(|diagnostic| diagnostic.code == codes::REL_CYCLIC_KEYS)
        .count();
    assert_eq!(cycles, 2);
}

#[test]
fn explicit_key_alias_names_the_synthesized_element() {
    let mut schema = item_order_schema();

    let item = schema.definition_mut("shop.Item").unwrap();
    let relation = item
        .elements
        .get_mut("order")
        .and_then(Element::as_relation_mut)
        .unwrap();
    relation.payload = RelationPayload::Managed {
        keys: vec![KeyRef {
            path: vec!["ID".into()],
            alias: Some("oid".into()),
        }],
    };

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();

    let item = lowered.schema.expect_definition("shop.Item");
    let relation = item.element("order").unwrap().expect_relation();
    assert_eq!(
        relation.synthesized,
        [SynthesizedKey {
            name: "order_oid".into(),
            parent: "ID".into(),
        }]
    );
}

#[test]
fn missing_target_is_reported() {
    let mut schema = Schema::new();

    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID", ScalarType::uuid()));
    item.push_element(Element::relation("order", Relation::association("shop.Nowhere")));
    schema.insert(item);

    let mut diag = Diagnostics::new();
    let err = lower(&schema, &Options::default(), &mut diag).unwrap_err();

    assert_eq!(err.diagnostics()[0].code, codes::TYPE_UNRESOLVED);
}

#[test]
fn managed_to_many_association_warns_and_synthesizes_nothing() {
    let mut schema = Schema::new();

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID", ScalarType::uuid()));
    let mut items = Relation::association("shop.Item");
    items.cardinality = Cardinality::TO_MANY;
    order.push_element(Element::relation("items", items));
    schema.insert(order);

    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID", ScalarType::uuid()));
    schema.insert(item);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();

    let warning = diag
        .entries()
        .iter()
        .find(|diagnostic| diagnostic.code == codes::REL_MANAGED_TO_MANY)
        .unwrap();
    assert_eq!(warning.level, Level::Warning);

    let order = lowered.schema.expect_definition("shop.Order");
    let relation = order.element("items").unwrap().expect_relation();
    assert!(relation.keyed);
    assert!(relation.synthesized.is_empty());
}

#[test]
fn missing_backlink_is_reported() {
    let mut schema = Schema::new();

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID", ScalarType::uuid()));
    order.push_element(Element::relation(
        "items",
        Relation::composition_of_many("shop.Item").backlink("nope"),
    ));
    schema.insert(order);

    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID", ScalarType::uuid()));
    item.push_element(Element::relation("order", Relation::association("shop.Order")));
    schema.insert(item);

    let mut diag = Diagnostics::new();
    let err = lower(&schema, &Options::default(), &mut diag).unwrap_err();

    assert_eq!(err.diagnostics()[0].code, codes::REL_MISSING_BACKLINK);
}

#[test]
fn tenant_discriminator_widens_primary_and_foreign_keys() {
    let schema = item_order_schema();
    let options = Options {
        tenant_discriminator: true,
        ..Options::default()
    };

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &options, &mut diag).unwrap();

    let item = lowered.schema.expect_definition("shop.Item");
    let first = item.elements.values().next().unwrap();
    assert_eq!(first.name, "tenant");
    assert!(first.key);

    let relation = item.element("order").unwrap().expect_relation();
    let key_names: Vec<&str> = relation
        .synthesized
        .iter()
        .map(|synthesized| synthesized.name.as_str())
        .collect();
    assert_eq!(key_names, ["order_tenant", "order_ID"]);
}
