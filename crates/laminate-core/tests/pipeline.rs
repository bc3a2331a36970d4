use laminate_core::schema::{Definition, Element, Relation, ScalarType, Schema};
use laminate_core::{codes, lower, Diagnostics, Error, Options, Target};

use pretty_assertions::assert_eq;

fn scalar(name: &str) -> Element {
    Element::scalar(name, ScalarType::string(None))
}

fn key_scalar(name: &str) -> Element {
    let mut element = scalar(name);
    element.key = true;
    element.not_null = true;
    element
}

fn shop_schema() -> Schema {
    let mut schema = Schema::new();

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID"));
    order.push_element(Element::structured(
        "ship",
        vec![scalar("city"), scalar("zip")],
    ));
    schema.insert(order);

    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID"));
    item.push_element(Element::relation("order", Relation::association("shop.Order")));
    schema.insert(item);

    schema
}

#[test]
fn the_callers_tree_is_never_mutated() {
    let schema = shop_schema();
    let before = format!("{schema:#?}");

    let mut diag = Diagnostics::new();
    let _ = lower(&schema, &Options::default(), &mut diag).unwrap();

    assert_eq!(format!("{schema:#?}"), before);
}

#[test]
fn diagnostics_accumulate_across_independent_definitions() {
    let mut schema = Schema::new();

    for name in ["app.One", "app.Two"] {
        let mut entity = Definition::entity(name);
        entity.push_element(key_scalar("ID"));
        entity.push_element(scalar("s_x"));
        entity.push_element(Element::structured("s", vec![scalar("x")]));
        schema.insert(entity);
    }

    let mut diag = Diagnostics::new();
    let err = lower(&schema, &Options::default(), &mut diag).unwrap_err();

    // Both definitions were processed before the checkpoint fired.
    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics
        .iter()
        .all(|diagnostic| diagnostic.code == codes::NAME_DUPLICATE_ELEMENT));
}

#[test]
fn malformed_option_combinations_are_rejected_up_front() {
    let options = Options {
        keep_structured: true,
        ..Options::default()
    };

    let mut diag = Diagnostics::new();
    let err = lower(&shop_schema(), &options, &mut diag).unwrap_err();

    assert!(matches!(err, Error::InvalidOptions(..)));
    assert!(diag.entries().is_empty());
}

#[test]
fn independent_targets_lower_their_own_clone() {
    let schema = shop_schema();

    let mut diag = Diagnostics::new();
    let relational = lower(&schema, &Options::default(), &mut diag).unwrap();

    // Fresh collector per compilation.
    diag.reset();
    let wire = lower(
        &schema,
        &Options {
            target: Target::WireMetadata,
            keep_structured: true,
            ..Options::default()
        },
        &mut diag,
    )
    .unwrap();

    let flat = relational.schema.expect_definition("shop.Order");
    assert!(flat.element("ship_city").is_some());

    let nested = wire.schema.expect_definition("shop.Order");
    assert!(nested.element("ship_city").is_none());
    assert!(nested.element("ship").unwrap().is_structural());

    // Both clones carry the synthesized relationship keys.
    for lowered in [&relational.schema, &wire.schema] {
        let item = lowered.expect_definition("shop.Item");
        let relation = item.element("order").unwrap().expect_relation();
        assert_eq!(relation.synthesized.len(), 1);
    }
}

#[test]
fn the_collector_resets_between_compilations() {
    let mut schema = Schema::new();
    let mut entity = Definition::entity("app.Broken");
    entity.push_element(key_scalar("ID"));
    entity.push_element(Element::named("blob", "app.Missing"));
    schema.insert(entity);

    let mut diag = Diagnostics::new();
    let _ = lower(&schema, &Options::default(), &mut diag).unwrap_err();
    assert!(diag.has_errors());

    diag.reset();
    assert!(!diag.has_errors());
    assert!(diag.entries().is_empty());

    let _ = lower(&shop_schema(), &Options::default(), &mut diag).unwrap();
    assert!(!diag.has_errors());
}
