use laminate_core::schema::{Definition, Element, OnDelete, Relation, ScalarType, Schema};
use laminate_core::{
    codes, lower, CheckType, ConstraintMode, Diagnostics, Options,
};

use pretty_assertions::assert_eq;

fn key_scalar(name: &str) -> Element {
    let mut element = Element::scalar(name, ScalarType::uuid());
    element.key = true;
    element.not_null = true;
    element
}

fn item_order_schema(check_override: Option<CheckType>) -> Schema {
    let mut schema = Schema::new();

    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID"));
    let mut order = Relation::association("shop.Order");
    order.check_override = check_override;
    item.push_element(Element::relation("order", order));
    schema.insert(item);

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID"));
    schema.insert(order);

    schema
}

fn run(
    mode: ConstraintMode,
    check: CheckType,
    check_override: Option<CheckType>,
) -> bool {
    let schema = item_order_schema(check_override);
    let options = Options {
        constraint_mode: mode,
        constraint_check_type: check,
        ..Options::default()
    };

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &options, &mut diag).unwrap();

    !lowered
        .schema
        .expect_definition("shop.Item")
        .constraints
        .is_empty()
}

#[test]
fn decision_table_is_normative() {
    use CheckType::{Database, Runtime};
    use ConstraintMode::{Individual, Off, On};

    // | global switch | check type | override      | emit? |
    assert!(!run(Off, Runtime, None));
    assert!(!run(Off, Database, Some(Database)));
    assert!(!run(On, Runtime, None));
    assert!(run(On, Runtime, Some(Database)));
    assert!(run(On, Database, None));
    assert!(!run(On, Database, Some(Runtime)));
    assert!(run(Individual, Runtime, Some(Database)));
    assert!(run(Individual, Database, Some(Database)));
    assert!(!run(Individual, Runtime, None));
    assert!(!run(Individual, Database, Some(Runtime)));
}

fn database_options() -> Options {
    Options {
        constraint_mode: ConstraintMode::On,
        constraint_check_type: CheckType::Database,
        ..Options::default()
    }
}

#[test]
fn association_restricts_deletion() {
    let schema = item_order_schema(None);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &database_options(), &mut diag).unwrap();

    let item = lowered.schema.expect_definition("shop.Item");
    let constraint = &item.constraints["fk_Item_Order"];

    assert_eq!(constraint.dependent, ["order_ID"]);
    assert_eq!(constraint.parent.qualified(), "shop.Order");
    assert_eq!(constraint.parent_key, ["ID"]);
    assert_eq!(constraint.on_delete, OnDelete::Restrict);
    assert_eq!(constraint.source_relation, "order");
    assert!(constraint.validated);
    assert!(constraint.enforced);
}

#[test]
fn composition_cascades_on_the_back_reference() {
    let mut schema = Schema::new();

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID"));
    order.push_element(Element::relation(
        "items",
        Relation::composition_of_many("shop.Item").backlink("order"),
    ));
    schema.insert(order);

    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID"));
    item.push_element(Element::relation("order", Relation::association("shop.Order")));
    schema.insert(item);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &database_options(), &mut diag).unwrap();

    let item = lowered.schema.expect_definition("shop.Item");
    let constraint = &item.constraints["fk_Item_Order"];
    assert_eq!(constraint.dependent, ["order_ID"]);
    assert_eq!(constraint.on_delete, OnDelete::Cascade);

    // The inverse side reuses the forward constraint: nothing on Order.
    let order = lowered.schema.expect_definition("shop.Order");
    assert!(order.constraints.is_empty());
}

#[test]
fn suppressed_forward_side_still_materializes_the_constraint() {
    let mut schema = item_order_schema(None);

    // Non-navigable: hidden from bidirectional navigation, but keys and the
    // constraint are synthesized as if the forward side existed.
    schema
        .definition_mut("shop.Item")
        .unwrap()
        .elements
        .get_mut("order")
        .and_then(Element::as_relation_mut)
        .unwrap()
        .navigable = false;

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &database_options(), &mut diag).unwrap();

    let item = lowered.schema.expect_definition("shop.Item");
    assert!(item.element("order_ID").is_some());
    assert_eq!(item.constraints["fk_Item_Order"].dependent, ["order_ID"]);
}

#[test]
fn weaker_rule_wins_when_groups_merge() {
    let mut schema = Schema::new();

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID"));
    order.push_element(Element::relation(
        "items",
        Relation::composition_of_many("shop.Item").backlink("order"),
    ));
    schema.insert(order);

    // Two relationships to the same parent merge under one identifier: the
    // owning one alone would cascade, the plain association restricts.
    let mut item = Definition::entity("shop.Item");
    item.push_element(key_scalar("ID"));
    item.push_element(Element::relation("order", Relation::association("shop.Order")));
    item.push_element(Element::relation(
        "original",
        Relation::association("shop.Order"),
    ));
    schema.insert(item);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &database_options(), &mut diag).unwrap();

    let item = lowered.schema.expect_definition("shop.Item");
    assert_eq!(item.constraints.len(), 1);
    assert_eq!(
        item.constraints["fk_Item_Order"].on_delete,
        OnDelete::Restrict
    );
}

#[test]
fn no_constraint_when_either_side_is_degraded() {
    // Dependent not persisted.
    let mut schema = item_order_schema(None);
    schema.definition_mut("shop.Item").unwrap().persisted = false;
    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &database_options(), &mut diag).unwrap();
    assert!(lowered
        .schema
        .expect_definition("shop.Item")
        .constraints
        .is_empty());

    // Parent already exists externally.
    let mut schema = item_order_schema(None);
    schema.definition_mut("shop.Order").unwrap().external = true;
    diag.reset();
    let lowered = lower(&schema, &database_options(), &mut diag).unwrap();
    assert!(lowered
        .schema
        .expect_definition("shop.Item")
        .constraints
        .is_empty());
}

#[test]
fn identifier_collision_with_declared_unique_constraint_is_reported() {
    let mut schema = item_order_schema(None);
    schema
        .definition_mut("shop.Item")
        .unwrap()
        .unique
        .insert("fk_Item_Order".into(), vec!["ID".into()]);

    let mut diag = Diagnostics::new();
    let err = lower(&schema, &database_options(), &mut diag).unwrap_err();

    assert_eq!(
        err.diagnostics()[0].code,
        codes::CONSTRAINT_DUPLICATE_NAME
    );
}

#[test]
fn tenant_discriminator_widens_the_constraint() {
    let schema = item_order_schema(None);
    let options = Options {
        tenant_discriminator: true,
        ..database_options()
    };

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &options, &mut diag).unwrap();

    let item = lowered.schema.expect_definition("shop.Item");
    let constraint = &item.constraints["fk_Item_Order"];
    assert_eq!(constraint.dependent, ["order_tenant", "order_ID"]);
    assert_eq!(constraint.parent_key, ["tenant", "ID"]);
}
