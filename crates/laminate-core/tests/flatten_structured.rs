use laminate_core::schema::{Definition, Element, ElementTy, ScalarType, Schema};
use laminate_core::{codes, lower, Diagnostics, Level, Options, Separator, Target};

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

fn order_schema() -> Schema {
    let mut schema = Schema::new();

    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID"));
    order.push_element(Element::structured(
        "ship",
        vec![scalar("city"), scalar("zip")],
    ));
    schema.insert(order);

    schema
}

fn rendered_names(definition: &Definition) -> Vec<String> {
    definition
        .rendered_elements()
        .map(|element| element.name.clone())
        .collect()
}

#[test]
fn flattens_structured_elements_into_leaves() {
    let schema = order_schema();
    let mut diag = Diagnostics::new();

    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();
    let order = lowered.schema.expect_definition("shop.Order");

    assert_eq!(rendered_names(order), ["ID", "ship_city", "ship_zip"]);

    // The structural element is retained for traceability, never rendered.
    let marker = order.element("ship").unwrap();
    assert!(marker.ignored);
}

#[test]
fn preserves_sibling_order() {
    let mut schema = Schema::new();
    let mut entity = Definition::entity("app.E");
    entity.push_element(key_scalar("a"));
    entity.push_element(Element::structured("s", vec![scalar("x"), scalar("y")]));
    entity.push_element(scalar("b"));
    schema.insert(entity);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();
    let entity = lowered.schema.expect_definition("app.E");

    assert_eq!(rendered_names(entity), ["a", "s_x", "s_y", "b"]);
}

#[test]
fn flattening_is_idempotent() {
    let schema = order_schema();
    let options = Options::default();

    let mut diag = Diagnostics::new();
    let once = lower(&schema, &options, &mut diag).unwrap();

    diag.reset();
    let twice = lower(&once.schema, &options, &mut diag).unwrap();

    let first = once.schema.expect_definition("shop.Order");
    let second = twice.schema.expect_definition("shop.Order");

    assert_eq!(rendered_names(first), rendered_names(second));
    assert_eq!(first.elements.len(), second.elements.len());
}

#[test]
fn key_flag_propagates_to_leaves() {
    let mut schema = Schema::new();
    let mut entity = Definition::entity("app.E");
    let mut code = Element::structured("code", vec![scalar("region"), scalar("serial")]);
    code.key = true;
    entity.push_element(code);
    schema.insert(entity);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();
    let entity = lowered.schema.expect_definition("app.E");

    assert!(entity.element("code_region").unwrap().key);
    assert!(entity.element("code_serial").unwrap().key);
}

#[test]
fn reports_duplicate_flattened_names() {
    let mut schema = Schema::new();
    let mut order = Definition::entity("shop.Order");
    order.push_element(key_scalar("ID"));
    order.push_element(scalar("ship_city"));
    order.push_element(Element::structured("ship", vec![scalar("city")]));
    schema.insert(order);

    let mut diag = Diagnostics::new();
    let err = lower(&schema, &Options::default(), &mut diag).unwrap_err();

    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::NAME_DUPLICATE_ELEMENT);
}

#[test]
fn dot_separator_joins_with_dots() {
    let schema = order_schema();
    let options = Options {
        name_separator: Separator::Dot,
        ..Options::default()
    };

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &options, &mut diag).unwrap();
    let order = lowered.schema.expect_definition("shop.Order");

    assert_eq!(rendered_names(order), ["ID", "ship.city", "ship.zip"]);
}

#[test]
fn named_structured_types_flatten_through() {
    let mut schema = Schema::new();

    let mut address = Definition::structured_type("shop.Address");
    address.push_element(scalar("street"));
    address.push_element(Element::structured(
        "geo",
        vec![scalar("lat"), scalar("lon")],
    ));
    schema.insert(address);

    let mut customer = Definition::entity("shop.Customer");
    customer.push_element(key_scalar("ID"));
    customer.push_element(Element::named("addr", "shop.Address"));
    schema.insert(customer);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();
    let customer = lowered.schema.expect_definition("shop.Customer");

    assert_eq!(
        rendered_names(customer),
        ["ID", "addr_street", "addr_geo_lat", "addr_geo_lon"]
    );
}

#[test]
fn unresolved_named_type_is_fatal_for_that_definition_only() {
    let mut schema = Schema::new();

    let mut broken = Definition::entity("app.Broken");
    broken.push_element(key_scalar("ID"));
    broken.push_element(Element::named("blob", "app.Missing"));
    schema.insert(broken);

    let mut fine = Definition::entity("app.Fine");
    fine.push_element(key_scalar("ID"));
    fine.push_element(Element::structured("s", vec![scalar("x")]));
    schema.insert(fine);

    let mut diag = Diagnostics::new();
    let err = lower(&schema, &Options::default(), &mut diag).unwrap_err();

    // One error for the broken definition; the sibling kept processing and
    // raised nothing.
    let diagnostics = err.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::TYPE_UNRESOLVED);
}

#[test]
fn cyclic_structured_types_are_reported() {
    let mut schema = Schema::new();

    let mut left = Definition::structured_type("app.Left");
    left.push_element(Element::named("right", "app.Right"));
    schema.insert(left);

    let mut right = Definition::structured_type("app.Right");
    right.push_element(Element::named("left", "app.Left"));
    schema.insert(right);

    let mut user = Definition::entity("app.User");
    user.push_element(key_scalar("ID"));
    user.push_element(Element::named("l", "app.Left"));
    schema.insert(user);

    let mut diag = Diagnostics::new();
    let err = lower(&schema, &Options::default(), &mut diag).unwrap_err();

    assert!(err
        .diagnostics()
        .iter()
        .any(|diagnostic| diagnostic.code == codes::TYPE_CYCLIC));
}

#[test]
fn array_elements_are_dropped_for_the_relational_target() {
    let mut schema = Schema::new();
    let mut post = Definition::entity("blog.Post");
    post.push_element(key_scalar("ID"));
    post.push_element(Element::array(
        "tags",
        ElementTy::Scalar(ScalarType::string(None)),
    ));
    schema.insert(post);

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &Options::default(), &mut diag).unwrap();

    // The column is degraded, not the compilation.
    let post = lowered.schema.expect_definition("blog.Post");
    assert_eq!(rendered_names(post), ["ID"]);
    assert!(post.element("tags").unwrap().ignored);

    let warning = diag
        .entries()
        .iter()
        .find(|diagnostic| diagnostic.code == codes::TYPE_ARRAY_UNSUPPORTED)
        .unwrap();
    assert_eq!(warning.level, Level::Warning);
}

#[test]
fn array_elements_survive_the_wire_metadata_target() {
    let mut schema = Schema::new();
    let mut post = Definition::entity("blog.Post");
    post.push_element(key_scalar("ID"));
    post.push_element(Element::array(
        "tags",
        ElementTy::Scalar(ScalarType::string(None)),
    ));
    schema.insert(post);

    let options = Options {
        target: Target::WireMetadata,
        ..Options::default()
    };

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &options, &mut diag).unwrap();

    let post = lowered.schema.expect_definition("blog.Post");
    assert_eq!(rendered_names(post), ["ID", "tags"]);
    assert!(diag.entries().is_empty());
}

#[test]
fn keep_structured_skips_flattening() {
    let schema = order_schema();
    let options = Options {
        target: Target::WireMetadata,
        keep_structured: true,
        ..Options::default()
    };

    let mut diag = Diagnostics::new();
    let lowered = lower(&schema, &options, &mut diag).unwrap();
    let order = lowered.schema.expect_definition("shop.Order");

    assert_eq!(rendered_names(order), ["ID", "ship"]);
    assert!(order.element("ship").unwrap().is_structural());
}
