//! Live integration tests for webshop-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/webshop-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use rust_decimal::Decimal;
use webshop_db::{
    create_attribute, create_product, create_template, create_variant, delete_product,
    delete_template, get_product, get_variant, list_attribute_products, list_attribute_values,
    list_attribute_variants, list_connected_product_attributes,
    list_connected_variant_attributes, list_products, list_variants_by_product, update_attribute,
    update_product, update_template, update_variant, ConnectedAttributeInput, DbError,
    JunctionInput, NewProduct, ProductPatch, ValueInput, VariantWrite,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn value_input(id: Option<i64>, name: &str, value: &str) -> ValueInput {
    ValueInput {
        id,
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn variant_write(id: Option<i64>, name: &str) -> VariantWrite {
    VariantWrite {
        id,
        name: name.to_string(),
        set_price_amount: None,
        set_price_currency: None,
        set_active: None,
    }
}

fn new_product<'a>(name: &'a str, template_id: i64) -> NewProduct<'a> {
    NewProduct {
        name,
        description: None,
        product_template_id: template_id,
        min_price_amount: Decimal::ZERO,
        min_price_currency: "EUR",
        active: false,
    }
}

/// Create a template plus a product under it; returns (template_id, product_id).
async fn seed_template_and_product(pool: &sqlx::PgPool) -> (i64, i64) {
    let template = create_template(pool, "Shirt", true, &[], &[])
        .await
        .expect("create_template failed");
    let product = create_product(pool, &new_product("Basic Tee", template.id), &[], &[], "EUR")
        .await
        .expect("create_product failed");
    (template.id, product.id)
}

// ---------------------------------------------------------------------------
// Section 1: Attributes and value reconciliation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn attribute_create_persists_values_and_generates_slug(pool: sqlx::PgPool) {
    let attribute = create_attribute(
        &pool,
        "Color",
        &[
            value_input(None, "Red", "red"),
            value_input(None, "Blue", "blue"),
        ],
    )
    .await
    .expect("create_attribute failed");

    assert_eq!(attribute.name, "Color");
    assert_eq!(attribute.slug.len(), 10);
    assert!(attribute.slug.chars().all(|c| c.is_ascii_alphanumeric()));

    let values = list_attribute_values(&pool, attribute.id)
        .await
        .expect("list_attribute_values failed");
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].name, "Red");
    assert_eq!(values[1].value, "blue");
}

#[sqlx::test(migrations = "../../migrations")]
async fn attribute_update_reconciles_value_set(pool: sqlx::PgPool) {
    let attribute = create_attribute(
        &pool,
        "Size",
        &[
            value_input(None, "Small", "s"),
            value_input(None, "Medium", "m"),
        ],
    )
    .await
    .expect("create failed");

    let before = list_attribute_values(&pool, attribute.id).await.unwrap();
    let keep_id = before[0].id;

    // Keep+rename the first value, drop the second, add a third.
    update_attribute(
        &pool,
        attribute.id,
        None,
        Some(&[
            value_input(Some(keep_id), "Small (EU)", "s"),
            value_input(None, "Large", "l"),
        ]),
    )
    .await
    .expect("update_attribute failed");

    let after = list_attribute_values(&pool, attribute.id).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].id, keep_id);
    assert_eq!(after[0].name, "Small (EU)");
    assert_eq!(after[1].name, "Large");
    assert!(after.iter().all(|v| v.name != "Medium"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn attribute_update_with_foreign_value_id_rolls_back(pool: sqlx::PgPool) {
    let first = create_attribute(&pool, "Color", &[value_input(None, "Red", "red")])
        .await
        .unwrap();
    let second = create_attribute(&pool, "Size", &[value_input(None, "Small", "s")])
        .await
        .unwrap();

    let foreign_id = list_attribute_values(&pool, second.id).await.unwrap()[0].id;

    let err = update_attribute(
        &pool,
        first.id,
        Some("Colour"),
        Some(&[value_input(Some(foreign_id), "Green", "green")]),
    )
    .await
    .expect_err("value id from another attribute should be rejected");

    assert!(matches!(err, DbError::MissingChild { id, .. } if id == foreign_id));

    // The whole write rolled back: name and values are untouched.
    let reloaded = webshop_db::get_attribute(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(reloaded.name, "Color");
    let values = list_attribute_values(&pool, first.id).await.unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].name, "Red");
}

#[sqlx::test(migrations = "../../migrations")]
async fn attribute_update_without_values_leaves_values_untouched(pool: sqlx::PgPool) {
    let attribute = create_attribute(&pool, "Color", &[value_input(None, "Red", "red")])
        .await
        .unwrap();

    update_attribute(&pool, attribute.id, Some("Colour"), None)
        .await
        .expect("update failed");

    let values = list_attribute_values(&pool, attribute.id).await.unwrap();
    assert_eq!(values.len(), 1, "omitted value list must not delete values");
}

// ---------------------------------------------------------------------------
// Section 2: Templates and junction reconciliation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn template_create_persists_junctions(pool: sqlx::PgPool) {
    let color = create_attribute(&pool, "Color", &[]).await.unwrap();
    let size = create_attribute(&pool, "Size", &[]).await.unwrap();

    let template = create_template(
        &pool,
        "Shirt",
        true,
        &[JunctionInput {
            id: None,
            attribute_id: color.id,
        }],
        &[JunctionInput {
            id: None,
            attribute_id: size.id,
        }],
    )
    .await
    .expect("create_template failed");

    assert!(template.has_variants);
    assert_eq!(template.slug.len(), 10);

    let product_junctions = list_attribute_products(&pool, template.id).await.unwrap();
    assert_eq!(product_junctions.len(), 1);
    assert_eq!(product_junctions[0].attribute_id, color.id);
    assert_eq!(product_junctions[0].attribute_name, "Color");
}

#[sqlx::test(migrations = "../../migrations")]
async fn template_update_reconciles_junctions(pool: sqlx::PgPool) {
    let color = create_attribute(&pool, "Color", &[]).await.unwrap();
    let size = create_attribute(&pool, "Size", &[]).await.unwrap();
    let material = create_attribute(&pool, "Material", &[]).await.unwrap();

    let template = create_template(
        &pool,
        "Shirt",
        false,
        &[
            JunctionInput {
                id: None,
                attribute_id: color.id,
            },
            JunctionInput {
                id: None,
                attribute_id: size.id,
            },
        ],
        &[],
    )
    .await
    .unwrap();

    let before = list_attribute_products(&pool, template.id).await.unwrap();
    let keep_id = before[0].id;

    update_template(
        &pool,
        template.id,
        None,
        Some(true),
        Some(&[
            JunctionInput {
                id: Some(keep_id),
                attribute_id: color.id,
            },
            JunctionInput {
                id: None,
                attribute_id: material.id,
            },
        ]),
        None,
    )
    .await
    .expect("update_template failed");

    let after = list_attribute_products(&pool, template.id).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].id, keep_id);
    assert!(after.iter().any(|j| j.attribute_id == material.id));
    assert!(after.iter().all(|j| j.attribute_id != size.id));
}

#[sqlx::test(migrations = "../../migrations")]
async fn template_delete_cascades_to_products(pool: sqlx::PgPool) {
    let (template_id, product_id) = seed_template_and_product(&pool).await;

    let deleted = delete_template(&pool, template_id).await.unwrap();
    assert!(deleted);

    assert!(get_product(&pool, product_id).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Section 3: Products, price defaults, and nested variants
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn product_create_applies_defaults(pool: sqlx::PgPool) {
    let (_, product_id) = seed_template_and_product(&pool).await;

    let product = get_product(&pool, product_id).await.unwrap().unwrap();
    assert!(!product.active);
    assert_eq!(product.min_price_amount, Decimal::ZERO);
    assert_eq!(product.min_price_currency, "EUR");
    assert!(product.description.is_none());
    assert_eq!(product.slug.len(), 10);
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_list_filters_on_active_state(pool: sqlx::PgPool) {
    let template = create_template(&pool, "Shirt", false, &[], &[]).await.unwrap();
    create_product(&pool, &new_product("Hidden Tee", template.id), &[], &[], "EUR")
        .await
        .unwrap();
    let live = create_product(
        &pool,
        &NewProduct {
            active: true,
            ..new_product("Live Tee", template.id)
        },
        &[],
        &[],
        "EUR",
    )
    .await
    .unwrap();

    let all = list_products(&pool, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let active = list_products(&pool, Some(true)).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, live.id);

    let inactive = list_products(&pool, Some(false)).await.unwrap();
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].name, "Hidden Tee");
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_create_inserts_nested_variants(pool: sqlx::PgPool) {
    let template = create_template(&pool, "Shirt", true, &[], &[]).await.unwrap();

    let mut red = variant_write(None, "Basic Tee / Red");
    red.set_price_amount = Some(Decimal::new(1999, 2));
    red.set_price_currency = Some("USD".to_string());

    let product = create_product(
        &pool,
        &new_product("Basic Tee", template.id),
        &[],
        &[red, variant_write(None, "Basic Tee / Blue")],
        "EUR",
    )
    .await
    .expect("create_product failed");

    let variants = list_variants_by_product(&pool, product.id).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].price_amount, Decimal::new(1999, 2));
    assert_eq!(variants[0].price_currency, "USD");
    // Unsubmitted price falls back to zero in the configured default currency.
    assert_eq!(variants[1].price_amount, Decimal::ZERO);
    assert_eq!(variants[1].price_currency, "EUR");
    assert!(!variants[1].active);
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_update_reconciles_variants(pool: sqlx::PgPool) {
    let template = create_template(&pool, "Shirt", true, &[], &[]).await.unwrap();
    let product = create_product(
        &pool,
        &new_product("Basic Tee", template.id),
        &[],
        &[
            variant_write(None, "Red"),
            variant_write(None, "Blue"),
        ],
        "EUR",
    )
    .await
    .unwrap();

    let before = list_variants_by_product(&pool, product.id).await.unwrap();
    let keep_id = before[0].id;

    let mut renamed = variant_write(Some(keep_id), "Crimson");
    renamed.set_active = Some(true);

    update_product(
        &pool,
        product.id,
        &ProductPatch::default(),
        None,
        Some(&[renamed, variant_write(None, "Green")]),
        "EUR",
    )
    .await
    .expect("update_product failed");

    let after = list_variants_by_product(&pool, product.id).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].id, keep_id);
    assert_eq!(after[0].name, "Crimson");
    assert!(after[0].active);
    assert_eq!(after[1].name, "Green");
    assert!(after.iter().all(|v| v.name != "Blue"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_update_with_foreign_variant_id_rolls_back(pool: sqlx::PgPool) {
    let template = create_template(&pool, "Shirt", true, &[], &[]).await.unwrap();
    let first = create_product(
        &pool,
        &new_product("Basic Tee", template.id),
        &[],
        &[variant_write(None, "Red")],
        "EUR",
    )
    .await
    .unwrap();
    let second = create_product(
        &pool,
        &new_product("Fancy Tee", template.id),
        &[],
        &[variant_write(None, "Gold")],
        "EUR",
    )
    .await
    .unwrap();

    let foreign_id = list_variants_by_product(&pool, second.id).await.unwrap()[0].id;

    let err = update_product(
        &pool,
        first.id,
        &ProductPatch {
            name: Some("Renamed Tee"),
            ..ProductPatch::default()
        },
        None,
        Some(&[variant_write(Some(foreign_id), "Stolen")]),
        "EUR",
    )
    .await
    .expect_err("variant id from another product should be rejected");

    assert!(matches!(err, DbError::MissingChild { id, .. } if id == foreign_id));

    // Rolled back: name unchanged, both products keep their variants.
    let reloaded = get_product(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(reloaded.name, "Basic Tee");
    assert_eq!(
        list_variants_by_product(&pool, first.id).await.unwrap().len(),
        1
    );
    let stolen = get_variant(&pool, foreign_id).await.unwrap().unwrap();
    assert_eq!(stolen.name, "Gold");
    assert_eq!(stolen.product_id, second.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_patch_overlays_only_submitted_fields(pool: sqlx::PgPool) {
    let template = create_template(&pool, "Shirt", false, &[], &[]).await.unwrap();
    let product = create_product(
        &pool,
        &NewProduct {
            name: "Basic Tee",
            description: Some("Plain cotton tee"),
            product_template_id: template.id,
            min_price_amount: Decimal::new(500, 2),
            min_price_currency: "USD",
            active: true,
        },
        &[],
        &[],
        "EUR",
    )
    .await
    .unwrap();

    // Amount alone: currency stays USD.
    let updated = update_product(
        &pool,
        product.id,
        &ProductPatch {
            set_min_price_amount: Some(Decimal::new(750, 2)),
            ..ProductPatch::default()
        },
        None,
        None,
        "EUR",
    )
    .await
    .unwrap();
    assert_eq!(updated.min_price_amount, Decimal::new(750, 2));
    assert_eq!(updated.min_price_currency, "USD");
    assert_eq!(updated.description.as_deref(), Some("Plain cotton tee"));

    // Explicit null clears the description; omitted fields keep their values.
    let cleared = update_product(
        &pool,
        product.id,
        &ProductPatch {
            description: Some(None),
            ..ProductPatch::default()
        },
        None,
        None,
        "EUR",
    )
    .await
    .unwrap();
    assert!(cleared.description.is_none());
    assert_eq!(cleared.name, "Basic Tee");
    assert!(cleared.active);
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_update_unknown_id_is_not_found(pool: sqlx::PgPool) {
    let err = update_product(
        &pool,
        999_999,
        &ProductPatch::default(),
        None,
        None,
        "EUR",
    )
    .await
    .expect_err("updating a missing product should fail");
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_delete_cascades_to_variants(pool: sqlx::PgPool) {
    let template = create_template(&pool, "Shirt", true, &[], &[]).await.unwrap();
    let product = create_product(
        &pool,
        &new_product("Basic Tee", template.id),
        &[],
        &[variant_write(None, "Red")],
        "EUR",
    )
    .await
    .unwrap();
    let variant_id = list_variants_by_product(&pool, product.id).await.unwrap()[0].id;

    assert!(delete_product(&pool, product.id).await.unwrap());
    assert!(get_variant(&pool, variant_id).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Section 4: Connected attributes
// ---------------------------------------------------------------------------

/// Full fixture: attribute with two values, template with a product-attribute
/// junction, and a product. Returns (connection_id, value ids, product_id).
async fn seed_connected_fixture(pool: &sqlx::PgPool) -> (i64, Vec<i64>, i64) {
    let color = create_attribute(
        pool,
        "Color",
        &[
            value_input(None, "Red", "red"),
            value_input(None, "Blue", "blue"),
        ],
    )
    .await
    .unwrap();
    let value_ids: Vec<i64> = list_attribute_values(pool, color.id)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();

    let template = create_template(
        pool,
        "Shirt",
        false,
        &[JunctionInput {
            id: None,
            attribute_id: color.id,
        }],
        &[],
    )
    .await
    .unwrap();
    let connection_id = list_attribute_products(pool, template.id).await.unwrap()[0].id;

    let product = create_product(pool, &new_product("Basic Tee", template.id), &[], &[], "EUR")
        .await
        .unwrap();

    (connection_id, value_ids, product.id)
}

#[sqlx::test(migrations = "../../migrations")]
async fn connected_product_attributes_reconcile(pool: sqlx::PgPool) {
    let (connection_id, value_ids, product_id) = seed_connected_fixture(&pool).await;

    update_product(
        &pool,
        product_id,
        &ProductPatch::default(),
        Some(&[ConnectedAttributeInput {
            id: None,
            connection_id,
            value_id: value_ids[0],
        }]),
        None,
        "EUR",
    )
    .await
    .expect("attaching a connected attribute failed");

    let connected = list_connected_product_attributes(&pool, product_id)
        .await
        .unwrap();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].value_id, value_ids[0]);

    // Swap the chosen value in place.
    update_product(
        &pool,
        product_id,
        &ProductPatch::default(),
        Some(&[ConnectedAttributeInput {
            id: Some(connected[0].id),
            connection_id,
            value_id: value_ids[1],
        }]),
        None,
        "EUR",
    )
    .await
    .unwrap();

    let swapped = list_connected_product_attributes(&pool, product_id)
        .await
        .unwrap();
    assert_eq!(swapped.len(), 1);
    assert_eq!(swapped[0].id, connected[0].id);
    assert_eq!(swapped[0].value_id, value_ids[1]);

    // Empty list clears the set.
    update_product(
        &pool,
        product_id,
        &ProductPatch::default(),
        Some(&[]),
        None,
        "EUR",
    )
    .await
    .unwrap();
    assert!(list_connected_product_attributes(&pool, product_id)
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn connected_variant_attributes_reconcile(pool: sqlx::PgPool) {
    let color = create_attribute(
        &pool,
        "Color",
        &[
            value_input(None, "Red", "red"),
            value_input(None, "Blue", "blue"),
        ],
    )
    .await
    .unwrap();
    let value_ids: Vec<i64> = list_attribute_values(&pool, color.id)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();

    let template = create_template(
        &pool,
        "Shirt",
        true,
        &[],
        &[JunctionInput {
            id: None,
            attribute_id: color.id,
        }],
    )
    .await
    .unwrap();
    let connection_id = list_attribute_variants(&pool, template.id).await.unwrap()[0].id;

    let product = create_product(&pool, &new_product("Basic Tee", template.id), &[], &[], "EUR")
        .await
        .unwrap();
    let variant = create_variant(
        &pool,
        product.id,
        &variant_write(None, "Red Tee"),
        &[ConnectedAttributeInput {
            id: None,
            connection_id,
            value_id: value_ids[0],
        }],
        "EUR",
    )
    .await
    .expect("create_variant with a connected attribute failed");

    let connected = list_connected_variant_attributes(&pool, variant.id)
        .await
        .unwrap();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].value_id, value_ids[0]);
    assert_eq!(connected[0].attribute_id, color.id);

    // Swap the chosen value in place.
    update_variant(
        &pool,
        variant.id,
        None,
        None,
        None,
        None,
        Some(&[ConnectedAttributeInput {
            id: Some(connected[0].id),
            connection_id,
            value_id: value_ids[1],
        }]),
    )
    .await
    .expect("swapping a connected variant attribute failed");

    let swapped = list_connected_variant_attributes(&pool, variant.id)
        .await
        .unwrap();
    assert_eq!(swapped.len(), 1);
    assert_eq!(swapped[0].id, connected[0].id);
    assert_eq!(swapped[0].value_id, value_ids[1]);

    // Empty list clears the set; omitted list leaves it alone.
    update_variant(&pool, variant.id, Some("Blue Tee"), None, None, None, None)
        .await
        .unwrap();
    assert_eq!(
        list_connected_variant_attributes(&pool, variant.id)
            .await
            .unwrap()
            .len(),
        1
    );
    update_variant(&pool, variant.id, None, None, None, None, Some(&[]))
        .await
        .unwrap();
    assert!(list_connected_variant_attributes(&pool, variant.id)
        .await
        .unwrap()
        .is_empty());
}

// ---------------------------------------------------------------------------
// Section 5: Standalone variants
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn variant_update_overlays_price_fields(pool: sqlx::PgPool) {
    let template = create_template(&pool, "Shirt", true, &[], &[]).await.unwrap();
    let product = create_product(&pool, &new_product("Basic Tee", template.id), &[], &[], "EUR")
        .await
        .unwrap();

    let mut write = variant_write(None, "Red");
    write.set_price_amount = Some(Decimal::new(1000, 2));
    write.set_price_currency = Some("GBP".to_string());
    let variant = create_variant(&pool, product.id, &write, &[], "EUR")
        .await
        .unwrap();

    // Amount alone keeps the stored currency.
    let updated = update_variant(
        &pool,
        variant.id,
        None,
        Some(Decimal::new(1250, 2)),
        None,
        Some(true),
        None,
    )
    .await
    .unwrap();

    assert_eq!(updated.name, "Red");
    assert_eq!(updated.price_amount, Decimal::new(1250, 2));
    assert_eq!(updated.price_currency, "GBP");
    assert!(updated.active);
    assert_eq!(updated.product_id, product.id);
}
