//! Schema ensure/migration: table creation, idempotency, additive columns and
//! columns the entity class does not declare.

mod common;

use common::{open, Widget, WidgetV2};
use rowkeeper::{Entity, Persistable, SchemaChanges};

#[tokio::test]
async fn creates_table_with_declared_column_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let widgets = registry.add_table::<Widget>("widgets", false).await?;

    assert_eq!(
        widgets.columns().await?,
        vec![
            "identity", "deleted", "name", "count", "ratio", "active", "meta", "seen_at",
            "born_on"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn ensure_schema_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let widgets = registry.add_table::<Widget>("widgets", false).await?;
    let before = widgets.columns().await?;

    assert_eq!(widgets.ensure_schema().await?, SchemaChanges::default());
    assert!(widgets.ensure_schema().await?.is_empty());

    // Re-registering against an existing file changes nothing either.
    let reopened = open(dir.path()).await?;
    let again = reopened.add_table::<Widget>("widgets", false).await?;
    assert_eq!(again.columns().await?, before);
    Ok(())
}

#[tokio::test]
async fn new_fields_are_added_and_old_rows_read_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let widgets = registry.add_table::<Widget>("widgets", false).await?;

    let mut widget = widgets.add()?;
    widget.name = "legacy".to_string();
    widget.count = 3;
    widget.write().await?;
    let identity = widget.base().identity().unwrap().to_string();

    // Same table, wider class: the missing column is added, nothing dropped.
    let wide = registry.add_table::<WidgetV2>("widgets", false).await?;
    let columns = wide.columns().await?;
    assert!(columns.contains(&"colour".to_string()));
    assert!(columns.contains(&"count".to_string()));
    assert_eq!(registry.table_names().await, vec!["_setting", "widgets"]);

    // The new column is NULL for the old row and reads as the descriptor default.
    let mut old_row = wide.read(&identity).await?;
    assert_eq!(old_row.name, "legacy");
    assert_eq!(old_row.colour, "grey");
    // Columns outside the class are carried along untouched.
    assert_eq!(old_row.base().extra("count"), Some("3"));

    old_row.colour = "red".to_string();
    old_row.write().await?;

    // The narrower class now sees `colour` as an extra column.
    let narrow = widgets.read(&identity).await?;
    assert_eq!(narrow.count, 3);
    assert_eq!(narrow.base().extra("colour"), Some("red"));
    assert_eq!(narrow.to_dict(false)["colour"], "red");
    Ok(())
}

#[tokio::test]
async fn invalid_table_names_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let err = registry
        .add_table::<Widget>("widgets; DROP TABLE _setting", false)
        .await
        .unwrap_err();
    assert!(matches!(err, rowkeeper::MetaError::Configuration(_)));
    Ok(())
}
