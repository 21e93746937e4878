//! Change tracking on tracked tables and reference resolution between entities.

mod common;

use common::{open, Client, Port};
use rowkeeper::{ChangeKey, Entity, MetaError, Persistable, WriteOptions};

#[tokio::test]
async fn tracked_writes_are_logged_unsent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let clients = registry.add_table::<Client>("clients", false).await?;
    let ports = registry.add_table::<Port>("ports", true).await?;

    let mut client = clients.add()?;
    client.write().await?;
    assert!(registry.changes().is_empty().await);

    let mut port = ports.add()?;
    port.f_port = 2222;
    port.write().await?;
    let key = ChangeKey::of(&port).expect("stored port");
    assert_eq!(key.as_str(), format!("Port/{}", port.identity().unwrap()));

    let (snapshot, sent) = registry.changes().get(key.clone()).await.expect("logged");
    assert!(!sent);
    assert_eq!(snapshot.class_name(), "Port");
    assert_eq!(registry.changes().select(Some("Port"), Some(false)).await.len(), 1);
    assert_eq!(registry.changes().select(Some("Client"), None).await.len(), 0);
    assert_eq!(registry.changes().select(None, Some(true)).await.len(), 0);

    // The latest write replaces the earlier snapshot.
    port.f_port = 2223;
    port.write().await?;
    assert_eq!(registry.changes().len().await, 1);
    let typed = registry.changes().select_as::<Port>(None).await;
    assert_eq!(typed.len(), 1);
    assert_eq!(typed[0].0.f_port, 2223);
    Ok(())
}

#[tokio::test]
async fn only_sent_entries_are_cleared() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let ports = registry.add_table::<Port>("ports", true).await?;

    let mut first = ports.add()?;
    first.f_port = 1000;
    first.write().await?;
    let mut second = ports.add()?;
    second.f_port = 1001;
    second.write().await?;
    let second_id = second.identity().unwrap().to_string();

    let log = registry.changes();
    assert_eq!(log.clear([&first, &second]).await, 0);
    assert_eq!(log.len().await, 2);

    assert_eq!(log.mark_sent([&first]).await, 1);
    assert_eq!(log.select(None, Some(true)).await.len(), 1);
    assert_eq!(log.clear([&first, &second]).await, 1);
    assert!(!log.contains(&first).await);
    assert!(log.contains(("Port", second_id.as_str())).await);

    // Unknown keys are ignored.
    assert_eq!(log.clear(["Port/nope"]).await, 0);

    // Entries can be stored already sent, then cleared by their composed key.
    log.set(&second, true).await?;
    assert_eq!(log.clear([format!("Port/{}", second_id)]).await, 1);
    assert!(log.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn untracked_writes_and_opt_outs_stay_out_of_the_log() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let ports = registry.add_table::<Port>("ports", true).await?;

    let mut port = ports.add()?;
    port.f_port = 53;
    port.write_with(WriteOptions {
        track: false,
        ..WriteOptions::default()
    })
    .await?;
    assert!(registry.changes().is_empty().await);

    let unsaved = ports.add()?;
    assert!(matches!(
        registry.changes().set(&unsaved, false).await,
        Err(MetaError::Configuration(_))
    ));
    Ok(())
}

#[tokio::test]
async fn validation_failures_write_nothing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let ports = registry.add_table::<Port>("ports", true).await?;

    let mut port = ports.add()?;
    port.f_port = 70000;
    assert!(matches!(port.write().await, Err(MetaError::Validation(_))));
    assert!(port.is_new());
    assert!(registry.changes().is_empty().await);

    // The hook may normalize fields before they are stored.
    port.f_port = 7000;
    port.protocol = "UDP".to_string();
    port.write().await?;
    assert_eq!(ports.read(port.identity().unwrap()).await?.protocol, "udp");
    Ok(())
}

#[tokio::test]
async fn references_resolve_and_dangling_ones_fall_back() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let clients = registry.add_table::<Client>("clients", false).await?;
    let ports = registry.add_table::<Port>("ports", false).await?;

    let mut client = clients.add()?;
    client.name = "bob".to_string();
    client.write().await?;

    let mut port = ports.add()?;
    port.f_port = 8443;
    port.client = Some(client.clone());
    port.write().await?;
    let port_id = port.identity().unwrap().to_string();

    let loaded = ports.read(&port_id).await?;
    let owner = loaded.client.as_ref().expect("resolved client");
    assert_eq!(owner.name, "bob");
    assert!(owner.same_identity(&client));
    assert_eq!(
        loaded.to_dict(false)["client"],
        serde_json::json!(client.identity().unwrap())
    );
    assert_eq!(loaded.to_dict(true)["client"]["name"], "bob");

    // Remove the client row: the reference decodes to a blank client.
    registry.storage().execute("DELETE FROM clients", &[]).await?;
    let orphaned = ports.read(&port_id).await?;
    let blank = orphaned.client.expect("fallback instance");
    assert!(blank.is_new());
    assert_eq!(blank.name, "");
    Ok(())
}

#[tokio::test]
async fn references_need_a_registered_table() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = open(dir.path()).await?;
    let clients = registry.add_table::<Client>("clients", false).await?;
    let ports = registry.add_table::<Port>("ports", false).await?;

    let mut client = clients.add()?;
    client.write().await?;
    let mut port = ports.add()?;
    port.f_port = 21;
    port.client = Some(client);
    port.write().await?;

    // Same file, but the referenced class was never registered here.
    let other = open(dir.path()).await?;
    let ports = other.add_table::<Port>("ports", false).await?;
    assert!(matches!(
        ports.read(port.identity().unwrap()).await,
        Err(MetaError::Configuration(_))
    ));
    Ok(())
}
