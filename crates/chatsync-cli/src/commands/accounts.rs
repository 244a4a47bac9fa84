use anyhow::{Context, Result};
use chatsync_application::ChatClient;
use chatsync_core::cancel::CancellationToken;
use chatsync_core::identity::{IdentityId, IdentityKind};

pub async fn list(client: &ChatClient) -> Result<()> {
    let active = client
        .sessions()
        .current()
        .await
        .map(|s| s.active_identity_id);

    for identity in client.registry().list().await {
        let marker = if active.as_ref() == Some(&identity.id) { "*" } else { " " };
        let kind = match identity.kind {
            IdentityKind::Builtin => "builtin",
            IdentityKind::Created if identity.has_credential => "created",
            IdentityKind::Created => "created, no password",
        };
        println!("{} {:<10} {} ({})", marker, identity.id, identity.display_name, kind);
    }
    Ok(())
}

pub async fn create(
    client: &ChatClient,
    name: &str,
    password: &str,
    confirm: Option<&str>,
    token: &CancellationToken,
) -> Result<()> {
    let identity = client
        .registry()
        .register(name, password, confirm.unwrap_or(password), token)
        .await
        .with_context(|| format!("Failed to create account '{}'", name.trim()))?;
    println!("✓ Created {} ({})", identity.display_name, identity.id);
    Ok(())
}

pub async fn rename(
    client: &ChatClient,
    id: &str,
    name: &str,
    token: &CancellationToken,
) -> Result<()> {
    let id = IdentityId::new(id);
    client
        .registry()
        .rename(&id, name, token)
        .await
        .with_context(|| format!("Failed to rename {}", id))?;
    println!("✓ Renamed {} to {}", id, name.trim());
    Ok(())
}

pub async fn reset_name(client: &ChatClient, id: &str, token: &CancellationToken) -> Result<()> {
    let id = IdentityId::new(id);
    client
        .registry()
        .reset_name(&id, token)
        .await
        .with_context(|| format!("Failed to reset the name of {}", id))?;
    if let Some(identity) = client.registry().get(&id).await {
        println!("✓ {} is now {}", id, identity.display_name);
    }
    Ok(())
}

pub async fn change_password(
    client: &ChatClient,
    id: &str,
    new_password: &str,
    confirm: &str,
    token: &CancellationToken,
) -> Result<()> {
    let id = IdentityId::new(id);
    client
        .registry()
        .change_credential(&id, new_password, confirm, token)
        .await
        .with_context(|| format!("Failed to change the password of {}", id))?;
    println!("✓ Password updated for {}", id);
    Ok(())
}

pub async fn delete(client: &ChatClient, id: &str, token: &CancellationToken) -> Result<()> {
    let id = IdentityId::new(id);
    client
        .registry()
        .delete(&id, token)
        .await
        .with_context(|| format!("Failed to delete {}", id))?;
    println!("✓ Deleted {}", id);
    Ok(())
}

pub async fn reconcile(client: &ChatClient, token: &CancellationToken) -> Result<()> {
    let removed = client
        .registry()
        .reconcile_with_authority(token)
        .await
        .context("Reconciliation failed")?;
    if removed.is_empty() {
        println!("✓ Registry already in sync");
    } else {
        for id in removed {
            println!("  - removed {}", id);
        }
    }
    Ok(())
}
