use anyhow::{Context, Result};
use chatsync_application::ChatClient;
use chatsync_core::cancel::CancellationToken;
use chatsync_core::identity::IdentityId;

pub async fn login(
    client: &ChatClient,
    id: &str,
    password: Option<&str>,
    token: &CancellationToken,
) -> Result<()> {
    let session = client
        .sessions()
        .login(&IdentityId::new(id), password, token)
        .await
        .with_context(|| format!("Login as {} failed", id))?;
    println!(
        "✓ Logged in as {} ({})",
        session.display_name_snapshot, session.active_identity_id
    );
    Ok(())
}

pub async fn switch(client: &ChatClient, id: &str) -> Result<()> {
    let session = client
        .sessions()
        .switch(&IdentityId::new(id))
        .await
        .with_context(|| format!("Cannot switch to {}", id))?;
    println!(
        "✓ Switched to {} ({})",
        session.display_name_snapshot, session.active_identity_id
    );
    Ok(())
}

pub async fn logout(client: &ChatClient) -> Result<()> {
    client.sessions().logout().await.context("Logout failed")?;
    println!("✓ Logged out");
    Ok(())
}

pub async fn whoami(client: &ChatClient) -> Result<()> {
    match client.sessions().current().await {
        Some(session) => println!(
            "{} ({})",
            session.display_name_snapshot, session.active_identity_id
        ),
        None => println!("Not logged in"),
    }
    Ok(())
}
