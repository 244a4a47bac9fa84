use anyhow::{Context, Result};
use chatsync_application::ChatClient;
use chatsync_core::cancel::CancellationToken;
use chatsync_core::message::{DeliveryState, Direction, Message, MessageFilter};

fn render(message: &Message) -> String {
    let arrow = match message.direction {
        Direction::Sent => "→",
        Direction::Received => "←",
    };
    let flag = match message.delivery {
        _ if message.is_unread() => " •",
        DeliveryState::Failed => " (not delivered)",
        DeliveryState::Provisional => " (pending)",
        DeliveryState::Confirmed => "",
    };
    format!(
        "[{}] {} {} {}{}",
        message.id,
        message.created_at.format("%Y-%m-%d %H:%M"),
        arrow,
        message.text,
        flag
    )
}

pub async fn send(client: &ChatClient, text: &str, token: &CancellationToken) -> Result<()> {
    let identity = client.active_identity().await?;
    let messages = client.messages();

    // Reconcile first so the local history is current before appending.
    messages
        .fetch_page(&identity.id, &MessageFilter::default(), token)
        .await
        .context("Failed to load history")?;

    let (sent, reply) = messages
        .send(&identity.id, text, token)
        .await
        .context("Failed to send message")?;
    println!("{}", render(&sent));
    println!("{}", render(&reply));
    Ok(())
}

pub async fn history(
    client: &ChatClient,
    direction: Option<Direction>,
    search: Option<String>,
    page: usize,
    token: &CancellationToken,
) -> Result<()> {
    let identity = client.active_identity().await?;
    let mut filter = MessageFilter::default();
    if let Some(direction) = direction {
        filter = filter.direction(direction);
    }
    if let Some(term) = search {
        filter = filter.search(term);
    }

    let timeline = client
        .messages()
        .fetch_page(&identity.id, &filter, token)
        .await
        .context("Failed to load history")?;
    let unread = timeline.unread_count();
    let page = timeline
        .newest_first()
        .page(page, client.config().display_page_size);

    if page.items.is_empty() {
        println!("No messages");
    }
    for message in &page.items {
        println!("{}", render(message));
    }
    println!(
        "\nPage {}/{} ({} messages, {} unread)",
        page.page, page.total_pages, page.total_items, unread
    );
    Ok(())
}

pub async fn mark_viewed(client: &ChatClient, token: &CancellationToken) -> Result<()> {
    let identity = client.active_identity().await?;
    let messages = client.messages();
    messages
        .fetch_page(&identity.id, &MessageFilter::default(), token)
        .await
        .context("Failed to load history")?;
    let changed = messages.mark_viewed(&identity.id, token).await?;
    println!("✓ Marked {} messages as viewed", changed);
    Ok(())
}

pub async fn delete_history(client: &ChatClient, token: &CancellationToken) -> Result<()> {
    let identity = client.active_identity().await?;
    let deleted = client
        .messages()
        .delete_history(&identity.id, token)
        .await
        .context("Failed to delete history")?;
    println!("✓ Deleted {} messages", deleted);
    Ok(())
}
