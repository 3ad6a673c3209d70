use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use blog_outbox::consumers::{ActivityLogConsumer, Consumer, NotificationConsumer};
use blog_outbox::domain::category::Category;
use blog_outbox::domain::post::Post;
use blog_outbox::events::LocalDispatcher;
use blog_outbox::messaging::{topic_for, InMemoryBroker};
use blog_outbox::metrics::Metrics;
use blog_outbox::outbox::{MemoryOutboxStore, OutboxStore};
use blog_outbox::relay::{RelayConfig, RelayWorker, RetentionSweeper, SweeperConfig};
use blog_outbox::uow::{Session, UnitOfWork};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,blog_outbox=debug")),
        )
        .init();

    tracing::info!("🚀 Starting blog outbox relay demo");

    // === 1. Infrastructure: in-memory store and broker ===
    let store = Arc::new(MemoryOutboxStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    let metrics = Arc::new(Metrics::new()?);

    // === 2. Downstream consumers, keyed by topic ===
    let activity = Arc::new(ActivityLogConsumer::new());
    let notifications = Arc::new(NotificationConsumer::new());
    for event_type in ["CategoryCreated", "CategoryRenamed", "PostPublished"] {
        broker
            .subscribe(&topic_for(event_type), activity.clone() as Arc<dyn Consumer>)
            .await;
    }
    broker
        .subscribe(
            &topic_for("CategoryCreated"),
            notifications.clone() as Arc<dyn Consumer>,
        )
        .await;

    // === 3. In-process dispatcher for local-only events ===
    let mut dispatcher = LocalDispatcher::new();
    dispatcher.subscribe("PostDrafted", "draft-audit", |envelope| {
        tracing::info!(aggregate_id = %envelope.aggregate_id, "📝 Draft recorded locally");
        Ok(())
    });

    // === 4. Background relay worker and retention sweeper ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = Arc::new(RelayWorker::new(
        store.clone(),
        broker.clone(),
        RelayConfig {
            poll_interval: Duration::from_millis(200),
            ..RelayConfig::default()
        },
    ));
    let worker_handle = {
        let worker = worker.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    let sweeper = Arc::new(
        RetentionSweeper::new(store.clone(), SweeperConfig::default())
            .with_metrics(metrics.clone()),
    );
    let sweeper_handle = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.run(shutdown_rx).await })
    };

    // === 5. Business operations through the unit of work ===
    let uow = UnitOfWork::with_dispatcher(store.as_ref(), &dispatcher);

    let mut category = Category::create("Docker")?;
    let category_id = category.id();
    let category_row = serde_json::json!({
        "name": category.name(),
        "slug": category.slug(),
    });

    let mut session = Session::new();
    session.track(&mut category);
    let summary = uow
        .commit(&mut session, move |tx| {
            Box::pin(async move {
                tx.put_entity("category", category_id, &category_row)?;
                Ok(())
            })
        })
        .await?;
    tracing::info!(
        relayed = summary.relayed,
        dispatched = summary.dispatched,
        "Category created"
    );

    let mut post = Post::draft("Multi-stage builds", "Keep your images small.")?;
    post.assign_category(category_id);
    post.publish()?;
    let post_id = post.id();
    let post_row = serde_json::json!({
        "title": post.title(),
        "category_id": post.category_id(),
    });

    let mut session = Session::new();
    session.track(&mut post);
    let summary = uow
        .commit(&mut session, move |tx| {
            Box::pin(async move {
                tx.put_entity("post", post_id, &post_row)?;
                Ok(())
            })
        })
        .await?;
    tracing::info!(
        relayed = summary.relayed,
        dispatched = summary.dispatched,
        "Post published"
    );

    // === 6. Let the relay drain, then shut down ===
    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown_tx.send(true)?;
    worker_handle.await?;
    sweeper_handle.await?;

    for entry in activity.entries().await {
        tracing::info!(
            action = %entry.action,
            aggregate_id = %entry.aggregate_id,
            "Activity log entry"
        );
    }
    for note in notifications.queued().await {
        tracing::info!(subject = %note.subject, "Notification queued");
    }
    tracing::info!(
        pending = store.pending_count().await?,
        "✅ Demo finished"
    );

    Ok(())
}
