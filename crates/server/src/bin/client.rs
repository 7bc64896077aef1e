use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use domain::{AuthorId, AuthorLabel, Comment, FeedError, Identity};
use feed::{AuthPrompts, FeedController, FeedState, FeedView, HttpStore, NoticeKind, Notices, Session};
use tracing_subscriber::EnvFilter;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let base_url = env("ECHOWEB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");

    let store = Arc::new(HttpStore::new(&base_url));

    let session = match env("ECHOWEB_AUTHOR_ID") {
        Some(raw_id) => {
            let id = AuthorId::new(raw_id).map_err(anyhow::Error::msg)?;
            let mut display_name = env("ECHOWEB_DISPLAY_NAME");
            if let Some(name) = display_name.take() {
                let profile = store
                    .upsert_profile(&id, &name)
                    .await
                    .context("Failed to register display name")?;
                display_name = Some(profile.display_name);
            }
            Session::signed_in(Identity {
                id,
                display_name,
                email: env("ECHOWEB_EMAIL"),
            })
        }
        None => Session::new(),
    };

    let prompts = AuthPrompts::new();
    let notices = Notices::new();
    spawn_signal_printers(&prompts, &notices);

    let controller = FeedController::new(
        store.clone(),
        Arc::new(session.clone()),
        prompts,
        notices,
    );

    println!("Connecting to {} ...", base_url);
    controller
        .start()
        .await
        .context("Could not subscribe to live updates")?;

    let identity = session.current();
    match &identity {
        Some(me) => println!(
            "Commenting as {}",
            AuthorLabel::resolve(me.display_name.as_deref(), me.email.as_deref()).name
        ),
        None => println!("Not signed in (set ECHOWEB_AUTHOR_ID to comment)"),
    }

    if !text.trim().is_empty() {
        let mut updates = controller.watch();
        let revision = controller.state().revision;
        match controller.submit_comment(&text).await {
            Ok(id) => {
                // 等待实时通道把新评论带回来
                let arrived = tokio::time::timeout(
                    Duration::from_secs(5),
                    updates.wait_for(|s| {
                        s.revision > revision && s.comments.iter().any(|c| c.id == id)
                    }),
                )
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false);
                if !arrived {
                    println!("(comment {} not visible yet)", id);
                }
            }
            Err(FeedError::AuthenticationRequired) => {}
            Err(e) => println!("Submission failed: {}", e),
        }
    }

    render(&controller.state(), identity.as_ref());

    // let the notice printers flush
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.shutdown().await;
    Ok(())
}

fn spawn_signal_printers(prompts: &AuthPrompts, notices: &Notices) {
    let mut prompt_rx = prompts.subscribe();
    tokio::spawn(async move {
        while let Ok(req) = prompt_rx.recv().await {
            println!("> {:?} required: set ECHOWEB_AUTHOR_ID and try again", req.mode);
        }
    });

    let mut notice_rx = notices.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            let marker = match notice.kind {
                NoticeKind::Info => "ok",
                NoticeKind::Error => "!!",
            };
            match notice.description {
                Some(d) => println!("[{}] {}: {}", marker, notice.title, d),
                None => println!("[{}] {}", marker, notice.title),
            }
        }
    });
}

fn render(state: &FeedState, me: Option<&Identity>) {
    println!("\nRecent Comments");
    match state.view() {
        FeedView::Loading => println!("  loading..."),
        FeedView::NoCommentsYet => println!("  No comments yet. Be the first to comment!"),
        FeedView::Comments(comments) => print_comments(comments, me),
        FeedView::Unavailable(comments) => {
            println!("  (comments unavailable, showing last known feed)");
            print_comments(comments, me);
        }
    }
}

fn print_comments(comments: &[Comment], me: Option<&Identity>) {
    for c in comments {
        let fallback = me
            .filter(|i| i.id == c.author_id)
            .map(|i| i.email.clone().unwrap_or_else(|| i.id.to_string()));
        let label = AuthorLabel::resolve(c.author_display_name.as_deref(), fallback.as_deref());
        println!(
            "  ({}) {}  {}",
            label.badge,
            label.name,
            c.created_at.format("%b %-d, %Y, %I:%M %p")
        );
        println!("      {}", c.text);
    }
}
