//! Seed script for development: populates a fresh database with users and
//! sample snippets.
//!
//! Usage: `cargo run --bin seed`
//!
//! Requires `DATABASE_URL` (reads .env).

use serde_json::json;
use sqlx::PgPool;

use snippetd::models::snippet::{Partition, SnippetInput};
use snippetd::services::auth::hash_password;
use snippetd::services::cache::SnippetCache;
use snippetd::services::snippet as snippet_service;
use snippetd::services::store::{ListFilter, PgStore, SnippetStore};

const ADMIN_PASSWORD: &str = "Admin123!Seed";
const EDITOR_PASSWORD: &str = "Editor123!Seed";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let db_url = std::env::var("DATABASE_URL")?;
    let pool = snippetd::db::create_pool(&db_url, 5).await?;
    snippetd::db::migrate(&pool).await?;

    println!("=== snippetd seed ===");

    seed_user(&pool, "admin", "Network Administrator", "Network_Admin", ADMIN_PASSWORD).await?;
    seed_user(&pool, "editor", "Site Editor", "Site_Admin", EDITOR_PASSWORD).await?;
    seed_snippets(&PgStore::new(pool.clone())).await?;

    println!("\n=== Seed complete! ===");
    println!("Network admin login: admin / {ADMIN_PASSWORD}");
    println!("Site admin login: editor / {EDITOR_PASSWORD}");

    Ok(())
}

async fn seed_user(
    pool: &PgPool,
    username: &str,
    display_name: &str,
    role: &str,
    password: &str,
) -> anyhow::Result<()> {
    let hash = hash_password(password)?;
    sqlx::query(
        "INSERT INTO users (username, email, password_hash, display_name, role)
         VALUES ($1, $2, $3, $4, $5::user_role)
         ON CONFLICT (username) DO UPDATE SET password_hash = EXCLUDED.password_hash",
    )
    .bind(username)
    .bind(format!("{username}@snippetd.local"))
    .bind(&hash)
    .bind(display_name)
    .bind(role)
    .execute(pool)
    .await?;

    println!("[done] User {username} ({role})");
    Ok(())
}

async fn seed_snippets(store: &PgStore) -> anyhow::Result<()> {
    if !store.list(Partition::Site, &ListFilter::default()).await?.is_empty() {
        println!("[skip] Snippets already present");
        return Ok(());
    }

    let cache = SnippetCache::disabled();
    let samples = [
        json!({
            "name": "Disable admin bar",
            "description": "Hide the admin bar on the front end",
            "code": "<?php\nadd_filter('show_admin_bar', '__return_false');",
            "scope": "front-end",
            "tags": "admin, cleanup",
            "active": true
        }),
        json!({
            "name": "Brand colours",
            "code": ".site-header { background: #1d2327; }\n.site-title a { color: #fff; }",
            "scope": "site-css",
            "priority": 5,
            "active": true
        }),
        json!({
            "name": "Analytics loader",
            "code": "window.dataLayer = window.dataLayer || [];",
            "scope": "site-head-js",
            "tags": ["tracking"],
            "active": true
        }),
        json!({
            "name": "Support notice",
            "code": "<p>Need help? Contact <a href=\"mailto:support@example.com\">support</a>.</p>",
            "scope": "content",
            "active": true
        }),
        json!({
            "name": "Flush rewrite rules once",
            "code": "flush_rewrite_rules();",
            "scope": "single-use"
        }),
    ];

    for sample in samples {
        let input: SnippetInput = serde_json::from_value(sample)?;
        let saved = snippet_service::create(store, &cache, Partition::Site, &input).await?;
        println!("[done] Snippet #{} {}", saved.snippet.id, saved.snippet.name);
    }

    let network: SnippetInput = serde_json::from_value(json!({
        "name": "Network maintenance banner",
        "code": "echo '<div class=\"notice\">Scheduled maintenance tonight.</div>';",
        "scope": "admin",
    }))?;
    let saved = snippet_service::create(store, &cache, Partition::Network, &network).await?;
    snippet_service::set_shared(store, &cache, &[saved.snippet.id]).await?;
    println!("[done] Shared network snippet #{}", saved.snippet.id);

    Ok(())
}
