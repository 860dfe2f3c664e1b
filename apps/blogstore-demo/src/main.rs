//! # Blogstore Demo
//!
//! Connects to the configured database, bootstraps the schema and walks
//! through the façade: writes, relation-aware queries, bulk operations and
//! the error envelopes a request layer would render.

use std::ops::ControlFlow;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;

use blogstore_core::domain::{Counter, NewPost, NewUser, Post, PostChanges, User};
use blogstore_core::error::RepoError;
use blogstore_core::ports::{
    BaseRepository, BillingRepository, CategoryRepository, PasswordService, PostRepository,
    TagRepository, UserRepository,
};
use blogstore_core::query::{
    Comparison, Conditional, Direction, FieldOp, PostQuery, PostScope, RowPatch, UserQuery,
};
use blogstore_infra::{Argon2PasswordService, Persistence};
use blogstore_shared::{ApiResponse, ErrorResponse};

mod config;
mod telemetry;

use config::AppConfig;

fn print<T: Serialize>(label: &str, value: &T) -> anyhow::Result<()> {
    println!("== {label}\n{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render a result the way a request handler would.
fn respond<T: Serialize>(label: &str, result: Result<T, RepoError>) -> anyhow::Result<()> {
    match result {
        Ok(value) => print(label, &ApiResponse::ok(value)),
        Err(err) => print(label, &ErrorResponse::from(&err)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry();

    let config = AppConfig::from_env();
    let mut store = Persistence::connect(&config.database, config.facade)
        .await
        .context("connecting to the database")?;
    store.ensure_schema().await?;

    match config.post_default_scope.as_deref() {
        Some("current_month") => {
            store = store.with_post_global_scope(PostScope::CurrentMonth);
        }
        Some(other) => tracing::warn!(scope = other, "Ignoring unknown POST_DEFAULT_SCOPE"),
        None => {}
    }

    let hasher = Argon2PasswordService::new();
    let stamp = Utc::now().format("%Y%m%d%H%M%S").to_string();

    let (ana, bob) = seed_users(&store, &hasher, &stamp).await?;
    write_posts(&store, &ana, &bob, &stamp).await?;
    run_queries(&store).await?;
    run_bulk(&store, &ana, &stamp).await?;
    show_errors(&store).await?;

    tracing::info!("Demo finished");
    Ok(())
}

async fn seed_users(
    store: &Persistence,
    hasher: &dyn PasswordService,
    stamp: &str,
) -> anyhow::Result<(User, User)> {
    let users = store.users();

    let ana = users
        .first_or_create(NewUser::new("Ana", "ana@example.com", "ana-password", 34, hasher)?)
        .await?;
    let (bob, billing) = users
        .create_with_billing(
            NewUser::new(
                "Bob",
                format!("bob+{stamp}@example.com"),
                "bob-password",
                27,
                hasher,
            )?,
            "4111 1111 1111 1111",
        )
        .await?;
    print("user created with billing", &(&bob, &billing))?;

    let billing = store
        .billings()
        .update_or_create(ana.id, "5500-0000-0000-0004")
        .await?;
    print("billing upserted", &billing)?;

    let stored = users.find_by_id_or_fail(ana.id).await?;
    println!(
        "password verifies: {}",
        hasher.verify("ana-password", &stored.password_hash)?
    );
    Ok((ana, bob))
}

async fn write_posts(
    store: &Persistence,
    ana: &User,
    bob: &User,
    stamp: &str,
) -> anyhow::Result<()> {
    let rust = store.categories().first_or_create("Rust").await?;
    let databases = store.categories().first_or_create("Databases").await?;
    let posts = store.posts();

    let release = posts
        .create_with_tags(
            NewPost::new(
                ana.id,
                rust.id,
                format!("Release notes {stamp}"),
                "What changed in this release.",
            ),
            &["rust", "release"],
        )
        .await?;
    print("post created with tags", &release)?;
    println!("{}", release.title_with_author(ana));

    let guide = posts
        .update_or_create(NewPost::new(
            bob.id,
            databases.id,
            "Indexing Guide",
            "Pick the columns you filter on.",
        ))
        .await?;
    let sql = store.tags().first_or_create("sql").await?;
    posts.attach_tag(guide.id, sql.id).await?;

    let same = posts
        .first_or_create(NewPost::new(bob.id, databases.id, "Indexing Guide", "ignored"))
        .await?;
    println!("first_or_create returned the existing row: {}", same.id == guide.id);

    posts
        .increment(guide.id, Counter::Likes, 12, PostChanges::new())
        .await?;
    let guide = posts
        .decrement(
            guide.id,
            Counter::Likes,
            2,
            PostChanges::new().content("Pick the columns you filter and sort on."),
        )
        .await?;
    print("counter adjusted", &guide)?;

    let renamed = posts
        .update(
            release.id,
            PostChanges::new().title(format!("Release notes {stamp} (final)")),
        )
        .await?;
    println!("slug follows the title: {}", renamed.slug);
    Ok(())
}

async fn run_queries(store: &Persistence) -> anyhow::Result<()> {
    let posts = store.posts();

    let summary = posts.get(&PostQuery::tagged_summary()).await?;
    print("tagged summary", &summary)?;

    let popular_only = std::env::var("DEMO_POPULAR_ONLY").is_ok();
    let listing = posts
        .paginate_query(
            &PostQuery::new()
                .select(&["id", "title", "likes"])
                .with("user:id,name")
                .with("user.billing")
                .with("sorted_tags:id,tag")
                .with_count("tags")
                .when_true(popular_only, |q| q.scope(PostScope::Popular { min_likes: 5 }))
                .order_by("likes", Direction::Desc),
            5,
            1,
        )
        .await?;
    print("first page of posts", &listing)?;

    let this_month = posts
        .count(&PostQuery::new().scope(PostScope::CurrentMonth))
        .await?;
    println!("posts this month: {this_month}");

    let busy = posts
        .first(&PostQuery::new().with_count_where("tags", Comparison::Ge, 2))
        .await?;
    print("first post with two or more tags", &busy)?;

    let likes = posts
        .sum_grouped(&PostQuery::new(), "user_id", "likes", Some((Comparison::Gt, 0)))
        .await?;
    print("likes per author", &likes)?;

    let authors = store
        .users()
        .get(
            &UserQuery::new()
                .select(&["id", "name"])
                .with_count("posts")
                .select_latest_post_title()
                .order_by_latest_post(Direction::Desc),
        )
        .await?;
    print("authors by latest post", &authors)?;

    let mut visited = 0;
    let batches = posts
        .chunk(2, &mut |batch: Vec<Post>| {
            visited += batch.len();
            ControlFlow::Continue(())
        })
        .await?;
    println!("chunked {visited} posts in {batches} batches");
    Ok(())
}

async fn run_bulk(store: &Persistence, author: &User, stamp: &str) -> anyhow::Result<()> {
    let category = store.categories().first_or_create("Drafts").await?;
    let drafts: Vec<NewPost> = (0..150)
        .map(|n| {
            NewPost::new(
                author.id,
                category.id,
                format!("Draft {stamp} {n}"),
                "Work in progress.",
            )
        })
        .collect();
    let inserted = store.posts().bulk_insert(drafts).await?;
    print("bulk insert", &inserted)?;

    let patches = (0..3)
        .map(|n| {
            RowPatch::new(format!("draft-{stamp}-{n}"))
                .op("likes", FieldOp::Add(n + 1))
                .op("content", FieldOp::Set("Ready for review.".into()))
        })
        .collect();
    let updated = store.posts().bulk_update(patches, "slug").await?;
    print("bulk update", &updated)?;
    Ok(())
}

async fn show_errors(store: &Persistence) -> anyhow::Result<()> {
    let posts = store.posts();

    respond("missing post", posts.find_by_id_or_fail(i64::MAX).await)?;
    respond(
        "unknown relation",
        posts.get(&PostQuery::new().with("comments")).await,
    )?;

    if let Some(guide) = posts.find_by_slug("indexing-guide").await? {
        respond(
            "decrement below zero",
            posts
                .decrement(guide.id, Counter::Dislikes, 1, PostChanges::new())
                .await,
        )?;
        respond(
            "category still in use",
            store.categories().delete(guide.category_id).await,
        )?;
    }
    Ok(())
}
