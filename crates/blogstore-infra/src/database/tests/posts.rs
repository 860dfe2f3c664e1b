use std::ops::ControlFlow;

use futures::future::join_all;

use blogstore_core::domain::{Counter, NewPost, PostChanges};
use blogstore_core::error::RepoError;
use blogstore_core::ports::{BaseRepository, CategoryRepository, PostRepository, TagRepository};
use blogstore_core::query::PostQuery;

use super::{post, seeded};

#[tokio::test]
async fn test_create_derives_slug_and_zero_counters() {
    let (store, user, category) = seeded().await;

    let created = store
        .posts()
        .create(post(&user, &category, "Ñandú @ Café, día 1!"))
        .await
        .unwrap();

    assert_eq!(created.slug, "nandu-at-cafe-dia-1");
    assert_eq!((created.likes, created.dislikes), (0, 0));

    let found = store.posts().find_by_slug(&created.slug).await.unwrap();
    assert_eq!(found, Some(created));
}

#[tokio::test]
async fn test_invalid_posts_are_rejected_before_writing() {
    let (store, user, category) = seeded().await;

    let err = store
        .posts()
        .create(post(&user, &category, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));

    let err = store
        .posts()
        .create(NewPost::new(user.id, 999, "Nowhere", "No such category"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(msg) if msg.contains("referenced row")));
    assert_eq!(store.posts().count(&PostQuery::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_slug_is_a_conflict() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();

    posts.create(post(&user, &category, "Hello World")).await.unwrap();
    let err = posts
        .create(post(&user, &category, "hello, world"))
        .await
        .unwrap_err();

    assert!(matches!(err, RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_update_retitles_and_reslugs() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    let created = posts.create(post(&user, &category, "First draft")).await.unwrap();

    let updated = posts
        .update(created.id, PostChanges::new().title("Final Version").content("Done"))
        .await
        .unwrap();
    assert_eq!(updated.slug, "final-version");
    assert_eq!(updated.content, "Done");
    assert!(posts.find_by_slug("first-draft").await.unwrap().is_none());

    let unchanged = posts.update(created.id, PostChanges::new()).await.unwrap();
    assert_eq!(unchanged.slug, "final-version");

    let err = posts
        .update(9999, PostChanges::new().content("x"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_find_many_and_find_or_fail() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    let a = posts.create(post(&user, &category, "Alpha")).await.unwrap();
    let b = posts.create(post(&user, &category, "Beta")).await.unwrap();

    let found = posts.find_many(&[b.id, 4242, a.id]).await.unwrap();
    let ids: Vec<i64> = found.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);

    assert_eq!(posts.find_by_id_or_fail(a.id).await.unwrap().title, "Alpha");
    let err = posts.find_by_id_or_fail(4242).await.unwrap_err();
    assert_eq!(err.to_string(), "Post not found: 4242");
}

#[tokio::test]
async fn test_paginate_and_chunk() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    for n in 0..25 {
        posts
            .create(post(&user, &category, &format!("Post {n}")))
            .await
            .unwrap();
    }

    let page = posts.paginate(10, 3).await.unwrap();
    assert_eq!(page.data.len(), 5);
    assert_eq!((page.total, page.last_page), (25, 3));
    assert!(!page.has_more_pages());
    assert!(posts.paginate(10, 0).await.is_err());

    let slice = posts.manual_page(4, 20).await.unwrap();
    assert_eq!(slice.len(), 4);
    assert_eq!(slice[0].title, "Post 20");

    let mut sizes = Vec::new();
    let batches = posts
        .chunk(10, &mut |batch| {
            sizes.push(batch.len());
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
    assert_eq!(batches, 3);
    assert_eq!(sizes, vec![10, 10, 5]);

    let stopped = posts
        .chunk(10, &mut |_| ControlFlow::Break(()))
        .await
        .unwrap();
    assert_eq!(stopped, 1);
}

#[tokio::test]
async fn test_concurrent_first_or_create_yields_one_row() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();

    let results = join_all((0..5).map(|_| {
        let posts = posts.clone();
        let new_post = post(&user, &category, "Only Once");
        async move { posts.first_or_create(new_post).await }
    }))
    .await;

    let ids: Vec<i64> = results.into_iter().map(|r| r.unwrap().id).collect();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(posts.count(&PostQuery::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_first_or_create_reports_slug_collisions() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    posts.create(post(&user, &category, "Hello World")).await.unwrap();

    let err = posts
        .first_or_create(post(&user, &category, "Hello -- World"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_update_or_create_is_keyed_by_slug() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();

    let first = posts
        .update_or_create(post(&user, &category, "Upserted"))
        .await
        .unwrap();
    let mut changed = post(&user, &category, "Upserted");
    changed.content = "Second body".into();
    let second = posts.update_or_create(changed).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.content, "Second body");
    assert_eq!(posts.count(&PostQuery::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_increments_are_not_lost() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    let created = posts.create(post(&user, &category, "Counted")).await.unwrap();

    let results = join_all((0..10).map(|_| {
        let posts = posts.clone();
        async move {
            posts
                .increment(created.id, Counter::Likes, 1, PostChanges::new())
                .await
        }
    }))
    .await;
    assert!(results.iter().all(Result::is_ok));

    let reloaded = posts.find_by_id_or_fail(created.id).await.unwrap();
    assert_eq!(reloaded.likes, 10);
}

#[tokio::test]
async fn test_increment_applies_extra_changes() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    let created = posts.create(post(&user, &category, "Before")).await.unwrap();

    let updated = posts
        .increment(created.id, Counter::Dislikes, 2, PostChanges::new().title("After"))
        .await
        .unwrap();
    assert_eq!(updated.dislikes, 2);
    assert_eq!(updated.slug, "after");
}

#[tokio::test]
async fn test_decrement_never_goes_below_zero() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    let created = posts.create(post(&user, &category, "Fragile")).await.unwrap();
    posts
        .increment(created.id, Counter::Likes, 2, PostChanges::new())
        .await
        .unwrap();

    let err = posts
        .decrement(created.id, Counter::Likes, 3, PostChanges::new().title("Changed"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(msg) if msg.contains("below zero")));

    let reloaded = posts.find_by_id_or_fail(created.id).await.unwrap();
    assert_eq!(reloaded.likes, 2);
    assert_eq!(reloaded.title, "Fragile");

    let lowered = posts
        .decrement(created.id, Counter::Likes, 2, PostChanges::new())
        .await
        .unwrap();
    assert_eq!(lowered.likes, 0);

    let err = posts
        .decrement(created.id, Counter::Likes, i64::MIN, PostChanges::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(msg) if msg.contains("cannot decrement likes")));
    assert_eq!(posts.find_by_id_or_fail(created.id).await.unwrap().likes, 0);

    let err = posts
        .decrement(4242, Counter::Likes, 1, PostChanges::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_with_tags_and_membership_changes() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();

    let created = posts
        .create_with_tags(post(&user, &category, "Tagged"), &["rust", "orm", "rust"])
        .await
        .unwrap();
    let record = posts.load(&created, &["tags"]).await.unwrap();
    let labels: Vec<&str> = record["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tag| tag["tag"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["rust", "orm"]);

    let rust = store.tags().find_by_label("rust").await.unwrap().unwrap();
    posts.attach_tag(created.id, rust.id).await.unwrap();
    posts.attach_tag(created.id, rust.id).await.unwrap();
    let record = posts.load(&created, &["tags"]).await.unwrap();
    assert_eq!(record["tags"].as_array().unwrap().len(), 2);

    assert_eq!(posts.detach_tags(created.id, Some(&[])).await.unwrap(), 0);
    assert_eq!(posts.detach_tags(created.id, Some(&[rust.id])).await.unwrap(), 1);
    assert_eq!(posts.detach_tags(created.id, None).await.unwrap(), 1);
    let record = posts.load(&created, &["tags"]).await.unwrap();
    assert!(record["tags"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_with_tags_rolls_back_on_failure() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();

    let err = posts
        .create_with_tags(post(&user, &category, "Doomed"), &["kept?", "  "])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RepoError::Transaction {
            operation: "create_with_tags",
            ..
        }
    ));
    assert!(matches!(err.root_cause(), RepoError::Validation(_)));
    assert!(posts.find_by_slug("doomed").await.unwrap().is_none());
    assert!(store.tags().find_by_label("kept?").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_cleans_up_memberships() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    let created = posts
        .create_with_tags(post(&user, &category, "Short lived"), &["ephemeral"])
        .await
        .unwrap();

    posts.delete(created.id).await.unwrap();

    assert!(posts.find_by_id(created.id).await.unwrap().is_none());
    let tag = store.tags().find_by_label("ephemeral").await.unwrap().unwrap();
    let record = store.tags().load(&tag, &["posts"]).await.unwrap();
    assert!(record["posts"].as_array().unwrap().is_empty());

    let err = posts.delete(created.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_category_with_posts_cannot_be_deleted() {
    let (store, user, category) = seeded().await;
    store
        .posts()
        .create(post(&user, &category, "Anchor"))
        .await
        .unwrap();

    let err = store.categories().delete(category.id).await.unwrap_err();
    assert!(matches!(err.root_cause(), RepoError::Conflict(_)));
    assert!(store.categories().find_by_id(category.id).await.unwrap().is_some());

    let renamed = store.categories().rename(category.id, " Systems ").await.unwrap();
    assert_eq!(renamed.name, "Systems");
    let again = store.categories().first_or_create("Systems").await.unwrap();
    assert_eq!(again.id, category.id);
}
