use blogstore_core::domain::{Counter, NewPost, PostChanges};
use blogstore_core::error::RepoError;
use blogstore_core::ports::{CategoryRepository, PostRepository, UserRepository};
use blogstore_core::query::{BulkReport, FieldOp, PostQuery, RowPatch};

use super::{new_user, post, seeded, store_with};
use crate::database::FacadeOptions;

#[tokio::test]
async fn test_bulk_insert_uses_the_batch_floor() {
    let store = store_with(FacadeOptions { bulk_batch_size: 10 }).await;
    let user = store
        .users()
        .create(new_user("Bulk", "bulk@example.com"))
        .await
        .unwrap();
    let category = store.categories().create("Bulk").await.unwrap();

    let rows: Vec<NewPost> = (0..250)
        .map(|n| post(&user, &category, &format!("Bulk post {n}")))
        .collect();
    let report = store.posts().bulk_insert(rows).await.unwrap();

    assert_eq!(report, BulkReport { rows: 250, batches: 3 });
    assert_eq!(store.posts().count(&PostQuery::new()).await.unwrap(), 250);

    let empty = store.posts().bulk_insert(Vec::new()).await.unwrap();
    assert_eq!(empty, BulkReport { rows: 0, batches: 0 });
}

#[tokio::test]
async fn test_bulk_insert_validates_every_row_first() {
    let (store, user, category) = seeded().await;

    let rows = vec![
        post(&user, &category, "Fine"),
        post(&user, &category, "!!!"),
    ];
    let err = store.posts().bulk_insert(rows).await.unwrap_err();
    assert!(matches!(err, RepoError::Validation(msg) if msg.starts_with("row 1")));

    let rows = vec![
        post(&user, &category, "Same"),
        post(&user, &category, "same"),
    ];
    assert!(store.posts().bulk_insert(rows).await.is_err());
    assert_eq!(store.posts().count(&PostQuery::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_bulk_insert_rolls_back_every_batch() {
    let (store, user, category) = seeded().await;
    let mut rows: Vec<NewPost> = (0..150)
        .map(|n| post(&user, &category, &format!("Row {n}")))
        .collect();
    rows.push(NewPost::new(user.id, 999, "Bad category", "x"));

    let err = store.posts().bulk_insert(rows).await.unwrap_err();
    assert!(matches!(
        err,
        RepoError::Transaction {
            operation: "bulk_insert",
            ..
        }
    ));
    assert_eq!(store.posts().count(&PostQuery::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_bulk_update_arithmetic_and_titles() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    let a = posts.create(post(&user, &category, "Alpha")).await.unwrap();
    let b = posts.create(post(&user, &category, "Beta")).await.unwrap();
    let untouched = posts.create(post(&user, &category, "Gamma")).await.unwrap();
    posts
        .increment(a.id, Counter::Likes, 10, PostChanges::new())
        .await
        .unwrap();
    posts
        .increment(b.id, Counter::Likes, 2, PostChanges::new())
        .await
        .unwrap();

    let report = posts
        .bulk_update(
            vec![
                RowPatch::new(a.id)
                    .op("likes", FieldOp::Multiply(3))
                    .op("title", FieldOp::Set("Alpha Prime".into())),
                RowPatch::new(b.id).op("likes", FieldOp::Subtract(5)),
            ],
            "id",
        )
        .await
        .unwrap();
    assert_eq!(report, BulkReport { rows: 2, batches: 1 });

    let a = posts.find_by_slug("alpha-prime").await.unwrap().unwrap();
    assert_eq!((a.title.as_str(), a.likes), ("Alpha Prime", 30));
    let b = posts.find_by_slug("beta").await.unwrap().unwrap();
    assert_eq!(b.likes, 0);
    let gamma = posts.find_by_slug("gamma").await.unwrap().unwrap();
    assert_eq!(gamma, untouched);
}

#[tokio::test]
async fn test_bulk_update_by_slug_and_rejections() {
    let (store, user, category) = seeded().await;
    let posts = store.posts();
    posts.create(post(&user, &category, "Keyed")).await.unwrap();

    let report = posts
        .bulk_update(
            vec![RowPatch::new("keyed").op("dislikes", FieldOp::Add(4))],
            "slug",
        )
        .await
        .unwrap();
    assert_eq!(report.rows, 1);
    assert_eq!(posts.find_by_slug("keyed").await.unwrap().unwrap().dislikes, 4);

    let divide = posts
        .bulk_update(vec![RowPatch::new("keyed").op("likes", FieldOp::Divide(0))], "slug")
        .await
        .unwrap_err();
    assert!(matches!(divide, RepoError::Validation(msg) if msg.contains("division by zero")));

    let unknown = posts
        .bulk_update(vec![RowPatch::new("keyed").op("slug", FieldOp::Set("x".into()))], "slug")
        .await
        .unwrap_err();
    assert!(matches!(unknown, RepoError::Validation(_)));

    let bad_key = posts
        .bulk_update(vec![RowPatch::new(1).op("likes", FieldOp::Add(1))], "title")
        .await
        .unwrap_err();
    assert!(matches!(bad_key, RepoError::Validation(_)));
}
