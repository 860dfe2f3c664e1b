use futures::future::join_all;

use blogstore_core::domain::UserChanges;
use blogstore_core::error::RepoError;
use blogstore_core::ports::{
    BaseRepository, BillingRepository, PasswordService, PostRepository, TagRepository,
    UserRepository,
};
use blogstore_core::query::{PostQuery, UserQuery};

use super::{PlainHasher, new_user, post, seeded, store};

#[tokio::test]
async fn test_find_by_email_and_unique_email() {
    let (store, user, _) = seeded().await;
    let users = store.users();

    let found = users.find_by_email("ana@example.com").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(PlainHasher.verify("password123", &found.password_hash).unwrap());

    let err = users
        .create(new_user("Other Ana", "ana@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_create_with_billing_is_atomic() {
    let store = store().await;
    let users = store.users();

    let (user, billing) = users
        .create_with_billing(new_user("Bea", "bea@example.com"), "4000-0000-0000-0002")
        .await
        .unwrap();
    assert_eq!(billing.user_id, user.id);
    assert_eq!(billing.credit_card_number, "4000000000000002");

    let err = users
        .create_with_billing(new_user("Bea again", "bea@example.com"), "4000000000000010")
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), RepoError::Conflict(_)));

    let err = users
        .create_with_billing(new_user("Cid", "cid@example.com"), "12ab")
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(users.find_by_email("cid@example.com").await.unwrap().is_none());
    assert_eq!(users.count(&UserQuery::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_billing_upsert_keeps_one_row_per_user() {
    let (store, user, _) = seeded().await;
    let billings = store.billings();

    let first = billings
        .update_or_create(user.id, "4111111111111111")
        .await
        .unwrap();
    let second = billings
        .update_or_create(user.id, "5500 0000 0000 0004")
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.credit_card_number, "5500000000000004");
    assert_eq!(billings.paginate(10, 1).await.unwrap().total, 1);
    assert_eq!(
        billings.find_by_user(user.id).await.unwrap().map(|b| b.id),
        Some(first.id)
    );

    let err = billings
        .update_or_create(4242, "4111111111111111")
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[tokio::test]
async fn test_concurrent_first_or_create_by_email() {
    let store = store().await;
    let users = store.users();

    let results = join_all((0..4).map(|n| {
        let users = users.clone();
        async move {
            users
                .first_or_create(new_user(&format!("Dee {n}"), "dee@example.com"))
                .await
        }
    }))
    .await;

    let ids: Vec<i64> = results.into_iter().map(|r| r.unwrap().id).collect();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(users.count(&UserQuery::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_or_create_and_update() {
    let store = store().await;
    let users = store.users();

    let created = users
        .update_or_create(new_user("Eve", "eve@example.com"))
        .await
        .unwrap();
    let upserted = users
        .update_or_create(new_user("Eve Renamed", "eve@example.com").banned(true))
        .await
        .unwrap();
    assert_eq!(created.id, upserted.id);
    assert_eq!(upserted.name, "Eve Renamed");
    assert!(upserted.banned);

    let changes = UserChanges::new()
        .age(41)
        .banned(false)
        .password("correct horse battery", &PlainHasher)
        .unwrap();
    let updated = users.update(created.id, changes).await.unwrap();
    assert_eq!(updated.age, 41);
    assert!(!updated.banned);
    assert!(PlainHasher.verify("correct horse battery", &updated.password_hash).unwrap());

    let err = users
        .update(created.id, UserChanges::new().age(-1))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    let err = users
        .update(4242, UserChanges::new().name("Ghost"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_user_load_hides_password() {
    let (store, user, category) = seeded().await;
    store
        .billings()
        .update_or_create(user.id, "4111111111111111")
        .await
        .unwrap();
    store
        .posts()
        .create(post(&user, &category, "By Ana"))
        .await
        .unwrap();

    let record = store
        .users()
        .load(&user, &["billing", "posts:id,title"])
        .await
        .unwrap();
    assert!(record.get("password_hash").is_none());
    assert_eq!(record["billing"]["credit_card_number"], "4111111111111111");
    assert_eq!(record["posts"][0]["title"], "By Ana");

    let billing = store.billings().find_by_user(user.id).await.unwrap().unwrap();
    let record = store.billings().find_by_id(billing.id).await.unwrap();
    assert_eq!(record.map(|b| b.user_id), Some(user.id));
}

#[tokio::test]
async fn test_deleting_a_user_removes_owned_rows() {
    let (store, user, category) = seeded().await;
    store
        .billings()
        .update_or_create(user.id, "4111111111111111")
        .await
        .unwrap();
    store
        .posts()
        .create_with_tags(post(&user, &category, "Doomed post"), &["survivor"])
        .await
        .unwrap();

    store.users().delete(user.id).await.unwrap();

    assert!(store.users().find_by_id(user.id).await.unwrap().is_none());
    assert!(store.billings().find_by_user(user.id).await.unwrap().is_none());
    assert_eq!(store.posts().count(&PostQuery::new()).await.unwrap(), 0);

    let tag = store.tags().find_by_label("survivor").await.unwrap().unwrap();
    let record = store.tags().load(&tag, &["posts"]).await.unwrap();
    assert!(record["posts"].as_array().unwrap().is_empty());
}
