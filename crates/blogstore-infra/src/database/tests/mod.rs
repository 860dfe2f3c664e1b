//! Repository tests against in-memory SQLite.

mod bulk_writes;
mod posts;
mod users;

use chrono::{DateTime, TimeZone, Utc};

use blogstore_core::domain::{Category, NewPost, NewUser, User};
use blogstore_core::ports::{CategoryRepository, PasswordError, PasswordService, UserRepository};

use super::{DatabaseConfig, FacadeOptions, Persistence, connect};

/// Reversible stand-in so tests do not pay for Argon2.
struct PlainHasher;

impl PasswordService for PlainHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        Ok(hash == format!("plain:{password}"))
    }
}

async fn store_with(options: FacadeOptions) -> Persistence {
    let db = connect(&DatabaseConfig::new("sqlite::memory:"))
        .await
        .unwrap();
    let store = Persistence::from_connection(db, options);
    store.ensure_schema().await.unwrap();
    store
}

async fn store() -> Persistence {
    store_with(FacadeOptions::default()).await
}

fn new_user(name: &str, email: &str) -> NewUser {
    NewUser::new(name, email, "password123", 30, &PlainHasher).unwrap()
}

/// A store holding one user and one category.
async fn seeded() -> (Persistence, User, Category) {
    let store = store().await;
    let user = store
        .users()
        .create(new_user("Ana", "ana@example.com"))
        .await
        .unwrap();
    let category = store.categories().create("Rust").await.unwrap();
    (store, user, category)
}

fn post(user: &User, category: &Category, title: &str) -> NewPost {
    NewPost::new(user.id, category.id, title, format!("About {title}"))
}

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}
