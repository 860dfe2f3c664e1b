//! Domain entities - the core business objects.

mod catalog;
mod post;
mod slug;
mod user;

pub use catalog::{
    Billing, Category, Tag, normalize_card_number, validate_category_name, validate_tag_label,
};
pub use post::{Counter, NewPost, Post, PostChanges, derive_slug};
pub use slug::slugify;
pub use user::{NewUser, User, UserChanges, mask_email};
