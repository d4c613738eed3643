pub mod auth;
pub mod comments;
pub mod moderation;
pub mod pages;
pub mod posts;
pub mod ratings;
