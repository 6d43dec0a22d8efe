pub mod documents;
pub mod health;
pub mod messages;
pub mod query;
pub mod store;
