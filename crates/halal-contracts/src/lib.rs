pub mod catalog;
pub mod chat;
pub mod events;
pub mod i18n;
pub mod models;
pub mod products;
pub mod store;
