pub mod analytics;
pub mod auth;
pub mod chat;
pub mod chats;
pub mod connectors;
pub mod extract;
pub mod facts;
pub mod organizations;
pub mod tools;
