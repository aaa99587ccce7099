pub mod chats;
pub mod connectors;
pub mod facts;
pub mod messages;
pub mod organizations;
pub mod schema;
pub mod streams;
