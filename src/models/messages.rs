use crate::models::schema::messages;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: String,
    pub content: String,
    pub meta_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Full transcript of a chat, ordered by creation time ascending.
    /// A chat with no messages yields an empty vec.
    pub fn list_for_chat(
        conn: &mut PgConnection,
        lookup_chat_id: Uuid,
    ) -> Result<Vec<Message>, MessageError> {
        messages::table
            .filter(messages::chat_id.eq(lookup_chat_id))
            .order((messages::created_at.asc(), messages::id.asc()))
            .load::<Message>(conn)
            .map_err(MessageError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: String,
    pub content: String,
    pub meta_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Idempotent append: re-saving an already-persisted message id is a
    /// no-op. Returns the number of rows actually written.
    pub fn insert_many(
        conn: &mut PgConnection,
        rows: &[NewMessage],
    ) -> Result<usize, MessageError> {
        if rows.is_empty() {
            return Ok(0);
        }

        diesel::insert_into(messages::table)
            .values(rows)
            .on_conflict(messages::id)
            .do_nothing()
            .execute(conn)
            .map_err(MessageError::DatabaseError)
    }
}
