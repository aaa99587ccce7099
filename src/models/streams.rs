use crate::models::schema::streams;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Active,
    Closed,
    Error,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Active => "active",
            StreamStatus::Closed => "closed",
            StreamStatus::Error => "error",
        }
    }
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = streams)]
pub struct Stream {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Stream {
    pub fn update_status(
        conn: &mut PgConnection,
        stream_id: Uuid,
        new_status: StreamStatus,
    ) -> Result<usize, StreamError> {
        diesel::update(streams::table.filter(streams::id.eq(stream_id)))
            .set(streams::status.eq(new_status.as_str()))
            .execute(conn)
            .map_err(StreamError::DatabaseError)
    }

    pub fn latest_active_for_chat(
        conn: &mut PgConnection,
        lookup_chat_id: Uuid,
    ) -> Result<Option<Stream>, StreamError> {
        streams::table
            .filter(streams::chat_id.eq(lookup_chat_id))
            .filter(streams::status.eq(StreamStatus::Active.as_str()))
            .order((streams::created_at.desc(), streams::id.desc()))
            .first::<Stream>(conn)
            .optional()
            .map_err(StreamError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = streams)]
pub struct NewStream {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub status: String,
}

impl NewStream {
    pub fn active(stream_id: Uuid, chat_id: Uuid) -> Self {
        Self {
            id: stream_id,
            chat_id,
            status: StreamStatus::Active.as_str().to_string(),
        }
    }

    /// Check-and-set so a chat never carries two active generation
    /// attempts: any prior active row is closed in the same transaction
    /// that inserts the new one.
    pub fn insert_closing_previous(&self, conn: &mut PgConnection) -> Result<Stream, StreamError> {
        conn.transaction(|conn| {
            diesel::update(
                streams::table
                    .filter(streams::chat_id.eq(self.chat_id))
                    .filter(streams::status.eq(StreamStatus::Active.as_str())),
            )
            .set(streams::status.eq(StreamStatus::Closed.as_str()))
            .execute(conn)?;

            diesel::insert_into(streams::table)
                .values(self)
                .get_result::<Stream>(conn)
        })
        .map_err(StreamError::DatabaseError)
    }
}
