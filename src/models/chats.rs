use crate::models::schema::chats;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
    #[error("Chat not found")]
    ChatNotFound,
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = chats)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn get_by_id_and_user(
        conn: &mut PgConnection,
        chat_id: Uuid,
        lookup_user_id: Uuid,
    ) -> Result<Chat, ChatError> {
        chats::table
            .filter(chats::id.eq(chat_id))
            .filter(chats::user_id.eq(lookup_user_id))
            .first::<Chat>(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => ChatError::ChatNotFound,
                _ => ChatError::DatabaseError(e),
            })
    }

    pub fn list_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Vec<Chat>, ChatError> {
        chats::table
            .filter(chats::user_id.eq(lookup_user_id))
            .order((chats::updated_at.desc(), chats::id.desc()))
            .load::<Chat>(conn)
            .map_err(ChatError::DatabaseError)
    }

    /// Bump updated_at so the chat sorts to the top of the sidebar.
    pub fn touch(conn: &mut PgConnection, chat_id: Uuid) -> Result<usize, ChatError> {
        diesel::update(chats::table.filter(chats::id.eq(chat_id)))
            .set(chats::updated_at.eq(Utc::now()))
            .execute(conn)
            .map_err(ChatError::DatabaseError)
    }

    pub fn update_title(
        conn: &mut PgConnection,
        chat_id: Uuid,
        lookup_user_id: Uuid,
        new_title: &str,
    ) -> Result<usize, ChatError> {
        diesel::update(
            chats::table
                .filter(chats::id.eq(chat_id))
                .filter(chats::user_id.eq(lookup_user_id)),
        )
        .set((chats::title.eq(new_title), chats::updated_at.eq(Utc::now())))
        .execute(conn)
        .map_err(ChatError::DatabaseError)
    }

    /// Messages and streams go with the chat via ON DELETE CASCADE.
    pub fn delete(
        conn: &mut PgConnection,
        chat_id: Uuid,
        lookup_user_id: Uuid,
    ) -> Result<usize, ChatError> {
        diesel::delete(
            chats::table
                .filter(chats::id.eq(chat_id))
                .filter(chats::user_id.eq(lookup_user_id)),
        )
        .execute(conn)
        .map_err(ChatError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = chats)]
pub struct NewChat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
}

impl NewChat {
    pub fn insert(&self, conn: &mut PgConnection) -> Result<Chat, ChatError> {
        diesel::insert_into(chats::table)
            .values(self)
            .get_result::<Chat>(conn)
            .map_err(ChatError::DatabaseError)
    }

    /// Chats come into existence on the first user message, so the chat
    /// route inserts the row if it is not there yet. Conflicting inserts
    /// from concurrent first messages resolve to the existing row.
    pub fn get_or_create(&self, conn: &mut PgConnection) -> Result<Chat, ChatError> {
        diesel::insert_into(chats::table)
            .values(self)
            .on_conflict(chats::id)
            .do_nothing()
            .execute(conn)
            .map_err(ChatError::DatabaseError)?;

        Chat::get_by_id_and_user(conn, self.id, self.user_id)
    }
}
