use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::chats::{Chat, ChatError, NewChat};
use crate::models::connectors::{ApiConnector, ConnectorError, NewApiConnector};
use crate::models::facts::{
    FactError, NewRating, NewRevenue, NewVisitor, Rating, Revenue, Visitor,
};
use crate::models::messages::{Message, MessageError, NewMessage};
use crate::models::organizations::{NewOrganization, Organization, OrganizationError};
use crate::models::streams::{NewStream, Stream, StreamError, StreamStatus};

#[derive(Error, Debug)]
pub enum DBError {
    #[error("Connection pool error: {0}")]
    PoolError(#[from] diesel::r2d2::PoolError),
    #[error("Chat error: {0}")]
    ChatError(#[from] ChatError),
    #[error("Message error: {0}")]
    MessageError(#[from] MessageError),
    #[error("Stream error: {0}")]
    StreamError(#[from] StreamError),
    #[error("Organization error: {0}")]
    OrganizationError(#[from] OrganizationError),
    #[error("Connector error: {0}")]
    ConnectorError(#[from] ConnectorError),
    #[error("Fact error: {0}")]
    FactError(#[from] FactError),
}

impl DBError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DBError::ChatError(ChatError::ChatNotFound)
                | DBError::OrganizationError(OrganizationError::OrganizationNotFound)
                | DBError::ConnectorError(ConnectorError::ConnectorNotFound)
        )
    }
}

/// Explicitly passed persistence handle. Handlers reach the database only
/// through this trait object on `AppState`; nothing holds a module-scope
/// client.
pub trait DBConnection: Send + Sync {
    // Chats
    fn create_chat(&self, new_chat: NewChat) -> Result<Chat, DBError>;
    fn get_or_create_chat(&self, new_chat: NewChat) -> Result<Chat, DBError>;
    fn get_chat_by_id_and_user(&self, chat_id: Uuid, user_id: Uuid) -> Result<Chat, DBError>;
    fn list_chats_for_user(&self, user_id: Uuid) -> Result<Vec<Chat>, DBError>;
    fn update_chat_title(&self, chat_id: Uuid, user_id: Uuid, title: &str)
        -> Result<(), DBError>;
    fn delete_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<usize, DBError>;

    // Messages
    fn load_chat_messages(&self, chat_id: Uuid) -> Result<Vec<Message>, DBError>;
    fn save_messages(&self, chat_id: Uuid, rows: &[NewMessage]) -> Result<usize, DBError>;

    // Streams
    fn create_stream(&self, new_stream: NewStream) -> Result<Stream, DBError>;
    fn update_stream_status(&self, stream_id: Uuid, status: StreamStatus) -> Result<(), DBError>;
    fn latest_active_stream(&self, chat_id: Uuid) -> Result<Option<Stream>, DBError>;

    // Organizations
    fn get_organization_for_user(&self, user_id: Uuid) -> Result<Option<Organization>, DBError>;
    fn create_organization(&self, new_org: NewOrganization) -> Result<Organization, DBError>;
    fn update_organization(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<(), DBError>;
    fn merge_organization_data(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), DBError>;

    // API connectors
    fn list_connectors(&self, organization_id: Uuid) -> Result<Vec<ApiConnector>, DBError>;
    fn create_connector(&self, new_connector: NewApiConnector) -> Result<ApiConnector, DBError>;
    fn update_connector(
        &self,
        connector_id: Uuid,
        organization_id: Uuid,
        name: &str,
        link: &str,
        key: Option<&str>,
    ) -> Result<(), DBError>;
    fn delete_connector(&self, connector_id: Uuid, organization_id: Uuid)
        -> Result<usize, DBError>;

    // Fact rows
    fn insert_visitor(&self, row: NewVisitor) -> Result<Visitor, DBError>;
    fn insert_revenue(&self, row: NewRevenue) -> Result<Revenue, DBError>;
    fn insert_rating(&self, row: NewRating) -> Result<Rating, DBError>;
    fn list_visitors(&self, user_id: Uuid) -> Result<Vec<Visitor>, DBError>;
    fn list_revenue(&self, user_id: Uuid) -> Result<Vec<Revenue>, DBError>;
    fn list_ratings(&self, user_id: Uuid) -> Result<Vec<Rating>, DBError>;
}

pub struct PostgresConnection {
    pool: Pool<ConnectionManager<PgConnection>>,
}

impl PostgresConnection {
    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<ConnectionManager<PgConnection>>, DBError> {
        self.pool.get().map_err(DBError::PoolError)
    }
}

impl DBConnection for PostgresConnection {
    fn create_chat(&self, new_chat: NewChat) -> Result<Chat, DBError> {
        Ok(new_chat.insert(&mut *self.conn()?)?)
    }

    fn get_or_create_chat(&self, new_chat: NewChat) -> Result<Chat, DBError> {
        Ok(new_chat.get_or_create(&mut *self.conn()?)?)
    }

    fn get_chat_by_id_and_user(&self, chat_id: Uuid, user_id: Uuid) -> Result<Chat, DBError> {
        Ok(Chat::get_by_id_and_user(&mut *self.conn()?, chat_id, user_id)?)
    }

    fn list_chats_for_user(&self, user_id: Uuid) -> Result<Vec<Chat>, DBError> {
        Ok(Chat::list_for_user(&mut *self.conn()?, user_id)?)
    }

    fn update_chat_title(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> Result<(), DBError> {
        let updated = Chat::update_title(&mut *self.conn()?, chat_id, user_id, title)?;
        if updated == 0 {
            return Err(DBError::ChatError(ChatError::ChatNotFound));
        }
        Ok(())
    }

    fn delete_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<usize, DBError> {
        Ok(Chat::delete(&mut *self.conn()?, chat_id, user_id)?)
    }

    fn load_chat_messages(&self, chat_id: Uuid) -> Result<Vec<Message>, DBError> {
        Ok(Message::list_for_chat(&mut *self.conn()?, chat_id)?)
    }

    fn save_messages(&self, chat_id: Uuid, rows: &[NewMessage]) -> Result<usize, DBError> {
        let mut conn = self.conn()?;
        let inserted = NewMessage::insert_many(&mut conn, rows)?;

        // The primary write succeeded; a failed timestamp bump is not worth
        // failing the save over.
        if let Err(e) = Chat::touch(&mut conn, chat_id) {
            warn!("Failed to bump updated_at for chat {}: {:?}", chat_id, e);
        }

        Ok(inserted)
    }

    fn create_stream(&self, new_stream: NewStream) -> Result<Stream, DBError> {
        Ok(new_stream.insert_closing_previous(&mut *self.conn()?)?)
    }

    fn update_stream_status(&self, stream_id: Uuid, status: StreamStatus) -> Result<(), DBError> {
        Stream::update_status(&mut *self.conn()?, stream_id, status)?;
        Ok(())
    }

    fn latest_active_stream(&self, chat_id: Uuid) -> Result<Option<Stream>, DBError> {
        Ok(Stream::latest_active_for_chat(&mut *self.conn()?, chat_id)?)
    }

    fn get_organization_for_user(&self, user_id: Uuid) -> Result<Option<Organization>, DBError> {
        Ok(Organization::get_for_user(&mut *self.conn()?, user_id)?)
    }

    fn create_organization(&self, new_org: NewOrganization) -> Result<Organization, DBError> {
        Ok(new_org.insert(&mut *self.conn()?)?)
    }

    fn update_organization(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<(), DBError> {
        let updated = Organization::update(&mut *self.conn()?, org_id, user_id, name, data)?;
        if updated == 0 {
            return Err(DBError::OrganizationError(
                OrganizationError::OrganizationNotFound,
            ));
        }
        Ok(())
    }

    fn merge_organization_data(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), DBError> {
        Organization::merge_data_key(&mut *self.conn()?, org_id, user_id, key, value)?;
        Ok(())
    }

    fn list_connectors(&self, organization_id: Uuid) -> Result<Vec<ApiConnector>, DBError> {
        Ok(ApiConnector::list_for_organization(
            &mut *self.conn()?,
            organization_id,
        )?)
    }

    fn create_connector(&self, new_connector: NewApiConnector) -> Result<ApiConnector, DBError> {
        Ok(new_connector.insert(&mut *self.conn()?)?)
    }

    fn update_connector(
        &self,
        connector_id: Uuid,
        organization_id: Uuid,
        name: &str,
        link: &str,
        key: Option<&str>,
    ) -> Result<(), DBError> {
        let updated = ApiConnector::update(
            &mut *self.conn()?,
            connector_id,
            organization_id,
            name,
            link,
            key,
        )?;
        if updated == 0 {
            return Err(DBError::ConnectorError(ConnectorError::ConnectorNotFound));
        }
        Ok(())
    }

    fn delete_connector(
        &self,
        connector_id: Uuid,
        organization_id: Uuid,
    ) -> Result<usize, DBError> {
        Ok(ApiConnector::delete(
            &mut *self.conn()?,
            connector_id,
            organization_id,
        )?)
    }

    fn insert_visitor(&self, row: NewVisitor) -> Result<Visitor, DBError> {
        Ok(row.insert(&mut *self.conn()?)?)
    }

    fn insert_revenue(&self, row: NewRevenue) -> Result<Revenue, DBError> {
        Ok(row.insert(&mut *self.conn()?)?)
    }

    fn insert_rating(&self, row: NewRating) -> Result<Rating, DBError> {
        Ok(row.insert(&mut *self.conn()?)?)
    }

    fn list_visitors(&self, user_id: Uuid) -> Result<Vec<Visitor>, DBError> {
        Ok(Visitor::list_for_user(&mut *self.conn()?, user_id)?)
    }

    fn list_revenue(&self, user_id: Uuid) -> Result<Vec<Revenue>, DBError> {
        Ok(Revenue::list_for_user(&mut *self.conn()?, user_id)?)
    }

    fn list_ratings(&self, user_id: Uuid) -> Result<Vec<Rating>, DBError> {
        Ok(Rating::list_for_user(&mut *self.conn()?, user_id)?)
    }
}

pub fn setup_db(database_url: &str) -> Arc<dyn DBConnection + Send + Sync> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(10)
        .build(manager)
        .expect("Failed to create database connection pool");

    info!("Database connection pool established");
    Arc::new(PostgresConnection { pool })
}
