use crate::models::schema::apis;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
    #[error("Connector not found")]
    ConnectorNotFound,
}

/// One configured external API endpoint, owned by an organization.
#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = apis)]
pub struct ApiConnector {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub api_name: String,
    pub api_link: String,
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApiConnector {
    pub fn list_for_organization(
        conn: &mut PgConnection,
        lookup_organization_id: Uuid,
    ) -> Result<Vec<ApiConnector>, ConnectorError> {
        apis::table
            .filter(apis::organization_id.eq(lookup_organization_id))
            .order(apis::created_at.asc())
            .load::<ApiConnector>(conn)
            .map_err(ConnectorError::DatabaseError)
    }

    pub fn get_by_id_and_organization(
        conn: &mut PgConnection,
        connector_id: Uuid,
        lookup_organization_id: Uuid,
    ) -> Result<ApiConnector, ConnectorError> {
        apis::table
            .filter(apis::id.eq(connector_id))
            .filter(apis::organization_id.eq(lookup_organization_id))
            .first::<ApiConnector>(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => ConnectorError::ConnectorNotFound,
                _ => ConnectorError::DatabaseError(e),
            })
    }

    pub fn update(
        conn: &mut PgConnection,
        connector_id: Uuid,
        lookup_organization_id: Uuid,
        name: &str,
        link: &str,
        key: Option<&str>,
    ) -> Result<usize, ConnectorError> {
        diesel::update(
            apis::table
                .filter(apis::id.eq(connector_id))
                .filter(apis::organization_id.eq(lookup_organization_id)),
        )
        .set((
            apis::api_name.eq(name),
            apis::api_link.eq(link),
            apis::api_key.eq(key),
        ))
        .execute(conn)
        .map_err(ConnectorError::DatabaseError)
    }

    pub fn delete(
        conn: &mut PgConnection,
        connector_id: Uuid,
        lookup_organization_id: Uuid,
    ) -> Result<usize, ConnectorError> {
        diesel::delete(
            apis::table
                .filter(apis::id.eq(connector_id))
                .filter(apis::organization_id.eq(lookup_organization_id)),
        )
        .execute(conn)
        .map_err(ConnectorError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = apis)]
pub struct NewApiConnector {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub api_name: String,
    pub api_link: String,
    pub api_key: Option<String>,
}

impl NewApiConnector {
    pub fn insert(&self, conn: &mut PgConnection) -> Result<ApiConnector, ConnectorError> {
        diesel::insert_into(apis::table)
            .values(self)
            .get_result::<ApiConnector>(conn)
            .map_err(ConnectorError::DatabaseError)
    }
}
