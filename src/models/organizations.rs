use crate::models::schema::organizations;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrganizationError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
    #[error("Organization not found")]
    OrganizationNotFound,
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = organizations)]
pub struct Organization {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub data_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// The first organization row is "the" organization for the user.
    pub fn get_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Option<Organization>, OrganizationError> {
        organizations::table
            .filter(organizations::user_id.eq(lookup_user_id))
            .order(organizations::created_at.asc())
            .first::<Organization>(conn)
            .optional()
            .map_err(OrganizationError::DatabaseError)
    }

    pub fn update(
        conn: &mut PgConnection,
        org_id: Uuid,
        lookup_user_id: Uuid,
        new_name: &str,
        new_data: &serde_json::Value,
    ) -> Result<usize, OrganizationError> {
        diesel::update(
            organizations::table
                .filter(organizations::id.eq(org_id))
                .filter(organizations::user_id.eq(lookup_user_id)),
        )
        .set((
            organizations::name.eq(new_name),
            organizations::data_json.eq(new_data),
            organizations::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .map_err(OrganizationError::DatabaseError)
    }

    /// Merge a key into data_json without clobbering the rest of the blob.
    pub fn merge_data_key(
        conn: &mut PgConnection,
        org_id: Uuid,
        lookup_user_id: Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<usize, OrganizationError> {
        conn.transaction(|conn| {
            let mut data: serde_json::Value = organizations::table
                .filter(organizations::id.eq(org_id))
                .filter(organizations::user_id.eq(lookup_user_id))
                .select(organizations::data_json)
                .first(conn)?;

            if !data.is_object() {
                data = serde_json::json!({});
            }
            data[key] = value;

            diesel::update(
                organizations::table
                    .filter(organizations::id.eq(org_id))
                    .filter(organizations::user_id.eq(lookup_user_id)),
            )
            .set((
                organizations::data_json.eq(&data),
                organizations::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
        })
        .map_err(OrganizationError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = organizations)]
pub struct NewOrganization {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub data_json: serde_json::Value,
}

impl NewOrganization {
    pub fn insert(&self, conn: &mut PgConnection) -> Result<Organization, OrganizationError> {
        diesel::insert_into(organizations::table)
            .values(self)
            .get_result::<Organization>(conn)
            .map_err(OrganizationError::DatabaseError)
    }
}
