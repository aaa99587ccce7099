//! Flat fact rows written by UI actions or assistant tool calls.

use crate::models::schema::{rating, revenue, visitor};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FactError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = visitor)]
pub struct Visitor {
    pub id: i64,
    pub user_id: Uuid,
    pub page_visited: String,
    pub created_at: DateTime<Utc>,
}

impl Visitor {
    pub fn list_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Vec<Visitor>, FactError> {
        visitor::table
            .filter(visitor::user_id.eq(lookup_user_id))
            .order(visitor::created_at.asc())
            .load::<Visitor>(conn)
            .map_err(FactError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = visitor)]
pub struct NewVisitor {
    pub user_id: Uuid,
    pub page_visited: String,
}

impl NewVisitor {
    pub fn insert(&self, conn: &mut PgConnection) -> Result<Visitor, FactError> {
        diesel::insert_into(visitor::table)
            .values(self)
            .get_result::<Visitor>(conn)
            .map_err(FactError::DatabaseError)
    }
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = revenue)]
pub struct Revenue {
    pub id: i64,
    pub user_id: Uuid,
    pub amount: f64,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Revenue {
    pub fn list_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Vec<Revenue>, FactError> {
        revenue::table
            .filter(revenue::user_id.eq(lookup_user_id))
            .order(revenue::created_at.asc())
            .load::<Revenue>(conn)
            .map_err(FactError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = revenue)]
pub struct NewRevenue {
    pub user_id: Uuid,
    pub amount: f64,
    pub source: String,
}

impl NewRevenue {
    pub fn insert(&self, conn: &mut PgConnection) -> Result<Revenue, FactError> {
        diesel::insert_into(revenue::table)
            .values(self)
            .get_result::<Revenue>(conn)
            .map_err(FactError::DatabaseError)
    }
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = rating)]
pub struct Rating {
    pub id: i64,
    pub user_id: Uuid,
    #[diesel(column_name = rating_value)]
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn list_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Vec<Rating>, FactError> {
        rating::table
            .filter(rating::user_id.eq(lookup_user_id))
            .order(rating::created_at.asc())
            .load::<Rating>(conn)
            .map_err(FactError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = rating)]
pub struct NewRating {
    pub user_id: Uuid,
    #[diesel(column_name = rating_value)]
    pub rating: i32,
    pub comment: Option<String>,
}

impl NewRating {
    pub fn insert(&self, conn: &mut PgConnection) -> Result<Rating, FactError> {
        diesel::insert_into(rating::table)
            .values(self)
            .get_result::<Rating>(conn)
            .map_err(FactError::DatabaseError)
    }
}
