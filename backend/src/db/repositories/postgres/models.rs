use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Date, Nullable, Text};
use serde_json::Value;

use super::schema::{analyses, analytics, users};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub subscription_status: String,
    pub stripe_customer_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = analyses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AnalysisRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    pub ai_analysis: String,
    pub analysis_type: String,
    pub tokens_used: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = analyses)]
pub struct NewAnalysisRow {
    pub user_id: Option<i64>,
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    pub ai_analysis: String,
    pub analysis_type: String,
    pub tokens_used: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = analytics)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AuditRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = analytics)]
pub struct NewAuditRow {
    pub user_id: Option<i64>,
    pub action: String,
    pub details: Option<Value>,
}

/// Owner columns pulled through a left join; all `None` for anonymous rows.
pub type OwnerColumns = (Option<String>, Option<String>, Option<String>);

#[derive(Debug, QueryableByName)]
pub struct TopUserRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Text)]
    pub email: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub first_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub last_name: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub total_analyses: i64,
    #[diesel(sql_type = BigInt)]
    pub total_tokens: i64,
}

#[derive(Debug, QueryableByName)]
pub struct DailyUsageRow {
    #[diesel(sql_type = Date)]
    pub day: NaiveDate,
    #[diesel(sql_type = BigInt)]
    pub analyses: i64,
}
