use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::schema_sqlite::{guild_configs, role_requests};

use super::{
    DatabaseError,
    models::{GuildConfig, RequestFlavor, RequestForm, RequestRank, RequestStatus, RoleRequest},
};

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// Helper function to parse ISO string to DateTime
fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

fn list_to_json(list: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(list).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn json_to_list(json: &str) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(json).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn map_to_json(map: &HashMap<String, Vec<String>>) -> Result<String, DatabaseError> {
    serde_json::to_string(map).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn json_to_map(json: &str) -> Result<HashMap<String, Vec<String>>, DatabaseError> {
    serde_json::from_str(json).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn map_insert_error(e: DieselError) -> DatabaseError {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            DatabaseError::Duplicate
        }
        other => DatabaseError::Query(other.to_string()),
    }
}

// SQLite uses i32 for INTEGER (primary keys), but we want to keep i64 in our API
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = role_requests)]
struct DbRoleRequest {
    id: i32,
    request_id: String,
    flavor: String,
    guild_id: String,
    user_id: String,
    target_role_id: String,
    display_name: Option<String>,
    game_id: Option<String>,
    rank: Option<String>,
    status: String,
    created_at: String,
    decided_by: Option<String>,
    decided_at: Option<String>,
    review_channel_id: Option<String>,
    review_message_id: Option<String>,
}

impl DbRoleRequest {
    fn to_role_request(&self) -> Result<RoleRequest, DatabaseError> {
        let flavor = RequestFlavor::parse(&self.flavor)
            .ok_or_else(|| DatabaseError::Serialization(format!("unknown flavor: {}", self.flavor)))?;
        let status = RequestStatus::parse(&self.status)
            .ok_or_else(|| DatabaseError::Serialization(format!("unknown status: {}", self.status)))?;

        let form = match (&self.display_name, &self.game_id, &self.rank) {
            (Some(display_name), Some(game_id), Some(rank)) => Some(RequestForm {
                display_name: display_name.clone(),
                game_id: game_id.clone(),
                rank: RequestRank::parse(rank).ok_or_else(|| {
                    DatabaseError::Serialization(format!("unknown rank: {rank}"))
                })?,
            }),
            _ => None,
        };

        Ok(RoleRequest {
            id: self.id as i64,
            request_id: self.request_id.clone(),
            flavor,
            guild_id: self.guild_id.clone(),
            user_id: self.user_id.clone(),
            target_role_id: self.target_role_id.clone(),
            form,
            status,
            created_at: string_to_datetime(&self.created_at)?,
            decided_by: self.decided_by.clone(),
            decided_at: self
                .decided_at
                .as_deref()
                .map(string_to_datetime)
                .transpose()?,
            review_channel_id: self.review_channel_id.clone(),
            review_message_id: self.review_message_id.clone(),
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = role_requests)]
struct NewRoleRequest<'a> {
    request_id: &'a str,
    flavor: &'a str,
    guild_id: &'a str,
    user_id: &'a str,
    target_role_id: &'a str,
    display_name: Option<&'a str>,
    game_id: Option<&'a str>,
    rank: Option<&'a str>,
    status: &'a str,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = guild_configs)]
struct DbGuildConfig {
    id: i32,
    guild_id: String,
    panel_channel_id: Option<String>,
    review_channel_id: Option<String>,
    log_channel_id: Option<String>,
    verified_role_id: Option<String>,
    eligible_role_ids: String,
    default_branch_role_ids: String,
    legacy_branch_role_id: Option<String>,
    branch_roles_by_target: String,
    staff_role_ids: String,
    lite_review_channel_id: Option<String>,
    lite_log_channel_id: Option<String>,
    lite_staff_role_ids: String,
    lite_eligible_role_ids: String,
    created_at: String,
    updated_at: String,
}

impl DbGuildConfig {
    fn to_guild_config(&self) -> Result<GuildConfig, DatabaseError> {
        Ok(GuildConfig {
            id: self.id as i64,
            guild_id: self.guild_id.clone(),
            panel_channel_id: self.panel_channel_id.clone(),
            review_channel_id: self.review_channel_id.clone(),
            log_channel_id: self.log_channel_id.clone(),
            verified_role_id: self.verified_role_id.clone(),
            eligible_role_ids: json_to_list(&self.eligible_role_ids)?,
            default_branch_role_ids: json_to_list(&self.default_branch_role_ids)?,
            legacy_branch_role_id: self.legacy_branch_role_id.clone(),
            branch_roles_by_target: json_to_map(&self.branch_roles_by_target)?,
            staff_role_ids: json_to_list(&self.staff_role_ids)?,
            lite_review_channel_id: self.lite_review_channel_id.clone(),
            lite_log_channel_id: self.lite_log_channel_id.clone(),
            lite_staff_role_ids: json_to_list(&self.lite_staff_role_ids)?,
            lite_eligible_role_ids: json_to_list(&self.lite_eligible_role_ids)?,
            created_at: Some(string_to_datetime(&self.created_at)?),
            updated_at: Some(string_to_datetime(&self.updated_at)?),
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = guild_configs)]
struct NewGuildConfig<'a> {
    guild_id: &'a str,
    eligible_role_ids: &'a str,
    default_branch_role_ids: &'a str,
    branch_roles_by_target: &'a str,
    staff_role_ids: &'a str,
    lite_staff_role_ids: &'a str,
    lite_eligible_role_ids: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = guild_configs)]
struct UpdateGuildConfig<'a> {
    panel_channel_id: Option<&'a str>,
    review_channel_id: Option<&'a str>,
    log_channel_id: Option<&'a str>,
    verified_role_id: Option<&'a str>,
    eligible_role_ids: &'a str,
    default_branch_role_ids: &'a str,
    legacy_branch_role_id: Option<&'a str>,
    branch_roles_by_target: &'a str,
    staff_role_ids: &'a str,
    lite_review_channel_id: Option<&'a str>,
    lite_log_channel_id: Option<&'a str>,
    lite_staff_role_ids: &'a str,
    lite_eligible_role_ids: &'a str,
    updated_at: String,
}

fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    // Concurrent writers wait for the lock instead of failing with SQLITE_BUSY.
    diesel::sql_query("PRAGMA busy_timeout = 5000")
        .execute(&mut conn)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

pub struct SqliteRequestStore {
    db_path: Arc<String>,
}

impl SqliteRequestStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::RequestStore for SqliteRequestStore {
    async fn insert_unique(&self, request: &RoleRequest) -> Result<RoleRequest, DatabaseError> {
        let request = request.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let new_request = NewRoleRequest {
                request_id: &request.request_id,
                flavor: request.flavor.as_str(),
                guild_id: &request.guild_id,
                user_id: &request.user_id,
                target_role_id: &request.target_role_id,
                display_name: request.form.as_ref().map(|f| f.display_name.as_str()),
                game_id: request.form.as_ref().map(|f| f.game_id.as_str()),
                rank: request.form.as_ref().map(|f| f.rank.as_str()),
                status: request.status.as_str(),
                created_at: datetime_to_string(&request.created_at),
            };

            diesel::insert_into(role_requests::table)
                .values(&new_request)
                .execute(&mut conn)
                .map_err(map_insert_error)?;

            role_requests::table
                .filter(role_requests::request_id.eq(&request.request_id))
                .select(DbRoleRequest::as_select())
                .first::<DbRoleRequest>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .to_role_request()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn get_by_request_id(
        &self,
        request_id_param: &str,
    ) -> Result<Option<RoleRequest>, DatabaseError> {
        let request_id_param = request_id_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::role_requests::dsl::*;
            role_requests
                .filter(request_id.eq(request_id_param))
                .select(DbRoleRequest::as_select())
                .first::<DbRoleRequest>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|r| r.to_role_request())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn claim_pending(
        &self,
        request_id_param: &str,
        outcome: RequestStatus,
        decided_by_param: &str,
        decided_at_param: DateTime<Utc>,
    ) -> Result<Option<RoleRequest>, DatabaseError> {
        let request_id_param = request_id_param.to_string();
        let decided_by_param = decided_by_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::role_requests::dsl::*;

            // The status guard in the filter is what makes the claim atomic:
            // only one caller observes rows_affected == 1 for a given request.
            let rows = diesel::update(
                role_requests
                    .filter(request_id.eq(&request_id_param))
                    .filter(status.eq(RequestStatus::Pending.as_str())),
            )
            .set((
                status.eq(outcome.as_str()),
                decided_by.eq(&decided_by_param),
                decided_at.eq(datetime_to_string(&decided_at_param)),
            ))
            .execute(&mut conn)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

            if rows == 0 {
                return Ok(None);
            }

            role_requests
                .filter(request_id.eq(&request_id_param))
                .select(DbRoleRequest::as_select())
                .first::<DbRoleRequest>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .to_role_request()
                .map(Some)
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn set_review_location(
        &self,
        request_id_param: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), DatabaseError> {
        let request_id_param = request_id_param.to_string();
        let channel_id = channel_id.to_string();
        let message_id = message_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::role_requests::dsl::*;
            diesel::update(role_requests.filter(request_id.eq(&request_id_param)))
                .set((
                    review_channel_id.eq(channel_id),
                    review_message_id.eq(message_id),
                ))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn delete_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let cutoff = datetime_to_string(&cutoff);
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::role_requests::dsl::*;
            // RFC 3339 strings in UTC compare in timestamp order.
            diesel::delete(
                role_requests
                    .filter(status.ne(RequestStatus::Pending.as_str()))
                    .filter(created_at.lt(cutoff)),
            )
            .execute(&mut conn)
            .map(|rows| rows as u64)
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

pub struct SqliteGuildConfigStore {
    db_path: Arc<String>,
}

impl SqliteGuildConfigStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::GuildConfigStore for SqliteGuildConfigStore {
    async fn get_or_create(&self, guild_id_param: &str) -> Result<GuildConfig, DatabaseError> {
        let guild_id_param = guild_id_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::guild_configs::dsl::*;

            let existing = guild_configs
                .filter(guild_id.eq(&guild_id_param))
                .select(DbGuildConfig::as_select())
                .first::<DbGuildConfig>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            if let Some(row) = existing {
                return row.to_guild_config();
            }

            let now = datetime_to_string(&Utc::now());
            let empty_list = list_to_json(&[])?;
            let empty_map = map_to_json(&HashMap::new())?;
            let new_config = NewGuildConfig {
                guild_id: &guild_id_param,
                eligible_role_ids: &empty_list,
                default_branch_role_ids: &empty_list,
                branch_roles_by_target: &empty_map,
                staff_role_ids: &empty_list,
                lite_staff_role_ids: &empty_list,
                lite_eligible_role_ids: &empty_list,
                created_at: now.clone(),
                updated_at: now,
            };

            let inserted = diesel::insert_into(guild_configs)
                .values(&new_config)
                .execute(&mut conn);

            // A concurrent caller may have created the row between the read
            // and the insert. Either way the row exists now.
            if let Err(e) = inserted {
                match map_insert_error(e) {
                    DatabaseError::Duplicate => {}
                    other => return Err(other),
                }
            }

            guild_configs
                .filter(guild_id.eq(&guild_id_param))
                .select(DbGuildConfig::as_select())
                .first::<DbGuildConfig>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .to_guild_config()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn save(&self, config: &GuildConfig) -> Result<GuildConfig, DatabaseError> {
        let config = config.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;

            let eligible = list_to_json(&config.eligible_role_ids)?;
            let default_branch = list_to_json(&config.default_branch_role_ids)?;
            let branch_map = map_to_json(&config.branch_roles_by_target)?;
            let staff = list_to_json(&config.staff_role_ids)?;
            let lite_staff = list_to_json(&config.lite_staff_role_ids)?;
            let lite_eligible = list_to_json(&config.lite_eligible_role_ids)?;

            let changes = UpdateGuildConfig {
                panel_channel_id: config.panel_channel_id.as_deref(),
                review_channel_id: config.review_channel_id.as_deref(),
                log_channel_id: config.log_channel_id.as_deref(),
                verified_role_id: config.verified_role_id.as_deref(),
                eligible_role_ids: &eligible,
                default_branch_role_ids: &default_branch,
                legacy_branch_role_id: config.legacy_branch_role_id.as_deref(),
                branch_roles_by_target: &branch_map,
                staff_role_ids: &staff,
                lite_review_channel_id: config.lite_review_channel_id.as_deref(),
                lite_log_channel_id: config.lite_log_channel_id.as_deref(),
                lite_staff_role_ids: &lite_staff,
                lite_eligible_role_ids: &lite_eligible,
                updated_at: datetime_to_string(&Utc::now()),
            };

            diesel::update(
                guild_configs::table.filter(guild_configs::guild_id.eq(&config.guild_id)),
            )
            .set(changes)
            .execute(&mut conn)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

            guild_configs::table
                .filter(guild_configs::guild_id.eq(&config.guild_id))
                .select(DbGuildConfig::as_select())
                .first::<DbGuildConfig>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .to_guild_config()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}
