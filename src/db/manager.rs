use crate::config::DatabaseConfig;
use crate::db::{DatabaseError, GuildConfigStore, RequestStore};
use std::sync::Arc;

use crate::db::sqlite::{SqliteGuildConfigStore, SqliteRequestStore};
use diesel::Connection;
use diesel::RunQueryDsl;
use diesel::sqlite::SqliteConnection;

#[derive(Clone)]
pub struct DatabaseManager {
    sqlite_path: String,
    request_store: Arc<dyn RequestStore>,
    guild_config_store: Arc<dyn GuildConfigStore>,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let path = config.filename.clone();
        let path_arc = Arc::new(path.clone());

        let request_store = Arc::new(SqliteRequestStore::new(path_arc.clone()));
        let guild_config_store = Arc::new(SqliteGuildConfigStore::new(path_arc));

        Ok(Self {
            sqlite_path: path,
            request_store,
            guild_config_store,
        })
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = SqliteConnection::establish(&path)
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS role_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    request_id TEXT NOT NULL UNIQUE,
                    flavor TEXT NOT NULL,
                    guild_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    target_role_id TEXT NOT NULL,
                    display_name TEXT,
                    game_id TEXT,
                    rank TEXT,
                    status TEXT NOT NULL DEFAULT 'PENDING',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    decided_by TEXT,
                    decided_at TEXT,
                    review_channel_id TEXT,
                    review_message_id TEXT
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS guild_configs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    guild_id TEXT NOT NULL UNIQUE,
                    panel_channel_id TEXT,
                    review_channel_id TEXT,
                    log_channel_id TEXT,
                    verified_role_id TEXT,
                    eligible_role_ids TEXT NOT NULL DEFAULT '[]',
                    default_branch_role_ids TEXT NOT NULL DEFAULT '[]',
                    legacy_branch_role_id TEXT,
                    branch_roles_by_target TEXT NOT NULL DEFAULT '{}',
                    staff_role_ids TEXT NOT NULL DEFAULT '[]',
                    lite_review_channel_id TEXT,
                    lite_log_channel_id TEXT,
                    lite_staff_role_ids TEXT NOT NULL DEFAULT '[]',
                    lite_eligible_role_ids TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_role_requests_request_id ON role_requests(request_id)",
                "CREATE INDEX IF NOT EXISTS idx_role_requests_status ON role_requests(status)",
                "CREATE INDEX IF NOT EXISTS idx_role_requests_decided_at ON role_requests(decided_at)",
                "CREATE INDEX IF NOT EXISTS idx_guild_configs_guild_id ON guild_configs(guild_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn request_store(&self) -> Arc<dyn RequestStore> {
        self.request_store.clone()
    }

    pub fn guild_config_store(&self) -> Arc<dyn GuildConfigStore> {
        self.guild_config_store.clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::NamedTempFile;

    use super::DatabaseManager;
    use crate::config::DatabaseConfig;
    use crate::db::{DatabaseError, RequestFlavor, RequestStatus, RoleRequest};

    async fn open_manager(path: &str) -> DatabaseManager {
        let config = DatabaseConfig {
            filename: path.to_string(),
        };
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        manager
    }

    fn pending_request(request_id: &str) -> RoleRequest {
        RoleRequest {
            id: 0,
            request_id: request_id.to_string(),
            flavor: RequestFlavor::Lite,
            guild_id: "guild-1".to_string(),
            user_id: "user-1".to_string(),
            target_role_id: "role-1".to_string(),
            form: None,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            decided_by: None,
            decided_at: None,
            review_channel_id: None,
            review_message_id: None,
        }
    }

    #[tokio::test]
    async fn request_roundtrip_and_duplicate_detection() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db_path = file.path().to_string_lossy().to_string();
        let manager = open_manager(&db_path).await;
        let store = manager.request_store();

        let inserted = store
            .insert_unique(&pending_request("FLITE-AAA-11111"))
            .await
            .expect("insert request");
        assert!(inserted.id > 0);
        assert_eq!(inserted.status, RequestStatus::Pending);

        let duplicate = store.insert_unique(&pending_request("FLITE-AAA-11111")).await;
        assert!(matches!(duplicate, Err(DatabaseError::Duplicate)));

        let fetched = store
            .get_by_request_id("FLITE-AAA-11111")
            .await
            .expect("query request")
            .expect("request exists");
        assert_eq!(fetched.guild_id, "guild-1");
        assert!(fetched.form.is_none());
    }

    #[tokio::test]
    async fn claim_pending_is_exactly_once() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db_path = file.path().to_string_lossy().to_string();
        let manager = open_manager(&db_path).await;
        let store = manager.request_store();

        store
            .insert_unique(&pending_request("FLITE-BBB-22222"))
            .await
            .expect("insert request");

        let now = Utc::now();
        let first = store
            .claim_pending("FLITE-BBB-22222", RequestStatus::Approved, "staff-1", now)
            .await
            .expect("first claim");
        let second = store
            .claim_pending("FLITE-BBB-22222", RequestStatus::Denied, "staff-2", now)
            .await
            .expect("second claim");

        let won = first.expect("first claim wins");
        assert_eq!(won.status, RequestStatus::Approved);
        assert_eq!(won.decided_by.as_deref(), Some("staff-1"));
        assert!(second.is_none());

        let missing = store
            .claim_pending("FLITE-MISSING", RequestStatus::Approved, "staff-1", now)
            .await
            .expect("claim missing");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn review_location_is_recorded() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db_path = file.path().to_string_lossy().to_string();
        let manager = open_manager(&db_path).await;
        let store = manager.request_store();

        store
            .insert_unique(&pending_request("FLITE-CCC-33333"))
            .await
            .expect("insert request");
        store
            .set_review_location("FLITE-CCC-33333", "chan-9", "msg-9")
            .await
            .expect("set location");

        let fetched = store
            .get_by_request_id("FLITE-CCC-33333")
            .await
            .expect("query request")
            .expect("request exists");
        assert_eq!(fetched.review_channel_id.as_deref(), Some("chan-9"));
        assert_eq!(fetched.review_message_id.as_deref(), Some("msg-9"));
    }

    #[tokio::test]
    async fn retention_deletes_only_old_terminal_rows() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db_path = file.path().to_string_lossy().to_string();
        let manager = open_manager(&db_path).await;
        let store = manager.request_store();

        let old = Utc::now() - Duration::days(60);
        let recent = Utc::now();

        let mut old_terminal = pending_request("FLITE-OLD-TERM");
        old_terminal.created_at = old;
        store.insert_unique(&old_terminal).await.expect("insert");
        store
            .claim_pending("FLITE-OLD-TERM", RequestStatus::Denied, "staff-1", recent)
            .await
            .expect("decide old");

        store
            .insert_unique(&pending_request("FLITE-NEW-TERM"))
            .await
            .expect("insert");
        store
            .claim_pending("FLITE-NEW-TERM", RequestStatus::Approved, "staff-1", recent)
            .await
            .expect("decide recent");

        // Old but still pending, must survive.
        let mut old_pending = pending_request("FLITE-OLD-PEND");
        old_pending.created_at = old;
        store.insert_unique(&old_pending).await.expect("insert");

        let cutoff = Utc::now() - Duration::days(30);
        let removed = store
            .delete_terminal_older_than(cutoff)
            .await
            .expect("sweep");
        assert_eq!(removed, 1);

        assert!(
            store
                .get_by_request_id("FLITE-OLD-TERM")
                .await
                .expect("query")
                .is_none()
        );
        assert!(
            store
                .get_by_request_id("FLITE-NEW-TERM")
                .await
                .expect("query")
                .is_some()
        );
        assert!(
            store
                .get_by_request_id("FLITE-OLD-PEND")
                .await
                .expect("query")
                .is_some()
        );
    }

    #[tokio::test]
    async fn guild_config_roundtrip() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db_path = file.path().to_string_lossy().to_string();
        let manager = open_manager(&db_path).await;
        let store = manager.guild_config_store();

        let created = store.get_or_create("guild-7").await.expect("create config");
        assert!(created.id > 0);
        assert!(created.eligible_role_ids.is_empty());
        assert!(created.review_channel_id.is_none());

        let mut config = created.clone();
        config.review_channel_id = Some("chan-1".to_string());
        config.staff_role_ids = vec!["staff-role".to_string()];
        config
            .branch_roles_by_target
            .insert("target-role".to_string(), vec!["branch-a".to_string()]);
        let saved = store.save(&config).await.expect("save config");
        assert_eq!(saved.review_channel_id.as_deref(), Some("chan-1"));

        let reloaded = store.get_or_create("guild-7").await.expect("reload config");
        assert_eq!(reloaded.id, created.id);
        assert_eq!(reloaded.staff_role_ids, vec!["staff-role".to_string()]);
        assert_eq!(
            reloaded.branch_roles_by_target.get("target-role"),
            Some(&vec!["branch-a".to_string()])
        );
    }
}
