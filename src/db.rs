pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{
    GuildConfig, RequestFlavor, RequestForm, RequestRank, RequestStatus, RoleRequest,
};
pub use self::stores::{GuildConfigStore, RequestStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod schema_sqlite;
pub mod sqlite;
pub mod stores;
