use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two parallel request workflows. Full carries a form and extra role
/// side effects; lite grants the requested role and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestFlavor {
    Full,
    Lite,
}

impl RequestFlavor {
    pub fn request_id_prefix(&self) -> &'static str {
        match self {
            RequestFlavor::Full => "FAC",
            RequestFlavor::Lite => "FLITE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestFlavor::Full => "full",
            RequestFlavor::Lite => "lite",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "full" => Some(RequestFlavor::Full),
            "lite" => Some(RequestFlavor::Lite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Denied => "DENIED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(RequestStatus::Pending),
            "APPROVED" => Some(RequestStatus::Approved),
            "DENIED" => Some(RequestStatus::Denied),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestRank {
    Lider,
    Sub,
}

impl RequestRank {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestRank::Lider => "LIDER",
            RequestRank::Sub => "SUB",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LIDER" => Some(RequestRank::Lider),
            "SUB" => Some(RequestRank::Sub),
            _ => None,
        }
    }

    /// Fixed nickname prefix per rank.
    pub fn nickname_prefix(&self) -> &'static str {
        match self {
            RequestRank::Lider => "[01]",
            RequestRank::Sub => "[02]",
        }
    }
}

/// Form fields collected for full-flavor requests. Immutable once the
/// request record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestForm {
    pub display_name: String,
    pub game_id: String,
    pub rank: RequestRank,
}

#[derive(Debug, Clone)]
pub struct RoleRequest {
    pub id: i64,
    pub request_id: String,
    pub flavor: RequestFlavor,
    pub guild_id: String,
    pub user_id: String,
    pub target_role_id: String,
    pub form: Option<RequestForm>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub review_channel_id: Option<String>,
    pub review_message_id: Option<String>,
}

/// Per-guild configuration aggregate, created lazily on first access.
/// List and map fields are stored as JSON text columns.
#[derive(Debug, Clone, Default)]
pub struct GuildConfig {
    pub id: i64,
    pub guild_id: String,

    // Full flavor.
    pub panel_channel_id: Option<String>,
    pub review_channel_id: Option<String>,
    pub log_channel_id: Option<String>,
    pub verified_role_id: Option<String>,
    pub eligible_role_ids: Vec<String>,
    pub default_branch_role_ids: Vec<String>,
    /// Compat shim for configs written before branch roles became a list.
    pub legacy_branch_role_id: Option<String>,
    pub branch_roles_by_target: HashMap<String, Vec<String>>,
    pub staff_role_ids: Vec<String>,

    // Lite flavor.
    pub lite_review_channel_id: Option<String>,
    pub lite_log_channel_id: Option<String>,
    pub lite_staff_role_ids: Vec<String>,
    pub lite_eligible_role_ids: Vec<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GuildConfig {
    pub fn new(guild_id: &str) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            ..Self::default()
        }
    }

    pub fn eligible_role_ids(&self, flavor: RequestFlavor) -> &[String] {
        match flavor {
            RequestFlavor::Full => &self.eligible_role_ids,
            RequestFlavor::Lite => &self.lite_eligible_role_ids,
        }
    }

    pub fn staff_role_ids(&self, flavor: RequestFlavor) -> &[String] {
        match flavor {
            RequestFlavor::Full => &self.staff_role_ids,
            RequestFlavor::Lite => &self.lite_staff_role_ids,
        }
    }

    pub fn review_channel_id(&self, flavor: RequestFlavor) -> Option<&str> {
        match flavor {
            RequestFlavor::Full => self.review_channel_id.as_deref(),
            RequestFlavor::Lite => self.lite_review_channel_id.as_deref(),
        }
    }

    pub fn log_channel_id(&self, flavor: RequestFlavor) -> Option<&str> {
        match flavor {
            RequestFlavor::Full => self.log_channel_id.as_deref(),
            RequestFlavor::Lite => self.lite_log_channel_id.as_deref(),
        }
    }
}
