//! Request lifecycle orchestration: creation with collision-safe ids,
//! exactly-once decisions through an atomic store claim, side-effect
//! application, and the compensating rollback when the review card cannot
//! be posted.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::db::{
    DatabaseError, GuildConfig, GuildConfigStore, RequestFlavor, RequestStatus, RequestStore,
    RoleRequest,
};

pub use self::branch::{missing_config_fields, resolve_branch_roles};
pub use self::forms::{build_nickname, normalize_form};
pub use self::ident::{REQUEST_ID_ATTEMPTS, generate_request_id};

pub mod branch;
pub mod forms;
pub mod ident;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("you do not have permission to review this request")]
    PermissionDenied,
    #[error("this request is no longer available")]
    Unavailable,
    #[error("could not allocate a unique request id after {REQUEST_ID_ATTEMPTS} attempts")]
    CollisionExhausted,
    #[error("the review card could not be posted: {0}")]
    PostFailure(String),
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// A guild member as seen by the engine: identity, roles, and whether they
/// hold the administrative override permission.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub user_id: String,
    pub role_ids: Vec<String>,
    pub has_manage_guild: bool,
}

#[derive(Debug, Clone)]
pub struct CardLocation {
    pub channel_id: String,
    pub message_id: String,
}

#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn get_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> anyhow::Result<Option<MemberProfile>>;
}

#[async_trait]
pub trait ReviewSurface: Send + Sync {
    async fn post_review_card(
        &self,
        request: &RoleRequest,
        config: &GuildConfig,
    ) -> anyhow::Result<CardLocation>;
    async fn mark_card_decided(&self, request: &RoleRequest) -> anyhow::Result<()>;
    async fn post_decision_log(
        &self,
        result: &DecisionResult,
        config: &GuildConfig,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MemberActions: Send + Sync {
    async fn grant_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        role_ids: &[String],
    ) -> anyhow::Result<()>;
    async fn set_nickname(
        &self,
        guild_id: &str,
        user_id: &str,
        nickname: &str,
    ) -> anyhow::Result<()>;
}

/// Raw form input as typed by the requester, before normalization.
#[derive(Debug, Clone)]
pub struct FormInput {
    pub display_name: String,
    pub game_id: String,
    pub rank: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approve,
    Deny,
}

impl DecisionOutcome {
    fn status(self) -> RequestStatus {
        match self {
            DecisionOutcome::Approve => RequestStatus::Approved,
            DecisionOutcome::Deny => RequestStatus::Denied,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleGrantReport {
    pub role_ids: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NicknameReport {
    pub nickname: String,
    pub error: Option<String>,
}

/// Outcome of a committed decision. Side-effect reports are present only on
/// approval; an error inside a report means that effect failed after the
/// decision was already final.
#[derive(Debug, Clone)]
pub struct DecisionResult {
    pub request: RoleRequest,
    pub roles: Option<RoleGrantReport>,
    pub nickname: Option<NicknameReport>,
}

/// Whether a member may decide requests of the given flavor. Holding the
/// manage-guild permission always qualifies; otherwise the member must hold
/// a configured staff role. No staff roles configured means nobody but
/// manage-guild holders can review.
pub fn can_review(profile: &MemberProfile, config: &GuildConfig, flavor: RequestFlavor) -> bool {
    if profile.has_manage_guild {
        return true;
    }
    let staff = config.staff_role_ids(flavor);
    profile.role_ids.iter().any(|role| staff.contains(role))
}

fn describe_side_effect_error(error: &anyhow::Error) -> String {
    let text = error.to_string();
    if text.contains("Missing Permissions") {
        "the bot is missing permissions; move its role above the roles it manages".to_string()
    } else {
        text
    }
}

pub struct RequestEngine {
    requests: Arc<dyn RequestStore>,
    guild_configs: Arc<dyn GuildConfigStore>,
    directory: Arc<dyn MemberDirectory>,
    surface: Arc<dyn ReviewSurface>,
    actions: Arc<dyn MemberActions>,
    system_user_id: String,
}

impl RequestEngine {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        guild_configs: Arc<dyn GuildConfigStore>,
        directory: Arc<dyn MemberDirectory>,
        surface: Arc<dyn ReviewSurface>,
        actions: Arc<dyn MemberActions>,
        system_user_id: String,
    ) -> Self {
        Self {
            requests,
            guild_configs,
            directory,
            surface,
            actions,
            system_user_id,
        }
    }

    /// Validates, inserts a fresh PENDING request, and posts its review
    /// card. If the card cannot be posted the record is rolled back to
    /// DENIED (decided by the system) so it never lingers unreviewable.
    pub async fn create_request(
        &self,
        flavor: RequestFlavor,
        guild_id: &str,
        user_id: &str,
        target_role_id: &str,
        form: Option<FormInput>,
    ) -> Result<RoleRequest, EngineError> {
        let config = self.guild_configs.get_or_create(guild_id).await?;

        let missing = missing_config_fields(&config, flavor);
        if !missing.is_empty() {
            return Err(EngineError::Validation(format!(
                "this server is not fully configured yet (missing: {})",
                missing.join(", ")
            )));
        }

        let member = self
            .directory
            .get_member(guild_id, user_id)
            .await
            .map_err(|e| {
                EngineError::Validation(format!("could not verify your membership: {e}"))
            })?
            .ok_or_else(|| {
                EngineError::Validation("you must be a member of this server".to_string())
            })?;

        let eligible = config.eligible_role_ids(flavor);
        if member.role_ids.iter().any(|role| eligible.contains(role)) {
            return Err(EngineError::Validation(
                "you already hold one of the requestable roles".to_string(),
            ));
        }
        if flavor == RequestFlavor::Full {
            if let Some(verified) = &config.verified_role_id {
                if member.role_ids.contains(verified) {
                    return Err(EngineError::Validation(
                        "you are already verified".to_string(),
                    ));
                }
            }
        }
        if !eligible.iter().any(|role| role == target_role_id) {
            return Err(EngineError::Validation(
                "that role cannot be requested".to_string(),
            ));
        }

        let normalized_form = match (flavor, form) {
            (RequestFlavor::Full, Some(input)) => Some(
                normalize_form(&input.display_name, &input.game_id, &input.rank)
                    .map_err(EngineError::Validation)?,
            ),
            (RequestFlavor::Full, None) => {
                return Err(EngineError::Validation(
                    "the request form is required".to_string(),
                ));
            }
            (RequestFlavor::Lite, _) => None,
        };

        if flavor == RequestFlavor::Full
            && resolve_branch_roles(&config, target_role_id).is_empty()
        {
            return Err(EngineError::Validation(
                "no branch roles are configured for that role".to_string(),
            ));
        }

        let mut inserted = None;
        for attempt in 1..=REQUEST_ID_ATTEMPTS {
            let candidate = RoleRequest {
                id: 0,
                request_id: generate_request_id(flavor.request_id_prefix()),
                flavor,
                guild_id: guild_id.to_string(),
                user_id: user_id.to_string(),
                target_role_id: target_role_id.to_string(),
                form: normalized_form.clone(),
                status: RequestStatus::Pending,
                created_at: Utc::now(),
                decided_by: None,
                decided_at: None,
                review_channel_id: None,
                review_message_id: None,
            };
            match self.requests.insert_unique(&candidate).await {
                Ok(request) => {
                    inserted = Some(request);
                    break;
                }
                Err(DatabaseError::Duplicate) => {
                    warn!(attempt = attempt, "request id collision, regenerating");
                }
                Err(other) => return Err(other.into()),
            }
        }
        let mut request = inserted.ok_or(EngineError::CollisionExhausted)?;

        match self.surface.post_review_card(&request, &config).await {
            Ok(location) => {
                self.requests
                    .set_review_location(
                        &request.request_id,
                        &location.channel_id,
                        &location.message_id,
                    )
                    .await?;
                request.review_channel_id = Some(location.channel_id);
                request.review_message_id = Some(location.message_id);
                debug!(
                    request_id = %request.request_id,
                    guild_id = guild_id,
                    "request created"
                );
                Ok(request)
            }
            Err(e) => {
                // Compensating action, not a retry: the record must not stay
                // PENDING with no card any reviewer can see.
                if let Err(rollback_err) = self
                    .requests
                    .claim_pending(
                        &request.request_id,
                        RequestStatus::Denied,
                        &self.system_user_id,
                        Utc::now(),
                    )
                    .await
                {
                    error!(
                        request_id = %request.request_id,
                        error = %rollback_err,
                        "rollback after review card post failure also failed"
                    );
                }
                Err(EngineError::PostFailure(e.to_string()))
            }
        }
    }

    /// Applies a reviewer's decision. The atomic claim on the store is the
    /// only arbiter between concurrent reviewers; the loser gets
    /// `Unavailable` and no side effects run. Side effects after a won claim
    /// are each attempted independently and reported, never rolled back.
    pub async fn decide(
        &self,
        request_id: &str,
        reviewer_id: &str,
        outcome: DecisionOutcome,
    ) -> Result<DecisionResult, EngineError> {
        let existing = self
            .requests
            .get_by_request_id(request_id)
            .await?
            .ok_or(EngineError::Unavailable)?;

        let config = self.guild_configs.get_or_create(&existing.guild_id).await?;

        // Fail closed: an unresolvable reviewer cannot review.
        let reviewer = self
            .directory
            .get_member(&existing.guild_id, reviewer_id)
            .await
            .map_err(|_| EngineError::PermissionDenied)?
            .ok_or(EngineError::PermissionDenied)?;
        if !can_review(&reviewer, &config, existing.flavor) {
            return Err(EngineError::PermissionDenied);
        }

        let claimed = self
            .requests
            .claim_pending(request_id, outcome.status(), reviewer_id, Utc::now())
            .await?
            .ok_or(EngineError::Unavailable)?;

        let mut result = DecisionResult {
            request: claimed,
            roles: None,
            nickname: None,
        };

        if outcome == DecisionOutcome::Approve {
            let role_ids = roles_to_grant(&result.request, &config);
            let grant_error = self
                .actions
                .grant_roles(&result.request.guild_id, &result.request.user_id, &role_ids)
                .await
                .err()
                .map(|e| describe_side_effect_error(&e));
            if let Some(reason) = &grant_error {
                warn!(
                    request_id = request_id,
                    reason = reason.as_str(),
                    "role grant failed after approval"
                );
            }
            result.roles = Some(RoleGrantReport {
                role_ids,
                error: grant_error,
            });

            if let Some(form) = &result.request.form {
                let nickname = build_nickname(form.rank, &form.display_name, &form.game_id);
                let nick_error = self
                    .actions
                    .set_nickname(&result.request.guild_id, &result.request.user_id, &nickname)
                    .await
                    .err()
                    .map(|e| describe_side_effect_error(&e));
                if let Some(reason) = &nick_error {
                    warn!(
                        request_id = request_id,
                        reason = reason.as_str(),
                        "nickname update failed after approval"
                    );
                }
                result.nickname = Some(NicknameReport {
                    nickname,
                    error: nick_error,
                });
            }
        }

        // Rendering is best-effort: the decision is already committed.
        if let Err(e) = self.surface.mark_card_decided(&result.request).await {
            warn!(request_id = request_id, error = %e, "failed to mark review card decided");
        }
        if let Err(e) = self.surface.post_decision_log(&result, &config).await {
            warn!(request_id = request_id, error = %e, "failed to post decision log");
        }

        Ok(result)
    }
}

/// Roles granted on approval: the requested role, plus (full flavor) the
/// verified role and the resolved branch roles, deduplicated in order.
fn roles_to_grant(request: &RoleRequest, config: &GuildConfig) -> Vec<String> {
    let mut roles = vec![request.target_role_id.clone()];
    if request.flavor == RequestFlavor::Full {
        if let Some(verified) = &config.verified_role_id {
            roles.push(verified.clone());
        }
        roles.extend(resolve_branch_roles(config, &request.target_role_id));
    }
    let mut seen = HashSet::new();
    roles.retain(|role| seen.insert(role.clone()));
    roles
}
