//! Text rendering for review cards, log entries, and interaction replies,
//! plus the custom-id scheme carried by review buttons. Pure functions, no
//! network.

use crate::db::{RequestFlavor, RoleRequest};
use crate::engine::{DecisionOutcome, DecisionResult};

/// Discord message content cap.
pub const MESSAGE_MAX_CHARS: usize = 2000;

/// Truncates to the platform content cap on a character boundary.
pub fn clamp_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{truncated}\u{2026}")
}

pub fn flavor_tag(flavor: RequestFlavor) -> &'static str {
    match flavor {
        RequestFlavor::Full => "fac",
        RequestFlavor::Lite => "faclite",
    }
}

fn flavor_from_tag(tag: &str) -> Option<RequestFlavor> {
    match tag {
        "fac" => Some(RequestFlavor::Full),
        "faclite" => Some(RequestFlavor::Lite),
        _ => None,
    }
}

pub fn approve_custom_id(request: &RoleRequest) -> String {
    format!(
        "{}/review/approve/{}",
        flavor_tag(request.flavor),
        request.request_id
    )
}

pub fn deny_custom_id(request: &RoleRequest) -> String {
    format!(
        "{}/review/deny/{}",
        flavor_tag(request.flavor),
        request.request_id
    )
}

/// Parses a review button custom id back into its flavor, outcome, and
/// request id. Anything that does not match the scheme is not ours.
pub fn parse_review_custom_id(custom_id: &str) -> Option<(RequestFlavor, DecisionOutcome, &str)> {
    let mut parts = custom_id.splitn(4, '/');
    let flavor = flavor_from_tag(parts.next()?)?;
    if parts.next()? != "review" {
        return None;
    }
    let outcome = match parts.next()? {
        "approve" => DecisionOutcome::Approve,
        "deny" => DecisionOutcome::Deny,
        _ => return None,
    };
    let request_id = parts.next()?;
    if request_id.is_empty() {
        return None;
    }
    Some((flavor, outcome, request_id))
}

pub fn review_card_text(request: &RoleRequest) -> String {
    let mut lines = vec![
        format!("**Role request `{}`**", request.request_id),
        format!("Requester: <@{}>", request.user_id),
        format!("Requested role: <@&{}>", request.target_role_id),
    ];
    if let Some(form) = &request.form {
        lines.push(format!("Name: {}", form.display_name));
        lines.push(format!("Game id: {}", form.game_id));
        lines.push(format!("Rank: {}", form.rank.as_str()));
    }
    lines.push("Status: **PENDING**".to_string());
    clamp_text(&lines.join("\n"), MESSAGE_MAX_CHARS)
}

/// The card after a decision, with the buttons removed by the caller.
pub fn decided_card_text(request: &RoleRequest) -> String {
    let decided_by = request.decided_by.as_deref().unwrap_or("unknown");
    let mut lines = vec![
        format!("**Role request `{}`**", request.request_id),
        format!("Requester: <@{}>", request.user_id),
        format!("Requested role: <@&{}>", request.target_role_id),
        format!(
            "Status: **{}** by <@{}>",
            request.status.as_str(),
            decided_by
        ),
    ];
    if let Some(decided_at) = request.decided_at {
        lines.push(format!("Decided at: {}", decided_at.to_rfc3339()));
    }
    clamp_text(&lines.join("\n"), MESSAGE_MAX_CHARS)
}

pub fn decision_log_text(result: &DecisionResult) -> String {
    let request = &result.request;
    let decided_by = request.decided_by.as_deref().unwrap_or("unknown");
    let mut lines = vec![
        format!(
            "Request `{}`: **{}** by <@{}>",
            request.request_id,
            request.status.as_str(),
            decided_by
        ),
        format!(
            "Requester <@{}>, role <@&{}>",
            request.user_id, request.target_role_id
        ),
    ];
    if let Some(roles) = &result.roles {
        match &roles.error {
            None => lines.push(format!("Roles granted: {}", roles.role_ids.join(", "))),
            Some(reason) => lines.push(format!("Role grant FAILED: {reason}")),
        }
    }
    if let Some(nickname) = &result.nickname {
        match &nickname.error {
            None => lines.push(format!("Nickname set: {}", nickname.nickname)),
            Some(reason) => lines.push(format!("Nickname update FAILED: {reason}")),
        }
    }
    clamp_text(&lines.join("\n"), MESSAGE_MAX_CHARS)
}

/// The ephemeral reply shown to the reviewer right after their decision.
pub fn decision_reply_text(result: &DecisionResult) -> String {
    let mut lines = vec![format!(
        "Request `{}` {}.",
        result.request.request_id,
        match result.request.status.as_str() {
            "APPROVED" => "approved",
            _ => "denied",
        }
    )];
    if let Some(roles) = &result.roles {
        if let Some(reason) = &roles.error {
            lines.push(format!(
                "Role grant failed, fix manually: {reason}"
            ));
        }
    }
    if let Some(nickname) = &result.nickname {
        if let Some(reason) = &nickname.error {
            lines.push(format!("Nickname update failed, fix manually: {reason}"));
        }
    }
    clamp_text(&lines.join("\n"), MESSAGE_MAX_CHARS)
}
