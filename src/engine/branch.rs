//! Branch-role resolution and per-flavor configuration completeness checks.

use crate::db::{GuildConfig, RequestFlavor};

/// Resolves the branch roles granted alongside a full-flavor target role.
/// An explicit per-role mapping wins, then the guild-wide default list, then
/// the legacy single-role value kept for configs written before branch roles
/// became a list.
pub fn resolve_branch_roles(config: &GuildConfig, target_role_id: &str) -> Vec<String> {
    if let Some(mapped) = config.branch_roles_by_target.get(target_role_id) {
        if !mapped.is_empty() {
            return mapped.clone();
        }
    }
    if !config.default_branch_role_ids.is_empty() {
        return config.default_branch_role_ids.clone();
    }
    if let Some(legacy) = &config.legacy_branch_role_id {
        return vec![legacy.clone()];
    }
    Vec::new()
}

/// Names the configuration fields still unset for the given flavor. An empty
/// result means requests of that flavor can be created.
pub fn missing_config_fields(config: &GuildConfig, flavor: RequestFlavor) -> Vec<&'static str> {
    let mut missing = Vec::new();
    match flavor {
        RequestFlavor::Full => {
            if config.review_channel_id.is_none() {
                missing.push("review channel");
            }
            if config.log_channel_id.is_none() {
                missing.push("log channel");
            }
            if config.verified_role_id.is_none() {
                missing.push("verified role");
            }
            if config.eligible_role_ids.is_empty() {
                missing.push("eligible roles");
            }
            if config.staff_role_ids.is_empty() {
                missing.push("staff roles");
            }
            let has_branch_source = !config.default_branch_role_ids.is_empty()
                || !config.branch_roles_by_target.is_empty()
                || config.legacy_branch_role_id.is_some();
            if !has_branch_source {
                missing.push("branch roles");
            }
        }
        RequestFlavor::Lite => {
            if config.lite_review_channel_id.is_none() {
                missing.push("review channel");
            }
            if config.lite_log_channel_id.is_none() {
                missing.push("log channel");
            }
            if config.lite_eligible_role_ids.is_empty() {
                missing.push("eligible roles");
            }
            if config.lite_staff_role_ids.is_empty() {
                missing.push("staff roles");
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::{missing_config_fields, resolve_branch_roles};
    use crate::db::{GuildConfig, RequestFlavor};

    fn full_config() -> GuildConfig {
        GuildConfig {
            guild_id: "guild-1".to_string(),
            review_channel_id: Some("chan-r".to_string()),
            log_channel_id: Some("chan-l".to_string()),
            verified_role_id: Some("role-v".to_string()),
            eligible_role_ids: vec!["role-a".to_string()],
            default_branch_role_ids: vec!["branch-default".to_string()],
            staff_role_ids: vec!["staff".to_string()],
            ..GuildConfig::new("guild-1")
        }
    }

    #[test]
    fn explicit_mapping_wins_over_default() {
        let mut config = full_config();
        config
            .branch_roles_by_target
            .insert("role-a".to_string(), vec!["branch-a".to_string()]);

        assert_eq!(
            resolve_branch_roles(&config, "role-a"),
            vec!["branch-a".to_string()]
        );
        assert_eq!(
            resolve_branch_roles(&config, "role-b"),
            vec!["branch-default".to_string()]
        );
    }

    #[test]
    fn legacy_single_role_is_the_last_fallback() {
        let mut config = full_config();
        config.default_branch_role_ids.clear();
        config.legacy_branch_role_id = Some("branch-legacy".to_string());

        assert_eq!(
            resolve_branch_roles(&config, "role-a"),
            vec!["branch-legacy".to_string()]
        );

        config.legacy_branch_role_id = None;
        assert!(resolve_branch_roles(&config, "role-a").is_empty());
    }

    #[test]
    fn empty_explicit_mapping_falls_through() {
        let mut config = full_config();
        config
            .branch_roles_by_target
            .insert("role-a".to_string(), Vec::new());

        assert_eq!(
            resolve_branch_roles(&config, "role-a"),
            vec!["branch-default".to_string()]
        );
    }

    #[test]
    fn complete_full_config_has_no_missing_fields() {
        assert!(missing_config_fields(&full_config(), RequestFlavor::Full).is_empty());
    }

    #[test]
    fn fresh_config_reports_everything_missing() {
        let config = GuildConfig::new("guild-1");
        let missing = missing_config_fields(&config, RequestFlavor::Full);
        assert!(missing.contains(&"review channel"));
        assert!(missing.contains(&"staff roles"));
        assert!(missing.contains(&"branch roles"));

        let missing_lite = missing_config_fields(&config, RequestFlavor::Lite);
        assert_eq!(
            missing_lite,
            vec!["review channel", "log channel", "eligible roles", "staff roles"]
        );
    }

    #[test]
    fn branch_source_via_mapping_satisfies_full_config() {
        let mut config = full_config();
        config.default_branch_role_ids.clear();
        config
            .branch_roles_by_target
            .insert("role-a".to_string(), vec!["branch-a".to_string()]);
        assert!(missing_config_fields(&config, RequestFlavor::Full).is_empty());
    }
}
