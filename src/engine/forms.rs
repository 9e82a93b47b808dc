//! Normalization of the full-flavor request form. Every function returns a
//! user-facing rejection message on failure; nothing here touches storage.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::{RequestForm, RequestRank};

/// Discord caps nicknames at 32 characters.
pub const NICKNAME_MAX_CHARS: usize = 32;

static MENTION_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[@#][!&]?\d*>?|@everyone|@here").expect("valid regex"));
static URL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://|www\.|discord\.gg/|://").expect("valid regex"));
static GAME_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,20}$").expect("valid regex"));

/// Collapses internal whitespace and rejects names carrying mention or URL
/// tokens, which would be rendered verbatim into cards and nicknames.
pub fn normalize_name(raw: &str) -> Result<String, String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err("the name cannot be empty".to_string());
    }
    if MENTION_TOKEN.is_match(&collapsed) {
        return Err("the name cannot contain mentions".to_string());
    }
    if URL_TOKEN.is_match(&collapsed) {
        return Err("the name cannot contain links".to_string());
    }
    Ok(collapsed)
}

pub fn normalize_game_id(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if !GAME_ID.is_match(trimmed) {
        return Err("the game id must be a number of up to 20 digits".to_string());
    }
    Ok(trimmed.to_string())
}

fn fold_char(c: char) -> char {
    match c {
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ç' => 'C',
        other => other,
    }
}

/// Case-folds and strips diacritics, then matches against the two canonical
/// ranks. "Líder", "LIDER" and "lider" all normalize to the same value.
pub fn normalize_rank(raw: &str) -> Result<RequestRank, String> {
    let folded: String = raw
        .trim()
        .chars()
        .flat_map(char::to_uppercase)
        .map(fold_char)
        .collect();
    RequestRank::parse(&folded)
        .ok_or_else(|| "the rank must be either LIDER or SUB".to_string())
}

pub fn normalize_form(
    display_name: &str,
    game_id: &str,
    rank: &str,
) -> Result<RequestForm, String> {
    Ok(RequestForm {
        display_name: normalize_name(display_name)?,
        game_id: normalize_game_id(game_id)?,
        rank: normalize_rank(rank)?,
    })
}

/// Renders the nickname applied on approval: rank prefix, as much of the
/// name as fits, then the game id. Hard-capped at the platform limit, and
/// the id is never truncated.
pub fn build_nickname(rank: RequestRank, display_name: &str, game_id: &str) -> String {
    let prefix = rank.nickname_prefix();
    let fixed = prefix.chars().count() + 1 + 3 + game_id.chars().count();
    let available = NICKNAME_MAX_CHARS.saturating_sub(fixed);

    let name: String = display_name.chars().take(available).collect();
    let name = name.trim_end();
    if name.is_empty() {
        format!("{} | {}", prefix, game_id)
    } else {
        format!("{} {} | {}", prefix, name, game_id)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{build_nickname, normalize_form, normalize_game_id, normalize_name, normalize_rank};
    use crate::db::RequestRank;

    #[test]
    fn name_whitespace_is_collapsed() {
        assert_eq!(
            normalize_name("  Jo\u{e3}o   da   Silva  ").as_deref(),
            Ok("Jo\u{e3}o da Silva")
        );
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("hi <@123456789012345678>" ; "user mention")]
    #[test_case("see <#123456789012345678>" ; "channel mention")]
    #[test_case("ping @everyone now" ; "everyone")]
    #[test_case("go to https://example.com" ; "url")]
    #[test_case("www.example.com" ; "bare www")]
    #[test_case("join discord.gg/abcdef now" ; "invite link")]
    fn hostile_names_are_rejected(raw: &str) {
        assert!(normalize_name(raw).is_err());
    }

    #[test]
    fn game_id_must_be_short_numeric() {
        assert_eq!(normalize_game_id(" 123456789 ").as_deref(), Ok("123456789"));
        assert!(normalize_game_id("12a34").is_err());
        assert!(normalize_game_id("").is_err());
        assert!(normalize_game_id("123456789012345678901").is_err());
    }

    #[test_case("LIDER", RequestRank::Lider ; "uppercase lider")]
    #[test_case("lider", RequestRank::Lider ; "lowercase lider")]
    #[test_case("L\u{ed}der", RequestRank::Lider ; "accented lider")]
    #[test_case("SUB", RequestRank::Sub)]
    #[test_case(" sub ", RequestRank::Sub ; "padded sub")]
    fn rank_normalizes_to_canonical_values(raw: &str, expected: RequestRank) {
        assert_eq!(normalize_rank(raw), Ok(expected));
    }

    #[test]
    fn unknown_rank_is_rejected() {
        assert!(normalize_rank("chefe").is_err());
    }

    #[test]
    fn form_normalizes_as_a_unit() {
        let form = normalize_form("  Ana  Souza ", "42", "l\u{ed}der").expect("valid form");
        assert_eq!(form.display_name, "Ana Souza");
        assert_eq!(form.game_id, "42");
        assert_eq!(form.rank, RequestRank::Lider);
    }

    #[test]
    fn nickname_is_capped_and_keeps_the_id() {
        let nickname = build_nickname(
            RequestRank::Lider,
            "Very Long Display Name Here",
            "123456789",
        );
        assert!(nickname.chars().count() <= 32);
        assert!(nickname.ends_with("| 123456789"));
        assert!(nickname.starts_with("[01] "));
    }

    #[test]
    fn short_names_are_kept_whole() {
        assert_eq!(
            build_nickname(RequestRank::Sub, "Ana", "42"),
            "[02] Ana | 42"
        );
    }
}
