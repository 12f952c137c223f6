use serde::{Deserialize, Serialize};

/// Maximum Programme Service name length (RDS PS field).
pub const MAX_PS_LEN: usize = 8;
/// Maximum RadioText length (RDS RT field).
pub const MAX_RT_LEN: usize = 64;

/// Station identification broadcast alongside the audio.
///
/// `rt` may contain `{artist}`, `{title}` and `{album}` placeholders, which are
/// filled from the current track's tags before the transmitter is launched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rt: Option<String>,
}

impl StationText {
    pub fn new(ps: Option<String>, rt: Option<String>) -> Self {
        StationText { ps, rt }
    }

    /// Fill in missing fields from `fallback`.
    pub fn or(self, fallback: &StationText) -> Self {
        StationText {
            ps: self.ps.or_else(|| fallback.ps.clone()),
            rt: self.rt.or_else(|| fallback.rt.clone()),
        }
    }

    /// Sanitized PS, or None if nothing printable is left.
    pub fn ps_field(&self) -> Option<String> {
        self.ps
            .as_deref()
            .map(|s| sanitize_rds_text(s, MAX_PS_LEN))
            .filter(|s| !s.is_empty())
    }

    /// Sanitized RT with placeholders replaced, or None if empty.
    pub fn rt_field(&self, artist: &str, title: &str, album: &str) -> Option<String> {
        self.rt
            .as_deref()
            .map(|s| format_message_text(s, artist, title, album))
            .map(|s| sanitize_rds_text(&s, MAX_RT_LEN))
            .filter(|s| !s.is_empty())
    }
}

/// Sanitize text for the RDS encoder: drop line breaks and double quotes,
/// trim, and truncate to `max_chars` characters.
pub fn sanitize_rds_text(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .filter(|c| *c != '"' && !c.is_control())
        .collect();
    cleaned.trim().chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Replace placeholders in message text.
/// {artist} -> UPPERCASE, {title} and {album} -> as-is.
pub fn format_message_text(text: &str, artist: &str, title: &str, album: &str) -> String {
    let result = text
        .replace("{artist}", &artist.to_uppercase())
        .replace("{title}", title)
        .replace("{album}", album);
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_removes_newlines() {
        assert_eq!(sanitize_rds_text("Hello\nWorld\r!", MAX_RT_LEN), "Hello World !");
    }

    #[test]
    fn sanitize_truncates_to_limit() {
        let long = "A".repeat(100);
        assert_eq!(sanitize_rds_text(&long, MAX_RT_LEN).len(), 64);
        assert_eq!(sanitize_rds_text("RADIO PIRATE", MAX_PS_LEN), "RADIO PI");
    }

    #[test]
    fn sanitize_truncates_on_char_boundaries() {
        assert_eq!(sanitize_rds_text("ÉÉÉÉÉÉÉÉÉÉ", MAX_PS_LEN).chars().count(), 8);
    }

    #[test]
    fn sanitize_strips_quotes() {
        assert_eq!(sanitize_rds_text("say \"hi\"", MAX_RT_LEN), "say hi");
    }

    #[test]
    fn sanitize_trims_whitespace() {
        assert_eq!(sanitize_rds_text("   padded   ", MAX_RT_LEN), "padded");
    }

    #[test]
    fn format_replaces_artist_uppercase() {
        assert_eq!(
            format_message_text("Now: {artist}", "queen", "", ""),
            "Now: QUEEN"
        );
    }

    #[test]
    fn format_replaces_all_placeholders() {
        assert_eq!(
            format_message_text("{artist} - {title} ({album})", "a", "Song", "LP"),
            "A - Song (LP)"
        );
    }

    #[test]
    fn empty_fields_become_none() {
        let text = StationText::new(Some("  ".into()), Some("{title}".into()));
        assert_eq!(text.ps_field(), None);
        assert_eq!(text.rt_field("", "", ""), None);
    }

    #[test]
    fn or_fills_missing_fields_only() {
        let fallback = StationText::new(Some("DEFAULT".into()), Some("default rt".into()));
        let text = StationText::new(Some("MINE".into()), None).or(&fallback);
        assert_eq!(text.ps.as_deref(), Some("MINE"));
        assert_eq!(text.rt.as_deref(), Some("default rt"));
    }
}
