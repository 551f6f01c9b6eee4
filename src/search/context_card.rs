//! Builds the text that gets embedded for a candidate.

use serde_json::json;

use super::extract::ExtractedField;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextCard {
    pub context_text: String,
    pub strict_text: String,
    pub lenient_text: String,
    /// JSON list of `{field, value, strict, confidence, sources}`.
    pub fields_json: String,
    /// JSON list of source URLs.
    pub sources_json: String,
    pub strict_ratio: f64,
}

/// `"moods"` -> `"Moods"`, `"tempo_feel"` -> `"Tempo Feel"`.
fn field_label(name: &str) -> String {
    let mut label = String::with_capacity(name.len());
    let mut prev_alpha = false;
    for c in name.replace('_', " ").chars() {
        if prev_alpha {
            label.extend(c.to_lowercase());
        } else {
            label.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    label
}

fn join_fields<'a>(fields: impl Iterator<Item = &'a ExtractedField>) -> String {
    fields
        .map(|f| format!("{}: {}", field_label(&f.name), f.value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Merges extracted fields into one card.
///
/// Lenient text is included when there is no strict text, or when strict
/// tokens make up less than `strict_threshold` of all tokens. A card without
/// fields has empty text and a ratio of zero, even when song and artist are
/// known.
pub fn build_context_card(
    song: &str,
    artist: &str,
    year: Option<&str>,
    fields: &[ExtractedField],
    sources: &[String],
    strict_threshold: f64,
) -> ContextCard {
    let strict_text = join_fields(fields.iter().filter(|f| f.strict));
    let lenient_text = join_fields(fields.iter().filter(|f| !f.strict));
    let strict_tokens = token_count(&strict_text);
    let lenient_tokens = token_count(&lenient_text);
    let total_tokens = strict_tokens + lenient_tokens;

    let include_lenient = strict_tokens == 0
        || (lenient_tokens > 0
            && (strict_tokens as f64 / total_tokens as f64) < strict_threshold);

    let strict_ratio = if include_lenient && total_tokens > 0 {
        strict_tokens as f64 / total_tokens as f64
    } else if strict_tokens > 0 {
        1.0
    } else {
        0.0
    };

    let context_text = if fields.is_empty() {
        String::new()
    } else {
        let mut parts: Vec<String> = Vec::new();
        if !song.is_empty() && !artist.is_empty() {
            parts.push(format!("{song} by {artist}."));
        }
        if let Some(year) = year.map(str::trim).filter(|y| !y.is_empty()) {
            parts.push(format!("Year: {year}."));
        }
        if !strict_text.is_empty() {
            parts.push(strict_text.clone());
        }
        if include_lenient && !lenient_text.is_empty() {
            parts.push(lenient_text.clone());
        }
        parts.join(" ").trim().to_string()
    };

    let fields_json = serde_json::to_string(fields).unwrap_or_else(|_| "[]".to_string());
    let sources_json = json!(sources).to_string();

    ContextCard {
        context_text,
        strict_text,
        lenient_text,
        fields_json,
        sources_json,
        strict_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value: &str, strict: bool) -> ExtractedField {
        ExtractedField {
            name: name.to_string(),
            value: value.to_string(),
            strict,
            confidence: if strict { 0.9 } else { 0.75 },
            sources: if strict {
                vec!["https://s".to_string()]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(field_label("moods"), "Moods");
        assert_eq!(field_label("tempo_feel"), "Tempo Feel");
        assert_eq!(field_label("era2go"), "Era2Go");
    }

    #[test]
    fn strict_only_card() {
        let card = build_context_card(
            "Teardrop",
            "Massive Attack",
            Some("1998"),
            &[field("summary", "trip hop classic", true)],
            &["https://s".to_string()],
            0.6,
        );
        assert_eq!(
            card.context_text,
            "Teardrop by Massive Attack. Year: 1998. Summary: trip hop classic"
        );
        assert_eq!(card.strict_ratio, 1.0);
        assert!(card.lenient_text.is_empty());
        assert_eq!(card.sources_json, r#"["https://s"]"#);
    }

    #[test]
    fn lenient_only_card_has_zero_ratio() {
        let card = build_context_card(
            "A",
            "B",
            None,
            &[field("moods", "calm", false)],
            &[],
            0.6,
        );
        assert_eq!(card.context_text, "A by B. Moods: calm");
        assert_eq!(card.strict_ratio, 0.0);
    }

    #[test]
    fn lenient_included_when_strict_coverage_is_low() {
        // strict: "Label: Warp" = 2 tokens, lenient: "Moods: calm hazy late night" = 5
        let card = build_context_card(
            "A",
            "B",
            None,
            &[
                field("label", "Warp", true),
                field("moods", "calm hazy late night", false),
            ],
            &[],
            0.6,
        );
        assert_eq!(card.context_text, "A by B. Label: Warp Moods: calm hazy late night");
        assert!((card.strict_ratio - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn lenient_excluded_when_strict_coverage_suffices() {
        let card = build_context_card(
            "A",
            "B",
            None,
            &[
                field("summary", "a long and well cited description", true),
                field("moods", "calm", false),
            ],
            &[],
            0.6,
        );
        assert!(!card.context_text.contains("Moods"));
        assert_eq!(card.lenient_text, "Moods: calm");
        assert_eq!(card.strict_ratio, 1.0);
    }

    #[test]
    fn no_fields_means_empty_card() {
        let card = build_context_card("A", "B", Some("2001"), &[], &[], 0.6);
        assert!(card.context_text.is_empty());
        assert_eq!(card.strict_ratio, 0.0);
        assert_eq!(card.fields_json, "[]");
        assert_eq!(card.sources_json, "[]");
    }

    #[test]
    fn fields_serialize_with_field_key() {
        let card = build_context_card("A", "B", None, &[field("era", "90s", true)], &[], 0.6);
        let parsed: serde_json::Value = serde_json::from_str(&card.fields_json).unwrap();
        assert_eq!(parsed[0]["field"], "era");
        assert_eq!(parsed[0]["strict"], true);
        assert_eq!(parsed[0]["sources"][0], "https://s");
    }

    #[test]
    fn ratio_stays_in_unit_interval() {
        for strict_words in 0..5 {
            for lenient_words in 0..5 {
                let mut fields = Vec::new();
                if strict_words > 0 {
                    fields.push(field("s", &"w ".repeat(strict_words), true));
                }
                if lenient_words > 0 {
                    fields.push(field("l", &"w ".repeat(lenient_words), false));
                }
                let card = build_context_card("A", "B", None, &fields, &[], 0.6);
                assert!((0.0..=1.0).contains(&card.strict_ratio));
            }
        }
    }
}
