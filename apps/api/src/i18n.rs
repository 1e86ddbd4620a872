//! User-facing message translation.
//!
//! Keys are the English messages themselves; `:name` placeholders are filled
//! from the parameters after lookup, so translations may move them around.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    Fr,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "fr" => Ok(Locale::Fr),
            other => Err(format!("unsupported locale '{other}'")),
        }
    }
}

fn french(key: &str) -> Option<&'static str> {
    Some(match key {
        "Job \":job\" created" => "Job \":job\" créé",
        "Job \":job\" updated" => "Job \":job\" mis à jour",
        "Job \":job\" deleted" => "Job \":job\" supprimé",
        "Applied to job \":job\"" => "Candidature envoyée pour le job \":job\"",
        "No jobs" => "Aucun job",
        "Please correct the highlighted fields." => "Veuillez corriger les champs signalés.",
        "These credentials do not match our records." => {
            "Ces identifiants ne correspondent à aucun compte."
        }
        "New job" => "Nouveau job",
        "Edit job \":job\"" => "Modifier le job \":job\"",
        _ => return None,
    })
}

/// Translates `key` and substitutes `:name` placeholders. Unknown keys are
/// returned as-is (with placeholders filled).
pub fn translate(locale: Locale, key: &str, params: &[(&str, &str)]) -> String {
    let template = match locale {
        Locale::En => key,
        Locale::Fr => french(key).unwrap_or(key),
    };
    substitute(template, params)
}

/// Single left-to-right pass: substituted values are never scanned again.
fn substitute(template: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(at) = rest.find(':') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        // Longest name first so `:job` does not eat the start of `:jobs`.
        let hit = params
            .iter()
            .filter(|(name, _)| !name.is_empty() && after.starts_with(name))
            .max_by_key(|(name, _)| name.len());
        match hit {
            Some((name, value)) => {
                out.push_str(value);
                rest = &after[name.len()..];
            }
            None => {
                out.push(':');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
