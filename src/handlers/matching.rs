//! Pure label matching and lookup tables.
//!
//! Everything here is deterministic and rendering-free so the scoring
//! weights and tie-break rules can be tested exhaustively with tables.
//!
//! Scoring: the target label is tokenized on whitespace and `&`; each
//! token found as a substring of a candidate is worth one point, and an
//! exact full-label match adds a bonus of ten. The strictly highest score
//! wins; ties keep the first-encountered candidate; a top score of zero
//! means no match.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::page::SelectOption;

const EXACT_MATCH_BONUS: u32 = 10;

/// Score one candidate against a target label.
pub fn score_label(target: &str, candidate: &str) -> u32 {
    let target = target.trim().to_lowercase();
    let candidate = candidate.trim().to_lowercase();
    if target.is_empty() || candidate.is_empty() {
        return 0;
    }

    let mut score = 0;
    for token in target.split(|c: char| c.is_whitespace() || c == '&') {
        if !token.is_empty() && candidate.contains(token) {
            score += 1;
        }
    }
    if candidate == target {
        score += EXACT_MATCH_BONUS;
    }
    score
}

/// Pick the best-scoring candidate, first-encountered on ties.
///
/// Returns `None` when nothing scores above zero; the caller falls back
/// to its designated default.
pub fn best_match<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, u32)> = None;
    for candidate in candidates {
        let score = score_label(target, candidate);
        match best {
            Some((_, top)) if score <= top => {}
            _ if score == 0 => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(label, _)| label)
}

/// Keyword table for inferring a category from the listing title when the
/// payload does not name one.
static CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("honda", "cars & trucks"),
    ("toyota", "cars & trucks"),
    ("ford", "cars & trucks"),
    ("chevy", "cars & trucks"),
    ("civic", "cars & trucks"),
    ("corolla", "cars & trucks"),
    ("sedan", "cars & trucks"),
    ("truck", "cars & trucks"),
    ("couch", "furniture"),
    ("sofa", "furniture"),
    ("dresser", "furniture"),
    ("recliner", "furniture"),
    ("futon", "furniture"),
    ("bookshelf", "furniture"),
    ("laptop", "electronics"),
    ("iphone", "electronics"),
    ("monitor", "electronics"),
    ("console", "electronics"),
    ("bicycle", "bicycles"),
    ("bike", "bicycles"),
    ("stroller", "baby & kid stuff"),
    ("crib", "baby & kid stuff"),
];

/// Category used when the payload names none and no keyword matches.
pub const DEFAULT_CATEGORY: &str = "general for sale";

/// Infer a category from title keywords. First table hit wins.
pub fn infer_category(title: &str) -> Option<&'static str> {
    let title = title.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| title.contains(keyword))
        .map(|(_, category)| *category)
}

/// Neighborhood labels by postal code. Deterministic and independent of
/// any other input.
static NEIGHBORHOODS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("94102", "hayes valley"),
        ("94109", "nob hill"),
        ("94110", "mission district"),
        ("94114", "castro / upper market"),
        ("94117", "haight ashbury"),
        ("94118", "inner richmond"),
        ("94122", "inner sunset"),
        ("94133", "north beach / telegraph hill"),
    ])
});

pub fn neighborhood_for_postal(postal_code: &str) -> Option<&'static str> {
    NEIGHBORHOODS.get(postal_code.trim()).copied()
}

/// Regional subarea by postal prefix.
static SUBAREAS: &[(&str, &str)] = &[
    ("941", "city of san francisco"),
    ("940", "peninsula"),
    ("944", "peninsula"),
    ("945", "east bay area"),
    ("946", "east bay area"),
    ("947", "east bay area"),
    ("949", "north bay / marin"),
    ("950", "south bay area"),
    ("951", "south bay area"),
];

pub fn subarea_for_postal(postal_code: &str) -> Option<&'static str> {
    let postal = postal_code.trim();
    SUBAREAS
        .iter()
        .find(|(prefix, _)| postal.starts_with(prefix))
        .map(|(_, subarea)| *subarea)
}

/// Resolve a required `<select>` with a strict three-tier order:
/// exact value whitelist match, then case-insensitive label match, then
/// the first non-placeholder option. The first tier that yields a match
/// wins outright.
pub fn resolve_required_select<'a>(
    options: &'a [SelectOption],
    preferred_values: &[&str],
    preferred_labels: &[&str],
) -> Option<&'a SelectOption> {
    for value in preferred_values {
        if let Some(option) = options.iter().find(|o| o.value == *value) {
            return Some(option);
        }
    }
    for label in preferred_labels {
        if let Some(option) = options
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(label))
        {
            return Some(option);
        }
    }
    options.iter().find(|o| !o.is_placeholder())
}
