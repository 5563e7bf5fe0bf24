//! Fuzzy matching for "did you mean" hints
//!
//! Used when a view name cannot be resolved or a template refers to an
//! undefined variable or filter. Candidates within a small Levenshtein
//! distance are offered, best match first.

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Filters available in every view
pub const AVAILABLE_FILTERS: &[&str] = &[
    // Hilt filters
    "component",
    // Built-in MiniJinja filters
    "default",
    "upper",
    "lower",
    "title",
    "capitalize",
    "replace",
    "trim",
    "join",
    "first",
    "last",
    "length",
    "reverse",
    "sort",
    "unique",
    "map",
    "select",
    "reject",
    "selectattr",
    "rejectattr",
    "batch",
    "slice",
    "dictsort",
    "items",
    "attr",
    "int",
    "float",
    "abs",
    "round",
    "string",
    "list",
    "bool",
    "safe",
    "escape",
    "e",
];

/// Suggestion result with its distance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// The suggested correction
    pub text: String,
    /// Levenshtein distance (lower = better match)
    pub distance: usize,
}

/// Find closest matches from a list of candidates
pub fn find_closest_matches<S: AsRef<str>>(
    input: &str,
    candidates: &[S],
    max_results: usize,
) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .map(AsRef::as_ref)
        .filter_map(|candidate| {
            let distance = strsim::levenshtein(input, candidate);
            (distance <= MAX_SUGGESTION_DISTANCE && distance > 0).then(|| Suggestion {
                text: candidate.to_string(),
                distance,
            })
        })
        .collect();

    suggestions.sort_by_key(|s| s.distance);
    suggestions.truncate(max_results);
    suggestions
}

fn did_you_mean(matches: &[Suggestion]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let quoted: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
    Some(format!("Did you mean {}?", quoted.join(" or ")))
}

/// Suggest a view name close to one that could not be found
///
/// Also catches the common slip of writing a path (`alias/source`) instead of
/// a dotted view name (`alias.source`).
pub fn suggest_view_name(name: &str, available: &[String]) -> Option<String> {
    let dotted = name.replace('/', ".");
    if dotted != name && available.iter().any(|v| *v == dotted) {
        return Some(format!(
            "View names use dots as separators. Did you mean `{}`?",
            dotted
        ));
    }

    did_you_mean(&find_closest_matches(name, available, 3))
}

/// Suggest corrections for an undefined variable from the view's data keys
pub fn suggest_undefined_variable(variable: &str, available: &[String]) -> Option<String> {
    did_you_mean(&find_closest_matches(variable, available, 3)).or_else(|| {
        Some(format!(
            "Variable `{}` is not defined. Pass it in the view data, share it, or add it from a view composer.",
            variable
        ))
    })
}

/// Suggest corrections for an unknown filter
pub fn suggest_unknown_filter(filter: &str) -> Option<String> {
    did_you_mean(&find_closest_matches(filter, AVAILABLE_FILTERS, 3))
}

/// Extract a quoted name from messages like "unknown filter 'upperr'"
pub fn extract_quoted(msg: &str) -> Option<String> {
    for quote in ['`', '\'', '"'] {
        let mut parts = msg.split(quote);
        parts.next()?;
        if let Some(inner) = parts.next() {
            if !inner.is_empty() && parts.next().is_some() {
                return Some(inner.to_string());
            }
        }
    }
    None
}
