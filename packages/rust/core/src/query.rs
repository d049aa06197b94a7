//! Boolean query construction.
//!
//! A query is the organization clause AND-ed with one OR-group per required
//! keyword group. Organization names ending in a legal-entity suffix expand
//! into every spelling of that suffix so that "Acme Cooperative" also finds
//! pages that say "Acme Co-op".

use orgscan_shared::TopicProfile;

/// Interchangeable legal-entity suffixes. The first entry is the long form.
const SUFFIX_GROUPS: &[&[&str]] = &[
    &["Cooperative", "Coop", "Co-op"],
    &["Company", "Co", "Co."],
    &["Corporation", "Corp", "Corp."],
    &["Association", "Assn", "Assn."],
    &["Incorporated", "Inc", "Inc."],
];

fn suffix_group(token: &str) -> Option<&'static [&'static str]> {
    SUFFIX_GROUPS
        .iter()
        .copied()
        .find(|group| group.iter().any(|form| form.eq_ignore_ascii_case(token)))
}

/// Every spelling of `name` worth searching for.
///
/// The name as written comes first. If one of its whitespace-separated
/// tokens (scanning from the end) is a known suffix, the other spellings of
/// that suffix follow in table order. Whitespace runs collapse to one space.
pub fn name_variants(name: &str) -> Vec<String> {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    let original = tokens.join(" ");

    let Some((idx, group)) = tokens
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, t)| suffix_group(t).map(|g| (i, g)))
    else {
        return vec![original];
    };

    let mut variants = vec![original];
    for form in group {
        if form.eq_ignore_ascii_case(tokens[idx]) {
            continue;
        }
        let mut replaced = tokens.clone();
        replaced[idx] = *form;
        variants.push(replaced.join(" "));
    }
    variants
}

fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', ""))
}

fn or_group<S: AsRef<str>>(terms: &[S]) -> String {
    let quoted: Vec<String> = terms.iter().map(|t| quote(t.as_ref())).collect();
    format!("({})", quoted.join(" OR "))
}

/// Build the search expression for one organization under `profile`.
pub fn build_query(name: &str, profile: &TopicProfile) -> String {
    let variants = name_variants(name);
    let name_clause = if variants.len() > 1 {
        or_group(variants.as_slice())
    } else {
        quote(&variants[0])
    };

    let mut clauses = vec![name_clause];
    clauses.extend(profile.required_groups.iter().map(|g| or_group(g.as_slice())));
    clauses.join(" AND ")
}
