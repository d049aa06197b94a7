//! Keyword validation of individual search results.

use orgscan_shared::{SearchItem, TopicProfile};

use crate::query::name_variants;

/// Checks search items against one topic profile for one organization.
///
/// Everything is lowercased once up front; [`MatchValidator::accepts`] then
/// only does substring tests.
#[derive(Debug, Clone)]
pub struct MatchValidator {
    names: Vec<String>,
    groups: Vec<Vec<String>>,
    exclusions: Vec<String>,
}

fn lower_all(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl MatchValidator {
    pub fn new(profile: &TopicProfile, org_name: &str) -> Self {
        Self {
            names: lower_all(&name_variants(org_name)),
            groups: profile.required_groups.iter().map(|g| lower_all(g)).collect(),
            exclusions: lower_all(&profile.exclusions),
        }
    }

    /// The first exclusion term found in `item`, if any.
    ///
    /// Exclusions are checked against title, snippet and link.
    pub fn excluded_by(&self, item: &SearchItem) -> Option<&str> {
        let text = text_buffer(item);
        let link = item.link.to_lowercase();
        self.exclusions
            .iter()
            .find(|x| text.contains(x.as_str()) || link.contains(x.as_str()))
            .map(String::as_str)
    }

    /// Whether `item` names the organization, satisfies every required group,
    /// and trips no exclusion.
    pub fn accepts(&self, item: &SearchItem) -> bool {
        let text = text_buffer(item);

        let names_org = self.names.iter().any(|n| text.contains(n.as_str()));
        if !names_org {
            return false;
        }

        let groups_ok = self
            .groups
            .iter()
            .all(|group| group.iter().any(|term| text.contains(term.as_str())));
        if !groups_ok {
            return false;
        }

        self.excluded_by(item).is_none()
    }

    /// First accepted item in provider order.
    pub fn first_match<'i>(&self, items: &'i [SearchItem]) -> Option<&'i SearchItem> {
        items.iter().find(|item| self.accepts(item))
    }
}

/// Title and snippet, lowercased with whitespace runs collapsed to one space.
fn text_buffer(item: &SearchItem) -> String {
    format!("{} {}", item.title, item.snippet)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgscan_shared::topics::builtin_topics;

    fn profile() -> TopicProfile {
        TopicProfile {
            name: "vegetation".into(),
            description: String::new(),
            verdict_column: "V".into(),
            evidence_column: "E".into(),
            required_groups: vec![
                vec!["satellite".into(), "overstory".into(), "ai".into()],
                vec!["vegetation".into(), "right-of-way".into()],
            ],
            exclusions: vec!["satellite dish".into(), "facebook.com".into()],
        }
    }

    fn item(title: &str, snippet: &str, link: &str) -> SearchItem {
        SearchItem {
            title: title.into(),
            snippet: snippet.into(),
            link: link.into(),
        }
    }

    #[test]
    fn variant_name_with_all_groups_passes() {
        let v = MatchValidator::new(&profile(), "Acme Cooperative");
        let hit = item(
            "News",
            "Acme Coop uses satellite imagery for vegetation management along rights-of-way",
            "https://acme.example/news",
        );
        assert!(v.accepts(&hit));
    }

    #[test]
    fn exclusion_overrides_match() {
        let v = MatchValidator::new(&profile(), "Acme Cooperative");
        let miss = item(
            "Acme Cooperative installs new satellite dish for rural vegetation areas",
            "",
            "https://acme.example",
        );
        assert!(!v.accepts(&miss));
        assert_eq!(v.excluded_by(&miss), Some("satellite dish"));
    }

    #[test]
    fn exclusion_applies_to_link() {
        let v = MatchValidator::new(&profile(), "Acme Cooperative");
        let social = item(
            "Acme Cooperative",
            "satellite vegetation survey",
            "https://www.Facebook.com/acme",
        );
        assert!(!v.accepts(&social));
    }

    #[test]
    fn missing_group_fails() {
        let v = MatchValidator::new(&profile(), "Acme Cooperative");
        let partial = item("Acme Cooperative", "satellite imagery program", "");
        assert!(!v.accepts(&partial));
    }

    #[test]
    fn organization_must_be_named() {
        let v = MatchValidator::new(&profile(), "Acme Cooperative");
        let other = item("Beta Energy", "satellite vegetation analytics", "");
        assert!(!v.accepts(&other));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let v = MatchValidator::new(&profile(), "acme cooperative");
        let shouty = item("ACME CO-OP", "OVERSTORY RIGHT-OF-WAY PILOT", "");
        assert!(v.accepts(&shouty));
    }

    #[test]
    fn irregular_whitespace_still_names_org() {
        let v = MatchValidator::new(&profile(), "Acme Cooperative");
        let doubled = item("Acme  Cooperative", "satellite\tvegetation", "");
        let nbsp = item("Acme\u{a0}Cooperative", "overstory\nright-of-way", "");
        assert!(v.accepts(&doubled));
        assert!(v.accepts(&nbsp));
    }

    #[test]
    fn builtin_profiles_accept_and_exclude() {
        for profile in builtin_topics() {
            let v = MatchValidator::new(&profile, "Acme Energy");
            let firsts: Vec<&str> = profile
                .required_groups
                .iter()
                .map(|g| g[0].as_str())
                .collect();
            let title = format!("Acme Energy {}", firsts.join(" "));

            let hit = item(&title, "", "https://acme.example");
            assert!(v.accepts(&hit), "{} rejects {title:?}", profile.name);

            for exclusion in &profile.exclusions {
                let in_snippet = item(&title, exclusion, "https://acme.example");
                assert!(!v.accepts(&in_snippet), "{}: {exclusion}", profile.name);
                let in_link = item(&title, "", &format!("https://{exclusion}"));
                assert!(!v.accepts(&in_link), "{}: {exclusion} in link", profile.name);
            }
        }
    }

    #[test]
    fn first_match_wins() {
        let v = MatchValidator::new(&profile(), "Acme Energy");
        let items = vec![
            item("Acme Energy", "annual report", "https://a.example"),
            item("Acme Energy", "ai vegetation pilot", "https://b.example"),
            item("Acme Energy", "satellite right-of-way", "https://c.example"),
        ];
        let first = v.first_match(&items).map(|i| i.link.as_str());
        assert_eq!(first, Some("https://b.example"));
    }

    #[test]
    fn no_items_no_match() {
        let v = MatchValidator::new(&profile(), "Acme Energy");
        assert!(v.first_match(&[]).is_none());
    }
}
