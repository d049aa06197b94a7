//! Single-row classification: query → search → validate.

use orgscan_search::{SearchProvider, SearchRequest};
use orgscan_shared::{Result, RunConfig, TopicProfile};
use tracing::{debug, instrument, warn};

use crate::matcher::MatchValidator;
use crate::query::build_query;

/// Result of classifying one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// An item passed validation; `evidence` is its link.
    Match { evidence: String, position: usize },
    /// The provider returned `results` items and none passed.
    NoMatch { results: usize },
    /// The provider returned nothing at all.
    NoResults,
}

impl Classification {
    pub fn verdict(&self) -> bool {
        matches!(self, Self::Match { .. })
    }

    pub fn evidence(&self) -> Option<&str> {
        match self {
            Self::Match { evidence, .. } => Some(evidence),
            _ => None,
        }
    }

    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResults)
    }
}

/// Classifies organizations for one topic against one provider.
pub struct RowClassifier<'a> {
    provider: &'a dyn SearchProvider,
    profile: &'a TopicProfile,
    config: &'a RunConfig,
}

impl<'a> RowClassifier<'a> {
    pub fn new(
        provider: &'a dyn SearchProvider,
        profile: &'a TopicProfile,
        config: &'a RunConfig,
    ) -> Self {
        Self {
            provider,
            profile,
            config,
        }
    }

    /// Search for `org_name` and evaluate the results in order.
    ///
    /// Provider errors propagate untouched.
    #[instrument(skip(self), fields(topic = %self.profile.name))]
    pub async fn classify(&self, org_name: &str) -> Result<Classification> {
        let query = build_query(org_name, self.profile);
        debug!(%query, provider = self.provider.name(), "searching");

        let request = SearchRequest {
            query: &query,
            num: self.config.result_count,
            locale: self.config.locale.as_deref(),
            time_window: self.config.time_window.as_deref(),
        };
        let items = self.provider.search(&request).await?;

        if items.is_empty() {
            warn!(org = org_name, "provider returned no results");
            return Ok(Classification::NoResults);
        }

        let validator = MatchValidator::new(self.profile, org_name);
        for (position, item) in items.iter().enumerate() {
            if let Some(term) = validator.excluded_by(item) {
                debug!(link = %item.link, term, "result excluded");
                continue;
            }
            if validator.accepts(item) {
                debug!(link = %item.link, position, "match found");
                return Ok(Classification::Match {
                    evidence: item.link.clone(),
                    position,
                });
            }
        }

        debug!(results = items.len(), "no result matched");
        Ok(Classification::NoMatch {
            results: items.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orgscan_shared::{OrgScanError, SearchItem};
    use std::sync::Mutex;

    /// Provider returning a fixed response and remembering every request.
    struct FixedProvider {
        response: std::result::Result<Vec<SearchItem>, String>,
        requests: Mutex<Vec<(String, u32, Option<String>, Option<String>)>>,
    }

    impl FixedProvider {
        fn ok(items: Vec<SearchItem>) -> Self {
            Self {
                response: Ok(items),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(message.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<SearchItem>> {
            self.requests.lock().unwrap().push((
                request.query.to_string(),
                request.num,
                request.locale.map(str::to_string),
                request.time_window.map(str::to_string),
            ));
            self.response.clone().map_err(OrgScanError::Provider)
        }
    }

    fn item(title: &str, snippet: &str, link: &str) -> SearchItem {
        SearchItem {
            title: title.into(),
            snippet: snippet.into(),
            link: link.into(),
        }
    }

    fn profile() -> TopicProfile {
        TopicProfile {
            name: "drones".into(),
            description: String::new(),
            verdict_column: "Uses_Drones".into(),
            evidence_column: "Drone_Source_URL".into(),
            required_groups: vec![vec!["drone".into(), "uav".into()]],
            exclusions: vec!["toy drone".into()],
        }
    }

    #[tokio::test]
    async fn first_passing_item_is_evidence() {
        let provider = FixedProvider::ok(vec![
            item("Acme Co toy drone sale", "", "https://shop.example"),
            item("Acme Co", "utility drone inspections", "https://acme.example/a"),
            item("Acme Co", "uav program", "https://acme.example/b"),
        ]);
        let profile = profile();
        let config = RunConfig::default();
        let classifier = RowClassifier::new(&provider, &profile, &config);

        let result = classifier.classify("Acme Co").await.unwrap();
        assert_eq!(
            result,
            Classification::Match {
                evidence: "https://acme.example/a".into(),
                position: 1,
            }
        );
        assert!(result.verdict());
        assert_eq!(result.evidence(), Some("https://acme.example/a"));
    }

    #[tokio::test]
    async fn request_carries_query_and_config() {
        let provider = FixedProvider::ok(Vec::new());
        let profile = profile();
        let config = RunConfig {
            result_count: 7,
            time_window: Some("qdr:y8".into()),
            ..RunConfig::default()
        };
        let classifier = RowClassifier::new(&provider, &profile, &config);
        classifier.classify("Acme Co").await.unwrap();

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (query, num, locale, window) = &requests[0];
        assert_eq!(
            query,
            r#"("Acme Co" OR "Acme Company" OR "Acme Co.") AND ("drone" OR "uav")"#
        );
        assert_eq!(*num, 7);
        assert_eq!(locale.as_deref(), Some("en"));
        assert_eq!(window.as_deref(), Some("qdr:y8"));
    }

    #[tokio::test]
    async fn empty_results_are_distinct() {
        let provider = FixedProvider::ok(Vec::new());
        let profile = profile();
        let config = RunConfig::default();
        let result = RowClassifier::new(&provider, &profile, &config)
            .classify("Acme")
            .await
            .unwrap();
        assert_eq!(result, Classification::NoResults);
        assert!(!result.verdict());
        assert!(result.is_no_results());
    }

    #[tokio::test]
    async fn no_match_counts_results() {
        let provider = FixedProvider::ok(vec![
            item("Acme", "annual meeting", "https://a.example"),
            item("Acme", "rate case", "https://b.example"),
        ]);
        let profile = profile();
        let config = RunConfig::default();
        let result = RowClassifier::new(&provider, &profile, &config)
            .classify("Acme")
            .await
            .unwrap();
        assert_eq!(result, Classification::NoMatch { results: 2 });
        assert_eq!(result.evidence(), None);
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let provider = FixedProvider::failing("HTTP 500");
        let profile = profile();
        let config = RunConfig::default();
        let err = RowClassifier::new(&provider, &profile, &config)
            .classify("Acme")
            .await
            .unwrap_err();
        assert!(matches!(err, OrgScanError::Provider(_)));
    }
}
