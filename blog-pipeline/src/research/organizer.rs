//! Fan-in: merge per-query, per-source fetch results into the shared
//! research context, deriving citations and key insights along the way.

use std::collections::BTreeMap;

use crate::state::{Citation, CitationKind, ResearchContext, ResearchResult};
use crate::util::{clip, extract_year};

use super::sources;

/// Merge a batch of executed queries into `existing`. Results group by
/// source across all queries, the per-query view is retained, and the
/// citation list stays deduplicated by URL.
pub fn organize(
    all_results: BTreeMap<String, BTreeMap<String, Vec<ResearchResult>>>,
    existing: &ResearchContext,
) -> ResearchContext {
    let mut context = existing.clone();

    for (query, per_source) in all_results {
        for (source, items) in &per_source {
            context
                .by_source
                .entry(source.clone())
                .or_default()
                .extend(items.iter().cloned());

            for item in items.iter().take(3) {
                if let Some(citation) = citation_for(source, item) {
                    context.citations.push(citation);
                }
            }
        }
        context.by_topic.insert(query, per_source);
    }

    context.citations = dedupe_citations(std::mem::take(&mut context.citations));
    context.key_insights = derive_insights(&context.by_source);
    context
}

fn citation_for(source: &str, item: &ResearchResult) -> Option<Citation> {
    let url = item.url.clone()?;
    if url.is_empty() {
        return None;
    }

    if source == sources::ARXIV {
        let authors = item
            .metadata
            .get("authors")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|a| a.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let year = item
            .metadata
            .get("published")
            .and_then(|v| v.as_str())
            .and_then(extract_year);
        Some(Citation {
            kind: CitationKind::Academic,
            title: item.title.clone(),
            url,
            snippet: None,
            authors,
            year,
        })
    } else {
        Some(Citation {
            kind: CitationKind::Web,
            title: item.title.clone(),
            url,
            snippet: Some(clip(&item.content, 100).to_string()),
            authors: Vec::new(),
            year: None,
        })
    }
}

fn dedupe_citations(citations: Vec<Citation>) -> Vec<Citation> {
    let mut seen = std::collections::BTreeSet::new();
    citations
        .into_iter()
        .filter(|citation| seen.insert(citation.url.clone()))
        .collect()
}

/// One headline per source, capped at five, for prompts that want a
/// quick view of what research turned up.
fn derive_insights(by_source: &BTreeMap<String, Vec<ResearchResult>>) -> Vec<String> {
    by_source
        .iter()
        .filter_map(|(source, items)| {
            items
                .first()
                .map(|item| format!("{source}: {}", item.title))
        })
        .take(5)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(title: &str, url: Option<&str>) -> ResearchResult {
        ResearchResult {
            title: title.to_string(),
            url: url.map(str::to_string),
            content: format!("{title} content"),
            summary: None,
            metadata: Default::default(),
        }
    }

    #[test]
    fn groups_by_source_across_queries() {
        let mut q1 = BTreeMap::new();
        q1.insert("web".to_string(), vec![result("first", Some("http://a"))]);
        let mut q2 = BTreeMap::new();
        q2.insert("web".to_string(), vec![result("second", Some("http://b"))]);

        let mut all = BTreeMap::new();
        all.insert("query one".to_string(), q1);
        all.insert("query two".to_string(), q2);

        let context = organize(all, &ResearchContext::default());
        assert_eq!(context.by_source["web"].len(), 2);
        assert_eq!(context.by_topic.len(), 2);
        assert_eq!(context.citations.len(), 2);
    }

    #[test]
    fn citations_dedupe_by_url() {
        let mut per_source = BTreeMap::new();
        per_source.insert(
            "web".to_string(),
            vec![
                result("same page", Some("http://dup")),
                result("same page again", Some("http://dup")),
                result("no link", None),
            ],
        );
        let mut all = BTreeMap::new();
        all.insert("q".to_string(), per_source);

        let context = organize(all, &ResearchContext::default());
        assert_eq!(context.citations.len(), 1);
    }

    #[test]
    fn academic_citations_carry_authors_and_year() {
        let mut paper = result("A Paper", Some("http://arxiv.org/abs/1"));
        paper.metadata.insert("authors".to_string(), json!(["Ada", "Grace"]));
        paper
            .metadata
            .insert("published".to_string(), json!("2023-04-01"));

        let mut per_source = BTreeMap::new();
        per_source.insert("arxiv".to_string(), vec![paper]);
        let mut all = BTreeMap::new();
        all.insert("q".to_string(), per_source);

        let context = organize(all, &ResearchContext::default());
        let citation = &context.citations[0];
        assert_eq!(citation.kind, CitationKind::Academic);
        assert_eq!(citation.authors, vec!["Ada", "Grace"]);
        assert_eq!(citation.year.as_deref(), Some("2023"));
    }

    #[test]
    fn merging_preserves_existing_context() {
        let mut existing = ResearchContext::default();
        existing
            .by_source
            .insert("web".to_string(), vec![result("old", Some("http://old"))]);
        existing.citations.push(Citation {
            kind: CitationKind::Web,
            title: "old".to_string(),
            url: "http://old".to_string(),
            snippet: None,
            authors: Vec::new(),
            year: None,
        });

        let mut per_source = BTreeMap::new();
        per_source.insert("web".to_string(), vec![result("new", Some("http://new"))]);
        let mut all = BTreeMap::new();
        all.insert("q".to_string(), per_source);

        let context = organize(all, &existing);
        assert_eq!(context.by_source["web"].len(), 2);
        assert_eq!(context.citations.len(), 2);
    }
}
