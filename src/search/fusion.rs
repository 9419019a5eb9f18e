//! Deterministic merging of per-strategy result lists
//!
//! Results are deduplicated on `(source.id, chunkId)`, keeping the higher
//! score and, on equal scores, the entry from the higher-priority strategy.
//! The merged list is ordered by score, then by content length in clusters
//! (lengths within 100 characters of each other count as equal), then by
//! creation time, newest first.

use super::executor::StrategyRun;
use super::models::{Facets, SearchResult, StrategyKind};
use crate::rag::RagResponse;
use indexmap::IndexMap;
use std::cmp::Ordering;

/// Content lengths closer than this are treated as a tie
pub const LENGTH_TIE_CHARS: usize = 100;

/// Merged output of every strategy run for one query
#[derive(Debug, Clone, Default)]
pub struct FusedResults {
    pub results: Vec<SearchResult>,
    pub facets: Option<Facets>,
    pub rag_response: Option<RagResponse>,
    /// Some strategy failed or served a fallback
    pub degraded: bool,
}

pub fn fuse(runs: Vec<StrategyRun>) -> FusedResults {
    let mut merged: IndexMap<(String, Option<String>), (SearchResult, i32)> = IndexMap::new();
    let mut fused = FusedResults::default();

    for run in runs {
        fused.degraded |= run.is_degraded();
        let priority = run.priority;
        let output = run.output;

        // only the engine aggregates
        if run.kind == StrategyKind::FullText && output.facets.is_some() {
            fused.facets = output.facets;
        }
        if output.rag_response.is_some() {
            fused.rag_response = output.rag_response;
        }

        for result in output.results {
            let key = result.dedup_key();
            match merged.get_mut(&key) {
                Some(existing) => {
                    if replaces(&result, priority, &existing.0, existing.1) {
                        *existing = (result, priority);
                    }
                }
                None => {
                    merged.insert(key, (result, priority));
                }
            }
        }
    }

    let mut results: Vec<SearchResult> = merged.into_values().map(|(result, _)| result).collect();
    rank(&mut results);
    fused.results = results;
    fused
}

fn replaces(candidate: &SearchResult, priority: i32, existing: &SearchResult, existing_priority: i32) -> bool {
    match candidate.score.total_cmp(&existing.score) {
        Ordering::Greater => true,
        Ordering::Equal => priority > existing_priority,
        Ordering::Less => false,
    }
}

/// Order by score, then length cluster, then recency.
///
/// Within a run of equal scores, lengths are sorted descending and a new
/// cluster starts wherever the gap to the previous length exceeds
/// [`LENGTH_TIE_CHARS`]. Clustering keeps the ordering transitive, which a
/// pairwise "differs by more than 100" comparison would not be.
pub fn rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.content_length().cmp(&a.content_length()))
    });

    let mut start = 0;
    while start < results.len() {
        let score = results[start].score;
        let end = results[start..]
            .iter()
            .position(|r| r.score.total_cmp(&score) != Ordering::Equal)
            .map_or(results.len(), |offset| start + offset);

        order_tied(&mut results[start..end]);
        start = end;
    }
}

fn order_tied(group: &mut [SearchResult]) {
    if group.len() < 2 {
        return;
    }

    let mut clusters = Vec::with_capacity(group.len());
    let mut cluster = 0usize;
    let mut previous = group[0].content_length();
    for result in group.iter() {
        let length = result.content_length();
        if previous - length > LENGTH_TIE_CHARS {
            cluster += 1;
        }
        previous = length;
        clusters.push(cluster);
    }

    let mut keyed: Vec<(usize, SearchResult)> = clusters.into_iter().zip(group.iter().cloned()).collect();
    keyed.sort_by(|(ca, a), (cb, b)| ca.cmp(cb).then_with(|| b.created_at.cmp(&a.created_at)));

    for (slot, (_, result)) in group.iter_mut().zip(keyed) {
        *slot = result;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::models::{ContentType, ResultSource, SourceKind};
    use crate::search::strategy::StrategyOutput;
    use crate::search::models::FacetBucket;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    fn result(id: &str, kind: SourceKind, score: f32, length: usize, age_days: i64) -> SearchResult {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() - ChronoDuration::days(age_days);
        SearchResult {
            id: format!("{}-{:?}", id, kind),
            content_type: ContentType::Article,
            title: id.to_string(),
            description: String::new(),
            content: Some("x".repeat(length)),
            highlights: vec![format!("{:?} highlight", kind)],
            score,
            relevance_score: score,
            semantic_score: (kind == SourceKind::Vector).then_some(score),
            source: ResultSource::new(kind, id),
            course_id: None,
            module_id: None,
            tags: Vec::new(),
            categories: Vec::new(),
            created_at: created,
            updated_at: created,
        }
    }

    fn run(kind: StrategyKind, priority: i32, results: Vec<SearchResult>) -> StrategyRun {
        StrategyRun {
            kind,
            priority,
            output: StrategyOutput::from_results(results),
            error: None,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_hybrid_overlap_example() {
        // 12 keyword matches, 8 vector matches, 3 shared content ids
        let keyword: Vec<SearchResult> = (0..12)
            .map(|i| result(&format!("doc-{}", i), SourceKind::FullText, 0.5 + i as f32 * 0.01, 300, 0))
            .collect();
        let mut vector: Vec<SearchResult> = (0..3)
            .map(|i| result(&format!("doc-{}", i), SourceKind::Vector, 0.9 - i as f32 * 0.01, 300, 0))
            .collect();
        vector.extend((0..5).map(|i| result(&format!("vec-{}", i), SourceKind::Vector, 0.75 + i as f32 * 0.01, 300, 0)));

        let fused = fuse(vec![
            run(StrategyKind::FullText, 10, keyword),
            run(StrategyKind::Semantic, 20, vector),
        ]);

        assert_eq!(fused.results.len(), 17);
        assert!(!fused.degraded);

        for i in 0..3 {
            let overlap = fused.results.iter().find(|r| r.source.id == format!("doc-{}", i)).unwrap();
            assert_eq!(overlap.source.kind, SourceKind::Vector);
            assert_eq!(overlap.semantic_score, Some(overlap.score));
            assert_eq!(overlap.highlights, vec!["Vector highlight"]);
        }

        assert!(fused.results.windows(2).all(|w| w[0].score >= w[1].score));
        let keys: HashSet<_> = fused.results.iter().map(|r| r.dedup_key()).collect();
        assert_eq!(keys.len(), 17);
    }

    #[test]
    fn test_equal_scores_prefer_higher_priority() {
        let fused = fuse(vec![
            run(StrategyKind::Semantic, 20, vec![result("doc", SourceKind::Vector, 0.8, 10, 0)]),
            run(StrategyKind::FullText, 10, vec![result("doc", SourceKind::FullText, 0.8, 10, 0)]),
        ]);
        assert_eq!(fused.results.len(), 1);
        assert_eq!(fused.results[0].source.kind, SourceKind::Vector);
    }

    #[test]
    fn test_chunks_of_one_document_are_distinct() {
        let mut a = result("doc", SourceKind::Vector, 0.8, 10, 0);
        a.source.metadata.insert("chunkId".to_string(), json!("1"));
        let mut b = result("doc", SourceKind::Vector, 0.7, 10, 0);
        b.source.metadata.insert("chunkId".to_string(), json!("2"));

        let fused = fuse(vec![run(StrategyKind::Semantic, 20, vec![a, b])]);
        assert_eq!(fused.results.len(), 2);
    }

    #[test]
    fn test_ties_break_on_length_cluster_then_recency() {
        let mut results = vec![
            result("short-new", SourceKind::FullText, 0.5, 100, 0),
            result("long-old", SourceKind::FullText, 0.5, 900, 30),
            result("long-new", SourceKind::FullText, 0.5, 850, 1),
            result("best", SourceKind::FullText, 0.9, 10, 90),
        ];
        rank(&mut results);

        let order: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(order, vec!["best", "long-new", "long-old", "short-new"]);
    }

    #[test]
    fn test_facets_only_from_full_text() {
        let mut facets = Facets::new();
        facets.insert("tags".to_string(), vec![FacetBucket { value: "ml".to_string(), count: 3 }]);

        let mut keyword = run(StrategyKind::FullText, 10, Vec::new());
        keyword.output.facets = Some(facets.clone());
        let mut semantic = run(StrategyKind::Semantic, 20, Vec::new());
        semantic.output.facets = Some(Facets::new());
        semantic.error = Some("vector store down".to_string());

        let fused = fuse(vec![keyword, semantic]);
        assert_eq!(fused.facets, Some(facets));
        assert!(fused.degraded);
    }
}
