// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Pure maintenance logic, tested from fixtures without talking to the
//! embedding server.

use std::collections::HashMap;

/// Naming convention collections must follow; anything else is a symptom of
/// the embedding server's crash-corruption behavior.
pub const COLLECTION_PREFIX: &str = "cm__";

/// Returns exactly the collection names not starting with `cm__`.
pub fn identify_orphaned_collections(collections: &[String]) -> Vec<String> {
    collections.iter().filter(|name| !name.starts_with(COLLECTION_PREFIX)).cloned().collect()
}

#[derive(Debug, Clone)]
pub struct DocMeta {
    pub id: String,
    pub doc_type: String,
    pub sqlite_id: i64,
    pub created_at_epoch: i64,
}

/// Groups documents by `(doc_type, sqlite_id)`, orders groups by
/// `created_at_epoch` descending, keeps the first `max_items` groups, and
/// returns the document ids belonging to every other (older) group.
pub fn identify_documents_to_prune(metas: &[DocMeta], max_items: usize) -> Vec<String> {
    let mut groups: HashMap<(String, i64), (i64, Vec<String>)> = HashMap::new();
    for meta in metas {
        let key = (meta.doc_type.clone(), meta.sqlite_id);
        let entry = groups.entry(key).or_insert_with(|| (meta.created_at_epoch, Vec::new()));
        entry.0 = entry.0.max(meta.created_at_epoch);
        entry.1.push(meta.id.clone());
    }

    let mut ordered: Vec<((String, i64), (i64, Vec<String>))> = groups.into_iter().collect();
    ordered.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.0.cmp(&b.0)));

    ordered
        .into_iter()
        .skip(max_items)
        .flat_map(|(_, (_, ids))| ids)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_orphaned_collections_keeps_cm_prefix_only() {
        let cols = vec!["cm__p".to_string(), "cm__q".to_string(), "junk-uuid".to_string()];
        assert_eq!(identify_orphaned_collections(&cols), vec!["junk-uuid".to_string()]);
    }

    #[test]
    fn identify_orphaned_collections_empty_when_all_conform() {
        let cols = vec!["cm__p".to_string(), "cm__q".to_string()];
        assert!(identify_orphaned_collections(&cols).is_empty());
    }

    fn meta(id: &str, doc_type: &str, sqlite_id: i64, created: i64) -> DocMeta {
        DocMeta { id: id.into(), doc_type: doc_type.into(), sqlite_id, created_at_epoch: created }
    }

    #[test]
    fn identify_documents_to_prune_keeps_newest_groups() {
        let metas = vec![
            meta("a1", "observation_narrative", 1, 300),
            meta("b1", "observation_narrative", 2, 200),
            meta("c1", "observation_narrative", 3, 100),
        ];
        let pruned = identify_documents_to_prune(&metas, 2);
        assert_eq!(pruned, vec!["c1".to_string()]);
    }

    #[test]
    fn identify_documents_to_prune_groups_by_doc_type_and_sqlite_id() {
        let metas = vec![
            meta("a1", "observation_narrative", 1, 100),
            meta("a2", "observation_fact", 1, 100),
            meta("b1", "observation_narrative", 2, 50),
        ];
        // Two distinct groups: (observation_narrative, 1) and
        // (observation_fact, 1) even though they share a sqlite_id.
        let pruned = identify_documents_to_prune(&metas, 2);
        assert_eq!(pruned, vec!["b1".to_string()]);
    }

    #[test]
    fn identify_documents_to_prune_returns_nothing_under_cap() {
        let metas = vec![meta("a1", "observation_narrative", 1, 100)];
        assert!(identify_documents_to_prune(&metas, 5).is_empty());
    }

    #[test]
    fn identify_documents_to_prune_prunes_all_docs_in_dropped_group() {
        let metas = vec![
            meta("a1", "observation_narrative", 1, 300),
            meta("b1", "summary", 2, 100),
            meta("b2", "summary", 2, 100),
        ];
        let pruned = identify_documents_to_prune(&metas, 1);
        let mut pruned_sorted = pruned;
        pruned_sorted.sort();
        assert_eq!(pruned_sorted, vec!["b1".to_string(), "b2".to_string()]);
    }
}
