//! Randomized differential checks over the aggregation pipeline.
//!
//! Trees are generated parent-before-child, so every generated table is a
//! single well-formed tree rooted at id 1.

use linnaea::aggregate::{AggregateMap, LevelAggregator};
use linnaea::taxon::{IconicTaxa, TaxonId, TaxonRecord};
use linnaea::tree::{AncestryTable, ChildIndex, SubtreePartitioner};
use proptest::prelude::*;
use std::collections::HashMap;

fn arb_tree() -> impl Strategy<Value = Vec<TaxonRecord>> {
    (2usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<prop::sample::Index>(), n - 1),
            prop::collection::vec(0u64..100, n),
        )
            .prop_map(|(picks, counts)| {
                let mut records = vec![TaxonRecord::new(
                    1u64,
                    None,
                    "stateofmatter",
                    "taxon 1",
                    counts[0],
                )];
                for (offset, pick) in picks.iter().enumerate() {
                    let id = offset as u64 + 2;
                    // Parents are drawn from earlier ids only
                    let parent = pick.index(offset + 1) as u64 + 1;
                    records.push(TaxonRecord::new(
                        id,
                        Some(TaxonId(parent)),
                        "clade",
                        format!("taxon {id}"),
                        counts[offset + 1],
                    ));
                }
                records
            })
    })
}

fn aggregate(records: &[TaxonRecord], threshold: usize, chunk_size: usize) -> AggregateMap {
    let children = ChildIndex::build(records);
    let ancestry = AncestryTable::build(records, &children).unwrap();
    let own_counts: HashMap<TaxonId, u64> = records
        .iter()
        .map(|r| (r.id, r.own_observation_count))
        .collect();
    let iconic = IconicTaxa::inat_default();

    let aggregator = LevelAggregator::new(&children, &ancestry, &iconic, &own_counts)
        .with_parallel_threshold(threshold)
        .with_chunk_size(chunk_size);
    let mut aggregates = AggregateMap::new();
    aggregator
        .aggregate_levels(ancestry.levels(), &mut aggregates)
        .unwrap();
    aggregates
}

/// Branch at the root's children, aggregate every branch, then finish the
/// upper remainder, exactly as the coordinator sequences it.
fn aggregate_partitioned(records: &[TaxonRecord]) -> AggregateMap {
    let children = ChildIndex::build(records);
    let ancestry = AncestryTable::build(records, &children).unwrap();
    let own_counts: HashMap<TaxonId, u64> = records
        .iter()
        .map(|r| (r.id, r.own_observation_count))
        .collect();
    let iconic = IconicTaxa::inat_default();
    let aggregator = LevelAggregator::new(&children, &ancestry, &iconic, &own_counts);

    let roots = children.children(ancestry.root()).to_vec();
    let partition = SubtreePartitioner::new(&children, &ancestry)
        .partition(&roots)
        .unwrap();

    let mut aggregates = AggregateMap::new();
    for branch in &partition.branches {
        aggregator
            .aggregate_levels(&branch.levels, &mut aggregates)
            .unwrap();
    }
    aggregator
        .aggregate_levels(&partition.upper_levels, &mut aggregates)
        .unwrap();
    aggregates
}

proptest! {
    #[test]
    fn prop_parallel_matches_sequential(records in arb_tree()) {
        let sequential = aggregate(&records, usize::MAX, 4);
        let parallel = aggregate(&records, 1, 3);
        prop_assert_eq!(sequential, parallel);
    }

    #[test]
    fn prop_counts_sum_over_children(records in arb_tree()) {
        let aggregates = aggregate(&records, usize::MAX, 4);
        let children = ChildIndex::build(&records);

        for record in &records {
            let agg = aggregates[&record.id];
            let child_ids = children.children(record.id);

            let child_observations: u64 = child_ids
                .iter()
                .map(|c| aggregates[c].aggregated_observation_count)
                .sum();
            prop_assert_eq!(
                agg.aggregated_observation_count,
                record.own_observation_count + child_observations
            );

            if child_ids.is_empty() {
                prop_assert_eq!(agg.leaf_taxa_count, 1);
            } else {
                let child_leaves: u64 =
                    child_ids.iter().map(|c| aggregates[c].leaf_taxa_count).sum();
                prop_assert_eq!(agg.leaf_taxa_count, child_leaves);
            }
        }
    }

    #[test]
    fn prop_root_accumulates_everything(records in arb_tree()) {
        let aggregates = aggregate(&records, usize::MAX, 4);
        let children = ChildIndex::build(&records);

        let total: u64 = records.iter().map(|r| r.own_observation_count).sum();
        let leaf_count = records.iter().filter(|r| children.is_leaf(r.id)).count() as u64;

        let root = aggregates[&TaxonId(1)];
        prop_assert_eq!(root.aggregated_observation_count, total);
        prop_assert_eq!(root.leaf_taxa_count, leaf_count);
    }

    #[test]
    fn prop_ancestor_chains_extend_the_parent(records in arb_tree()) {
        let children = ChildIndex::build(&records);
        let ancestry = AncestryTable::build(&records, &children).unwrap();

        for record in &records {
            let chain = ancestry.ancestors(record.id);
            prop_assert_eq!(ancestry.depth(record.id), Some(chain.len() as u32));
            match record.parent_id {
                Some(parent) => {
                    prop_assert_eq!(chain.last().copied(), Some(parent));
                    prop_assert_eq!(&chain[..chain.len() - 1], ancestry.ancestors(parent));
                }
                None => prop_assert!(chain.is_empty()),
            }
        }
    }

    #[test]
    fn prop_partitioned_matches_whole_tree(records in arb_tree()) {
        let whole = aggregate(&records, usize::MAX, 4);
        let partitioned = aggregate_partitioned(&records);
        prop_assert_eq!(whole, partitioned);
    }
}
