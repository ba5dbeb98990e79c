//! Equi-joins between catalog rows and overlay rows
//!
//! Both sides are keyed by [`OverlayKey`] (content hash + user). Output order
//! follows the left sequence.

use std::collections::HashMap;
use std::hash::Hash;

use crate::models::{CatalogEntry, RatingRow};

/// Composite join key between catalog and overlay data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayKey<'a> {
    pub hash: &'a str,
    pub user: &'a str,
}

/// A catalog row merged with the requester's rating
#[derive(Debug, Clone, PartialEq)]
pub struct RatedEntry {
    pub entry: CatalogEntry,
    pub rating: Option<u8>,
}

/// Left outer join: every left item appears once, paired with its match if any
///
/// When several right items share a key the last one wins.
pub fn left_join<'s, L, R, K, O>(
    left: &'s [L],
    right: &'s [R],
    left_key: impl Fn(&'s L) -> K,
    right_key: impl Fn(&'s R) -> K,
    merge: impl Fn(&'s L, Option<&'s R>) -> O,
) -> Vec<O>
where
    K: Eq + Hash,
{
    let index: HashMap<K, &'s R> = right.iter().map(|r| (right_key(r), r)).collect();
    left.iter()
        .map(|l| merge(l, index.get(&left_key(l)).copied()))
        .collect()
}

/// Inner join: only left items with a matching right item
pub fn inner_join<'s, L, R, K, O>(
    left: &'s [L],
    right: &'s [R],
    left_key: impl Fn(&'s L) -> K,
    right_key: impl Fn(&'s R) -> K,
    merge: impl Fn(&'s L, &'s R) -> O,
) -> Vec<O>
where
    K: Eq + Hash,
{
    let index: HashMap<K, &'s R> = right.iter().map(|r| (right_key(r), r)).collect();
    left.iter()
        .filter_map(|l| index.get(&left_key(l)).map(|r| merge(l, r)))
        .collect()
}

/// Attach `user`'s ratings to catalog rows, keeping rows without one
pub fn with_ratings(entries: &[CatalogEntry], ratings: &[RatingRow], user: &str) -> Vec<RatedEntry> {
    left_join(
        entries,
        ratings,
        |e| OverlayKey { hash: &e.hash, user },
        |r| OverlayKey { hash: &r.hash, user: &r.user },
        |e, r| RatedEntry {
            entry: e.clone(),
            rating: r.map(|r| r.rating),
        },
    )
}

/// Catalog rows `user` has rated, in rating order of `ratings`
pub fn rated_entries(ratings: &[RatingRow], entries: &[CatalogEntry], user: &str) -> Vec<RatedEntry> {
    inner_join(
        ratings,
        entries,
        |r| OverlayKey { hash: &r.hash, user: &r.user },
        |e| OverlayKey { hash: &e.hash, user },
        |r, e| RatedEntry {
            entry: e.clone(),
            rating: Some(r.rating),
        },
    )
}
