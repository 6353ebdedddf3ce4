use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::db::models::{Answer, Grade, Submission};

/// The identifying tuple of an entity that is stable across backends.
pub trait BusinessKey {
    type Key: Ord + Copy + Debug;

    fn business_key(&self) -> Self::Key;
}

impl BusinessKey for Submission {
    type Key = (i64, i64);

    fn business_key(&self) -> Self::Key {
        (self.quiz_id, self.user_id)
    }
}

impl BusinessKey for Answer {
    type Key = i64;

    fn business_key(&self) -> Self::Key {
        self.question_id
    }
}

impl BusinessKey for Grade {
    type Key = i64;

    fn business_key(&self) -> Self::Key {
        self.question_id
    }
}

/// Outcome of looking a record up by business key in the other backend.
#[derive(Debug, PartialEq)]
pub enum Counterpart<'a, T> {
    Missing,
    Unique(&'a T),
    /// More than one record carries the key; holds the number of matches.
    Ambiguous(usize),
}

#[derive(Debug, PartialEq)]
pub struct Pairing<'a, 'b, A, B> {
    pub source: &'a A,
    pub target: Counterpart<'b, B>,
}

pub fn match_one<T: BusinessKey>(candidates: &[T], key: T::Key) -> Counterpart<'_, T> {
    let mut matches = candidates.iter().filter(|candidate| candidate.business_key() == key);

    match (matches.next(), matches.next()) {
        (None, _) => Counterpart::Missing,
        (Some(only), None) => Counterpart::Unique(only),
        (Some(_), Some(_)) => Counterpart::Ambiguous(2 + matches.count()),
    }
}

/// Pairs every source record with its counterpart among `target`.
///
/// When the source itself repeats a key, the last occurrence is kept: it is
/// the most recent write.
pub fn pair_by_key<'a, 'b, A, B, K>(
    source: &'a [A],
    target: &'b [B],
) -> BTreeMap<K, Pairing<'a, 'b, A, B>>
where
    A: BusinessKey<Key = K>,
    B: BusinessKey<Key = K>,
    K: Ord + Copy + Debug,
{
    let mut by_key: BTreeMap<K, Vec<&'b B>> = BTreeMap::new();
    for record in target {
        by_key.entry(record.business_key()).or_default().push(record);
    }

    let mut pairs = BTreeMap::new();
    for record in source {
        let key = record.business_key();
        let counterpart = match by_key.get(&key).map(Vec::as_slice) {
            None | Some([]) => Counterpart::Missing,
            Some([only]) => Counterpart::Unique(*only),
            Some(many) => Counterpart::Ambiguous(many.len()),
        };
        pairs.insert(key, Pairing { source: record, target: counterpart });
    }

    pairs
}
