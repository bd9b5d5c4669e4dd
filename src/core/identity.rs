//! De-identified ID assignment
//!
//! A record that already carries a `rid` keeps it forever. Otherwise a new
//! identifier is drawn as the site prefix plus a random upper-case
//! alphanumeric suffix and redrawn until it is absent from the working set,
//! which starts out as every identifier already stored in the registry.

use crate::config::SiteConfig;
use crate::core::matching::RegistrySnapshot;
use crate::domain::consent::ConsentRecord;
use crate::domain::ids::WbhiId;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};

/// Characters a generated suffix is drawn from
pub const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Identifiers in use during this run
#[derive(Debug, Clone, Default)]
pub struct WorkingIdSet {
    ids: HashSet<WbhiId>,
}

impl WorkingIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the set with every identifier stored in the registry
    pub fn from_snapshot(snapshot: &RegistrySnapshot) -> Self {
        Self {
            ids: snapshot.existing_ids().collect(),
        }
    }

    pub fn contains(&self, id: &WbhiId) -> bool {
        self.ids.contains(id)
    }

    /// Returns `false` if the identifier was already present
    pub fn insert(&mut self, id: WbhiId) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Identifiers staged for records that have not been imported yet
///
/// Keyed by snapshot index. Later sessions in the same batch that match an
/// already-staged record reuse its identifier instead of drawing a new one.
#[derive(Debug, Clone, Default)]
pub struct PendingAssignments {
    by_record: BTreeMap<usize, WbhiId>,
}

impl PendingAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier already staged for any of `records`
    pub fn lookup(&self, records: &[usize]) -> Option<&WbhiId> {
        records.iter().find_map(|idx| self.by_record.get(idx))
    }

    /// Stages `id` for every record in `records`
    pub fn stage(&mut self, records: &[usize], id: &WbhiId) {
        for &idx in records {
            self.by_record.insert(idx, id.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.by_record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_record.is_empty()
    }

    /// Staged records with their `rid` filled in, ready for import
    pub fn records_for_import(&self, snapshot: &RegistrySnapshot) -> Vec<ConsentRecord> {
        self.by_record
            .iter()
            .filter_map(|(&idx, id)| {
                snapshot.record(idx).map(|record| {
                    let mut record = record.clone();
                    record.set_rid(id);
                    record
                })
            })
            .collect()
    }

    /// Writes the staged identifiers into the snapshot after a successful import
    pub fn commit(self, snapshot: &mut RegistrySnapshot) {
        for (idx, id) in self.by_record {
            snapshot.set_rid(idx, &id);
        }
    }
}

/// Generates or recovers identifiers
#[derive(Debug, Clone)]
pub struct IdentityGenerator {
    suffix_length: usize,
}

impl IdentityGenerator {
    pub fn new(suffix_length: usize) -> Self {
        Self { suffix_length }
    }

    /// Returns the identifier for a set of matching records
    ///
    /// The first non-blank `rid` among `matches` wins and the working set is
    /// left untouched. Otherwise a fresh identifier is generated, inserted
    /// into `working` and returned.
    pub fn assign_id<R: Rng + ?Sized>(
        &self,
        matches: &[&ConsentRecord],
        site: &SiteConfig,
        working: &mut WorkingIdSet,
        rng: &mut R,
    ) -> WbhiId {
        if let Some(existing) = matches.iter().find_map(|record| record.rid()) {
            return existing;
        }

        loop {
            let candidate = WbhiId::from_parts(site.prefix, &self.random_suffix(rng));
            if working.insert(candidate.clone()) {
                return candidate;
            }
            tracing::debug!(candidate = %candidate, "Generated identifier collides, redrawing");
        }
    }

    /// Identifier for a match within a registry batch
    ///
    /// Stored `rid`s come first, then identifiers staged earlier in the same
    /// batch, then a fresh one. The result is staged for every matched record.
    pub fn assign_for_batch<R: Rng + ?Sized>(
        &self,
        matched: &[usize],
        snapshot: &RegistrySnapshot,
        pending: &mut PendingAssignments,
        site: &SiteConfig,
        working: &mut WorkingIdSet,
        rng: &mut R,
    ) -> WbhiId {
        let records: Vec<&ConsentRecord> =
            matched.iter().filter_map(|&idx| snapshot.record(idx)).collect();

        let id = if records.iter().any(|r| r.rid().is_some()) {
            self.assign_id(&records, site, working, rng)
        } else if let Some(staged) = pending.lookup(matched) {
            staged.clone()
        } else {
            self.assign_id(&records, site, working, rng)
        };

        pending.stage(matched, &id);
        id
    }

    fn random_suffix<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        (0..self.suffix_length)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect()
    }
}
