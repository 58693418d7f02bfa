use crate::domain::interval::intersects;
use crate::domain::models::{ShiftOwner, ShiftRecord};
use crate::error::ConflictPair;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct OverlapCandidate {
    pub owner: ShiftOwner,
    pub shift: ShiftRecord,
    pub overlap_acceptable: bool,
}

impl OverlapCandidate {
    pub fn new(owner: ShiftOwner, shift: ShiftRecord, overlap_acceptable: bool) -> Self {
        Self {
            owner,
            shift,
            overlap_acceptable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSource {
    Existing,
    Batch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlapPair {
    pub owner: ShiftOwner,
    pub proposed: ShiftRecord,
    pub other: ShiftRecord,
    pub source: PairSource,
}

impl OverlapPair {
    pub fn conflict(&self) -> ConflictPair {
        ConflictPair {
            proposed_id: self.proposed.id.clone(),
            existing_id: self.other.id.clone(),
        }
    }

    pub fn key(&self) -> (String, String) {
        unordered_key(&self.proposed.id, &self.other.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlapReport {
    pub unacceptable: Vec<OverlapPair>,
    pub acceptable: Vec<OverlapPair>,
}

impl OverlapReport {
    pub fn is_clear(&self) -> bool {
        self.unacceptable.is_empty()
    }

    pub fn unacceptable_conflicts(&self) -> Vec<ConflictPair> {
        self.unacceptable.iter().map(OverlapPair::conflict).collect()
    }
}

pub fn detect_overlaps(
    proposed: &[OverlapCandidate],
    existing: &[OverlapCandidate],
) -> OverlapReport {
    let proposed_ids = proposed
        .iter()
        .map(|candidate| candidate.shift.id.as_str())
        .collect::<HashSet<_>>();
    let existing = existing
        .iter()
        .filter(|candidate| {
            candidate.shift.is_live() && !proposed_ids.contains(candidate.shift.id.as_str())
        })
        .collect::<Vec<_>>();

    let mut report = OverlapReport::default();
    let mut seen = HashSet::new();

    for (index, candidate) in proposed.iter().enumerate() {
        if !candidate.shift.is_live() {
            continue;
        }
        let period = candidate.shift.period();

        let persisted = existing
            .iter()
            .copied()
            .map(|other| (other, PairSource::Existing));
        let batch = proposed[..index]
            .iter()
            .filter(|other| other.shift.is_live())
            .map(|other| (other, PairSource::Batch));

        for (other, source) in persisted.chain(batch) {
            if other.owner != candidate.owner || other.shift.id == candidate.shift.id {
                continue;
            }
            if !intersects(&period, &other.shift.period()) {
                continue;
            }
            if !seen.insert(unordered_key(&candidate.shift.id, &other.shift.id)) {
                continue;
            }
            let pair = OverlapPair {
                owner: candidate.owner.clone(),
                proposed: candidate.shift.clone(),
                other: other.shift.clone(),
                source,
            };
            if candidate.overlap_acceptable && other.overlap_acceptable {
                report.acceptable.push(pair);
            } else {
                report.unacceptable.push(pair);
            }
        }
    }

    report
}

fn unordered_key(left: &str, right: &str) -> (String, String) {
    if left <= right {
        (left.to_string(), right.to_string())
    } else {
        (right.to_string(), left.to_string())
    }
}
