use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    BTreeMap,
    HashSet,
};

use super::AnalysedRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BucketName {
    All,
    Failed,
    Aligned,
    Misaligned,
    NonNpom,
    AllNpoms,
    Singles,
    Doubles,
    WeirdPeakers,
    NonWeirdPeakers,
    Ideal,
    Perfect,
}

impl BucketName {
    pub const ALL: [BucketName; 12] = [
        BucketName::All,
        BucketName::Failed,
        BucketName::Aligned,
        BucketName::Misaligned,
        BucketName::NonNpom,
        BucketName::AllNpoms,
        BucketName::Singles,
        BucketName::Doubles,
        BucketName::WeirdPeakers,
        BucketName::NonWeirdPeakers,
        BucketName::Ideal,
        BucketName::Perfect,
    ];

    /// Buckets made of NPoMs only; these get histograms.
    pub const NPOM_SUBSETS: [BucketName; 7] = [
        BucketName::AllNpoms,
        BucketName::Singles,
        BucketName::Doubles,
        BucketName::WeirdPeakers,
        BucketName::NonWeirdPeakers,
        BucketName::Ideal,
        BucketName::Perfect,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BucketName::All => "All",
            BucketName::Failed => "Failed",
            BucketName::Aligned => "Aligned",
            BucketName::Misaligned => "Misaligned",
            BucketName::NonNpom => "Non-NPoM",
            BucketName::AllNpoms => "All NPoMs",
            BucketName::Singles => "Singles",
            BucketName::Doubles => "Doubles",
            BucketName::WeirdPeakers => "Weird Peakers",
            BucketName::NonWeirdPeakers => "Non-Weird-Peakers",
            BucketName::Ideal => "Ideal NPoMs",
            BucketName::Perfect => "Perfect NPoMs",
        }
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Named, possibly overlapping subsets of a batch, stored as record indices
/// in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buckets {
    members: BTreeMap<BucketName, Vec<usize>>,
}

impl Buckets {
    pub fn new() -> Self {
        let members = BucketName::ALL.iter().map(|b| (*b, Vec::new())).collect();
        Self { members }
    }

    /// Routes every record into the buckets it belongs to.
    ///
    /// `records[i].index` must be `i`; indices in `misaligned` refer to the
    /// same positions.
    pub fn route(records: &[AnalysedRecord], misaligned: &[usize]) -> Self {
        let misaligned: HashSet<usize> = misaligned.iter().copied().collect();
        let mut out = Self::new();
        for rec in records {
            out.insert(rec, misaligned.contains(&rec.index));
        }
        out
    }

    fn insert(&mut self, rec: &AnalysedRecord, misaligned: bool) {
        let i = rec.index;
        self.push(BucketName::All, i);
        self.push(
            if misaligned {
                BucketName::Misaligned
            } else {
                BucketName::Aligned
            },
            i,
        );

        if rec.is_failed() {
            self.push(BucketName::Failed, i);
            return;
        }
        if !rec.is_npom {
            self.push(BucketName::NonNpom, i);
            return;
        }

        self.push(BucketName::AllNpoms, i);
        let double = rec.is_double_peak == Some(true);
        let weird = rec.has_weird_peak == Some(true);
        self.push(
            if double {
                BucketName::Doubles
            } else {
                BucketName::Singles
            },
            i,
        );
        self.push(
            if weird {
                BucketName::WeirdPeakers
            } else {
                BucketName::NonWeirdPeakers
            },
            i,
        );
        if !double && !weird {
            self.push(BucketName::Ideal, i);
            if !misaligned {
                self.push(BucketName::Perfect, i);
            }
        }
    }

    fn push(&mut self, bucket: BucketName, index: usize) {
        self.members.entry(bucket).or_default().push(index);
    }

    pub fn get(&self, bucket: BucketName) -> &[usize] {
        self.members
            .get(&bucket)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len_of(&self, bucket: BucketName) -> usize {
        self.get(bucket).len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BucketName, &[usize])> {
        self.members.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}
