use serde::{Serialize, Serializer};
use strum::IntoEnumIterator;

use crate::track::models::{VoteCategory, VoteModel};

const CATEGORY_COUNT: usize = 5;

/// Categories tied for the highest vote count
///
/// Stored as a bit set over the five categories; iteration follows the
/// category order from very_good to very_bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MajoritySet {
    bits: u8,
}

impl MajoritySet {
    pub fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn of(categories: &[VoteCategory]) -> Self {
        categories.iter().fold(Self::empty(), |mut set, category| {
            set.insert(*category);
            set
        })
    }

    pub fn insert(&mut self, category: VoteCategory) {
        self.bits |= 1 << category.index();
    }

    pub fn contains(&self, category: VoteCategory) -> bool {
        self.bits & (1 << category.index()) != 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn is_tie(&self) -> bool {
        self.len() > 1
    }

    pub fn iter(&self) -> impl Iterator<Item = VoteCategory> + '_ {
        VoteCategory::iter().filter(move |category| self.contains(*category))
    }

    /// Mean point value of the members; 0 for an empty set
    pub fn mean_points(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let total: f64 = self.iter().map(VoteCategory::points).sum();
        total / self.len() as f64
    }

    /// True when every member is bad or very_bad
    pub fn is_all_negative(&self) -> bool {
        !self.is_empty() && self.iter().all(VoteCategory::is_negative)
    }
}

impl Serialize for MajoritySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Vote counts for one song, one slot per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoteTally {
    counts: [u32; CATEGORY_COUNT],
}

impl VoteTally {
    pub fn from_categories(categories: impl IntoIterator<Item = VoteCategory>) -> Self {
        let mut tally = Self::default();
        for category in categories {
            tally.record(category);
        }
        tally
    }

    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a VoteModel>) -> Self {
        Self::from_categories(votes.into_iter().map(|vote| vote.category))
    }

    pub fn record(&mut self, category: VoteCategory) {
        self.counts[category.index()] += 1;
    }

    pub fn count(&self, category: VoteCategory) -> u32 {
        self.counts[category.index()]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Every category whose count equals the maximum count
    ///
    /// With no votes at all every category ties at zero.
    pub fn majority(&self) -> MajoritySet {
        let max = self.counts.iter().copied().max().unwrap_or_default();
        let mut set = MajoritySet::empty();
        for category in VoteCategory::iter() {
            if self.count(category) == max {
                set.insert(category);
            }
        }
        set
    }
}

impl Serialize for VoteTally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            VoteCategory::iter().map(|category| (category.as_ref().to_string(), self.count(category))),
        )
    }
}
