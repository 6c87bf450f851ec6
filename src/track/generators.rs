use rand::Rng;

use super::models::{MAX_TRACK_ID, MIN_TRACK_ID};

/// Source of candidate track ids
pub trait TrackIdGenerator: Send + Sync {
    fn generate(&self) -> i64;
}

/// Uniformly random six-digit PIN
pub struct RandomTrackIdGenerator;

impl RandomTrackIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomTrackIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackIdGenerator for RandomTrackIdGenerator {
    fn generate(&self) -> i64 {
        rand::rng().random_range(MIN_TRACK_ID..=MAX_TRACK_ID)
    }
}

/// Trait for generating DJ display names
pub trait DjNameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Pet name-based DJ name generator
pub struct PetNameDjNameGenerator;

impl PetNameDjNameGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PetNameDjNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DjNameGenerator for PetNameDjNameGenerator {
    fn generate(&self) -> String {
        petname::Petnames::default().generate_one(2, "-")
    }
}
