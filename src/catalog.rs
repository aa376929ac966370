//! Exercise catalog seam
//!
//! Replacement-exercise lookup needs to know which muscle group an
//! exercise trains. The catalog itself is an external collaborator; the
//! engine depends only on the narrow [`ExerciseCatalog`] trait, and the
//! seeded [`StaticCatalog`] covers the common barbell/dumbbell movements
//! for deployments without a remote catalog.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::MuscleGroup;

/// Muscle-group lookup used for substitution matching
pub trait ExerciseCatalog {
    /// Primary muscle group of an exercise, if known
    fn muscle_group(&self, exercise: &str) -> Option<MuscleGroup>;

    /// All known exercises training a muscle group, in catalog order
    fn exercises_for(&self, group: MuscleGroup) -> Vec<String>;
}

/// In-memory catalog seeded with common strength movements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticCatalog {
    entries: BTreeMap<String, MuscleGroup>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        StaticCatalog {
            entries: BTreeMap::new(),
        }
    }

    /// Catalog with the default movement set
    pub fn seeded() -> Self {
        let mut catalog = Self::new();
        for (name, group) in [
            ("squat", MuscleGroup::Quadriceps),
            ("front squat", MuscleGroup::Quadriceps),
            ("lunges", MuscleGroup::Quadriceps),
            ("leg press", MuscleGroup::Quadriceps),
            ("leg extension", MuscleGroup::Quadriceps),
            ("deadlift", MuscleGroup::Hamstrings),
            ("romanian deadlift", MuscleGroup::Hamstrings),
            ("leg curl", MuscleGroup::Hamstrings),
            ("good morning", MuscleGroup::Hamstrings),
            ("hip thrust", MuscleGroup::Glutes),
            ("glute bridge", MuscleGroup::Glutes),
            ("bench press", MuscleGroup::Chest),
            ("incline press", MuscleGroup::Chest),
            ("push-up", MuscleGroup::Chest),
            ("chest fly", MuscleGroup::Chest),
            ("barbell row", MuscleGroup::Back),
            ("lat pulldown", MuscleGroup::Back),
            ("pull-up", MuscleGroup::Back),
            ("seated row", MuscleGroup::Back),
            ("overhead press", MuscleGroup::Shoulders),
            ("lateral raise", MuscleGroup::Shoulders),
            ("face pull", MuscleGroup::Shoulders),
            ("barbell curl", MuscleGroup::Biceps),
            ("hammer curl", MuscleGroup::Biceps),
            ("triceps pushdown", MuscleGroup::Triceps),
            ("dips", MuscleGroup::Triceps),
            ("standing calf raise", MuscleGroup::Calves),
            ("seated calf raise", MuscleGroup::Calves),
            ("plank", MuscleGroup::Core),
            ("hanging leg raise", MuscleGroup::Core),
        ] {
            catalog.entries.insert(name.to_string(), group);
        }
        catalog
    }

    /// Add or replace a catalog entry
    pub fn with_exercise(mut self, name: impl Into<String>, group: MuscleGroup) -> Self {
        self.entries.insert(name.into(), group);
        self
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::seeded()
    }
}

impl ExerciseCatalog for StaticCatalog {
    fn muscle_group(&self, exercise: &str) -> Option<MuscleGroup> {
        self.entries.get(exercise).copied()
    }

    fn exercises_for(&self, group: MuscleGroup) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, g)| **g == group)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_lookup() {
        let catalog = StaticCatalog::seeded();
        assert_eq!(catalog.muscle_group("squat"), Some(MuscleGroup::Quadriceps));
        assert_eq!(catalog.muscle_group("lunges"), Some(MuscleGroup::Quadriceps));
        assert_eq!(catalog.muscle_group("unknown movement"), None);
    }

    #[test]
    fn test_group_listing() {
        let catalog = StaticCatalog::seeded();
        let quads = catalog.exercises_for(MuscleGroup::Quadriceps);
        assert!(quads.contains(&"squat".to_string()));
        assert!(quads.contains(&"leg press".to_string()));
        assert!(!quads.contains(&"deadlift".to_string()));
    }

    #[test]
    fn test_override_entry() {
        let catalog = StaticCatalog::new().with_exercise("sled push", MuscleGroup::Quadriceps);
        assert_eq!(
            catalog.muscle_group("sled push"),
            Some(MuscleGroup::Quadriceps)
        );
    }
}
