//! Fixture data and cleanup.
//!
//! Every entity a test creates in the shared environment is recorded in a
//! [`CleanupRegistry`]. Tests that delete their own fixtures call
//! [`CleanupRegistry::forget`]; whatever remains is deleted in reverse
//! creation order by a [`Cleaner`], mirroring teardown after setup.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::result::{E2eError, E2eResult};

const WORDS: &[&str] = &[
    "crack", "seepage", "rebar", "slab", "column", "facade", "drainage", "spalling", "survey",
    "stockpile", "boundary", "scaffold", "roof", "trench", "culvert", "retaining", "wall", "grade",
];

/// Generator for unique, human-readable fixture values
#[derive(Debug)]
pub struct FakeData {
    rng: StdRng,
}

impl Default for FakeData {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeData {
    /// Entropy-seeded generator
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn token(&mut self) -> String {
        let bytes: [u8; 4] = self.rng.gen();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// `"{prefix} {MMDD-HHMM} {token}"`, unique per run
    pub fn unique_name(&mut self, prefix: &str) -> String {
        format!(
            "{prefix} {} {}",
            Utc::now().format("%m%d-%H%M"),
            self.token()
        )
    }

    /// Address on the test mail domain
    pub fn email(&mut self, domain: &str) -> String {
        format!("qa+{}@{domain}", uuid::Uuid::new_v4().simple())
    }

    /// Floor altitude in metres, one decimal
    pub fn altitude(&mut self) -> f64 {
        (self.rng.gen_range(0.0..120.0_f64) * 10.0).round() / 10.0
    }

    /// A point within `radius_deg` of `(lat, lon)`
    pub fn coordinate_near(&mut self, lat: f64, lon: f64, radius_deg: f64) -> (f64, f64) {
        let radius = radius_deg.abs().max(f64::EPSILON);
        (
            lat + self.rng.gen_range(-radius..radius),
            lon + self.rng.gen_range(-radius..radius),
        )
    }

    /// A short lowercase phrase for descriptions
    pub fn sentence(&mut self, words: usize) -> String {
        (0..words.max(1))
            .map(|_| WORDS[self.rng.gen_range(0..WORDS.len())])
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Kind of entity created in the shared environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Measurement group (folder)
    MeasurementGroup,
    /// Nested group
    SubGroup,
    /// Single measurement
    MeasurementItem,
    /// Indoor floor
    Floor,
    /// Invited organization member
    InvitedUser,
    /// Issue
    Issue,
    /// Video link
    VideoLink,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MeasurementGroup => "measurement group",
            Self::SubGroup => "sub-group",
            Self::MeasurementItem => "measurement item",
            Self::Floor => "floor",
            Self::InvitedUser => "invited user",
            Self::Issue => "issue",
            Self::VideoLink => "video link",
        };
        f.write_str(name)
    }
}

/// A created entity awaiting cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Kind
    pub kind: EntityKind,
    /// Backend identifier
    pub id: String,
    /// Display name, for logs
    pub label: String,
}

/// Deletes one tracked entity
#[async_trait]
pub trait Cleaner: Send + Sync {
    /// Delete the entity
    async fn delete(&self, entity: &TrackedEntity) -> E2eResult<()>;
}

/// Outcome of a cleanup run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Entities deleted
    pub deleted: Vec<TrackedEntity>,
    /// Entities whose deletion failed, with the error text
    pub failed: Vec<(TrackedEntity, String)>,
}

/// Ordered record of created entities
#[derive(Debug, Default, Clone)]
pub struct CleanupRegistry {
    entities: Vec<TrackedEntity>,
}

impl CleanupRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a created entity
    pub fn track(&mut self, kind: EntityKind, id: impl Into<String>, label: impl Into<String>) {
        let entity = TrackedEntity {
            kind,
            id: id.into(),
            label: label.into(),
        };
        tracing::debug!(kind = %entity.kind, id = %entity.id, "tracking fixture");
        self.entities.push(entity);
    }

    /// Stop tracking an entity the test deleted itself
    pub fn forget(&mut self, kind: EntityKind, id: &str) -> bool {
        let before = self.entities.len();
        self.entities.retain(|e| !(e.kind == kind && e.id == id));
        before != self.entities.len()
    }

    /// Tracked entities in creation order
    #[must_use]
    pub fn entities(&self) -> &[TrackedEntity] {
        &self.entities
    }

    /// Number of tracked entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether nothing is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Delete everything in reverse creation order
    ///
    /// Every entity is attempted and the registry is left empty either way.
    /// On failure the error is [`E2eError::Cleanup`], carrying the full
    /// report so what was left behind can still be listed.
    pub async fn run(&mut self, cleaner: &dyn Cleaner) -> E2eResult<CleanupReport> {
        let mut report = CleanupReport::default();
        let mut first: Option<String> = None;
        for entity in self.entities.drain(..).rev() {
            match cleaner.delete(&entity).await {
                Ok(()) => {
                    tracing::info!(kind = %entity.kind, label = %entity.label, "deleted fixture");
                    report.deleted.push(entity);
                }
                Err(e) => {
                    tracing::warn!(kind = %entity.kind, label = %entity.label, error = %e, "fixture cleanup failed");
                    if first.is_none() {
                        first = Some(format!("{} '{}': {e}", entity.kind, entity.label));
                    }
                    report.failed.push((entity, e.to_string()));
                }
            }
        }
        let Some(first) = first else {
            return Ok(report);
        };
        let left: Vec<String> = report
            .failed
            .iter()
            .map(|(e, _)| format!("{} {} '{}'", e.kind, e.id, e.label))
            .collect();
        tracing::warn!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            left_behind = ?left,
            "fixture cleanup incomplete"
        );
        Err(E2eError::Cleanup { first, report })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCleaner {
        seen: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Cleaner for RecordingCleaner {
        async fn delete(&self, entity: &TrackedEntity) -> E2eResult<()> {
            self.seen.lock().unwrap().push(entity.id.clone());
            if self.fail_on.as_deref() == Some(entity.id.as_str()) {
                return Err(E2eError::HttpStatus {
                    status: 500,
                    url: "https://api.example.test".into(),
                    body: "boom".into(),
                });
            }
            Ok(())
        }
    }

    mod fake_data_tests {
        use super::*;

        #[test]
        fn test_unique_names_differ() {
            let mut fake = FakeData::seeded(7);
            let a = fake.unique_name("E2E Floor");
            let b = fake.unique_name("E2E Floor");
            assert!(a.starts_with("E2E Floor "));
            assert_ne!(a, b);
        }

        #[test]
        fn test_email_uses_domain() {
            let mut fake = FakeData::new();
            let email = fake.email("example.test");
            assert!(email.starts_with("qa+"));
            assert!(email.ends_with("@example.test"));
        }

        #[test]
        fn test_altitude_has_one_decimal() {
            let mut fake = FakeData::seeded(1);
            for _ in 0..50 {
                let alt = fake.altitude();
                assert!((0.0..=120.0).contains(&alt));
                assert!(((alt * 10.0).round() - alt * 10.0).abs() < 1e-9);
            }
        }

        #[test]
        fn test_coordinate_near_stays_in_radius() {
            let mut fake = FakeData::seeded(3);
            let (lat, lon) = fake.coordinate_near(1.35, 103.8, 0.01);
            assert!((lat - 1.35).abs() <= 0.01);
            assert!((lon - 103.8).abs() <= 0.01);
        }

        #[test]
        fn test_sentence_word_count() {
            let mut fake = FakeData::seeded(9);
            assert_eq!(fake.sentence(4).split(' ').count(), 4);
        }
    }

    mod registry_tests {
        use super::*;

        fn registry() -> CleanupRegistry {
            let mut registry = CleanupRegistry::new();
            registry.track(EntityKind::MeasurementGroup, "g1", "Group A");
            registry.track(EntityKind::SubGroup, "s1", "Sub A");
            registry.track(EntityKind::Floor, "f1", "Level 9");
            registry
        }

        #[tokio::test]
        async fn test_reverse_creation_order() {
            let cleaner = RecordingCleaner::default();
            let mut registry = registry();
            let report = registry.run(&cleaner).await.unwrap();
            assert_eq!(*cleaner.seen.lock().unwrap(), vec!["f1", "s1", "g1"]);
            assert_eq!(report.deleted.len(), 3);
            assert!(registry.is_empty());
        }

        #[tokio::test]
        async fn test_forget_skips_entity() {
            let cleaner = RecordingCleaner::default();
            let mut registry = registry();
            assert!(registry.forget(EntityKind::SubGroup, "s1"));
            assert!(!registry.forget(EntityKind::Floor, "s1"));
            registry.run(&cleaner).await.unwrap();
            assert_eq!(*cleaner.seen.lock().unwrap(), vec!["f1", "g1"]);
        }

        #[tokio::test]
        async fn test_failure_attempts_rest_and_reports_first() {
            let cleaner = RecordingCleaner {
                fail_on: Some("s1".into()),
                ..RecordingCleaner::default()
            };
            let mut registry = registry();
            let err = registry.run(&cleaner).await.unwrap_err();
            assert!(err.to_string().contains("sub-group 'Sub A'"));
            assert!(err.to_string().contains("1 of 3 entities"));
            assert_eq!(cleaner.seen.lock().unwrap().len(), 3);
            assert!(registry.is_empty());
        }

        #[tokio::test]
        async fn test_failure_keeps_report() {
            let cleaner = RecordingCleaner {
                fail_on: Some("f1".into()),
                ..RecordingCleaner::default()
            };
            let mut registry = registry();
            match registry.run(&cleaner).await.unwrap_err() {
                E2eError::Cleanup { report, .. } => {
                    let deleted: Vec<&str> = report.deleted.iter().map(|e| e.id.as_str()).collect();
                    assert_eq!(deleted, vec!["s1", "g1"]);
                    assert_eq!(report.failed.len(), 1);
                    assert_eq!(report.failed[0].0.label, "Level 9");
                    assert!(report.failed[0].1.contains("boom"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
