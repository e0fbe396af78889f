//! # Registration Registry
//!
//! Process-wide index of registration records, partitioned into records
//! bound to named services and records that apply to every service. The
//! registry accumulates declarations as they are made and replays them onto
//! each service when it starts: the per-instance pass binds handlers,
//! coders, and facades; the class-level pass installs frame-exception
//! handlers on the directory, guarded to run at most once per registry.
//!
//! A process-global instance is available through [`RegistrationRegistry::global`];
//! independent instances can be built for isolation (tests, embedded runtimes).
//! Registration is expected to happen before scheduling starts; mutating the
//! registry from another thread while a scheduler runs is unsupported.

use crate::error::Result;
use crate::registry::builder::RegistrationBuilder;
use crate::registry::record::{RegistrationRecord, RegistrationRole, SubjectId};
use crate::registry::registrant::Registrant;
use crate::service::core::Service;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::directory::ServiceDirectory;

static GLOBAL_REGISTRY: OnceLock<Arc<RegistrationRegistry>> = OnceLock::new();

#[derive(Default)]
struct Partitions {
    bound: HashMap<String, HashSet<SubjectId>>,
    unbound: HashSet<SubjectId>,
}

/// Snapshot of registry occupancy.
#[derive(Debug, Clone, Default)]
pub struct RegistrationStats {
    pub total_records: usize,
    pub unbound_records: usize,
    pub bound_partitions: usize,
}

/// Partitioned index of registration records.
#[derive(Default)]
pub struct RegistrationRegistry {
    records: DashMap<SubjectId, Arc<RwLock<RegistrationRecord>>>,
    partitions: RwLock<Partitions>,
    class_level_resolved: AtomicBool,
}

impl RegistrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry instance.
    pub fn global() -> Arc<RegistrationRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(RegistrationRegistry::new()))
            .clone()
    }

    /// Begin (or extend) the registration of a subject.
    ///
    /// The registry keys the subject by allocation identity and keeps only a
    /// weak reference to it; repeated `describe` calls for the same `Arc`
    /// extend the same record.
    pub fn describe<S: Registrant>(&self, subject: &Arc<S>) -> RegistrationBuilder<'_> {
        let subject: Arc<dyn Registrant> = subject.clone();
        RegistrationBuilder::new(self, subject, std::any::type_name::<S>().to_string())
    }

    pub(crate) fn extract_or_create(
        &self,
        subject: &Arc<dyn Registrant>,
        subject_name: &str,
        role: RegistrationRole,
    ) -> Result<Arc<RwLock<RegistrationRecord>>> {
        let id = SubjectId::of(subject);
        let record = self
            .records
            .entry(id)
            .or_insert_with(|| {
                Arc::new(RwLock::new(RegistrationRecord::new(
                    Arc::downgrade(subject),
                    id,
                    subject_name.to_string(),
                )))
            })
            .clone();
        record.write().assume_role(role)?;
        Ok(record)
    }

    /// Re-index a record into the bound/unbound partitions.
    ///
    /// Idempotent: every declaration re-triggers it. A record with target
    /// services lives exactly under those names; a record without lives only
    /// in the unbound partition.
    pub(crate) fn reindex(&self, id: SubjectId, targets: &BTreeSet<String>) {
        let mut partitions = self.partitions.write();
        if targets.is_empty() {
            for members in partitions.bound.values_mut() {
                members.remove(&id);
            }
            partitions.unbound.insert(id);
        } else {
            partitions.unbound.remove(&id);
            for (name, members) in partitions.bound.iter_mut() {
                if !targets.contains(name) {
                    members.remove(&id);
                }
            }
            for name in targets {
                partitions.bound.entry(name.clone()).or_default().insert(id);
            }
        }
    }

    /// Per-instance binding pass for a starting service: records bound to
    /// its name plus all unbound records.
    pub(crate) fn apply_to_service(&self, service: &Service) -> Result<()> {
        let ids: Vec<SubjectId> = {
            let partitions = self.partitions.read();
            let mut ids: Vec<SubjectId> = partitions
                .bound
                .get(service.name())
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default();
            ids.extend(partitions.unbound.iter().copied());
            ids
        };

        debug!(
            service = service.name(),
            records = ids.len(),
            "Applying registrations to starting service"
        );
        for id in ids {
            let record = self.records.get(&id).map(|entry| entry.value().clone());
            if let Some(record) = record {
                record.read().apply_to(service)?;
            }
        }
        Ok(())
    }

    /// Class-level binding pass, applied at most once per registry.
    pub(crate) fn apply_class_level(&self, directory: &ServiceDirectory) -> Result<()> {
        if self.class_level_resolved.load(Ordering::SeqCst) {
            return Ok(());
        }
        let records: Vec<Arc<RwLock<RegistrationRecord>>> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        for record in records {
            record.read().apply_class_level(directory)?;
        }
        self.class_level_resolved.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn class_level_resolved(&self) -> bool {
        self.class_level_resolved.load(Ordering::SeqCst)
    }

    pub fn contains(&self, id: SubjectId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn record_role(&self, id: SubjectId) -> Option<RegistrationRole> {
        self.records.get(&id).map(|entry| entry.value().read().role())
    }

    pub fn is_unbound(&self, id: SubjectId) -> bool {
        self.partitions.read().unbound.contains(&id)
    }

    pub fn is_bound_to(&self, service: &str, id: SubjectId) -> bool {
        self.partitions
            .read()
            .bound
            .get(service)
            .is_some_and(|members| members.contains(&id))
    }

    pub fn stats(&self) -> RegistrationStats {
        let partitions = self.partitions.read();
        RegistrationStats {
            total_records: self.records.len(),
            unbound_records: partitions.unbound.len(),
            bound_partitions: partitions
                .bound
                .values()
                .filter(|members| !members.is_empty())
                .count(),
        }
    }
}
