//! # Service Directory & Scheduler
//!
//! The process-wide home of live services and the cooperative loop that
//! drives them. Services are kept in insertion order, which is the
//! scheduling order; lookup is by explicit name through [`ServiceDirectory::get`].
//!
//! ## Scheduling
//!
//! `schedule()` runs ticks until descheduled or an unhandled frame error
//! escapes. Each tick walks a start-of-tick snapshot of the live sequence,
//! steps every started service whose frame interval has elapsed (stamping
//! the time sampled before the step, so drift stays bounded to one frame),
//! advances the engine timers once, then drains the pending-removal queue.
//! Stopping a service mid-tick only queues it; the live sequence is never
//! structurally mutated while a tick iterates it. If the tick finished
//! faster than the global maximum rate allows, the loop suspends for the
//! remainder.
//!
//! Frame failures route to the single frame exception handler when one is
//! installed; otherwise they abort the loop after the end-of-tick teardown,
//! leaving the scheduler state reset so a fresh `schedule()` call works.
//!
//! Directory mutation from outside the scheduling thread while a scheduler
//! runs is unsupported.

use crate::config::RuntimeConfig;
use crate::driver::NetworkEngine;
use crate::error::{NetmuxError, Result};
use crate::registry::registration_registry::RegistrationRegistry;
use crate::service::core::{Service, ServiceKind};
use crate::service::handler::{FailureContext, FrameExceptionHandler};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

enum TickOutcome {
    Continue,
    Descheduled,
}

/// Process-wide directory of live services plus the cooperative scheduler.
pub struct ServiceDirectory {
    engine: Arc<dyn NetworkEngine>,
    registry: Arc<RegistrationRegistry>,
    config: RuntimeConfig,
    services: RwLock<Vec<Arc<Service>>>,
    services_by_name: RwLock<HashMap<String, Arc<Service>>>,
    pending_removal: Mutex<Vec<Arc<Service>>>,
    scheduling: AtomicBool,
    deschedule_pending: AtomicBool,
    frame_exc_handler: RwLock<Option<Arc<dyn FrameExceptionHandler>>>,
    weak_self: Weak<ServiceDirectory>,
}

impl ServiceDirectory {
    /// Directory wired to the process-global registration registry and the
    /// default runtime configuration.
    pub fn new(engine: Arc<dyn NetworkEngine>) -> Arc<Self> {
        Self::configured(engine, RegistrationRegistry::global(), RuntimeConfig::default())
    }

    /// Directory with an explicit registry and configuration. Isolated
    /// registries keep independent runtimes (and tests) from seeing each
    /// other's registrations.
    pub fn configured(
        engine: Arc<dyn NetworkEngine>,
        registry: Arc<RegistrationRegistry>,
        config: RuntimeConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            engine,
            registry,
            config,
            services: RwLock::new(Vec::new()),
            services_by_name: RwLock::new(HashMap::new()),
            pending_removal: Mutex::new(Vec::new()),
            scheduling: AtomicBool::new(false),
            deschedule_pending: AtomicBool::new(false),
            frame_exc_handler: RwLock::new(None),
            weak_self: weak_self.clone(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RegistrationRegistry> {
        &self.registry
    }

    /// Create a service and register it under its unique, non-empty name.
    pub fn create_service(&self, name: impl Into<String>, kind: ServiceKind) -> Result<Arc<Service>> {
        let name = name.into();
        if name.is_empty() {
            return Err(NetmuxError::EmptyServiceName);
        }
        if self.services.read().len() >= self.config.max_services {
            return Err(NetmuxError::ServiceCountLimit {
                limit: self.config.max_services,
            });
        }
        if self.get(&name).is_some() {
            return Err(NetmuxError::DuplicateServiceName { name });
        }

        let driver = self
            .engine
            .create_driver(&name, kind)
            .map_err(NetmuxError::Engine)?;
        let this = self.weak_self.upgrade().ok_or(NetmuxError::DirectoryGone)?;
        let service = Service::new(&this, name, kind, driver, &self.config);
        self.add_service(service.clone())?;
        info!(service = service.name(), kind = %kind, "Service created");
        Ok(service)
    }

    fn add_service(&self, service: Arc<Service>) -> Result<()> {
        let mut services = self.services.write();
        let mut by_name = self.services_by_name.write();
        if by_name.contains_key(service.name()) {
            return Err(NetmuxError::DuplicateServiceName {
                name: service.name().to_string(),
            });
        }
        by_name.insert(service.name().to_string(), service.clone());
        services.push(service);
        Ok(())
    }

    /// Re-register a service that start() found missing from the directory
    /// (it was removed after a previous termination).
    pub(crate) fn readd_if_absent(&self, service: &Arc<Service>) -> Result<()> {
        let present = self
            .services
            .read()
            .iter()
            .any(|candidate| Arc::ptr_eq(candidate, service));
        if present {
            return Ok(());
        }
        self.add_service(service.clone())
    }

    /// Look up a live service by name.
    pub fn get(&self, name: &str) -> Option<Arc<Service>> {
        self.services_by_name.read().get(name).cloned()
    }

    /// Snapshot of the live services in scheduling order.
    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services.read().clone()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services
            .read()
            .iter()
            .map(|service| service.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Remove a service from the directory.
    ///
    /// A started service is stopped first; teardown is queued either way
    /// and drained immediately when no scheduler is running, otherwise at
    /// the running scheduler's end-of-tick drain.
    pub fn remove(&self, name: &str) -> Result<()> {
        let service = self.get(name).ok_or_else(|| NetmuxError::UnknownService {
            name: name.to_string(),
        })?;
        if service.is_started() {
            service.stop()?;
        } else {
            self.queue_removal(&service);
        }
        if !self.is_scheduling() {
            self.drain_pending_removals();
        }
        Ok(())
    }

    pub(crate) fn queue_removal(&self, service: &Arc<Service>) {
        let mut pending = self.pending_removal.lock();
        if !pending.iter().any(|queued| Arc::ptr_eq(queued, service)) {
            pending.push(service.clone());
        }
    }

    pub(crate) fn apply_registrations(&self, service: &Arc<Service>) -> Result<()> {
        self.registry.apply_to_service(service)?;
        self.registry.apply_class_level(self)?;
        Ok(())
    }

    /// Install or clear the process-wide frame exception handler.
    pub fn set_frame_exception_handler(&self, handler: Option<Arc<dyn FrameExceptionHandler>>) {
        *self.frame_exc_handler.write() = handler;
    }

    pub fn has_frame_exception_handler(&self) -> bool {
        self.frame_exc_handler.read().is_some()
    }

    pub fn is_scheduling(&self) -> bool {
        self.scheduling.load(Ordering::SeqCst)
    }

    /// Run the cooperative scheduling loop until descheduled or an
    /// unhandled frame error escapes.
    ///
    /// Only one loop may run at a time; calling `schedule()` while one is
    /// running is a configuration error and leaves the running loop
    /// untouched.
    pub async fn schedule(&self) -> Result<()> {
        if self.scheduling.swap(true, Ordering::SeqCst) {
            return Err(NetmuxError::AlreadyScheduling);
        }

        info!(services = self.len(), "Scheduler starting");
        self.engine.install_error_hook();
        let result = self.schedule_loop().await;
        self.engine.uninstall_error_hook();
        self.deschedule_pending.store(false, Ordering::SeqCst);
        self.scheduling.store(false, Ordering::SeqCst);

        match &result {
            Ok(()) => info!("Scheduler descheduled"),
            Err(error) => warn!(error = %error, "Scheduler aborted by unhandled error"),
        }
        result
    }

    /// Request cooperative loop exit. Idempotent; a no-op when no loop is
    /// running.
    pub fn deschedule(&self) {
        if !self.is_scheduling() {
            return;
        }
        self.deschedule_pending.store(true, Ordering::SeqCst);
    }

    async fn schedule_loop(&self) -> Result<()> {
        self.drain_pending_removals();
        let tick_interval = self.config.tick_interval();

        loop {
            let tick_started = Instant::now();
            let outcome = self.run_tick().await;
            // The drain runs exactly once per tick, whatever the outcome.
            self.drain_pending_removals();
            match outcome? {
                TickOutcome::Descheduled => return Ok(()),
                TickOutcome::Continue => {}
            }

            let elapsed = tick_started.elapsed();
            if let Some(remaining) = tick_interval.checked_sub(elapsed) {
                sleep(remaining).await;
            }
        }
    }

    async fn run_tick(&self) -> Result<TickOutcome> {
        // Start-of-tick snapshot: the live sequence is never structurally
        // mutated while this iteration runs; stop() only queues.
        let services = self.services();
        for service in &services {
            if !service.is_started() {
                continue;
            }

            let frame_started = Instant::now();
            if service.frame_due(frame_started) {
                let step_result = service.step().await;
                // Stamp the time sampled before the step: per-service drift
                // stays bounded to one frame.
                service.mark_scheduled(frame_started);
                if let Err(error) = step_result {
                    let ctx = FailureContext::frame(Some(service.name().to_string()));
                    self.route_frame_error(Some(service), &ctx, error)?;
                }
            }

            if self.consume_pending_deschedule() {
                return Ok(TickOutcome::Descheduled);
            }
        }

        if let Err(error) = self.engine.advance_timers() {
            let ctx = FailureContext::timer();
            self.route_frame_error(None, &ctx, error)?;
        }
        if self.consume_pending_deschedule() {
            return Ok(TickOutcome::Descheduled);
        }
        Ok(TickOutcome::Continue)
    }

    fn route_frame_error(
        &self,
        service: Option<&Arc<Service>>,
        ctx: &FailureContext,
        error: anyhow::Error,
    ) -> Result<()> {
        let handler = self.frame_exc_handler.read().clone();
        match handler {
            Some(handler) => {
                warn!(
                    service = service.map(|s| s.name()).unwrap_or("<none>"),
                    error = %error,
                    "Frame error routed to frame exception handler"
                );
                handler.handle_frame_error(service, ctx, &error);
                Ok(())
            }
            None => Err(NetmuxError::UnhandledFrameError(error)),
        }
    }

    fn consume_pending_deschedule(&self) -> bool {
        self.deschedule_pending.swap(false, Ordering::SeqCst)
    }

    fn drain_pending_removals(&self) {
        loop {
            let drained: Vec<Arc<Service>> = std::mem::take(&mut *self.pending_removal.lock());
            if drained.is_empty() {
                return;
            }
            for service in drained {
                if service.is_started() {
                    if let Err(error) = service.stop() {
                        warn!(
                            service = service.name(),
                            error = %error,
                            "Engine stop failed during teardown"
                        );
                    }
                }
                service.finish_termination();
                self.remove_service(&service);
            }
        }
    }

    fn remove_service(&self, service: &Arc<Service>) {
        let mut services = self.services.write();
        let mut by_name = self.services_by_name.write();
        services.retain(|candidate| !Arc::ptr_eq(candidate, service));
        if by_name
            .get(service.name())
            .is_some_and(|candidate| Arc::ptr_eq(candidate, service))
        {
            by_name.remove(service.name());
        }
        debug!(service = service.name(), "Service removed from directory");
    }
}

impl std::fmt::Debug for ServiceDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDirectory")
            .field("services", &self.service_names())
            .field("scheduling", &self.is_scheduling())
            .finish()
    }
}
