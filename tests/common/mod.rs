//! Shared helpers for the integration suites: an isolated directory wired
//! to the mock engine, plus reusable registration subjects.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use netmux_core::driver::mock::MockEngine;
use netmux_core::{
    CodecError, CoderSpec, Decodable, Encodable, ExceptionHandler, Facade, FacadeInstance,
    FailureContext, FrameExceptionHandler, Opcode, Packet, PacketHandler, Registrant,
    RegistrationRegistry, RuntimeConfig, Service, ServiceDirectory,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct TestContext {
    pub engine: Arc<MockEngine>,
    pub registry: Arc<RegistrationRegistry>,
    pub directory: Arc<ServiceDirectory>,
}

/// Fresh directory with an isolated registry and the default configuration.
pub fn test_context() -> TestContext {
    test_context_with(RuntimeConfig::default())
}

pub fn test_context_with(config: RuntimeConfig) -> TestContext {
    let engine = MockEngine::new();
    let registry = Arc::new(RegistrationRegistry::new());
    let directory = ServiceDirectory::configured(engine.clone(), registry.clone(), config);
    TestContext {
        engine,
        registry,
        directory,
    }
}

/// Packet handler counting invocations, optionally failing every time.
pub struct CountingHandler {
    pub calls: Arc<AtomicUsize>,
    pub fail: bool,
}

impl PacketHandler for CountingHandler {
    fn handle(&self, packet: &Packet) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("handler failed for opcode {}", packet.opcode);
        }
        Ok(())
    }
}

/// Registration subject producing [`CountingHandler`] instances.
pub struct HandlerSubject {
    pub instances_created: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
    pub fail: bool,
}

impl HandlerSubject {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            instances_created: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            instances_created: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        })
    }
}

impl Registrant for HandlerSubject {
    fn create_packet_handler(&self) -> Option<Arc<dyn PacketHandler>> {
        self.instances_created.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(CountingHandler {
            calls: self.calls.clone(),
            fail: self.fail,
        }))
    }
}

/// Exception handler recording the opcodes it saw.
pub struct RecordingExcHandler {
    pub seen: Arc<Mutex<Vec<Opcode>>>,
}

impl ExceptionHandler for RecordingExcHandler {
    fn handle_error(&self, packet: &Packet, _ctx: &FailureContext, _error: &anyhow::Error) {
        self.seen.lock().unwrap().push(packet.opcode);
    }
}

/// Registration subject producing [`RecordingExcHandler`] instances.
pub struct ExcSubject {
    pub seen: Arc<Mutex<Vec<Opcode>>>,
}

impl ExcSubject {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

impl Registrant for ExcSubject {
    fn create_exception_handler(&self) -> Option<Arc<dyn ExceptionHandler>> {
        Some(Arc::new(RecordingExcHandler {
            seen: self.seen.clone(),
        }))
    }
}

/// Registration subject for the process-wide frame exception handler.
pub struct FrameExcSubject {
    pub instances_created: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<Option<String>>>>,
}

impl FrameExcSubject {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            instances_created: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

impl Registrant for FrameExcSubject {
    fn create_frame_exception_handler(&self) -> Option<Arc<dyn FrameExceptionHandler>> {
        self.instances_created.fetch_add(1, Ordering::SeqCst);
        let seen = self.seen.clone();
        Some(Arc::new(
            move |service: Option<&Arc<Service>>, _ctx: &FailureContext, _error: &anyhow::Error| {
                seen.lock()
                    .unwrap()
                    .push(service.map(|svc| svc.name().to_string()));
            },
        ))
    }
}

/// Facade counting lifecycle callbacks.
#[derive(Default)]
pub struct ProbeFacade {
    pub initialized: AtomicUsize,
}

impl Facade for ProbeFacade {
    fn on_initialize(&self, _ev: &netmux_core::service::facade::ServiceEvent) {
        self.initialized.fetch_add(1, Ordering::SeqCst);
    }
}

/// Registration subject auto-instantiating [`ProbeFacade`]s.
pub struct FacadeSubject;

impl Registrant for FacadeSubject {
    fn create_facade(&self) -> Option<FacadeInstance> {
        Some(FacadeInstance::new(ProbeFacade::default()))
    }
}

/// Simple length-prefixed text payload used as a coder in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine(pub String);

impl Encodable for ChatLine {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.extend_from_slice(self.0.as_bytes());
        Ok(())
    }
}

impl Decodable for ChatLine {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError> {
        Ok(ChatLine(String::from_utf8_lossy(buf).into_owned()))
    }
}

/// Registration subject declaring [`ChatLine`] as a coder.
pub struct ChatCoder;

impl Registrant for ChatCoder {
    fn coder_spec(&self) -> Option<CoderSpec> {
        Some(CoderSpec::of::<ChatLine>())
    }
}
