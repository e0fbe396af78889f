//! Registration declaration and start-time binding.

mod common;

use common::*;
use netmux_core::{NetmuxError, Opcode, Registrant, ServiceKind};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test]
fn unbound_records_apply_to_every_service() {
    let ctx = test_context();
    let subject = HandlerSubject::new();
    ctx.registry
        .describe(&subject)
        .handles([Opcode(10), Opcode(11)])
        .unwrap();
    let created_by_declaration = subject.instances_created.load(Ordering::SeqCst);

    let alpha = ctx.directory.create_service("alpha", ServiceKind::Normal).unwrap();
    let beta = ctx.directory.create_service("beta", ServiceKind::Normal).unwrap();
    alpha.start().unwrap();
    beta.start().unwrap();

    for name in ["alpha", "beta"] {
        let driver = ctx.engine.driver(name).unwrap();
        assert_eq!(driver.subscribed_opcodes(), vec![Opcode(10), Opcode(11)]);
    }
    // One handler instance per opcode per service.
    assert_eq!(
        subject.instances_created.load(Ordering::SeqCst) - created_by_declaration,
        4
    );
}

#[test]
fn bound_records_skip_other_services() {
    let ctx = test_context();
    let bound = HandlerSubject::new();
    let unbound = HandlerSubject::new();
    ctx.registry
        .describe(&bound)
        .handles([Opcode(1)])
        .unwrap()
        .bind_to(["gateway"])
        .unwrap();
    ctx.registry.describe(&unbound).handles([Opcode(2)]).unwrap();

    let gateway = ctx.directory.create_service("gateway", ServiceKind::Normal).unwrap();
    let lobby = ctx.directory.create_service("lobby", ServiceKind::Normal).unwrap();
    gateway.start().unwrap();
    lobby.start().unwrap();

    // The gateway sees the union of its bound records and the unbound ones.
    assert_eq!(
        ctx.engine.driver("gateway").unwrap().subscribed_opcodes(),
        vec![Opcode(1), Opcode(2)]
    );
    // The lobby sees only the unbound record; the bound one is a silent no-op.
    assert_eq!(
        ctx.engine.driver("lobby").unwrap().subscribed_opcodes(),
        vec![Opcode(2)]
    );
}

#[test]
fn bind_to_moves_record_between_partitions() {
    let ctx = test_context();
    let subject = HandlerSubject::new();

    let id = ctx
        .registry
        .describe(&subject)
        .handles([Opcode(5)])
        .unwrap()
        .subject_id();
    assert!(ctx.registry.is_unbound(id));
    assert!(!ctx.registry.is_bound_to("gateway", id));

    ctx.registry
        .describe(&subject)
        .bind_to(["gateway", "lobby"])
        .unwrap();
    assert!(!ctx.registry.is_unbound(id));
    assert!(ctx.registry.is_bound_to("gateway", id));
    assert!(ctx.registry.is_bound_to("lobby", id));
    assert!(!ctx.registry.is_bound_to("other", id));
}

#[test]
fn expired_subjects_contribute_nothing() {
    let ctx = test_context();
    let subject = HandlerSubject::new();
    ctx.registry.describe(&subject).handles([Opcode(7)]).unwrap();
    drop(subject);

    let svc = ctx.directory.create_service("alpha", ServiceKind::Normal).unwrap();
    svc.start().unwrap();

    assert!(ctx.engine.driver("alpha").unwrap().subscribed_opcodes().is_empty());
    assert!(svc.is_started());
}

#[test]
fn coder_records_bind_encoders_and_decoders_on_normal_services() {
    let ctx = test_context();
    let coder = Arc::new(ChatCoder);
    ctx.registry
        .describe(&coder)
        .encodes(Opcode(20))
        .unwrap()
        .decodes([Opcode(20), Opcode(21)])
        .unwrap();

    let normal = ctx.directory.create_service("normal", ServiceKind::Normal).unwrap();
    let raw = ctx.directory.create_service("raw", ServiceKind::Raw).unwrap();
    normal.start().unwrap();
    raw.start().unwrap();

    assert_eq!(
        ctx.engine.driver("normal").unwrap().decoder_opcodes(),
        vec![Opcode(20), Opcode(21)]
    );
    // Sending without an explicit opcode resolves through the bound encoder.
    normal.send(1, &ChatLine("hi".into())).unwrap();
    assert_eq!(ctx.engine.driver("normal").unwrap().sent()[0].opcode, Opcode(20));

    // Raw services skip coder binding entirely.
    assert!(ctx.engine.driver("raw").unwrap().decoder_opcodes().is_empty());
}

#[test]
fn facade_records_auto_instantiate_per_service() {
    let ctx = test_context();
    let subject = Arc::new(FacadeSubject);
    ctx.registry.describe(&subject).as_facade().unwrap();

    let alpha = ctx.directory.create_service("alpha", ServiceKind::Normal).unwrap();
    let beta = ctx.directory.create_service("beta", ServiceKind::Normal).unwrap();
    alpha.start().unwrap();
    beta.start().unwrap();

    let on_alpha = alpha.facade::<ProbeFacade>().unwrap();
    let on_beta = beta.facade::<ProbeFacade>().unwrap();
    assert!(!Arc::ptr_eq(&on_alpha, &on_beta));
    assert_eq!(ctx.engine.driver("alpha").unwrap().facade_count(), 1);
}

#[test]
fn facade_flag_is_independent_of_role() {
    let ctx = test_context();

    struct HandlerWithFacade;
    impl Registrant for HandlerWithFacade {
        fn create_packet_handler(&self) -> Option<Arc<dyn netmux_core::PacketHandler>> {
            Some(Arc::new(|_packet: &netmux_core::Packet| -> anyhow::Result<()> {
                Ok(())
            }))
        }
        fn create_facade(&self) -> Option<netmux_core::FacadeInstance> {
            Some(netmux_core::FacadeInstance::new(ProbeFacade::default()))
        }
    }

    let subject = Arc::new(HandlerWithFacade);
    ctx.registry
        .describe(&subject)
        .handles([Opcode(3)])
        .unwrap()
        .as_facade()
        .unwrap();

    let svc = ctx.directory.create_service("alpha", ServiceKind::Normal).unwrap();
    svc.start().unwrap();

    assert!(svc.has_handler(Opcode(3)));
    assert!(svc.facade::<ProbeFacade>().is_some());
}

#[test]
fn class_level_pass_applies_once() {
    let ctx = test_context();
    let frame_subject = FrameExcSubject::new();
    ctx.registry
        .describe(&frame_subject)
        .handles_frame_exceptions()
        .unwrap();
    let created_by_declaration = frame_subject.instances_created.load(Ordering::SeqCst);

    let alpha = ctx.directory.create_service("alpha", ServiceKind::Normal).unwrap();
    let beta = ctx.directory.create_service("beta", ServiceKind::Normal).unwrap();
    alpha.start().unwrap();
    beta.start().unwrap();

    assert!(ctx.directory.has_frame_exception_handler());
    assert!(ctx.registry.class_level_resolved());
    // The second start must not re-run the class-level pass.
    assert_eq!(
        frame_subject.instances_created.load(Ordering::SeqCst) - created_by_declaration,
        1
    );
}

#[test]
fn second_unify_pre_handler_is_rejected_at_start() {
    let ctx = test_context();
    let first = HandlerSubject::new();
    let second = HandlerSubject::new();
    ctx.registry.describe(&first).unify_pre_handles().unwrap();
    ctx.registry.describe(&second).unify_pre_handles().unwrap();

    let svc = ctx.directory.create_service("alpha", ServiceKind::Normal).unwrap();
    let err = svc.start().unwrap_err();
    assert!(matches!(err, NetmuxError::DuplicateUnifyPreHandler { .. }));
}

#[test]
fn exception_handler_records_bind_into_slots() {
    let ctx = test_context();
    let per_opcode = ExcSubject::new();
    let by_default = ExcSubject::new();
    ctx.registry
        .describe(&per_opcode)
        .handles_exceptions([Opcode(9)])
        .unwrap();
    ctx.registry
        .describe(&by_default)
        .handles_exceptions_by_default()
        .unwrap();

    let svc = ctx.directory.create_service("alpha", ServiceKind::Normal).unwrap();
    svc.start().unwrap();

    assert!(svc
        .exception_handler_for(netmux_core::HandlerRole::Subscribe, Opcode(9))
        .is_some());
    // Unknown opcode falls back to the default handler.
    assert!(svc
        .exception_handler_for(netmux_core::HandlerRole::Subscribe, Opcode(99))
        .is_some());
    // The pre-subscribe tables are untouched.
    assert!(svc
        .exception_handler_for(netmux_core::HandlerRole::PreSubscribe, Opcode(9))
        .is_none());
}
