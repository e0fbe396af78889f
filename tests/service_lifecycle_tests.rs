//! Service creation, lifecycle transitions, messaging, and table surfaces.

mod common;

use common::*;
use netmux_core::driver::mock::SendKind;
use netmux_core::{
    LifecycleState, NetmuxError, Opcode, PacketPart, RuntimeConfig, SendOptions, ServiceKind,
};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn service_names_must_be_unique_and_non_empty() {
    let ctx = test_context();

    let err = ctx.directory.create_service("", ServiceKind::Normal).unwrap_err();
    assert!(matches!(err, NetmuxError::EmptyServiceName));

    ctx.directory.create_service("alpha", ServiceKind::Normal).unwrap();
    let err = ctx
        .directory
        .create_service("alpha", ServiceKind::Raw)
        .unwrap_err();
    assert!(matches!(err, NetmuxError::DuplicateServiceName { .. }));
}

#[test]
fn service_count_limit_is_enforced() {
    let config = RuntimeConfig {
        max_services: 2,
        ..RuntimeConfig::default()
    };
    let ctx = test_context_with(config);

    ctx.directory.create_service("one", ServiceKind::Normal).unwrap();
    ctx.directory.create_service("two", ServiceKind::Normal).unwrap();
    let err = ctx
        .directory
        .create_service("three", ServiceKind::Normal)
        .unwrap_err();
    assert!(matches!(err, NetmuxError::ServiceCountLimit { limit: 2 }));
}

#[test]
fn lifecycle_transitions_and_guards() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();
    assert_eq!(svc.state(), LifecycleState::Created);

    svc.start().unwrap();
    assert_eq!(svc.state(), LifecycleState::Started);
    assert!(matches!(
        svc.start().unwrap_err(),
        NetmuxError::ServiceAlreadyStarted { .. }
    ));

    svc.stop().unwrap();
    assert_eq!(svc.state(), LifecycleState::Terminating);
    // Stop of a non-started service is a no-op.
    svc.stop().unwrap();
    assert!(matches!(
        svc.start().unwrap_err(),
        NetmuxError::ServiceTerminating { .. }
    ));

    // Outside a scheduling run, remove() drains the teardown immediately.
    ctx.directory.remove("alpha").unwrap();
    assert_eq!(svc.state(), LifecycleState::Terminated);
    assert!(ctx.directory.get("alpha").is_none());
    assert_eq!(ctx.engine.driver("alpha").unwrap().stop_count(), 1);
}

#[test]
fn terminated_services_can_restart_and_rebind() {
    let ctx = test_context();
    let subject = HandlerSubject::new();
    ctx.registry.describe(&subject).handles([Opcode(4)]).unwrap();

    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();
    svc.start().unwrap();
    assert!(svc.has_handler(Opcode(4)));

    svc.stop().unwrap();
    ctx.directory.remove("alpha").unwrap();
    assert_eq!(svc.state(), LifecycleState::Terminated);
    // Termination cleared the live tables.
    assert!(!svc.has_handler(Opcode(4)));

    svc.start().unwrap();
    assert_eq!(svc.state(), LifecycleState::Started);
    assert!(svc.has_handler(Opcode(4)));
    assert!(ctx.directory.get("alpha").is_some());
    assert_eq!(ctx.engine.driver("alpha").unwrap().start_count(), 2);
}

#[test]
fn remove_of_unknown_service_errors() {
    let ctx = test_context();
    assert!(matches!(
        ctx.directory.remove("ghost").unwrap_err(),
        NetmuxError::UnknownService { .. }
    ));
}

#[test]
fn fps_is_validated_and_refreshes_the_frame_interval() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();
    assert_eq!(svc.fps(), 60);

    svc.set_fps(50).unwrap();
    assert_eq!(svc.fps(), 50);
    assert_eq!(svc.frame_interval(), Duration::from_millis(20));

    assert!(matches!(
        svc.set_fps(0).unwrap_err(),
        NetmuxError::FpsOutOfRange { .. }
    ));
    assert!(matches!(
        svc.set_fps(100_000).unwrap_err(),
        NetmuxError::FpsOutOfRange { .. }
    ));
    assert_eq!(svc.fps(), 50);
}

#[test]
fn send_resolves_opcodes_through_the_encoder_table() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();
    svc.register_encoder::<ChatLine>(Opcode(30)).unwrap();

    svc.send(7, &ChatLine("hello".into())).unwrap();

    let sent = ctx.engine.driver("alpha").unwrap().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, SendKind::Unicast(7));
    assert_eq!(sent[0].opcode, Opcode(30));
    assert_eq!(&sent[0].payload[..], b"hello");
}

#[test]
fn send_without_an_encoder_is_a_caller_error() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();

    let err = svc.send(7, &ChatLine("hello".into())).unwrap_err();
    assert!(matches!(err, NetmuxError::MissingEncoder { .. }));
    assert!(ctx.engine.driver("alpha").unwrap().sent().is_empty());
}

#[test]
fn explicit_opcodes_bypass_encoder_resolution() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();

    svc.send_with(
        7,
        &ChatLine("ping".into()),
        SendOptions::default().with_opcode(Opcode(42)).with_status(3),
    )
    .unwrap();

    let sent = ctx.engine.driver("alpha").unwrap().sent();
    assert_eq!(sent[0].opcode, Opcode(42));
    assert_eq!(sent[0].status, 3);
}

#[test]
fn raw_services_send_with_opcode_zero() {
    let ctx = test_context();
    let svc = ctx.directory.create_service("raw", ServiceKind::Raw).unwrap();

    svc.send(9, &ChatLine("bytes".into())).unwrap();
    assert_eq!(ctx.engine.driver("raw").unwrap().sent()[0].opcode, Opcode::RAW);
}

#[test]
fn multicast_and_broadcast_carry_parts() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();
    svc.register_encoder::<ChatLine>(Opcode(30)).unwrap();

    let parts = vec![PacketPart::new(1, &b"extra"[..])];
    svc.multicast(
        &[1, 2, 3],
        &ChatLine("all".into()),
        SendOptions::default().with_parts(parts.clone()),
    )
    .unwrap();
    svc.broadcast(&ChatLine("everyone".into()), SendOptions::default())
        .unwrap();

    let sent = ctx.engine.driver("alpha").unwrap().sent();
    assert_eq!(sent[0].kind, SendKind::Multicast(vec![1, 2, 3]));
    assert_eq!(sent[0].parts.len(), 1);
    assert_eq!(sent[1].kind, SendKind::Broadcast);
}

#[test]
fn duplicate_subscriptions_are_conflicts() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();

    let handler = || {
        Arc::new(CountingHandler {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        })
    };
    svc.subscribe(Opcode(1), handler()).unwrap();
    assert!(matches!(
        svc.subscribe(Opcode(1), handler()).unwrap_err(),
        NetmuxError::DuplicateSubscription { .. }
    ));

    // Pre-subscriptions keep their own table.
    svc.pre_subscribe(Opcode(1), handler()).unwrap();
    assert!(matches!(
        svc.pre_subscribe(Opcode(1), handler()).unwrap_err(),
        NetmuxError::DuplicateSubscription { .. }
    ));

    svc.unify_pre_subscribe(handler()).unwrap();
    assert!(matches!(
        svc.unify_pre_subscribe(handler()).unwrap_err(),
        NetmuxError::DuplicateUnifyPreHandler { .. }
    ));
}

#[test]
fn duplicate_encoders_and_facades_are_conflicts() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();

    svc.register_encoder::<ChatLine>(Opcode(1)).unwrap();
    assert!(matches!(
        svc.register_encoder::<ChatLine>(Opcode(2)).unwrap_err(),
        NetmuxError::DuplicateEncoder { .. }
    ));

    svc.register_facade(ProbeFacade::default()).unwrap();
    assert!(matches!(
        svc.register_facade(ProbeFacade::default()).unwrap_err(),
        NetmuxError::DuplicateFacade { .. }
    ));
    assert_eq!(svc.facade_count(), 1);
}

#[test]
fn session_operations_delegate_to_the_driver() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();
    let addr = "127.0.0.1:9000".parse().unwrap();

    let listener = svc.listen(addr).unwrap();
    let session = svc.connect(addr).unwrap();
    assert_ne!(listener, session);
    svc.async_connect(addr).unwrap();
    svc.remove_session(session).unwrap();

    assert_eq!(
        ctx.engine.driver("alpha").unwrap().removed_sessions(),
        vec![session]
    );
}

#[test]
fn driver_is_destroyed_exactly_once_on_drop() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();
    let driver = ctx.engine.driver("alpha").unwrap();

    ctx.directory.remove("alpha").unwrap();
    assert!(!driver.is_destroyed());

    drop(svc);
    assert!(driver.is_destroyed());
}

#[test]
fn codec_strategy_round_trips_through_the_driver() {
    let ctx = test_context();
    let svc = ctx
        .directory
        .create_service("alpha", ServiceKind::Normal)
        .unwrap();

    assert_eq!(svc.codec(), netmux_core::CodecStrategy::Binary);
    svc.set_codec(netmux_core::CodecStrategy::Json).unwrap();
    assert_eq!(svc.codec(), netmux_core::CodecStrategy::Json);
}
