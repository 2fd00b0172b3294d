mod common;

use {
    common::{config, Backend, Device, BACKEND, BACKEND_DOMAIN, FRONTEND, NAME},
    std::time::Duration,
    xenbus::{mock::Operation, suspend::SuspendInterface},
    xenvkbd::{Error, FrontendState, Pdo},
};

const STATES: [FrontendState; 6] = [
    FrontendState::Unknown,
    FrontendState::Closing,
    FrontendState::Closed,
    FrontendState::Prepared,
    FrontendState::Connected,
    FrontendState::Enabled,
];

fn drive(pdo: &Pdo, state: FrontendState) {
    let frontend = pdo.frontend();

    // CLOSING is only ever entered on the way down from CONNECTED
    if state == FrontendState::Closing {
        frontend.set_state(FrontendState::Connected).unwrap();
    }

    frontend.set_state(state).unwrap();
    assert_eq!(frontend.state(), state);
}

#[test]
fn every_state_reaches_every_target() {
    let backend = Backend::new();
    let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
    let frontend = pdo.frontend();

    for &from in STATES.iter() {
        for &to in STATES.iter() {
            drive(&pdo, from);

            frontend.set_state(to).unwrap();

            let state = frontend.state();
            let expected = match (from, to) {
                (FrontendState::Closing, _)
                | (FrontendState::Connected, _)
                | (FrontendState::Enabled, _) => to,
                (_, FrontendState::Closing) => FrontendState::Closed,
                _ => to,
            };
            assert_eq!(state, expected, "{} -> {}", from, to);
            assert!(state.rank() <= to.rank());

            // the ring is only released on the way out of CLOSING
            let connected = matches!(
                state,
                FrontendState::Closing | FrontendState::Connected | FrontendState::Enabled
            );
            assert_eq!(frontend.ring().is_connected(), connected, "{} -> {}", from, to);
        }
    }

    frontend.set_state(FrontendState::Unknown).unwrap();
    assert_eq!(backend.gnttab.grants(), 0);
    assert_eq!(backend.evtchn.open_ports(), 0);
    assert_eq!(backend.store.watches(), 0);

    pdo.destroy();
}

#[test]
fn same_state_is_a_no_op() {
    let backend = Backend::new();
    let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
    let frontend = pdo.frontend();

    frontend.set_state(FrontendState::Unknown).unwrap();
    assert_eq!(frontend.state(), FrontendState::Unknown);
    assert_eq!(backend.frontend_node("state"), None);

    frontend.set_state(FrontendState::Connected).unwrap();
    let gref = backend.gref();
    let commits = backend.store.commits();

    frontend.set_state(FrontendState::Connected).unwrap();
    assert_eq!(frontend.state(), FrontendState::Connected);
    assert_eq!(backend.gref(), gref);
    assert_eq!(backend.store.commits(), commits);

    frontend.set_state(FrontendState::Unknown).unwrap();
    pdo.destroy();
}

#[test]
fn connect_publishes_the_ring() {
    let backend = Backend::new();
    let device = Device::start(&backend);
    let frontend = device.pdo.frontend().clone();

    assert_eq!(frontend.state(), FrontendState::Enabled);
    assert_eq!(frontend.backend_path().as_deref(), Some(BACKEND));
    assert_eq!(frontend.backend_domain(), BACKEND_DOMAIN);
    assert!(frontend.ring().is_enabled());

    assert_eq!(backend.frontend_node("state").as_deref(), Some("4"));
    assert_eq!(backend.backend_state().as_deref(), Some("4"));

    let gref = backend.gref();
    assert!(backend.gnttab.is_granted(gref));
    assert!(backend.gnttab.map(gref, BACKEND_DOMAIN).unwrap().writable());

    let port = backend.port();
    assert!(backend.evtchn.is_open(port));
    assert_eq!(backend.evtchn.remote_domain(port), Some(BACKEND_DOMAIN));
    assert_eq!(backend.evtchn.is_masked(port), Some(false));

    assert!(backend.frontend_node("page-ref").is_some());
    assert_eq!(backend.frontend_node("request-abs-pointer").as_deref(), Some("1"));
    assert_eq!(backend.frontend_node("request-raw-pointer").as_deref(), Some("1"));

    device.stop();

    assert_eq!(frontend.state(), FrontendState::Unknown);
    assert!(!backend.gnttab.is_granted(gref));
    assert!(!backend.evtchn.is_open(port));
}

#[test]
fn suspend_releases_ring_and_resume_stops_at_closed() {
    let backend = Backend::new();
    let device = Device::start(&backend);
    let frontend = device.pdo.frontend().clone();

    let gref = backend.gref();
    let port = backend.port();

    device.pdo.suspend();

    assert_eq!(frontend.state(), FrontendState::Unknown);
    assert_eq!(frontend.backend_path(), None);
    assert!(!frontend.ring().is_connected());
    assert!(!backend.gnttab.is_granted(gref));
    assert!(!backend.evtchn.is_open(port));
    assert_eq!(backend.gnttab.caches(), 0);
    assert_eq!(backend.gnttab.references(), 0);
    assert_eq!(backend.evtchn.references(), 0);

    device.pdo.resume().unwrap();

    assert_eq!(frontend.state(), FrontendState::Closed);
    assert!(!frontend.ring().is_connected());
    assert_eq!(backend.gnttab.grants(), 0);
    assert_eq!(backend.backend_state().as_deref(), Some("6"));

    device.stop();

    assert_eq!(backend.suspend.callbacks(), 0);
    assert_eq!(backend.suspend.references(), 0);
}

#[test]
fn domain_resume_reconnects_from_scratch() {
    let backend = Backend::new();
    let device = Device::start(&backend);
    let frontend = device.pdo.frontend().clone();

    let gref = backend.gref();
    assert_eq!(backend.suspend.callbacks(), 3);

    backend.suspend.trigger();

    assert_eq!(backend.suspend.count(), 1);
    assert_eq!(frontend.state(), FrontendState::Closed);
    assert!(frontend.is_online());
    assert!(!frontend.ring().is_connected());
    assert!(!backend.gnttab.is_granted(gref));
    assert!(backend.bus.ejects().is_empty());

    device.stop();
}

#[test]
fn unresponsive_backend_times_out() {
    let backend = Backend::silent(
        config()
            .with_backend_timeout(Duration::from_millis(50))
            .with_watch_poll(5, Duration::from_millis(1)),
    );
    let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
    let frontend = pdo.frontend();

    assert_eq!(frontend.set_state(FrontendState::Closed), Err(Error::Timeout));
    assert_eq!(frontend.state(), FrontendState::Unknown);
    assert_eq!(backend.frontend_node("state").as_deref(), Some("5"));
    assert!(backend.store.polls() > 0);
    assert_eq!(backend.store.watches(), 0);

    pdo.destroy();
}

#[test]
fn failed_prepare_falls_back_to_closed() {
    let backend = Backend::silent(
        config()
            .with_backend_timeout(Duration::from_millis(100))
            .with_watch_poll(5, Duration::from_millis(1)),
    );
    // never leaves CLOSED for INITWAIT
    backend.answer(&[("5", "5"), ("6", "6")]);

    let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
    let frontend = pdo.frontend();

    frontend.set_state(FrontendState::Closed).unwrap();

    assert_eq!(frontend.set_state(FrontendState::Enabled), Err(Error::Timeout));
    assert_eq!(frontend.state(), FrontendState::Closed);
    assert!(!frontend.ring().is_connected());
    assert_eq!(backend.store.watches(), 0);
    assert_eq!(backend.backend_state().as_deref(), Some("6"));

    frontend.set_state(FrontendState::Unknown).unwrap();
    pdo.destroy();
}

#[test]
fn backend_closing_during_connect_unwinds_the_ring() {
    let backend = Backend::new();
    // backend gives up instead of connecting
    backend.answer(&[("3", "6")]);

    let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
    let frontend = pdo.frontend();

    assert_eq!(frontend.set_state(FrontendState::Connected), Err(Error::Unsuccessful));
    assert_eq!(frontend.state(), FrontendState::Closed);
    assert!(!frontend.ring().is_connected());
    assert_eq!(backend.gnttab.grants(), 0);
    assert_eq!(backend.evtchn.open_ports(), 0);

    frontend.set_state(FrontendState::Unknown).unwrap();
    pdo.destroy();
}

#[test]
fn failed_connect_step_releases_everything() {
    let steps: [(&str, fn(&Backend)); 8] = [
        ("debug acquire", |b| b.debug.fail_next(Operation::Acquire, Error::NoMemory)),
        ("store acquire", |b| b.store.fail_next(Operation::Acquire, Error::NoMemory)),
        ("evtchn acquire", |b| b.evtchn.fail_next(Operation::Acquire, Error::NoMemory)),
        ("gnttab acquire", |b| b.gnttab.fail_next(Operation::Acquire, Error::NoMemory)),
        ("grant cache", |b| b.gnttab.fail_next(Operation::CreateCache, Error::NoMemory)),
        ("grant", |b| {
            b.gnttab
                .fail_next(Operation::PermitForeignAccess, Error::NoMemory)
        }),
        ("event channel", |b| b.evtchn.fail_next(Operation::OpenUnbound, Error::NoMemory)),
        ("debug callback", |b| b.debug.fail_next(Operation::Register, Error::NoMemory)),
    ];

    for (step, arm) in steps.iter() {
        let backend = Backend::new();
        let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
        let frontend = pdo.frontend();

        frontend.set_state(FrontendState::Closed).unwrap();
        arm(&backend);

        assert_eq!(
            frontend.set_state(FrontendState::Connected),
            Err(Error::NoMemory),
            "{}",
            step
        );
        assert_eq!(frontend.state(), FrontendState::Closed, "{}", step);
        assert!(!frontend.ring().is_connected(), "{}", step);

        assert_eq!(backend.gnttab.grants(), 0, "{}", step);
        assert_eq!(backend.gnttab.caches(), 0, "{}", step);
        assert_eq!(backend.evtchn.open_ports(), 0, "{}", step);
        assert_eq!(backend.debug.callbacks(), 0, "{}", step);

        assert_eq!(backend.debug.references(), 0, "{}", step);
        assert_eq!(backend.store.references(), 0, "{}", step);
        assert_eq!(backend.evtchn.references(), 0, "{}", step);
        assert_eq!(backend.gnttab.references(), 0, "{}", step);

        // nothing is left behind to trip up the next attempt
        frontend.set_state(FrontendState::Connected).unwrap();
        assert!(backend.gnttab.is_granted(backend.gref()), "{}", step);
        assert_eq!(backend.debug.callbacks(), 1, "{}", step);

        frontend.set_state(FrontendState::Unknown).unwrap();
        pdo.destroy();
    }
}

#[test]
fn conflicting_transaction_is_retried() {
    let backend = Backend::new();
    let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
    let frontend = pdo.frontend();

    backend.store.inject_conflicts(2);
    frontend.set_state(FrontendState::Connected).unwrap();

    assert_eq!(backend.store.commits(), 1);
    assert_eq!(backend.store.aborts(), 0);
    assert!(backend.gnttab.is_granted(backend.gref()));
    assert!(backend.evtchn.is_open(backend.port()));

    frontend.set_state(FrontendState::Unknown).unwrap();
    pdo.destroy();
}

#[test]
fn missing_raw_pointer_is_not_ready() {
    let backend = Backend::new();
    backend
        .store
        .delete(&format!("{}/feature-raw-pointer", BACKEND));

    let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
    let frontend = pdo.frontend();

    assert_eq!(frontend.set_state(FrontendState::Connected), Err(Error::DeviceNotReady));
    assert_eq!(frontend.state(), FrontendState::Closed);
    assert_eq!(backend.gnttab.grants(), 0);
    assert_eq!(backend.gnttab.references(), 0);

    // the HID interface tolerates a backend that cannot provide input
    pdo.resume().unwrap();
    pdo.d3_to_d0().unwrap();
    let fdo = xenvkbd::HidFdo::new(pdo.hid().clone());
    fdo.d3_to_d0().unwrap();

    assert!(pdo.hid().is_enabled());
    assert_eq!(frontend.state(), FrontendState::Closed);

    fdo.d0_to_d3();
    pdo.d0_to_d3();
    pdo.suspend();
    pdo.destroy();
}

#[test]
fn raw_pointer_can_be_optional() {
    let mut backend = Backend::new();
    backend
        .store
        .delete(&format!("{}/feature-raw-pointer", BACKEND));

    let mut context = (*backend.context).clone();
    context.config = context.config.with_require_raw_pointer(false);
    backend.context = std::sync::Arc::new(context);

    let pdo = Pdo::create(backend.context.clone(), NAME).unwrap();
    let frontend = pdo.frontend();

    frontend.set_state(FrontendState::Connected).unwrap();
    assert_eq!(backend.frontend_node("request-raw-pointer").as_deref(), Some("0"));
    assert_eq!(backend.frontend_node("request-abs-pointer").as_deref(), Some("1"));

    frontend.set_state(FrontendState::Unknown).unwrap();
    pdo.destroy();
}

#[test]
fn frontend_path_follows_prefix() {
    assert_eq!(config().frontend_path(NAME), FRONTEND);
}
