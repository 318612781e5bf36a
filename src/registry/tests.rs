use crate::{
    protocols::Interface,
    session::SessionErrorKind,
    test_framework::{Arg, setup},
};

#[test]
fn advertises_supported_globals() {
    let mut t = setup();
    t.guest.get_registry();
    t.pump();
    let advertised: Vec<(&str, u32)> = t
        .guest
        .globals
        .iter()
        .map(|(_, interface, version)| (interface.as_str(), *version))
        .collect();
    assert_eq!(
        advertised,
        vec![
            ("wl_shm", 1),
            ("wl_compositor", 5),
            ("wl_data_device_manager", 3),
            ("zwp_primary_selection_device_manager_v1", 1),
            ("gtk_primary_selection_device_manager", 1),
            ("wl_seat", 7),
            ("wl_output", 4),
            ("zxdg_output_manager_v1", 3),
            ("xdg_wm_base", 5),
        ],
    );
}

/// Some clients bind in advertisement order and misbehave unless the seat
/// comes after the primary-selection managers.
#[test]
fn seat_after_primary_selection() {
    let mut t = setup();
    t.guest.get_registry();
    t.pump();
    let pos = |name: &str| {
        t.guest
            .globals
            .iter()
            .position(|(_, i, _)| i == name)
            .unwrap()
    };
    assert!(pos("zwp_primary_selection_device_manager_v1") < pos("wl_seat"));
    assert!(pos("gtk_primary_selection_device_manager") < pos("wl_seat"));
}

#[test]
fn second_registry_gets_snapshot() {
    let mut t = setup();
    t.guest.get_registry();
    t.pump();
    let first = t.guest.globals.len();
    assert_ne!(first, 0);
    t.guest.get_registry();
    t.pump();
    assert_eq!(t.guest.globals.len(), 2 * first);
}

#[test]
fn bind_forwards_to_host_global() {
    let mut t = setup();
    t.guest.get_registry();
    t.pump();
    t.guest.bind("wl_compositor", 5);
    t.pump();
    let binds = t.host.requests_named("bind");
    assert_eq!(binds.len(), 1);
    assert_eq!(binds[0].args[1].str(), "wl_compositor");
    assert_eq!(binds[0].args[2].uint(), 5);
}

/// The gtk global is backed by the host's zwp global.
#[test]
fn gtk_binds_the_zwp_global() {
    let mut t = setup();
    t.guest.get_registry();
    t.pump();
    t.guest.bind("gtk_primary_selection_device_manager", 1);
    t.pump();
    let binds = t.host.requests_named("bind");
    assert_eq!(binds.len(), 1);
    assert_eq!(
        binds[0].args[1].str(),
        "zwp_primary_selection_device_manager_v1",
    );
    assert_eq!(
        t.host.object_of(Interface::ZwpPrimarySelectionDeviceManagerV1),
        binds[0].args[3].uint(),
    );
}

#[test]
fn bind_unknown_name_is_fatal() {
    let mut t = setup();
    let registry = t.guest.get_registry();
    t.pump();
    t.guest.send(
        registry,
        0,
        &[
            Arg::Uint(99),
            Arg::Str("wl_compositor".to_string()),
            Arg::Uint(1),
            Arg::Uint(70),
        ],
    );
    let err = t.pump_err();
    assert!(matches!(err.0, SessionErrorKind::Protocol(_)));
}

#[test]
fn bind_interface_mismatch_is_fatal() {
    let mut t = setup();
    let registry = t.guest.get_registry();
    t.pump();
    // Name 1 is wl_shm.
    t.guest.send(
        registry,
        0,
        &[
            Arg::Uint(1),
            Arg::Str("wl_compositor".to_string()),
            Arg::Uint(1),
            Arg::Uint(70),
        ],
    );
    let err = t.pump_err();
    assert!(matches!(err.0, SessionErrorKind::Protocol(_)));
}

#[test]
fn bind_above_advertised_version_is_fatal() {
    let mut t = setup();
    t.guest.get_registry();
    t.pump();
    t.guest.bind("wl_compositor", 6);
    let err = t.pump_err();
    assert!(matches!(err.0, SessionErrorKind::Protocol(_)));
}

#[test]
fn global_remove_is_forwarded() {
    let mut t = setup();
    t.guest.get_registry();
    t.pump();
    // wl_output is the sixth host global.
    let host_registry = t.host.registry.unwrap();
    t.host.send_event(host_registry, 1, &[Arg::Uint(6)]);
    t.pump();
    let output_name = t
        .guest
        .globals
        .iter()
        .find(|(_, i, _)| i == "wl_output")
        .unwrap()
        .0;
    assert_eq!(t.guest.removed_globals, vec![output_name]);
}
