use crate::protocols::{ArgSpec, Interface, MessageSpec};

#[test]
fn name_lookup() {
    for interface in [
        Interface::WlDisplay,
        Interface::WlSurface,
        Interface::XdgWmBase,
        Interface::ZwpPrimarySelectionOfferV1,
        Interface::GtkPrimarySelectionDeviceManager,
    ] {
        assert_eq!(Interface::from_name(interface.name()), Some(interface));
    }
    assert_eq!(Interface::from_name("wl_bogus"), None);
}

#[test]
fn opcode_tables() {
    let surface = Interface::WlSurface.spec();
    assert_eq!(surface.requests.len(), 11);
    assert_eq!(surface.requests[0].name, "destroy");
    assert!(surface.requests[0].destructor);
    assert_eq!(surface.requests[1].name, "attach");
    assert_eq!(surface.requests[6].name, "commit");
    assert_eq!(surface.requests[8].name, "set_buffer_scale");

    let display = Interface::WlDisplay.spec();
    assert_eq!(display.events[1].name, "delete_id");

    let pointer = Interface::WlPointer.spec();
    assert_eq!(pointer.events[0].name, "enter");
    assert_eq!(pointer.events[3].name, "button");

    let offer = Interface::WlDataOffer.spec();
    assert_eq!(offer.requests[1].name, "receive");
    assert!(offer.requests[2].destructor);
}

#[test]
fn fd_arguments() {
    let create_pool = &Interface::WlShm.spec().requests[0];
    assert!(create_pool.args.contains(&ArgSpec::Fd));
    let keymap = &Interface::WlKeyboard.spec().events[0];
    assert!(keymap.args.contains(&ArgSpec::Fd));
}

fn same_shape(a: &MessageSpec, b: &MessageSpec) {
    assert_eq!(a.name, b.name);
    assert_eq!(a.destructor, b.destructor);
    assert_eq!(a.args.len(), b.args.len());
    for (x, y) in a.args.iter().zip(b.args.iter()) {
        let compatible = match (x, y) {
            (ArgSpec::Object { nullable: a, .. }, ArgSpec::Object { nullable: b, .. }) => a == b,
            (ArgSpec::NewId { .. }, ArgSpec::NewId { .. }) => true,
            (x, y) => x == y,
        };
        assert!(compatible, "{}: {x:?} vs {y:?}", a.name);
    }
}

/// The legacy gtk flow is relayed onto the zwp twin with unchanged opcodes;
/// the two protocols must stay wire-compatible message for message.
#[test]
fn gtk_zwp_wire_compatible() {
    for gtk in [
        Interface::GtkPrimarySelectionDeviceManager,
        Interface::GtkPrimarySelectionDevice,
        Interface::GtkPrimarySelectionOffer,
        Interface::GtkPrimarySelectionSource,
    ] {
        let zwp = gtk.gtk_to_zwp().unwrap();
        assert_eq!(zwp.zwp_to_gtk(), Some(gtk));
        let g = gtk.spec();
        let z = zwp.spec();
        assert_eq!(g.requests.len(), z.requests.len());
        assert_eq!(g.events.len(), z.events.len());
        for (a, b) in g.requests.iter().zip(z.requests.iter()) {
            same_shape(a, b);
        }
        for (a, b) in g.events.iter().zip(z.events.iter()) {
            same_shape(a, b);
        }
    }
    assert!(Interface::WlSeat.gtk_to_zwp().is_none());
    assert!(Interface::WlSeat.zwp_to_gtk().is_none());
}

#[test]
fn max_versions() {
    assert_eq!(Interface::WlCompositor.max_version(), 5);
    assert_eq!(Interface::WlSeat.max_version(), 7);
    assert_eq!(Interface::GtkPrimarySelectionDeviceManager.max_version(), 1);
}
