//! Clipboard, drag-and-drop, and primary-selection relays.
//!
//! Three near-identical flows share this module: `wl_data_device_manager`,
//! `zwp_primary_selection_v1`, and the legacy `gtk_primary_selection`. All
//! MIME types pass through the clipboard namespace: guest-advertised types
//! are prefixed on the way to the host, host-advertised types are stripped or
//! dropped on the way back.
//!
//! The gtk flow is special: the host only speaks zwp, so gtk objects pair
//! with zwp twins. Such cross-interface pairs are excluded from the generic
//! translation path (the protocols are wire-compatible but the interfaces
//! differ); this module follows the sibling link with its own accessor.

use {
    crate::{
        object::{Object, Role},
        protocols::{Interface, MessageSpec},
        relay,
        session::{ProtocolError, Session, SessionError},
        trans::{MsgBuilder, MsgParser},
    },
    std::{collections::VecDeque, os::fd::OwnedFd, rc::Rc},
};


fn parse_err(obj: &Object, mspec: &'static MessageSpec) -> impl Fn(crate::trans::ParseError) -> SessionError {
    let interface = obj.interface.name();
    let role = obj.role;
    move |e| {
        relay::wrap_err(
            role,
            ProtocolError::Parse {
                interface,
                message: mspec.name,
                source: e,
            },
        )
    }
}

fn sel_twin(obj: &Object) -> Result<Rc<Object>, SessionError> {
    obj.any_twin()
        .map_err(|e| relay::wrap_err(obj.role, ProtocolError::Binding(e)))
}

/// Guest `receive(mime_type, fd)` on a data offer or primary-selection
/// offer: the MIME type gains the namespace prefix, the fd passes through and
/// the relay's copy closes after the flush.
pub(crate) fn receive(
    session: &Rc<Session>,
    offer: &Rc<Object>,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
    mspec: &'static MessageSpec,
) -> Result<(), SessionError> {
    let parse = parse_err(offer, mspec);
    let mut p = MsgParser::new(msg);
    let mime = p.string("mime_type").map_err(&parse)?;
    let fd = p.fd(fds, "fd").map_err(&parse)?;
    p.finish().map_err(&parse)?;
    let twin = sel_twin(offer)?;
    let mut out = MsgBuilder::new(twin.id, opcode);
    out.string(&session.clip.to_host(mime));
    out.fd(fd);
    session.host.submit(out.finish());
    Ok(())
}

/// Guest `offer(mime_type)` on a data source or primary-selection source.
pub(crate) fn source_offer(
    session: &Rc<Session>,
    source: &Rc<Object>,
    opcode: u32,
    msg: &[u32],
    mspec: &'static MessageSpec,
) -> Result<(), SessionError> {
    let parse = parse_err(source, mspec);
    let mut p = MsgParser::new(msg);
    let mime = p.string("mime_type").map_err(&parse)?;
    p.finish().map_err(&parse)?;
    let twin = sel_twin(source)?;
    let mut out = MsgBuilder::new(twin.id, opcode);
    out.string(&session.clip.to_host(mime));
    session.host.submit(out.finish());
    Ok(())
}

/// Host `offer(mime_type)` on an offer: stripped, or dropped entirely when
/// the type belongs to a different namespace.
pub(crate) fn offer_event(
    session: &Rc<Session>,
    offer: &Rc<Object>,
    opcode: u32,
    msg: &[u32],
    mspec: &'static MessageSpec,
) -> Result<(), SessionError> {
    let parse = parse_err(offer, mspec);
    let mut p = MsgParser::new(msg);
    let mime = p.string("mime_type").map_err(&parse)?;
    p.finish().map_err(&parse)?;
    let Some(mime) = session.clip.to_clients(mime) else {
        log::debug!("Dropping an offer outside the clipboard namespace");
        return Ok(());
    };
    let twin = sel_twin(offer)?;
    let mut out = MsgBuilder::new(twin.id, opcode);
    out.string(mime);
    session.guest.submit(out.finish());
    Ok(())
}

/// Host `send(mime_type, fd)` on a source the guest owns: stripped, or
/// dropped (closing the fd) when the type belongs to a different namespace.
pub(crate) fn send_event(
    session: &Rc<Session>,
    source: &Rc<Object>,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
    mspec: &'static MessageSpec,
) -> Result<(), SessionError> {
    let parse = parse_err(source, mspec);
    let mut p = MsgParser::new(msg);
    let mime = p.string("mime_type").map_err(&parse)?;
    let fd = p.fd(fds, "fd").map_err(&parse)?;
    p.finish().map_err(&parse)?;
    let Some(mime) = session.clip.to_clients(mime) else {
        log::debug!("Dropping a send outside the clipboard namespace");
        return Ok(());
    };
    let twin = sel_twin(source)?;
    let mut out = MsgBuilder::new(twin.id, opcode);
    out.string(mime);
    out.fd(fd);
    session.guest.submit(out.finish());
    Ok(())
}

/// Host `wl_data_device.enter`: surface-local coordinates are rescaled and
/// the serial is recorded.
pub(crate) fn dnd_enter(
    session: &Rc<Session>,
    device: &Rc<Object>,
    msg: &[u32],
    mspec: &'static MessageSpec,
) -> Result<(), SessionError> {
    let parse = parse_err(device, mspec);
    let mut p = MsgParser::new(msg);
    let serial = p.uint("serial").map_err(&parse)?;
    let surface = p.uint("surface").map_err(&parse)?;
    let x = p.fixed("x").map_err(&parse)?;
    let y = p.fixed("y").map_err(&parse)?;
    let offer = p.uint("id").map_err(&parse)?;
    p.finish().map_err(&parse)?;
    session.note_serial(serial);
    let twin = sel_twin(device)?;
    let mut out = MsgBuilder::new(twin.id, 1);
    out.uint(serial);
    out.uint(translate_arg(session, device, mspec, surface, false)?);
    out.fixed(session.point_to_client(x));
    out.fixed(session.point_to_client(y));
    out.uint(translate_arg(session, device, mspec, offer, true)?);
    session.guest.submit(out.finish());
    Ok(())
}

/// Host `wl_data_device.motion`: coordinates are rescaled.
pub(crate) fn dnd_motion(
    session: &Rc<Session>,
    device: &Rc<Object>,
    msg: &[u32],
    mspec: &'static MessageSpec,
) -> Result<(), SessionError> {
    let parse = parse_err(device, mspec);
    let mut p = MsgParser::new(msg);
    let time = p.uint("time").map_err(&parse)?;
    let x = p.fixed("x").map_err(&parse)?;
    let y = p.fixed("y").map_err(&parse)?;
    p.finish().map_err(&parse)?;
    let twin = sel_twin(device)?;
    let mut out = MsgBuilder::new(twin.id, 3);
    out.uint(time);
    out.fixed(session.point_to_client(x));
    out.fixed(session.point_to_client(y));
    session.guest.submit(out.finish());
    Ok(())
}

fn translate_arg(
    session: &Rc<Session>,
    src: &Object,
    mspec: &'static MessageSpec,
    id: u32,
    nullable: bool,
) -> Result<u32, SessionError> {
    if id == 0 {
        if !nullable {
            return Err(relay::wrap_err(
                src.role,
                ProtocolError::Parse {
                    interface: src.interface.name(),
                    message: mspec.name,
                    source: crate::trans::ParseError::NullArgument(mspec.name),
                },
            ));
        }
        return Ok(0);
    }
    let src_ep = session.endpoint_of(src.role);
    let obj = src_ep.lookup(id).ok_or_else(|| {
        relay::wrap_err(
            src.role,
            ProtocolError::UnknownObjectArg {
                interface: src.interface.name(),
                message: mspec.name,
                id,
            },
        )
    })?;
    Ok(sel_twin(&obj)?.id)
}

/// Guest requests on the legacy gtk_primary_selection objects. Wire
/// compatible with zwp, so the opcode carries over; only object arguments and
/// MIME types are rewritten, and new objects pair gtk (guest) with zwp
/// (host).
pub(crate) fn gtk_request(
    session: &Rc<Session>,
    obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    use Interface::*;
    let parse = parse_err(obj, mspec);
    let twin = sel_twin(obj)?;
    let mut p = MsgParser::new(msg);
    let mut out = MsgBuilder::new(twin.id, opcode);
    match (obj.interface, opcode) {
        (GtkPrimarySelectionDeviceManager, 0) => {
            let id = p.uint("id").map_err(&parse)?;
            let (_, host_new) = relay::create_pair(
                session,
                &session.guest,
                id,
                GtkPrimarySelectionSource,
                ZwpPrimarySelectionSourceV1,
                obj.version,
            )?;
            out.uint(host_new.id);
        }
        (GtkPrimarySelectionDeviceManager, 1) => {
            let id = p.uint("id").map_err(&parse)?;
            let seat = p.uint("seat").map_err(&parse)?;
            let (_, host_new) = relay::create_pair(
                session,
                &session.guest,
                id,
                GtkPrimarySelectionDevice,
                ZwpPrimarySelectionDeviceV1,
                obj.version,
            )?;
            out.uint(host_new.id);
            out.uint(translate_seat(session, obj, mspec, seat)?);
        }
        (GtkPrimarySelectionDevice, 0) => {
            let source = p.uint("source").map_err(&parse)?;
            let serial = p.uint("serial").map_err(&parse)?;
            out.uint(translate_arg(session, obj, mspec, source, true)?);
            out.uint(serial);
        }
        (GtkPrimarySelectionOffer, 0) => {
            let mime = p.string("mime_type").map_err(&parse)?;
            let fd = p.fd(fds, "fd").map_err(&parse)?;
            out.string(&session.clip.to_host(mime));
            out.fd(fd);
        }
        (GtkPrimarySelectionSource, 0) => {
            let mime = p.string("mime_type").map_err(&parse)?;
            out.string(&session.clip.to_host(mime));
        }
        // The destroy requests carry no arguments.
        (GtkPrimarySelectionDeviceManager, 2)
        | (GtkPrimarySelectionDevice, 1)
        | (GtkPrimarySelectionOffer, 1)
        | (GtkPrimarySelectionSource, 1) => {}
        _ => {
            return Err(relay::wrap_err(
                Role::Guest,
                ProtocolError::UnknownMessage {
                    interface: obj.interface.name(),
                    opcode,
                },
            ));
        }
    }
    p.finish().map_err(&parse)?;
    session.host.submit(out.finish());
    if mspec.destructor {
        relay::destructor_sent(session, obj);
    }
    Ok(())
}

fn translate_seat(
    session: &Rc<Session>,
    src: &Object,
    mspec: &'static MessageSpec,
    id: u32,
) -> Result<u32, SessionError> {
    let seat = session.guest.lookup(id).ok_or_else(|| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::UnknownObjectArg {
                interface: src.interface.name(),
                message: mspec.name,
                id,
            },
        )
    })?;
    if seat.interface != Interface::WlSeat {
        return Err(relay::wrap_err(
            Role::Guest,
            ProtocolError::WrongInterface {
                actual: seat.interface.name(),
                expected: Interface::WlSeat.name(),
            },
        ));
    }
    let twin = seat
        .twin()
        .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
    Ok(twin.id)
}

/// Host events on the zwp twins of gtk objects.
pub(crate) fn gtk_event(
    session: &Rc<Session>,
    obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    use Interface::*;
    let parse = parse_err(obj, mspec);
    let twin = sel_twin(obj)?;
    let mut p = MsgParser::new(msg);
    let mut out = MsgBuilder::new(twin.id, opcode);
    match (obj.interface, opcode) {
        (ZwpPrimarySelectionDeviceV1, 0) => {
            let id = p.uint("offer").map_err(&parse)?;
            let (_, guest_new) = relay::create_pair(
                session,
                &session.host,
                id,
                ZwpPrimarySelectionOfferV1,
                GtkPrimarySelectionOffer,
                obj.version,
            )?;
            out.uint(guest_new.id);
        }
        (ZwpPrimarySelectionDeviceV1, 1) => {
            let id = p.uint("id").map_err(&parse)?;
            out.uint(translate_arg(session, obj, mspec, id, true)?);
        }
        (ZwpPrimarySelectionOfferV1, 0) => {
            let mime = p.string("mime_type").map_err(&parse)?;
            let Some(mime) = session.clip.to_clients(mime) else {
                log::debug!("Dropping an offer outside the clipboard namespace");
                return Ok(());
            };
            out.string(mime);
        }
        (ZwpPrimarySelectionSourceV1, 0) => {
            let mime = p.string("mime_type").map_err(&parse)?;
            let fd = p.fd(fds, "fd").map_err(&parse)?;
            let Some(mime) = session.clip.to_clients(mime) else {
                log::debug!("Dropping a send outside the clipboard namespace");
                return Ok(());
            };
            out.string(mime);
            out.fd(fd);
        }
        (ZwpPrimarySelectionSourceV1, 1) => {}
        _ => {
            return Err(relay::wrap_err(
                Role::Host,
                ProtocolError::UnknownMessage {
                    interface: obj.interface.name(),
                    opcode,
                },
            ));
        }
    }
    p.finish().map_err(&parse)?;
    session.guest.submit(out.finish());
    Ok(())
}
