//! Seat, pointer, and keyboard relays.
//!
//! The seat capability mask is reduced to pointer and keyboard (touch is not
//! relayed). Pointer and keyboard events keep the session's last-seen serial
//! current, surface-local coordinates are rescaled for Xwayland, and focus
//! entry events can be withheld by the Xwayland hooks.

use {
    crate::{
        object::{Object, Role},
        protocols::MessageSpec,
        relay,
        session::{ProtocolError, Session, SessionError},
        trans::{MsgBuilder, MsgParser, OutMsg},
        xwayland::{ForwardEvent, SurfaceHandle},
    },
    std::{collections::VecDeque, os::fd::OwnedFd, rc::Rc},
};


/// Capabilities the relay is willing to advertise.
const RELAYED_CAPS: u32 = 1 | 2;

/// Host `wl_seat.capabilities`: the mask is intersected with the relayed
/// capabilities before it reaches the guest.
pub(crate) fn capabilities(
    session: &Rc<Session>,
    seat: &Rc<Object>,
    msg: &[u32],
) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "wl_seat",
                message: "capabilities",
                source: e,
            },
        )
    };
    let caps = p.uint("capabilities").map_err(parse)?;
    p.finish().map_err(parse)?;
    let twin = seat
        .twin()
        .map_err(|e| relay::wrap_err(Role::Host, ProtocolError::Binding(e)))?;
    let mut out = MsgBuilder::new(twin.id, 0);
    out.uint(caps & RELAYED_CAPS);
    session.guest.submit(out.finish());
    Ok(())
}

pub(crate) fn pointer_event(
    session: &Rc<Session>,
    pointer: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    let parse = |e| {
        relay::wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "wl_pointer",
                message: mspec.name,
                source: e,
            },
        )
    };
    match opcode {
        // enter
        0 => {
            let mut p = MsgParser::new(msg);
            let serial = p.uint("serial").map_err(parse)?;
            let surface = p.uint("surface").map_err(parse)?;
            let sx = p.fixed("surface_x").map_err(parse)?;
            let sy = p.fixed("surface_y").map_err(parse)?;
            p.finish().map_err(parse)?;
            session.note_serial(serial);
            let (guest_surface, twin) = entry_targets(session, pointer, mspec, surface)?;
            let mut out = MsgBuilder::new(twin.id, 0);
            out.uint(serial);
            out.uint(guest_surface.id);
            out.fixed(session.point_to_client(sx));
            out.fixed(session.point_to_client(sy));
            deliver_entry(session, guest_surface, out.finish(), EntryKind::Pointer);
            Ok(())
        }
        // leave
        1 => {
            let mut p = MsgParser::new(msg);
            let serial = p.uint("serial").map_err(parse)?;
            p.uint("surface").map_err(parse)?;
            session.note_serial(serial);
            relay::forward_event(session, pointer, mspec, opcode, msg, fds)
        }
        // motion
        2 => {
            let mut p = MsgParser::new(msg);
            let time = p.uint("time").map_err(parse)?;
            let sx = p.fixed("surface_x").map_err(parse)?;
            let sy = p.fixed("surface_y").map_err(parse)?;
            p.finish().map_err(parse)?;
            let twin = pointer
                .twin()
                .map_err(|e| relay::wrap_err(Role::Host, ProtocolError::Binding(e)))?;
            let mut out = MsgBuilder::new(twin.id, 2);
            out.uint(time);
            out.fixed(session.point_to_client(sx));
            out.fixed(session.point_to_client(sy));
            session.guest.submit(out.finish());
            Ok(())
        }
        // button
        3 => {
            let mut p = MsgParser::new(msg);
            let serial = p.uint("serial").map_err(parse)?;
            session.note_serial(serial);
            relay::forward_event(session, pointer, mspec, opcode, msg, fds)
        }
        _ => relay::forward_event(session, pointer, mspec, opcode, msg, fds),
    }
}

pub(crate) fn keyboard_event(
    session: &Rc<Session>,
    keyboard: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    let parse = |e| {
        relay::wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "wl_keyboard",
                message: mspec.name,
                source: e,
            },
        )
    };
    match opcode {
        // enter
        1 => {
            let mut p = MsgParser::new(msg);
            let serial = p.uint("serial").map_err(parse)?;
            let surface = p.uint("surface").map_err(parse)?;
            let keys = p.array("keys").map_err(parse)?;
            p.finish().map_err(parse)?;
            session.note_serial(serial);
            let (guest_surface, twin) = entry_targets(session, keyboard, mspec, surface)?;
            let mut out = MsgBuilder::new(twin.id, 1);
            out.uint(serial);
            out.uint(guest_surface.id);
            out.array(keys);
            deliver_entry(session, guest_surface, out.finish(), EntryKind::Keyboard);
            Ok(())
        }
        // leave
        2 => {
            let mut p = MsgParser::new(msg);
            let serial = p.uint("serial").map_err(parse)?;
            let surface = p.uint("surface").map_err(parse)?;
            p.finish().map_err(parse)?;
            session.note_serial(serial);
            if let Some(hooks) = session.hooks.clone()
                && let Some(guest_surface) = session.host.lookup(surface).and_then(|s| s.twin().ok())
            {
                hooks.on_keyboard_leave(&SurfaceHandle {
                    session: session.weak.clone(),
                    surface: guest_surface,
                });
            }
            relay::forward_event(session, keyboard, mspec, opcode, msg, fds)
        }
        // key and modifiers carry serials
        3 | 4 => {
            let mut p = MsgParser::new(msg);
            let serial = p.uint("serial").map_err(parse)?;
            session.note_serial(serial);
            relay::forward_event(session, keyboard, mspec, opcode, msg, fds)
        }
        _ => relay::forward_event(session, keyboard, mspec, opcode, msg, fds),
    }
}

enum EntryKind {
    Pointer,
    Keyboard,
}

/// Resolves the guest surface and the guest-side input object for an entry
/// event.
fn entry_targets(
    session: &Rc<Session>,
    input: &Rc<Object>,
    mspec: &'static MessageSpec,
    surface: u32,
) -> Result<(Rc<Object>, Rc<Object>), SessionError> {
    let err = |e| relay::wrap_err(Role::Host, e);
    let surface_obj = session
        .host
        .lookup(surface)
        .ok_or_else(|| {
            err(ProtocolError::UnknownObjectArg {
                interface: input.interface.name(),
                message: mspec.name,
                id: surface,
            })
        })?;
    let guest_surface = surface_obj
        .twin()
        .map_err(|e| err(ProtocolError::Binding(e)))?;
    let twin = input
        .twin()
        .map_err(|e| err(ProtocolError::Binding(e)))?;
    Ok((guest_surface, twin))
}

/// Entry events are withheld when a hook wants to decide their timing.
fn deliver_entry(session: &Rc<Session>, guest_surface: Rc<Object>, out: OutMsg, kind: EntryKind) {
    let Some(hooks) = session.hooks.clone() else {
        session.guest.submit(out);
        return;
    };
    let handle = SurfaceHandle {
        session: session.weak.clone(),
        surface: guest_surface,
    };
    let forward = ForwardEvent {
        session: session.weak.clone(),
        msg: out,
    };
    match kind {
        EntryKind::Pointer => hooks.on_pointer_entry(&handle, forward),
        EntryKind::Keyboard => hooks.on_keyboard_entry(&handle, forward),
    }
}
