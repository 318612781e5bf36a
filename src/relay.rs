//! The relay boundary: message dispatch and the generic forwarding engine.
//!
//! Every message is parsed against the signature tables in [`crate::protocols`].
//! A small set of `(interface, opcode)` pairs is intercepted below; everything
//! else is forwarded generically: object arguments are translated through
//! their twins, new-id arguments mint a fresh twin pair, and all other
//! arguments are copied verbatim.

use {
    crate::{
        endpoint::Endpoint,
        input,
        object::{self, Object, ObjectData, Role},
        output,
        protocols::{ArgSpec, Interface, MessageSpec},
        registry, selection,
        session::{ProtocolError, Session, SessionError, SessionErrorKind},
        shell, shm, surface,
        trans::{MsgBuilder, MsgParser, OutMsg},
    },
    std::{collections::VecDeque, os::fd::OwnedFd, rc::Rc},
};


pub(crate) fn handle_message(
    session: &Rc<Session>,
    source: &Rc<Endpoint>,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    let id = msg[0];
    let opcode = msg[1] & 0xffff;
    let Some(obj) = source.lookup(id) else {
        return match source.role {
            Role::Guest => Err(wrap_err(Role::Guest, ProtocolError::UnknownObject(id))),
            Role::Host => {
                // Events can race destruction of host-created objects, e.g.
                // an offer superseded while the guest was destroying it.
                log::debug!("Dropping an event for the unknown host object {id}");
                Ok(())
            }
        };
    };
    let specs = match source.role {
        Role::Guest => obj.interface.spec().requests,
        Role::Host => obj.interface.spec().events,
    };
    let Some(mspec) = specs.get(opcode as usize) else {
        return Err(wrap_err(
            source.role,
            ProtocolError::UnknownMessage {
                interface: obj.interface.name(),
                opcode,
            },
        ));
    };
    if log::log_enabled!(log::Level::Trace) {
        let dir = match source.role {
            Role::Guest => "guest ->",
            Role::Host => "host  <=",
        };
        log::trace!("{dir} {}#{}.{}", obj.interface.name(), id, mspec.name);
    }
    match source.role {
        Role::Guest => handle_request(session, &obj, mspec, opcode, msg, fds),
        Role::Host => handle_event(session, &obj, mspec, opcode, msg, fds),
    }
}

fn handle_request(
    session: &Rc<Session>,
    obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    use Interface::*;
    if obj.awaiting_ack.get() {
        return Err(wrap_err(Role::Guest, ProtocolError::UnknownObject(obj.id)));
    }
    match (obj.interface, opcode) {
        // get_registry is answered by the relay itself; sync is forwarded.
        (WlDisplay, 1) => registry::get_registry(session, obj, msg),
        (WlRegistry, 0) => registry::bind(session, obj, msg),
        (WlCompositor, 0) => surface::create_surface(session, obj, msg),
        (WlSurface, _) => surface::request(session, obj, mspec, opcode, msg, fds),
        (WlShm, 0) if session.gpu.is_some() => shm::create_pool(session, obj, msg, fds),
        (WlShmPool, _) if is_virtwl(obj) => shm::pool_request(session, obj, opcode, msg),
        (WlBuffer, 0) if is_virtwl(obj) => shm::destroy_buffer(session, obj),
        (WlSeat, 2) => Err(SessionErrorKind::Unsupported("touch input").into()),
        (XdgWmBase, 3) => shell::pong(session, obj, msg),
        (XdgToplevel, 2) => shell::set_title(session, obj, msg),
        (WlDataOffer, 1) | (ZwpPrimarySelectionOfferV1, 0) => {
            selection::receive(session, obj, opcode, msg, fds, mspec)
        }
        (WlDataSource, 0) | (ZwpPrimarySelectionSourceV1, 0) => {
            selection::source_offer(session, obj, opcode, msg, mspec)
        }
        _ if obj.interface.is_gtk_primary_selection() => {
            selection::gtk_request(session, obj, mspec, opcode, msg, fds)
        }
        _ => forward_request(session, obj, mspec, opcode, msg, fds),
    }
}

fn handle_event(
    session: &Rc<Session>,
    obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    use Interface::*;
    match (obj.interface, opcode) {
        (WlDisplay, 0) => display_error(session, msg),
        (WlDisplay, 1) => handle_delete_id(session, msg),
        (WlRegistry, _) => registry::host_registry_event(session, opcode, msg),
        (WlCallback, 0) if matches!(&*obj.data.borrow(), ObjectData::SetupCallback) => {
            registry::finish_setup(session, obj)
        }
        (WlSeat, 0) => input::capabilities(session, obj, msg),
        (WlPointer, _) => input::pointer_event(session, obj, mspec, opcode, msg, fds),
        (WlKeyboard, _) => input::keyboard_event(session, obj, mspec, opcode, msg, fds),
        (WlOutput, 3) => output::scale(session, obj, msg),
        (ZxdgOutputV1, 0 | 1) => output::logical(session, obj, mspec, opcode, msg),
        (XdgWmBase, 0) => shell::ping(session, obj, msg),
        _ if obj.cross_pair.get() => selection::gtk_event(session, obj, mspec, opcode, msg, fds),
        (WlDataOffer, 0) | (ZwpPrimarySelectionOfferV1, 0) => {
            selection::offer_event(session, obj, opcode, msg, mspec)
        }
        (WlDataSource, 1) | (ZwpPrimarySelectionSourceV1, 0) => {
            selection::send_event(session, obj, opcode, msg, fds, mspec)
        }
        (WlDataDevice, 1) => selection::dnd_enter(session, obj, msg, mspec),
        (WlDataDevice, 3) => selection::dnd_motion(session, obj, msg, mspec),
        _ => forward_event(session, obj, mspec, opcode, msg, fds),
    }
}

fn is_virtwl(obj: &Object) -> bool {
    matches!(
        &*obj.data.borrow(),
        ObjectData::Pool(_) | ObjectData::Buffer(_)
    )
}

/// Translates a message for the peer connection without submitting it.
pub(crate) fn translate(
    session: &Rc<Session>,
    src_obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<OutMsg, SessionError> {
    Ok(translate_collect(session, src_obj, mspec, opcode, msg, fds)?.0)
}

/// Like [`translate`] but also returns the source-side objects minted for
/// new-id arguments, so that callers deferring the message can roll them back.
pub(crate) fn translate_collect(
    session: &Rc<Session>,
    src_obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(OutMsg, Vec<Rc<Object>>), SessionError> {
    let role = src_obj.role;
    let src_ep = session.endpoint_of(role);
    let twin = src_obj
        .twin()
        .map_err(|e| wrap_err(role, ProtocolError::Binding(e)))?;
    let mut out = MsgBuilder::new(twin.id, opcode);
    let mut created = Vec::new();
    translate_args(session, src_ep, src_obj, mspec, msg, fds, &mut out, &mut created)?;
    Ok((out.finish(), created))
}

/// Translates the arguments of a message into `out`, minting twin pairs for
/// new-id arguments. Source-side minted objects are pushed onto `created`.
#[expect(clippy::too_many_arguments)]
pub(crate) fn translate_args(
    session: &Rc<Session>,
    src_ep: &Rc<Endpoint>,
    src_obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
    out: &mut MsgBuilder,
    created: &mut Vec<Rc<Object>>,
) -> Result<(), SessionError> {
    let role = src_ep.role;
    let mut p = MsgParser::new(msg);
    let parse_err = |e| {
        wrap_err(
            role,
            ProtocolError::Parse {
                interface: src_obj.interface.name(),
                message: mspec.name,
                source: e,
            },
        )
    };
    for arg in mspec.args {
        match arg {
            ArgSpec::Int | ArgSpec::Uint | ArgSpec::Fixed => {
                let start = p.pos();
                p.uint(mspec.name).map_err(parse_err)?;
                out.copy_words(p.words_since(start));
            }
            ArgSpec::Str { nullable } => {
                let start = p.pos();
                let s = p.string_opt(mspec.name).map_err(parse_err)?;
                if s.is_none() && !nullable {
                    return Err(parse_err(crate::trans::ParseError::NullString(mspec.name)));
                }
                out.copy_words(p.words_since(start));
            }
            ArgSpec::Array => {
                let start = p.pos();
                p.array(mspec.name).map_err(parse_err)?;
                out.copy_words(p.words_since(start));
            }
            ArgSpec::Fd => {
                let fd = p.fd(fds, mspec.name).map_err(parse_err)?;
                out.fd(fd);
            }
            ArgSpec::Object {
                interface,
                nullable,
            } => {
                let id = p.uint(mspec.name).map_err(parse_err)?;
                if id == 0 {
                    if !nullable {
                        return Err(parse_err(crate::trans::ParseError::NullArgument(
                            mspec.name,
                        )));
                    }
                    out.uint(0);
                    continue;
                }
                let arg_obj = src_ep.lookup(id).filter(|o| !o.awaiting_ack.get()).ok_or_else(|| {
                    wrap_err(
                        role,
                        ProtocolError::UnknownObjectArg {
                            interface: src_obj.interface.name(),
                            message: mspec.name,
                            id,
                        },
                    )
                })?;
                if let Some(expected) = interface
                    && arg_obj.interface != *expected
                {
                    return Err(wrap_err(
                        role,
                        ProtocolError::WrongInterface {
                            actual: arg_obj.interface.name(),
                            expected: expected.name(),
                        },
                    ));
                }
                let arg_twin = match role {
                    Role::Guest => object::to_host(&arg_obj),
                    Role::Host => object::to_guest(&arg_obj),
                }
                .map_err(|e| wrap_err(role, ProtocolError::Binding(e)))?;
                out.uint(arg_twin.id);
            }
            ArgSpec::NewId { interface } => {
                let Some(interface) = interface else {
                    // wl_registry.bind is always intercepted.
                    return Err(wrap_err(
                        role,
                        ProtocolError::UnknownMessage {
                            interface: src_obj.interface.name(),
                            opcode: u32::MAX,
                        },
                    ));
                };
                let id = p.uint(mspec.name).map_err(parse_err)?;
                let (src_new, dst_new) = create_pair(
                    session,
                    src_ep,
                    id,
                    *interface,
                    *interface,
                    src_obj.version,
                )?;
                created.push(src_new);
                out.uint(dst_new.id);
            }
        }
    }
    p.finish().map_err(parse_err)?;
    Ok(())
}

/// Creates a linked pair of objects for a new-id argument. `src_id` is the id
/// chosen by the sending peer; the id on the other connection is allocated by
/// the relay.
pub(crate) fn create_pair(
    session: &Rc<Session>,
    src_ep: &Rc<Endpoint>,
    src_id: u32,
    src_interface: Interface,
    dst_interface: Interface,
    version: u32,
) -> Result<(Rc<Object>, Rc<Object>), SessionError> {
    let role = src_ep.role;
    if !src_ep.peer_may_allocate(src_id) {
        return Err(wrap_err(role, ProtocolError::IllegalNewId(src_id)));
    }
    let src_new = Object::new(role, src_interface, version, src_id);
    if !src_ep.insert(&src_new) {
        return Err(wrap_err(role, ProtocolError::IdInUse(src_id)));
    }
    let dst_ep = session.other(src_ep);
    let dst_id = dst_ep.allocate_id();
    let dst_new = Object::new(dst_ep.role, dst_interface, version, dst_id);
    let inserted = dst_ep.insert(&dst_new);
    debug_assert!(inserted);
    match role {
        Role::Guest => Object::link(&src_new, &dst_new),
        Role::Host => Object::link(&dst_new, &src_new),
    }
    Ok((src_new, dst_new))
}

/// Generically forwards a guest request, then applies the destructor
/// lifecycle if the message destroys its object.
pub(crate) fn forward_request(
    session: &Rc<Session>,
    obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    let out = translate(session, obj, mspec, opcode, msg, fds)?;
    session.host.submit(out);
    if mspec.destructor {
        destructor_sent(session, obj);
    }
    Ok(())
}

/// Generically forwards a host event.
pub(crate) fn forward_event(
    session: &Rc<Session>,
    obj: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    let out = translate(session, obj, mspec, opcode, msg, fds)?;
    session.guest.submit(out);
    Ok(())
}

/// Applies the destruction ordering after a destructor was forwarded to the
/// host for the guest-side object `obj`.
///
/// If the host will confirm the deletion (the relay allocated the host id),
/// the guest-side object stays alive until the confirmation arrives. If the
/// host created the id itself, no confirmation will come and both sides are
/// deleted immediately.
pub(crate) fn destructor_sent(session: &Rc<Session>, obj: &Rc<Object>) {
    match obj.any_twin() {
        Ok(twin) => {
            if session.host.relay_allocated(twin.id) {
                obj.awaiting_ack.set(true);
            } else {
                session.host.remove(twin.id);
                delete_guest_object(session, obj);
            }
        }
        Err(_) => delete_guest_object(session, obj),
    }
}

/// Final deletion of a guest-side object: it leaves the table, its relay
/// state is released, and the guest is sent the delete_id event it is waiting
/// for (if it allocated the id itself).
pub(crate) fn delete_guest_object(session: &Rc<Session>, obj: &Rc<Object>) {
    let Some(obj) = session.guest.remove(obj.id) else {
        return;
    };
    cleanup_object_data(session, &obj);
    if !session.guest.relay_allocated(obj.id) {
        let mut out = MsgBuilder::new(1, 1);
        out.uint(obj.id);
        session.guest.submit(out.finish());
    }
}

fn cleanup_object_data(session: &Rc<Session>, obj: &Rc<Object>) {
    match obj.data.take() {
        ObjectData::Pool(pool) => pool.unref(session),
        ObjectData::Buffer(buffer) => buffer.pool.unref(session),
        _ => {}
    }
}

fn display_error(session: &Rc<Session>, msg: &[u32]) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "wl_display",
                message: "error",
                source: e,
            },
        )
    };
    let id = p.uint("object_id").map_err(parse)?;
    let code = p.uint("code").map_err(parse)?;
    let message = p.string("message").map_err(parse)?;
    let interface = match session.host.lookup(id) {
        Some(obj) => obj.interface.name().to_string(),
        None => "unknown".to_string(),
    };
    Err(SessionErrorKind::HostDisplayError {
        interface,
        id,
        code,
        message: message.to_string(),
    }
    .into())
}

fn handle_delete_id(session: &Rc<Session>, msg: &[u32]) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let id = p.uint("id").map_err(|e| {
        wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "wl_display",
                message: "delete_id",
                source: e,
            },
        )
    })?;
    let Some(obj) = session.host.remove(id) else {
        log::debug!("The host deleted the unknown id {id}");
        return Ok(());
    };
    if let Ok(twin) = obj.any_twin()
        && twin.live.get()
    {
        delete_guest_object(session, &twin);
    }
    Ok(())
}

pub(crate) fn wrap_err(role: Role, e: ProtocolError) -> SessionError {
    match role {
        Role::Guest => SessionErrorKind::Protocol(e).into(),
        Role::Host => SessionErrorKind::HostMessage(e).into(),
    }
}
