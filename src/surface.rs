//! Per-surface relay state.
//!
//! Surfaces carry the commit-time copy for virtualized buffers and, when
//! Xwayland hooks are installed, a deferral queue: requests that arrive before
//! the X11 side has configured the surface are queued and replayed in order
//! once the hook calls `set_configured`.

use {
    crate::{
        object::{Object, ObjectData, Role},
        protocols::{Interface, MessageSpec},
        relay,
        session::{ProtocolError, Session, SessionError},
        shm::{self, ResolvedBuffer, ShmPool},
        trans::{MsgBuilder, MsgParser, OutMsg},
        xwayland::{SurfaceHandle, Visibility},
    },
    std::{any::Any, collections::VecDeque, os::fd::OwnedFd, rc::Rc},
};


pub(crate) struct SurfaceState {
    lifecycle: Lifecycle,
    visibility: Visibility,
    /// The range of the currently attached virtualized buffer, copied on
    /// commit. Empty for direct buffers and when nothing is attached.
    attached: Option<AttachedBuffer>,
    /// Supervisor-owned data, reachable through the Xwayland hooks.
    pub(crate) user: Option<Box<dyn Any>>,
}

impl std::fmt::Debug for SurfaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceState")
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

enum Lifecycle {
    /// Guest requests are queued until the Xwayland hook configures the
    /// surface.
    Unconfigured(VecDeque<SurfaceOp>),
    Ready,
    Destroyed,
}

struct AttachedBuffer {
    pool: Rc<ShmPool>,
    range: (usize, usize),
}

enum SurfaceOp {
    /// An already-translated request; `created` are guest-side objects minted
    /// by its new-id arguments, rolled back if the queue is dropped.
    Forward {
        out: OutMsg,
        created: Vec<Rc<Object>>,
    },
    Attach {
        buffer: Option<Rc<Object>>,
        x: i32,
        y: i32,
    },
    Commit,
}

/// Guest `wl_compositor.create_surface`.
pub(crate) fn create_surface(
    session: &Rc<Session>,
    compositor: &Rc<Object>,
    msg: &[u32],
) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "wl_compositor",
                message: "create_surface",
                source: e,
            },
        )
    };
    let id = p.uint("id").map_err(parse)?;
    p.finish().map_err(parse)?;
    let (guest_surface, host_surface) = relay::create_pair(
        session,
        &session.guest,
        id,
        Interface::WlSurface,
        Interface::WlSurface,
        compositor.version,
    )?;
    let lifecycle = match &session.hooks {
        Some(_) => Lifecycle::Unconfigured(VecDeque::new()),
        None => Lifecycle::Ready,
    };
    *guest_surface.data.borrow_mut() = ObjectData::Surface(SurfaceState {
        lifecycle,
        visibility: Visibility::Show,
        attached: None,
        user: None,
    });
    let compositor_twin = compositor
        .twin()
        .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
    let mut out = MsgBuilder::new(compositor_twin.id, 0);
    out.uint(host_surface.id);
    session.host.submit(out.finish());
    // Xwayland renders at the scaled size; tell the host so it scales the
    // content back down.
    if let Some(scale) = session.xscale() {
        send_buffer_scale(session, &host_surface, scale);
    }
    if let Some(hooks) = session.hooks.clone() {
        hooks.on_create_surface(&SurfaceHandle {
            session: session.weak.clone(),
            surface: guest_surface,
        });
    }
    Ok(())
}

fn send_buffer_scale(session: &Rc<Session>, host_surface: &Object, scale: i32) {
    if host_surface.version < 3 {
        log::warn!("Cannot compensate for the Xwayland scale on a wl_surface below version 3");
        return;
    }
    let mut out = MsgBuilder::new(host_surface.id, 8);
    out.int(scale);
    session.host.submit(out.finish());
}

/// Guest requests on a wl_surface.
pub(crate) fn request(
    session: &Rc<Session>,
    surface: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    if opcode == 0 {
        return destroy(session, surface, mspec, opcode, msg, fds);
    }
    let op = build_op(session, surface, mspec, opcode, msg, fds)?;
    let deferred = with_state(surface, |state| match &mut state.lifecycle {
        Lifecycle::Unconfigured(queue) => {
            queue.push_back(op);
            None
        }
        Lifecycle::Ready => Some(op),
        Lifecycle::Destroyed => None,
    });
    match deferred {
        Some(Some(op)) => execute(session, surface, op),
        _ => Ok(()),
    }
}

/// Translates one surface request into a deferred op without sending it.
fn build_op(
    session: &Rc<Session>,
    surface: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<SurfaceOp, SessionError> {
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "wl_surface",
                message: mspec.name,
                source: e,
            },
        )
    };
    let twin = surface
        .twin()
        .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
    match opcode {
        // attach: translate the buffer now, realize it at execution time.
        1 => {
            let mut p = MsgParser::new(msg);
            let buffer_id = p.uint("buffer").map_err(parse)?;
            let x = p.int("x").map_err(parse)?;
            let y = p.int("y").map_err(parse)?;
            p.finish().map_err(parse)?;
            let buffer = match buffer_id {
                0 => None,
                id => Some(
                    session
                        .guest
                        .lookup(id)
                        .filter(|b| !b.awaiting_ack.get())
                        .ok_or_else(|| {
                            relay::wrap_err(
                                Role::Guest,
                                ProtocolError::UnknownObjectArg {
                                    interface: "wl_surface",
                                    message: "attach",
                                    id,
                                },
                            )
                        })?,
                ),
            };
            Ok(SurfaceOp::Attach {
                buffer,
                x: session.scale_to_host(x),
                y: session.scale_to_host(y),
            })
        }
        // damage and offset carry surface-local coordinates.
        2 => {
            let mut p = MsgParser::new(msg);
            let x = p.int("x").map_err(parse)?;
            let y = p.int("y").map_err(parse)?;
            let width = p.int("width").map_err(parse)?;
            let height = p.int("height").map_err(parse)?;
            p.finish().map_err(parse)?;
            let mut out = MsgBuilder::new(twin.id, opcode);
            out.int(session.scale_to_host(x));
            out.int(session.scale_to_host(y));
            out.int(session.scale_to_host(width));
            out.int(session.scale_to_host(height));
            Ok(SurfaceOp::Forward {
                out: out.finish(),
                created: Vec::new(),
            })
        }
        10 => {
            let mut p = MsgParser::new(msg);
            let x = p.int("x").map_err(parse)?;
            let y = p.int("y").map_err(parse)?;
            p.finish().map_err(parse)?;
            let mut out = MsgBuilder::new(twin.id, opcode);
            out.int(session.scale_to_host(x));
            out.int(session.scale_to_host(y));
            Ok(SurfaceOp::Forward {
                out: out.finish(),
                created: Vec::new(),
            })
        }
        6 => Ok(SurfaceOp::Commit),
        // frame, regions, buffer transforms, damage_buffer: generic
        // translation. damage_buffer coordinates are buffer-local and are not
        // rescaled.
        _ => {
            let (out, created) =
                relay::translate_collect(session, surface, mspec, opcode, msg, fds)?;
            Ok(SurfaceOp::Forward { out, created })
        }
    }
}

fn execute(session: &Rc<Session>, surface: &Rc<Object>, op: SurfaceOp) -> Result<(), SessionError> {
    match op {
        SurfaceOp::Forward { out, .. } => {
            session.host.submit(out);
            Ok(())
        }
        SurfaceOp::Attach { buffer, x, y } => attach(session, surface, buffer, x, y),
        SurfaceOp::Commit => commit(session, surface),
    }
}

fn attach(
    session: &Rc<Session>,
    surface: &Rc<Object>,
    buffer: Option<Rc<Object>>,
    x: i32,
    y: i32,
) -> Result<(), SessionError> {
    let twin = surface
        .twin()
        .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
    let hidden = with_state(surface, |state| state.visibility == Visibility::Hide)
        .unwrap_or_default();
    let resolved = match &buffer {
        Some(buffer) if !hidden => Some(shm::resolve_attach(session, buffer)?),
        _ => None,
    };
    let (host_id, attached) = match resolved {
        Some(ResolvedBuffer::Direct { host_id }) => (host_id, None),
        Some(ResolvedBuffer::Virtwl {
            host_id,
            pool,
            range,
        }) => (host_id, Some(AttachedBuffer { pool, range })),
        None => (0, None),
    };
    with_state(surface, |state| state.attached = attached);
    let mut out = MsgBuilder::new(twin.id, 1);
    out.uint(host_id);
    out.int(x);
    out.int(y);
    session.host.submit(out.finish());
    Ok(())
}

fn commit(session: &Rc<Session>, surface: &Rc<Object>) -> Result<(), SessionError> {
    let attached = with_state(surface, |state| {
        state
            .attached
            .as_ref()
            .map(|a| (a.pool.clone(), a.range))
    })
    .flatten();
    if let Some((pool, range)) = attached {
        pool.copy_to_host(range);
    }
    let twin = surface
        .twin()
        .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
    session.host.submit(MsgBuilder::new(twin.id, 6).finish());
    Ok(())
}

fn destroy(
    session: &Rc<Session>,
    surface: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    let queue = with_state(surface, |state| {
        state.attached = None;
        match std::mem::replace(&mut state.lifecycle, Lifecycle::Destroyed) {
            Lifecycle::Unconfigured(queue) => queue,
            _ => VecDeque::new(),
        }
    })
    .unwrap_or_default();
    drop_queue(session, queue);
    if let Some(hooks) = session.hooks.clone() {
        hooks.on_destroy_surface(&SurfaceHandle {
            session: session.weak.clone(),
            surface: surface.clone(),
        });
    }
    relay::forward_request(session, surface, mspec, opcode, msg, fds)
}

/// Rolls back objects minted by requests that will never reach the host.
fn drop_queue(session: &Rc<Session>, queue: VecDeque<SurfaceOp>) {
    for op in queue {
        let SurfaceOp::Forward { created, .. } = op else {
            continue;
        };
        for guest_obj in created {
            if let Ok(twin) = guest_obj.any_twin() {
                session.host.remove(twin.id);
            }
            relay::delete_guest_object(session, &guest_obj);
        }
    }
}

/// Called by the Xwayland hook: the surface is configured and the deferral
/// queue is replayed in order.
pub(crate) fn set_configured(session: &Rc<Session>, surface: &Rc<Object>, visibility: Visibility) {
    let queue = with_state(surface, |state| {
        state.visibility = visibility;
        if matches!(state.lifecycle, Lifecycle::Destroyed) {
            return None;
        }
        match std::mem::replace(&mut state.lifecycle, Lifecycle::Ready) {
            Lifecycle::Unconfigured(queue) => Some(queue),
            _ => None,
        }
    })
    .flatten();
    // Cursor surfaces and hidden markers are not upscaled.
    if visibility == Visibility::Unmanaged
        && session.xscale().is_some()
        && let Ok(twin) = surface.twin()
    {
        send_buffer_scale(session, &twin, 1);
    }
    let Some(queue) = queue else {
        return;
    };
    for op in queue {
        if let Err(e) = execute(session, surface, op) {
            log::warn!(
                "Could not replay a deferred surface request: {}",
                error_reporter::Report::new(e),
            );
            return;
        }
    }
}

fn with_state<R>(surface: &Object, f: impl FnOnce(&mut SurfaceState) -> R) -> Option<R> {
    let data = &mut *surface.data.borrow_mut();
    match data {
        ObjectData::Surface(state) => Some(f(state)),
        _ => None,
    }
}
