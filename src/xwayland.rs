//! The Xwayland integration hooks consumed by the relay.
//!
//! Xwayland needs help from the process that supervises it: surfaces must not
//! reach the host until the X11 side has decided whether they are windows,
//! cursors, or override-redirect markers, and coordinates must be rescaled
//! between the X11 pixel space and the host's logical space. The supervisor
//! supplies an implementation of [`XwaylandHooks`] at session construction;
//! without one, none of this machinery engages.

use {
    crate::{
        object::{Object, ObjectData},
        session::Session,
        shell, surface,
        trans::OutMsg,
    },
    std::{
        any::Any,
        rc::{Rc, Weak},
    },
};

/// What the X11 side decided a surface is.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Visibility {
    /// A mapped window; relay its content.
    Show,
    /// An unmapped window; its buffers are withheld from the host.
    Hide,
    /// Not window-managed (cursor images and similar). Content is relayed
    /// but never upscaled.
    Unmanaged,
}

/// Callbacks into the Xwayland supervisor.
///
/// When hooks are installed, every new surface starts out unconfigured: its
/// requests are queued until the hook calls
/// [`SurfaceHandle::set_configured`]. An implementation that never configures
/// a surface starves it.
pub trait XwaylandHooks: 'static {
    /// The integer factor between X11 pixels and host logical coordinates.
    fn scale(&self) -> i32 {
        1
    }

    /// A guest surface was created.
    fn on_create_surface(&self, surface: &SurfaceHandle) {
        let _ = surface;
    }

    /// A guest surface was destroyed.
    fn on_destroy_surface(&self, surface: &SurfaceHandle) {
        let _ = surface;
    }

    /// The pointer entered a surface. The enter event is withheld until
    /// `forward` is delivered, allowing the supervisor to reorder focus
    /// changes around X11 state.
    fn on_pointer_entry(&self, surface: &SurfaceHandle, forward: ForwardEvent) {
        let _ = surface;
        forward.deliver();
    }

    /// The keyboard entered a surface. Same contract as
    /// [`XwaylandHooks::on_pointer_entry`].
    fn on_keyboard_entry(&self, surface: &SurfaceHandle, forward: ForwardEvent) {
        let _ = surface;
        forward.deliver();
    }

    /// The keyboard left a surface.
    fn on_keyboard_leave(&self, surface: &SurfaceHandle) {
        let _ = surface;
    }

    /// Hands the supervisor a [`Pinger`] with which it can check that the
    /// guest is still responsive.
    fn set_ping(&self, pinger: Pinger) {
        let _ = pinger;
    }
}

/// A handle to a relayed surface, passed to the surface hooks.
#[derive(Clone)]
pub struct SurfaceHandle {
    pub(crate) session: Weak<Session>,
    pub(crate) surface: Rc<Object>,
}

impl SurfaceHandle {
    /// Marks the surface as configured. Requests queued while the surface was
    /// unconfigured are replayed in order.
    pub fn set_configured(&self, visibility: Visibility) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        surface::set_configured(&session, &self.surface, visibility);
    }

    /// The id of the surface on the guest connection.
    pub fn guest_id(&self) -> u32 {
        self.surface.id
    }

    /// The id of the mirrored surface on the host connection.
    pub fn host_id(&self) -> Option<u32> {
        self.surface.twin.borrow().upgrade().map(|twin| twin.id)
    }

    /// Whether the two handles refer to the same surface.
    pub fn is_same(&self, other: &SurfaceHandle) -> bool {
        Rc::ptr_eq(&self.surface, &other.surface)
    }

    /// Attaches supervisor-owned data to the surface. It is dropped together
    /// with the surface.
    pub fn set_user_data(&self, data: Box<dyn Any>) {
        self.with_user_data(|slot| *slot = Some(data));
    }

    /// Grants access to the supervisor-owned data slot of the surface.
    pub fn with_user_data<R>(&self, f: impl FnOnce(&mut Option<Box<dyn Any>>) -> R) -> R {
        let data = &mut *self.surface.data.borrow_mut();
        let mut empty = None;
        let slot = match data {
            ObjectData::Surface(state) => &mut state.user,
            _ => &mut empty,
        };
        f(slot)
    }
}

/// A withheld input event. Dropping it without calling
/// [`ForwardEvent::deliver`] suppresses the event.
pub struct ForwardEvent {
    pub(crate) session: Weak<Session>,
    pub(crate) msg: OutMsg,
}

impl ForwardEvent {
    /// Delivers the withheld event to the guest.
    pub fn deliver(self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        session.submit_to_guest(self.msg);
    }
}

/// Pings the guest through its window-manager object.
pub struct Pinger {
    pub(crate) session: Weak<Session>,
}

impl Pinger {
    /// Sends a ping to the guest and runs `done` once the guest answers.
    ///
    /// If the guest has not bound a window manager yet there is nothing to
    /// ping; `done` runs immediately.
    pub fn ping(&self, done: Box<dyn FnOnce()>) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        shell::hook_ping(&session, done);
    }
}
