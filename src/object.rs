//! Relayed objects and the guest↔host bindings between them.
//!
//! Every logical entity the guest creates exists twice: once as the object the
//! guest addresses on its connection and once as the twin the relay created on
//! the host connection. The two sides are linked through weak sibling
//! references; each endpoint's object table holds the owning references.

use {
    crate::{
        protocols::Interface, shell::WmBaseState, shm::BufferState, shm::ShmPool,
        surface::SurfaceState,
    },
    std::{
        cell::{Cell, RefCell},
        rc::{Rc, Weak},
    },
    thiserror::Error,
};


/// Ids above this value are allocated by the server side of a connection.
///
/// On the guest connection the relay is the server, so ids it mints for
/// host-initiated objects are in this range. On the host connection the host
/// compositor mints event-created ids in this range.
pub(crate) const MIN_SERVER_ALLOCATED_ID: u32 = 0xff00_0000;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Role {
    /// Faces the guest client; the relay acts as the server.
    Guest,
    /// Faces the host compositor; the relay acts as a client.
    Host,
}

#[derive(Debug, Error)]
pub(crate) enum BindingError {
    #[error("{interface}#{id} has no live twin")]
    NoTwin { interface: &'static str, id: u32 },
    #[error("generic translation used on a {interface}#{id} cross-interface pair")]
    CrossPair { interface: &'static str, id: u32 },
}

/// One side of a relayed object.
#[derive(Debug)]
pub(crate) struct Object {
    pub(crate) role: Role,
    pub(crate) interface: Interface,
    pub(crate) version: u32,
    pub(crate) id: u32,
    /// Cleared when the object is removed from its endpoint table.
    pub(crate) live: Cell<bool>,
    /// The destructor was forwarded to the host; the guest side stays alive
    /// until the host confirms with wl_display.delete_id.
    pub(crate) awaiting_ack: Cell<bool>,
    /// The twin has a different interface (gtk↔zwp primary selection).
    pub(crate) cross_pair: Cell<bool>,
    pub(crate) twin: RefCell<Weak<Object>>,
    pub(crate) data: RefCell<ObjectData>,
}

/// Per-object relay state, dispatched by pattern matching at the relay
/// boundary.
#[derive(Default, Debug)]
pub(crate) enum ObjectData {
    #[default]
    None,
    /// A guest-facing registry. Fully synthetic; has no host twin.
    Registry,
    /// The callback that completes the host registry round-trip at startup.
    SetupCallback,
    Surface(SurfaceState),
    Pool(Rc<ShmPool>),
    Buffer(BufferState),
    WmBase(WmBaseState),
}

impl Object {
    pub(crate) fn new(role: Role, interface: Interface, version: u32, id: u32) -> Rc<Self> {
        Rc::new(Self {
            role,
            interface,
            version,
            id,
            live: Cell::new(true),
            awaiting_ack: Cell::new(false),
            cross_pair: Cell::new(false),
            twin: RefCell::new(Weak::new()),
            data: RefCell::new(ObjectData::None),
        })
    }

    /// Links a guest-side object and its host-side twin. Pairs whose
    /// interfaces differ are flagged and excluded from generic translation.
    pub(crate) fn link(guest: &Rc<Object>, host: &Rc<Object>) {
        debug_assert_eq!(guest.role, Role::Guest);
        debug_assert_eq!(host.role, Role::Host);
        debug_assert_eq!(guest.version, host.version);
        *guest.twin.borrow_mut() = Rc::downgrade(host);
        *host.twin.borrow_mut() = Rc::downgrade(guest);
        if guest.interface != host.interface {
            guest.cross_pair.set(true);
            host.cross_pair.set(true);
        }
    }

    /// The twin object, for use by the generic forwarding path. Fails on
    /// cross-interface pairs, which only the selection relay may follow.
    pub(crate) fn twin(&self) -> Result<Rc<Object>, BindingError> {
        if self.cross_pair.get() {
            return Err(BindingError::CrossPair {
                interface: self.interface.name(),
                id: self.id,
            });
        }
        self.any_twin()
    }

    /// The twin object regardless of the cross-interface flag. The selection
    /// relay uses this to follow gtk↔zwp pairs.
    pub(crate) fn any_twin(&self) -> Result<Rc<Object>, BindingError> {
        self.twin.borrow().upgrade().ok_or(BindingError::NoTwin {
            interface: self.interface.name(),
            id: self.id,
        })
    }

    pub(crate) fn has_twin(&self) -> bool {
        self.twin.borrow().strong_count() > 0
    }
}

/// Returns the host-side twin of a guest-side object.
pub(crate) fn to_host(obj: &Object) -> Result<Rc<Object>, BindingError> {
    debug_assert_eq!(obj.role, Role::Guest);
    obj.twin()
}

/// Returns the guest-side twin of a host-side object.
pub(crate) fn to_guest(obj: &Object) -> Result<Rc<Object>, BindingError> {
    debug_assert_eq!(obj.role, Role::Host);
    obj.twin()
}
