//! One side of a session: a socket, its buffers, and the object table.

use {
    crate::{
        object::{MIN_SERVER_ALLOCATED_ID, Object, Role},
        trans::{InBuf, OutBuf, OutMsg},
    },
    std::{
        cell::{Cell, RefCell},
        collections::{BTreeSet, HashMap},
        os::fd::OwnedFd,
        rc::Rc,
    },
};

pub(crate) struct Endpoint {
    pub(crate) role: Role,
    pub(crate) socket: Rc<OwnedFd>,
    pub(crate) objects: RefCell<HashMap<u32, Rc<Object>>>,
    ids: IdAllocator,
    pub(crate) incoming: RefCell<InBuf>,
    pub(crate) outgoing: RefCell<OutBuf>,
    /// The epoll interest currently installed for this socket.
    pub(crate) interest: Cell<u32>,
    /// Whether the socket has been registered with the poller yet. The guest
    /// socket is only registered once the host registry round-trip completes.
    pub(crate) registered: Cell<bool>,
}

impl Endpoint {
    pub(crate) fn new(role: Role, socket: OwnedFd) -> Rc<Self> {
        // The relay allocates ids from the client range on the host
        // connection (1 is the display) and from the server range on the
        // guest connection.
        let first_id = match role {
            Role::Host => 2,
            Role::Guest => MIN_SERVER_ALLOCATED_ID,
        };
        Rc::new(Self {
            role,
            socket: Rc::new(socket),
            objects: Default::default(),
            ids: IdAllocator::new(first_id),
            incoming: Default::default(),
            outgoing: Default::default(),
            interest: Cell::new(0),
            registered: Cell::new(false),
        })
    }

    pub(crate) fn lookup(&self, id: u32) -> Option<Rc<Object>> {
        self.objects.borrow().get(&id).cloned()
    }

    /// Inserts an object into the table. Returns false if the id is taken.
    pub(crate) fn insert(&self, obj: &Rc<Object>) -> bool {
        let objects = &mut *self.objects.borrow_mut();
        if objects.contains_key(&obj.id) {
            return false;
        }
        objects.insert(obj.id, obj.clone());
        true
    }

    /// Removes an object from the table and releases its id if the relay
    /// allocated it.
    pub(crate) fn remove(&self, id: u32) -> Option<Rc<Object>> {
        let obj = self.objects.borrow_mut().remove(&id)?;
        obj.live.set(false);
        if self.relay_allocated(id) {
            self.ids.release(id);
        }
        Some(obj)
    }

    pub(crate) fn allocate_id(&self) -> u32 {
        self.ids.acquire()
    }

    /// Whether the given id was minted by the relay on this connection.
    pub(crate) fn relay_allocated(&self, id: u32) -> bool {
        match self.role {
            Role::Host => id < MIN_SERVER_ALLOCATED_ID,
            Role::Guest => id >= MIN_SERVER_ALLOCATED_ID,
        }
    }

    /// Whether the peer of this connection is allowed to mint the given id.
    pub(crate) fn peer_may_allocate(&self, id: u32) -> bool {
        id != 0 && !self.relay_allocated(id)
    }

    pub(crate) fn submit(&self, msg: OutMsg) {
        self.outgoing.borrow_mut().submit(msg);
    }

    pub(crate) fn needs_flush(&self) -> bool {
        !self.outgoing.borrow().is_empty()
    }
}

/// Lowest-free id allocation, so that freed ids are reused the way the
/// protocol expects.
struct IdAllocator {
    next: Cell<u32>,
    free: RefCell<BTreeSet<u32>>,
}

impl IdAllocator {
    fn new(first: u32) -> Self {
        Self {
            next: Cell::new(first),
            free: Default::default(),
        }
    }

    fn acquire(&self) -> u32 {
        let free = &mut *self.free.borrow_mut();
        if let Some(id) = free.pop_first() {
            return id;
        }
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }

    fn release(&self, id: u32) {
        self.free.borrow_mut().insert(id);
    }
}
