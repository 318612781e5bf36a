//! A relayed session: one guest connection paired with one host connection.

use {
    crate::{
        clipname::ClipPrefix,
        endpoint::Endpoint,
        fixed::Fixed,
        object::{BindingError, Object, Role},
        poll::{self, PollError, PollEvent, Poller},
        registry::GlobalTable,
        relay,
        trans::{FlushResult, OutMsg, ParseError, TransError},
        virtio_gpu::VirtioGpu,
        xwayland::{Pinger, XwaylandHooks},
    },
    run_on_drop::on_drop,
    std::{
        cell::{Cell, RefCell},
        fmt::{Display, Formatter},
        io,
        os::fd::{AsFd, AsRawFd, OwnedFd},
        rc::{Rc, Weak},
        time::Duration,
    },
    thiserror::Error,
    uapi::c,
};

/// Static configuration of a session.
#[derive(Default)]
pub struct Config {
    /// Prepended to every window title the guest sets, so that guest windows
    /// are recognizable on the host.
    pub tag: String,
    /// The clipboard namespace prefix. `None` falls back to the
    /// `WAYLAND_PROXY_CLIPNAME` environment variable and then to
    /// `#PID<pid>#`; an empty string disables prefixing.
    pub clipname: Option<String>,
}

/// One side of the session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Peer {
    Host,
    Guest,
}

impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::Host => f.write_str("host compositor"),
            Peer::Guest => f.write_str("guest client"),
        }
    }
}

/// An error emitted by a [`Session`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct SessionError(#[from] pub(crate) SessionErrorKind);

#[derive(Debug, Error)]
pub(crate) enum SessionErrorKind {
    #[error("the session is already destroyed")]
    Destroyed,
    #[error("cannot perform recursive dispatch")]
    RecursiveCall,
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("could not make the {0} socket nonblocking")]
    Nonblock(Peer, #[source] io::Error),
    #[error("could not read from the {0} socket")]
    Read(Peer, #[source] TransError),
    #[error("could not write to the {0} socket")]
    Write(Peer, #[source] TransError),
    #[error("the guest violated the protocol")]
    Protocol(#[source] ProtocolError),
    #[error("the guest requested the unsupported feature: {0}")]
    Unsupported(&'static str),
    #[error("the host sent an invalid message")]
    HostMessage(#[source] ProtocolError),
    #[error("the host reported error {code} on {interface}#{id}: {message}")]
    HostDisplayError {
        interface: String,
        id: u32,
        code: u32,
        message: String,
    },
    #[error("could not allocate a host buffer of {0} bytes")]
    GpuAlloc(usize, #[source] io::Error),
    #[error("could not map a memory pool")]
    Map(#[source] io::Error),
}

/// An inconsistency between a message and the relay's object tables.
#[derive(Debug, Error)]
pub(crate) enum ProtocolError {
    #[error("there is no object with id {0}")]
    UnknownObject(u32),
    #[error("{interface} has no message {opcode}")]
    UnknownMessage {
        interface: &'static str,
        opcode: u32,
    },
    #[error("could not parse {interface}.{message}")]
    Parse {
        interface: &'static str,
        message: &'static str,
        #[source]
        source: ParseError,
    },
    #[error("object argument {id} of {interface}.{message} does not exist")]
    UnknownObjectArg {
        interface: &'static str,
        message: &'static str,
        id: u32,
    },
    #[error("an object argument has interface {actual} but {expected} was expected")]
    WrongInterface {
        actual: &'static str,
        expected: &'static str,
    },
    #[error("the id {0} is outside the range the sender may allocate")]
    IllegalNewId(u32),
    #[error("invalid {interface}.{message}: {detail}")]
    InvalidArgument {
        interface: &'static str,
        message: &'static str,
        detail: &'static str,
    },
    #[error("the id {0} is already in use")]
    IdInUse(u32),
    #[error("there is no global {0}")]
    UnknownGlobal(u32),
    #[error("global {name} is {advertised} but was bound as {requested}")]
    GlobalInterfaceMismatch {
        name: u32,
        advertised: &'static str,
        requested: String,
    },
    #[error("version {requested} of {interface} exceeds the advertised version {advertised}")]
    GlobalVersion {
        interface: &'static str,
        requested: u32,
        advertised: u32,
    },
    #[error(transparent)]
    Binding(#[from] BindingError),
}

const HOST_TOKEN: u64 = 0;
const GUEST_TOKEN: u64 = 1;

/// A relayed session.
///
/// Created with [`Session::builder`]. Sessions contain reference cycles that
/// are broken by [`Session::destroy`]; `destroy` runs automatically when
/// either peer closes its connection or a fatal error occurs.
pub struct Session {
    pub(crate) weak: Weak<Session>,
    poller: Poller,
    pub(crate) host: Rc<Endpoint>,
    pub(crate) guest: Rc<Endpoint>,
    pub(crate) config: Config,
    pub(crate) clip: ClipPrefix,
    pub(crate) gpu: Option<Rc<dyn VirtioGpu>>,
    pub(crate) hooks: Option<Rc<dyn XwaylandHooks>>,
    pub(crate) globals: RefCell<GlobalTable>,
    /// False until the host registry round-trip has completed; the guest
    /// socket is not serviced before that.
    pub(crate) setup_done: Cell<bool>,
    pub(crate) last_serial: Cell<u32>,
    pub(crate) next_ping_serial: Cell<u32>,
    /// Guest-side xdg_wm_base objects, used to route supervisor pings.
    pub(crate) wm_bases: RefCell<Vec<Weak<Object>>>,
    dispatching: Cell<bool>,
    destroyed: Cell<bool>,
}

/// Builds a [`Session`].
pub struct SessionBuilder {
    config: Config,
    gpu: Option<Rc<dyn VirtioGpu>>,
    hooks: Option<Rc<dyn XwaylandHooks>>,
}

impl SessionBuilder {
    /// Enables shm virtualization through the given virtio-gpu allocator.
    ///
    /// Without an allocator the relay runs in plain proxy mode and passes
    /// guest shm fds to the host unchanged.
    pub fn with_virtio_gpu(mut self, gpu: Rc<dyn VirtioGpu>) -> Self {
        self.gpu = Some(gpu);
        self
    }

    /// Installs Xwayland hooks. See [`crate::xwayland`].
    pub fn with_xwayland_hooks(mut self, hooks: Rc<dyn XwaylandHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Creates the session over the two connected sockets.
    ///
    /// `host_socket` must be connected to the host compositor, `guest_socket`
    /// to the guest client. Both are switched to nonblocking mode. This
    /// queues the host registry round-trip but performs no IO; drive the
    /// session with [`Session::dispatch`] or [`Session::run`].
    pub fn build(
        self,
        host_socket: OwnedFd,
        guest_socket: OwnedFd,
    ) -> Result<Rc<Session>, SessionError> {
        set_nonblocking(&host_socket, Peer::Host)?;
        set_nonblocking(&guest_socket, Peer::Guest)?;
        let poller = Poller::new().map_err(SessionErrorKind::Poll)?;
        let host = Endpoint::new(Role::Host, host_socket);
        let guest = Endpoint::new(Role::Guest, guest_socket);
        let session = Rc::new_cyclic(|weak| Session {
            weak: weak.clone(),
            poller,
            host,
            guest,
            clip: ClipPrefix::new(self.config.clipname.as_deref()),
            config: self.config,
            gpu: self.gpu,
            hooks: self.hooks,
            globals: RefCell::new(GlobalTable::default()),
            setup_done: Cell::new(false),
            last_serial: Cell::new(0),
            next_ping_serial: Cell::new(1),
            wm_bases: RefCell::new(Vec::new()),
            dispatching: Cell::new(false),
            destroyed: Cell::new(false),
        });
        session
            .poller
            .register(HOST_TOKEN, session.host.socket.as_fd(), poll::READABLE)
            .map_err(SessionErrorKind::Poll)?;
        session.host.registered.set(true);
        session.host.interest.set(poll::READABLE);
        crate::registry::start_setup(&session);
        if let Some(hooks) = &session.hooks {
            hooks.set_ping(Pinger {
                session: session.weak.clone(),
            });
        }
        Ok(session)
    }
}

fn set_nonblocking(socket: &OwnedFd, peer: Peer) -> Result<(), SessionError> {
    let res = uapi::fcntl_getfl(socket.as_raw_fd())
        .and_then(|fl| uapi::fcntl_setfl(socket.as_raw_fd(), fl | c::O_NONBLOCK));
    res.map_err(|e| SessionErrorKind::Nonblock(peer, e.into()).into())
}

impl Session {
    /// Creates a new [`SessionBuilder`].
    pub fn builder(config: Config) -> SessionBuilder {
        SessionBuilder {
            config,
            gpu: None,
            hooks: None,
        }
    }

    /// Relays messages until one peer closes its connection or a fatal error
    /// occurs. Returns which peer closed.
    pub fn run(self: &Rc<Self>) -> Result<Peer, SessionError> {
        loop {
            if let Some(peer) = self.dispatch(None)? {
                return Ok(peer);
            }
        }
    }

    /// Performs one dispatch iteration: flushes pending messages, waits up to
    /// `timeout` (indefinitely if `None`), then reads and handles incoming
    /// messages.
    ///
    /// Returns `Some(peer)` when a peer closed its connection; the session is
    /// destroyed in that case. This function is not reentrant.
    pub fn dispatch(self: &Rc<Self>, timeout: Option<Duration>) -> Result<Option<Peer>, SessionError> {
        if self.destroyed.get() {
            return Err(SessionErrorKind::Destroyed.into());
        }
        if self.dispatching.replace(true) {
            return Err(SessionErrorKind::RecursiveCall.into());
        }
        let clear_flag = on_drop(|| self.dispatching.set(false));
        let destroy_on_exit = on_drop(|| self.destroy());
        let res = self.dispatch_(timeout);
        match &res {
            Ok(None) => destroy_on_exit.forget(),
            Ok(Some(peer)) => log::info!("the {peer} closed the connection"),
            Err(_) => {}
        }
        drop(clear_flag);
        res
    }

    fn dispatch_(self: &Rc<Self>, timeout: Option<Duration>) -> Result<Option<Peer>, SessionError> {
        let timeout = timeout
            .and_then(|t| t.as_millis().try_into().ok())
            .unwrap_or(-1);
        if timeout != 0
            && let Some(peer) = self.flush_all()?
        {
            return Ok(Some(peer));
        }
        let mut events = [PollEvent::default(); poll::MAX_EVENTS];
        let n = self
            .poller
            .wait(timeout, &mut events)
            .map_err(SessionErrorKind::Poll)?;
        let mut closed = None;
        for event in &events[..n] {
            let (endpoint, peer) = match event.token {
                HOST_TOKEN => (&self.host, Peer::Host),
                GUEST_TOKEN => (&self.guest, Peer::Guest),
                _ => continue,
            };
            if event.events & (poll::READABLE | poll::ERROR) != 0
                && let Some(peer) = self.read_endpoint(endpoint, peer)?
            {
                closed = Some(peer);
                break;
            }
            if event.events & poll::WRITABLE != 0
                && let Some(peer) = self.flush_endpoint(endpoint, peer)?
            {
                closed = Some(peer);
                break;
            }
        }
        if closed.is_none() {
            closed = self.flush_all()?;
        }
        Ok(closed)
    }

    fn read_endpoint(
        self: &Rc<Self>,
        endpoint: &Rc<Endpoint>,
        peer: Peer,
    ) -> Result<Option<Peer>, SessionError> {
        let mut may_read = true;
        let incoming = &mut *endpoint.incoming.borrow_mut();
        let buffer = &mut incoming.buffer;
        let fds = &mut incoming.fds;
        loop {
            if self.destroyed.get() {
                return Ok(None);
            }
            let msg = match buffer.read_message(endpoint.socket.as_raw_fd(), &mut may_read, fds) {
                Ok(msg) => msg,
                Err(TransError::Closed) => return Ok(Some(peer)),
                Err(e) => return Err(SessionErrorKind::Read(peer, e).into()),
            };
            let Some(msg) = msg else {
                return Ok(None);
            };
            relay::handle_message(self, endpoint, msg, fds)?;
        }
    }

    fn flush_all(&self) -> Result<Option<Peer>, SessionError> {
        if let Some(peer) = self.flush_endpoint(&self.host, Peer::Host)? {
            return Ok(Some(peer));
        }
        self.flush_endpoint(&self.guest, Peer::Guest)
    }

    fn flush_endpoint(
        &self,
        endpoint: &Rc<Endpoint>,
        peer: Peer,
    ) -> Result<Option<Peer>, SessionError> {
        if !endpoint.needs_flush() {
            return Ok(None);
        }
        let res = endpoint
            .outgoing
            .borrow_mut()
            .flush(endpoint.socket.as_raw_fd());
        let interest = match res {
            Ok(FlushResult::Done) => poll::READABLE,
            Ok(FlushResult::Blocked) => poll::READABLE | poll::WRITABLE,
            Err(TransError::Closed) => return Ok(Some(peer)),
            Err(e) => return Err(SessionErrorKind::Write(peer, e).into()),
        };
        self.set_interest(endpoint, interest)?;
        Ok(None)
    }

    fn set_interest(&self, endpoint: &Rc<Endpoint>, interest: u32) -> Result<(), SessionError> {
        if !endpoint.registered.get() || endpoint.interest.get() == interest {
            return Ok(());
        }
        let token = match endpoint.role {
            Role::Host => HOST_TOKEN,
            Role::Guest => GUEST_TOKEN,
        };
        self.poller
            .update(token, endpoint.socket.as_fd(), interest)
            .map_err(SessionErrorKind::Poll)?;
        endpoint.interest.set(interest);
        Ok(())
    }

    /// Called by the registry once the host round-trip is complete; the guest
    /// socket joins the poll set.
    pub(crate) fn enable_guest(&self) -> Result<(), SessionError> {
        self.setup_done.set(true);
        self.poller
            .register(GUEST_TOKEN, self.guest.socket.as_fd(), poll::READABLE)
            .map_err(SessionErrorKind::Poll)?;
        self.guest.registered.set(true);
        self.guest.interest.set(poll::READABLE);
        Ok(())
    }

    /// Submits an event to the guest from outside the dispatch loop (deferred
    /// hook deliveries) and flushes it on a best-effort basis.
    pub(crate) fn submit_to_guest(&self, msg: OutMsg) {
        if self.destroyed.get() {
            return;
        }
        self.guest.submit(msg);
        if self.dispatching.get() {
            // The dispatch loop flushes before it returns.
            return;
        }
        if let Err(e) = self.flush_endpoint(&self.guest, Peer::Guest) {
            log::warn!(
                "Could not flush the guest socket: {}",
                error_reporter::Report::new(e),
            );
        }
    }

    /// A file descriptor that becomes readable when the session should be
    /// dispatched. For integration into external event loops.
    pub fn poll_fd(&self) -> &Rc<OwnedFd> {
        self.poller.fd()
    }

    /// The most recent input serial seen on this session.
    pub fn last_input_serial(&self) -> u32 {
        self.last_serial.get()
    }

    pub(crate) fn note_serial(&self, serial: u32) {
        self.last_serial.set(serial);
    }

    /// The endpoint opposite to `endpoint`.
    pub(crate) fn other(&self, endpoint: &Endpoint) -> &Rc<Endpoint> {
        match endpoint.role {
            Role::Host => &self.guest,
            Role::Guest => &self.host,
        }
    }

    pub(crate) fn endpoint_of(&self, role: Role) -> &Rc<Endpoint> {
        match role {
            Role::Host => &self.host,
            Role::Guest => &self.guest,
        }
    }

    /// The Xwayland scale factor, if hooks are installed and scaling is
    /// active.
    pub(crate) fn xscale(&self) -> Option<i32> {
        let hooks = self.hooks.as_ref()?;
        let scale = hooks.scale();
        (scale > 1).then_some(scale)
    }

    /// Converts a guest-side coordinate to the host's logical space.
    pub(crate) fn scale_to_host(&self, val: i32) -> i32 {
        match self.xscale() {
            Some(s) => val / s,
            None => val,
        }
    }

    /// Converts a host-side coordinate to the guest's pixel space.
    pub(crate) fn scale_to_client(&self, val: i32) -> i32 {
        match self.xscale() {
            Some(s) => val.saturating_mul(s),
            None => val,
        }
    }

    /// Converts a host-side fixed-point coordinate to the guest's pixel
    /// space.
    pub(crate) fn point_to_client(&self, val: Fixed) -> Fixed {
        match self.xscale() {
            Some(s) => val.scale_up(s),
            None => val,
        }
    }

    /// Whether the session is destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Destroys the session: both sockets leave the poll set, all object
    /// tables are cleared, and pool resources are released.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        for endpoint in [&self.host, &self.guest] {
            if endpoint.registered.replace(false) {
                self.poller.unregister(endpoint.socket.as_raw_fd());
            }
            let objects = std::mem::take(&mut *endpoint.objects.borrow_mut());
            for obj in objects.into_values() {
                obj.live.set(false);
                *obj.twin.borrow_mut() = Weak::new();
                obj.data.take();
            }
        }
        self.wm_bases.borrow_mut().clear();
    }
}
