//! In-process fakes for driving a session in tests.
//!
//! Everything is single-threaded: the session is created over socketpairs, a
//! scripted host compositor and guest client sit on the far ends, and tests
//! pump all three with zero-timeout dispatches until the pipes drain.

use {
    crate::{
        fixed::Fixed,
        protocols::{ArgSpec, Interface},
        session::{Config, Peer, Session, SessionError},
        trans::{FlushResult, InBuf, MsgBuilder, MsgParser},
        xwayland::XwaylandHooks,
    },
    log::LevelFilter,
    std::{
        collections::HashMap,
        os::fd::{AsRawFd, OwnedFd},
        rc::Rc,
        time::Duration,
    },
    uapi::c,
};

pub(crate) mod fake_gpu;
pub(crate) mod fake_guest;
pub(crate) mod fake_host;

pub(crate) use {fake_gpu::FakeGpu, fake_guest::FakeGuest, fake_host::FakeHost};

pub(crate) fn install_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

/// An argument of a scripted message.
pub(crate) enum Arg {
    Uint(u32),
    Int(i32),
    Fixed(Fixed),
    Str(String),
    Arr(Vec<u8>),
    Fd(Rc<OwnedFd>),
    /// Writes the id and registers the interface for it.
    NewId(u32, Interface),
}

/// A message received by one of the fakes.
#[derive(Debug)]
pub(crate) struct Recorded {
    pub(crate) interface: Interface,
    pub(crate) object: u32,
    pub(crate) message: &'static str,
    pub(crate) args: Vec<RecordedArg>,
}

#[derive(Debug)]
pub(crate) enum RecordedArg {
    Uint(u32),
    Int(i32),
    Fixed(Fixed),
    Str(String),
    Arr(Vec<u8>),
    Fd(Rc<OwnedFd>),
}

impl RecordedArg {
    pub(crate) fn uint(&self) -> u32 {
        match self {
            RecordedArg::Uint(v) => *v,
            _ => panic!("argument is not a uint: {self:?}"),
        }
    }

    pub(crate) fn int(&self) -> i32 {
        match self {
            RecordedArg::Int(v) => *v,
            _ => panic!("argument is not an int: {self:?}"),
        }
    }

    pub(crate) fn fixed(&self) -> Fixed {
        match self {
            RecordedArg::Fixed(v) => *v,
            _ => panic!("argument is not fixed: {self:?}"),
        }
    }

    pub(crate) fn str(&self) -> &str {
        match self {
            RecordedArg::Str(v) => v,
            _ => panic!("argument is not a string: {self:?}"),
        }
    }

    pub(crate) fn fd(&self) -> &Rc<OwnedFd> {
        match self {
            RecordedArg::Fd(v) => v,
            _ => panic!("argument is not an fd: {self:?}"),
        }
    }
}

/// One end of a scripted connection.
pub(crate) struct Conn {
    pub(crate) socket: OwnedFd,
    pub(crate) incoming: InBuf,
    outgoing: crate::trans::OutBuf,
    /// Interfaces of all known objects on this connection.
    pub(crate) objects: HashMap<u32, Interface>,
}

impl Conn {
    pub(crate) fn new(socket: OwnedFd) -> Self {
        let mut objects = HashMap::new();
        objects.insert(1, Interface::WlDisplay);
        Self {
            socket,
            incoming: InBuf::default(),
            outgoing: Default::default(),
            objects,
        }
    }

    pub(crate) fn send(&mut self, object: u32, opcode: u32, args: &[Arg]) {
        let mut out = MsgBuilder::new(object, opcode);
        for arg in args {
            match arg {
                Arg::Uint(v) => out.uint(*v),
                Arg::Int(v) => out.int(*v),
                Arg::Fixed(v) => out.fixed(*v),
                Arg::Str(v) => out.string(v),
                Arg::Arr(v) => out.array(v),
                Arg::Fd(v) => out.fd(v.clone()),
                Arg::NewId(id, interface) => {
                    self.objects.insert(*id, *interface);
                    out.uint(*id)
                }
            };
        }
        self.outgoing.submit(out.finish());
        self.flush();
    }

    pub(crate) fn flush(&mut self) {
        for _ in 0..64 {
            match self.outgoing.flush(self.socket.as_raw_fd()) {
                Ok(FlushResult::Done) => return,
                Ok(FlushResult::Blocked) => continue,
                Err(e) => panic!("could not flush a test connection: {e}"),
            }
        }
    }

    /// Drains all complete messages into owned word vectors.
    pub(crate) fn drain(&mut self) -> Vec<Vec<u32>> {
        let mut msgs = Vec::new();
        loop {
            let mut may_read = true;
            let mut got = false;
            loop {
                let msg = self
                    .incoming
                    .buffer
                    .read_message(self.socket.as_raw_fd(), &mut may_read, &mut self.incoming.fds)
                    .expect("could not read from a test connection");
                let Some(msg) = msg else {
                    break;
                };
                msgs.push(msg.to_vec());
                got = true;
            }
            if !got {
                return msgs;
            }
        }
    }

    /// Parses a drained message against the signature tables. Returns the
    /// record and any objects created by new-id arguments.
    pub(crate) fn parse(&mut self, msg: &[u32], requests: bool) -> Recorded {
        let id = msg[0];
        let opcode = (msg[1] & 0xffff) as usize;
        let interface = *self
            .objects
            .get(&id)
            .unwrap_or_else(|| panic!("message for unknown object {id}"));
        let specs = if requests {
            interface.spec().requests
        } else {
            interface.spec().events
        };
        let mspec = &specs[opcode];
        let mut p = MsgParser::new(msg);
        let mut args = Vec::new();
        for arg in mspec.args {
            let parsed = match arg {
                ArgSpec::Int => RecordedArg::Int(p.int("arg").unwrap()),
                ArgSpec::Uint => RecordedArg::Uint(p.uint("arg").unwrap()),
                ArgSpec::Fixed => RecordedArg::Fixed(p.fixed("arg").unwrap()),
                ArgSpec::Str { .. } => RecordedArg::Str(
                    p.string_opt("arg").unwrap().unwrap_or_default().to_string(),
                ),
                ArgSpec::Array => RecordedArg::Arr(p.array("arg").unwrap().to_vec()),
                ArgSpec::Fd => RecordedArg::Fd(p.fd(&mut self.incoming.fds, "arg").unwrap()),
                ArgSpec::Object { .. } => RecordedArg::Uint(p.uint("arg").unwrap()),
                ArgSpec::NewId {
                    interface: Some(new_interface),
                } => {
                    let new_id = p.uint("arg").unwrap();
                    self.objects.insert(new_id, *new_interface);
                    RecordedArg::Uint(new_id)
                }
                ArgSpec::NewId { interface: None } => {
                    // wl_registry.bind: interface string and version precede.
                    unreachable!("bind is parsed by the fake host");
                }
            };
            args.push(parsed);
        }
        Recorded {
            interface,
            object: id,
            message: mspec.name,
            args,
        }
    }
}

/// A guest-side shm file: the returned mapping lets the test write pixels,
/// the fd is what the guest sends in `wl_shm.create_pool`.
pub(crate) fn shm_file(size: usize) -> (memmap2::MmapMut, Rc<OwnedFd>) {
    let fd = uapi::memfd_create("wl-relay-test-shm", c::MFD_CLOEXEC).unwrap();
    let file = std::fs::File::from(OwnedFd::from(fd));
    file.set_len(size as u64).unwrap();
    // SAFETY: The mapping is private to the test.
    let map = unsafe { memmap2::MmapOptions::new().len(size).map_mut(&file).unwrap() };
    (map, Rc::new(file.into()))
}

pub(crate) fn socketpair() -> (OwnedFd, OwnedFd) {
    let (a, b) = uapi::socketpair(
        c::AF_UNIX,
        c::SOCK_STREAM | c::SOCK_NONBLOCK | c::SOCK_CLOEXEC,
        0,
    )
    .unwrap();
    (a.into(), b.into())
}

/// A session wired up to a scripted host and guest.
pub(crate) struct TestSetup {
    pub(crate) session: Rc<Session>,
    pub(crate) host: FakeHost,
    pub(crate) guest: FakeGuest,
    pub(crate) gpu: Option<Rc<FakeGpu>>,
}

pub(crate) struct SetupOpts {
    pub(crate) config: Config,
    pub(crate) gpu: bool,
    pub(crate) hooks: Option<Rc<dyn XwaylandHooks>>,
}

impl Default for SetupOpts {
    fn default() -> Self {
        Self {
            config: Config::default(),
            gpu: false,
            hooks: None,
        }
    }
}

pub(crate) fn setup() -> TestSetup {
    setup_with(SetupOpts::default())
}

pub(crate) fn setup_virtwl() -> TestSetup {
    setup_with(SetupOpts {
        gpu: true,
        ..Default::default()
    })
}

/// Creates a session between a standard fake host and a fake guest.
pub(crate) fn setup_with(opts: SetupOpts) -> TestSetup {
    install_logger();
    let (host_relay, host_fake) = socketpair();
    let (guest_relay, guest_fake) = socketpair();
    let host = FakeHost::new(host_fake);
    let guest = FakeGuest::new(guest_fake);
    let mut builder = Session::builder(opts.config);
    let gpu = opts.gpu.then(|| Rc::new(FakeGpu::default()));
    if let Some(gpu) = &gpu {
        builder = builder.with_virtio_gpu(gpu.clone());
    }
    if let Some(hooks) = opts.hooks {
        builder = builder.with_xwayland_hooks(hooks);
    }
    let session = builder.build(host_relay, guest_relay).unwrap();
    let mut setup = TestSetup {
        session,
        host,
        guest,
        gpu,
    };
    setup.pump();
    setup
}

impl TestSetup {
    /// Alternates the three actors until everything is quiescent.
    pub(crate) fn pump(&mut self) {
        for _ in 0..8 {
            if !self.session.is_destroyed() {
                let _ = self.session.dispatch(Some(Duration::ZERO));
            }
            self.host.pump();
            self.guest.pump();
        }
    }

    /// Pumps and expects the session to die with an error.
    pub(crate) fn pump_err(&mut self) -> SessionError {
        for _ in 0..8 {
            self.host.pump();
            self.guest.pump();
            match self.session.dispatch(Some(Duration::ZERO)) {
                Ok(Some(Peer::Host)) => panic!("the host closed instead of an error"),
                Ok(Some(Peer::Guest)) => panic!("the guest closed instead of an error"),
                Ok(None) => {}
                Err(e) => return e,
            }
        }
        panic!("the session did not fail");
    }
}
