use {
    error_reporter::Report,
    std::{
        io,
        os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd},
        rc::Rc,
    },
    thiserror::Error,
    uapi::{Errno, c},
};

#[derive(Debug, Error)]
pub(crate) enum PollError {
    #[error("could not create epoll fd")]
    Create(#[source] io::Error),
    #[error("could not read epoll events")]
    Read(#[source] io::Error),
    #[error("could not register socket with epoll")]
    Add(#[source] io::Error),
    #[error("could not update epoll interests")]
    Update(#[source] io::Error),
}

pub(crate) const MAX_EVENTS: usize = 4;

pub(crate) const READABLE: u32 = c::EPOLLIN as u32;
pub(crate) const WRITABLE: u32 = c::EPOLLOUT as u32;
pub(crate) const ERROR: u32 = (c::EPOLLERR | c::EPOLLHUP) as u32;

#[derive(Copy, Clone, Default)]
pub(crate) struct PollEvent {
    pub(crate) token: u64,
    pub(crate) events: u32,
}

/// Level-triggered poller for the two session endpoints.
pub(crate) struct Poller {
    epoll: Rc<OwnedFd>,
}

impl Poller {
    pub(crate) fn new() -> Result<Self, PollError> {
        let epoll =
            uapi::epoll_create1(c::EPOLL_CLOEXEC).map_err(|e| PollError::Create(e.into()))?;
        Ok(Self {
            epoll: Rc::new(epoll.into()),
        })
    }

    pub(crate) fn fd(&self) -> &Rc<OwnedFd> {
        &self.epoll
    }

    pub(crate) fn wait(
        &self,
        timeout: c::c_int,
        events: &mut [PollEvent; MAX_EVENTS],
    ) -> Result<usize, PollError> {
        loop {
            let mut epe = [c::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
            let n = match uapi::epoll_wait(self.epoll.as_raw_fd(), &mut epe, timeout) {
                Ok(n) => n,
                Err(Errno(c::EINTR)) => continue,
                Err(e) => return Err(PollError::Read(e.into())),
            };
            for i in 0..n {
                events[i] = PollEvent {
                    token: epe[i].u64,
                    events: epe[i].events,
                };
            }
            return Ok(n);
        }
    }

    pub(crate) fn register(
        &self,
        token: u64,
        fd: BorrowedFd<'_>,
        interest: u32,
    ) -> Result<(), PollError> {
        let event = c::epoll_event {
            events: interest,
            u64: token,
        };
        uapi::epoll_ctl(
            self.epoll.as_raw_fd(),
            c::EPOLL_CTL_ADD,
            fd.as_raw_fd(),
            Some(&event),
        )
        .map_err(|e| PollError::Add(e.into()))
    }

    pub(crate) fn update(
        &self,
        token: u64,
        fd: BorrowedFd<'_>,
        interest: u32,
    ) -> Result<(), PollError> {
        let event = c::epoll_event {
            events: interest,
            u64: token,
        };
        uapi::epoll_ctl(
            self.epoll.as_raw_fd(),
            c::EPOLL_CTL_MOD,
            fd.as_raw_fd(),
            Some(&event),
        )
        .map_err(|e| PollError::Update(e.into()))
    }

    pub(crate) fn unregister(&self, fd: RawFd) {
        let res = uapi::epoll_ctl(self.epoll.as_raw_fd(), c::EPOLL_CTL_DEL, fd, None);
        if let Err(e) = res {
            log::warn!(
                "Could not remove a file descriptor from epoll: {}",
                Report::new(io::Error::from(e)),
            );
        }
    }
}
