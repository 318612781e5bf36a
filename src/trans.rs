//! Wire transport: message framing and file-descriptor passing.
//!
//! Messages are streams of 32-bit words with a two-word header
//! `[object id, size << 16 | opcode]`. File descriptors travel out of band
//! via `SCM_RIGHTS` and are matched to messages by queue order.

use {
    crate::fixed::Fixed,
    isnt::std_1::primitive::IsntSliceExt,
    smallvec::SmallVec,
    std::{
        collections::VecDeque,
        io,
        mem::{self, MaybeUninit},
        os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
        rc::Rc,
        slice,
    },
    thiserror::Error,
    uapi::{Errno, Msghdr, MsghdrMut, c, sockaddr_none_mut, sockaddr_none_ref},
};

#[cfg(test)]
mod tests;

const WORD_SIZE: usize = size_of::<u32>();
pub(crate) const MAX_MESSAGE_SIZE: usize = 4096;
const MAX_MESSAGE_WORDS: usize = MAX_MESSAGE_SIZE / WORD_SIZE;
const IN_BUFFER_WORDS: usize = MAX_MESSAGE_WORDS * 2;
const HEADER_WORDS: usize = 2;
const HEADER_SIZE: usize = HEADER_WORDS * WORD_SIZE;
const MAX_FDS_PER_SEND: usize = 28;

#[derive(Debug, Error)]
pub enum TransError {
    #[error("failed to read from the socket")]
    ReadFromSocket(#[source] io::Error),
    #[error("failed to write to the socket")]
    WriteToSocket(#[source] io::Error),
    #[error("the connection is closed")]
    Closed,
    #[error("message has a supposed length {0} < {HEADER_SIZE}")]
    MessageTooSmall(usize),
    #[error("message has a supposed length {0} > {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),
    #[error("message has a supposed length {0} that is not a multiple of {WORD_SIZE}")]
    MessageNotAligned(usize),
}

/// Receive-side state of one socket: a bounded word buffer and the queue of
/// received but not yet claimed file descriptors. The two halves are separate
/// fields so that a borrowed message and the fd queue can be used together.
#[derive(Default)]
pub(crate) struct InBuf {
    pub(crate) buffer: InputBuffer,
    pub(crate) fds: VecDeque<Rc<OwnedFd>>,
}

pub(crate) struct InputBuffer {
    buffer: Box<[u32; IN_BUFFER_WORDS]>,
    valid_from_word: usize,
    valid_bytes: usize,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self {
            buffer: Box::new([0; IN_BUFFER_WORDS]),
            valid_from_word: 0,
            valid_bytes: 0,
        }
    }
}

impl InputBuffer {
    /// Extracts the next complete message, reading from the socket at most
    /// once per batch. `may_read` should start out true and is cleared by the
    /// first read attempt.
    pub(crate) fn read_message(
        &mut self,
        socket: RawFd,
        may_read: &mut bool,
        fds: &mut VecDeque<Rc<OwnedFd>>,
    ) -> Result<Option<&[u32]>, TransError> {
        if self.valid_bytes == 0 {
            self.valid_from_word = 0;
        }
        if self.valid_from_word + HEADER_WORDS > IN_BUFFER_WORDS {
            self.compact();
        }
        if self.valid_bytes < HEADER_SIZE {
            if mem::take(may_read) {
                self.read_from_socket(socket, fds)?;
            }
            if self.valid_bytes < HEADER_SIZE {
                return Ok(None);
            }
        }
        let size = (self.buffer[self.valid_from_word + 1] >> 16) as usize;
        if size < HEADER_SIZE {
            return Err(TransError::MessageTooSmall(size));
        }
        if size > MAX_MESSAGE_SIZE {
            return Err(TransError::MessageTooLarge(size));
        }
        if size % WORD_SIZE != 0 {
            return Err(TransError::MessageNotAligned(size));
        }
        let size_words = size / WORD_SIZE;
        if self.valid_from_word + size_words > IN_BUFFER_WORDS {
            self.compact();
        }
        if size > self.valid_bytes {
            if mem::take(may_read) {
                self.read_from_socket(socket, fds)?;
            }
            if size > self.valid_bytes {
                return Ok(None);
            }
        }
        let start = self.valid_from_word;
        let end = start + size_words;
        self.valid_from_word += size_words;
        self.valid_bytes -= size;
        Ok(Some(&self.buffer[start..end]))
    }

    fn compact(&mut self) {
        let start = self.valid_from_word * WORD_SIZE;
        let buf = uapi::as_bytes_mut(&mut self.buffer[..]);
        buf.copy_within(start..start + self.valid_bytes, 0);
        self.valid_from_word = 0;
    }

    fn read_from_socket(
        &mut self,
        socket: RawFd,
        fds: &mut VecDeque<Rc<OwnedFd>>,
    ) -> Result<(), TransError> {
        let mut iovec = &mut uapi::as_bytes_mut(&mut self.buffer[self.valid_from_word..])
            [self.valid_bytes..];
        if iovec.is_empty() {
            return Ok(());
        }
        let mut control_buf = [0u8; 256];
        let mut header = MsghdrMut {
            iov: slice::from_mut(&mut iovec),
            control: Some(&mut control_buf),
            name: sockaddr_none_mut(),
            flags: 0,
        };
        let (init, _, mut control) =
            match uapi::recvmsg(socket, &mut header, c::MSG_CMSG_CLOEXEC | c::MSG_DONTWAIT) {
                Ok(r) => r,
                Err(e) if e.0 == c::EAGAIN => return Ok(()),
                Err(Errno(c::ECONNRESET)) => return Err(TransError::Closed),
                Err(e) => {
                    return Err(TransError::ReadFromSocket(io::Error::from_raw_os_error(
                        e.0,
                    )));
                }
            };
        if init.is_empty() && control.is_empty() {
            return Err(TransError::Closed);
        }
        self.valid_bytes += init.len();
        while control.is_not_empty() {
            let (_, hdr, data) = uapi::cmsg_read(&mut control).unwrap();
            if hdr.cmsg_level != c::SOL_SOCKET || hdr.cmsg_type != c::SCM_RIGHTS {
                continue;
            }
            for fd in uapi::pod_iter::<RawFd, _>(data).unwrap() {
                // SAFETY: The kernel guarantees that fd is valid.
                unsafe {
                    fds.push_back(Rc::new(OwnedFd::from_raw_fd(fd)));
                }
            }
        }
        Ok(())
    }
}

#[derive(Eq, PartialEq, Debug)]
pub(crate) enum FlushResult {
    Done,
    Blocked,
}

/// Send-side state of one socket. Messages accumulate in a word vector and
/// are written out with all pending file descriptors attached to the next
/// successful `sendmsg`.
#[derive(Default)]
pub(crate) struct OutBuf {
    words: Vec<u32>,
    valid_from_byte: usize,
    fds: VecDeque<Rc<OwnedFd>>,
}

impl OutBuf {
    pub(crate) fn submit(&mut self, msg: OutMsg) {
        self.words.extend_from_slice(&msg.words);
        self.fds.extend(msg.fds);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.valid_from_byte == self.words.len() * WORD_SIZE && self.fds.is_empty()
    }

    pub(crate) fn flush(&mut self, socket: RawFd) -> Result<FlushResult, TransError> {
        loop {
            let end = self.words.len() * WORD_SIZE;
            if self.valid_from_byte == end {
                self.words.clear();
                self.valid_from_byte = 0;
                return Ok(FlushResult::Done);
            }
            let num_fds = self.fds.len().min(MAX_FDS_PER_SEND);
            let mut control_buf = SmallVec::<[MaybeUninit<u8>; 256]>::new();
            let mut control = None;
            if num_fds > 0 {
                let data_len = size_of::<RawFd>() * num_fds;
                let cmsg_space = uapi::cmsg_space(data_len);
                control_buf.reserve_exact(cmsg_space);
                // SAFETY: control_buf contains only MaybeUninit elements.
                unsafe {
                    control_buf.set_len(cmsg_space);
                }
                let hdr = c::cmsghdr {
                    cmsg_len: 0,
                    cmsg_level: c::SOL_SOCKET,
                    cmsg_type: c::SCM_RIGHTS,
                };
                let mut fds = SmallVec::<[RawFd; MAX_FDS_PER_SEND]>::new();
                for fd in self.fds.iter().take(num_fds) {
                    fds.push(fd.as_raw_fd());
                }
                let mut buf = &mut control_buf[..];
                uapi::cmsg_write(&mut buf, hdr, &fds[..]).unwrap();
                control = Some(&control_buf[..]);
            }
            let buf = &uapi::as_bytes(&self.words[..])[self.valid_from_byte..end];
            let msghdr = Msghdr {
                iov: slice::from_ref(&buf),
                control,
                name: sockaddr_none_ref(),
            };
            match uapi::sendmsg(socket, &msghdr, c::MSG_NOSIGNAL | c::MSG_DONTWAIT) {
                Ok(n) => {
                    self.fds.drain(..num_fds);
                    self.valid_from_byte += n;
                }
                Err(e) if e.0 == c::EAGAIN => return Ok(FlushResult::Blocked),
                Err(Errno(c::ECONNRESET)) => return Err(TransError::Closed),
                Err(Errno(c::EPIPE)) => return Err(TransError::Closed),
                Err(e) => {
                    return Err(TransError::WriteToSocket(io::Error::from_raw_os_error(
                        e.0,
                    )));
                }
            }
        }
    }
}

/// A complete outgoing message.
pub(crate) struct OutMsg {
    pub(crate) words: Vec<u32>,
    pub(crate) fds: Vec<Rc<OwnedFd>>,
}

/// Serializes one message. The size field of the header is patched in by
/// [`MsgBuilder::finish`].
pub(crate) struct MsgBuilder {
    words: Vec<u32>,
    fds: Vec<Rc<OwnedFd>>,
}

impl MsgBuilder {
    pub(crate) fn new(object_id: u32, opcode: u32) -> Self {
        debug_assert!(opcode < 1 << 16);
        Self {
            words: vec![object_id, opcode],
            fds: Vec::new(),
        }
    }

    pub(crate) fn uint(&mut self, val: u32) -> &mut Self {
        self.words.push(val);
        self
    }

    pub(crate) fn int(&mut self, val: i32) -> &mut Self {
        self.words.push(val as u32);
        self
    }

    pub(crate) fn fixed(&mut self, val: Fixed) -> &mut Self {
        self.words.push(val.to_wire() as u32);
        self
    }

    pub(crate) fn string(&mut self, val: &str) -> &mut Self {
        let len = val.len() + 1;
        self.words.push(len as u32);
        let start = self.words.len();
        self.words.resize(start + len.div_ceil(WORD_SIZE), 0);
        uapi::as_bytes_mut(&mut self.words[start..])[..val.len()].copy_from_slice(val.as_bytes());
        self
    }

    pub(crate) fn array(&mut self, val: &[u8]) -> &mut Self {
        self.words.push(val.len() as u32);
        let start = self.words.len();
        self.words.resize(start + val.len().div_ceil(WORD_SIZE), 0);
        uapi::as_bytes_mut(&mut self.words[start..])[..val.len()].copy_from_slice(val);
        self
    }

    /// Copies already-serialized argument words verbatim.
    pub(crate) fn copy_words(&mut self, words: &[u32]) -> &mut Self {
        self.words.extend_from_slice(words);
        self
    }

    pub(crate) fn fd(&mut self, fd: Rc<OwnedFd>) -> &mut Self {
        self.fds.push(fd);
        self
    }

    pub(crate) fn finish(self) -> OutMsg {
        let mut words = self.words;
        let size = words.len() * WORD_SIZE;
        assert!(size <= MAX_MESSAGE_SIZE);
        words[1] |= (size as u32) << 16;
        OutMsg {
            words,
            fds: self.fds,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ParseError {
    #[error("argument {0} is not present in the message")]
    MissingArgument(&'static str),
    #[error("argument {0} is a null string but the argument is not nullable")]
    NullString(&'static str),
    #[error("argument {0} is null but the argument is not nullable")]
    NullArgument(&'static str),
    #[error("argument {0} is not valid UTF-8")]
    NonUtf8(&'static str),
    #[error("the file descriptor for argument {0} is missing")]
    MissingFd(&'static str),
    #[error("there are trailing words after the message")]
    TrailingWords,
}

/// Deserializes the arguments of one received message.
pub(crate) struct MsgParser<'a> {
    msg: &'a [u32],
    pos: usize,
}

impl<'a> MsgParser<'a> {
    pub(crate) fn new(msg: &'a [u32]) -> Self {
        Self {
            msg,
            pos: HEADER_WORDS,
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn words_since(&self, start: usize) -> &'a [u32] {
        let msg = self.msg;
        &msg[start..self.pos]
    }

    pub(crate) fn uint(&mut self, name: &'static str) -> Result<u32, ParseError> {
        let Some(&val) = self.msg.get(self.pos) else {
            return Err(ParseError::MissingArgument(name));
        };
        self.pos += 1;
        Ok(val)
    }

    pub(crate) fn int(&mut self, name: &'static str) -> Result<i32, ParseError> {
        Ok(self.uint(name)? as i32)
    }

    pub(crate) fn fixed(&mut self, name: &'static str) -> Result<Fixed, ParseError> {
        Ok(Fixed::from_wire(self.uint(name)? as i32))
    }

    pub(crate) fn string_opt(
        &mut self,
        name: &'static str,
    ) -> Result<Option<&'a str>, ParseError> {
        let msg = self.msg;
        let len = self.uint(name)? as usize;
        if len == 0 {
            return Ok(None);
        }
        let words = len.div_ceil(WORD_SIZE);
        if self.pos + words > msg.len() {
            return Err(ParseError::MissingArgument(name));
        }
        let bytes = &uapi::as_bytes(&msg[self.pos..])[..len];
        self.pos += words;
        let Ok(s) = str::from_utf8(&bytes[..len - 1]) else {
            return Err(ParseError::NonUtf8(name));
        };
        Ok(Some(s))
    }

    pub(crate) fn string(&mut self, name: &'static str) -> Result<&'a str, ParseError> {
        self.string_opt(name)?
            .ok_or(ParseError::NullString(name))
    }

    pub(crate) fn array(&mut self, name: &'static str) -> Result<&'a [u8], ParseError> {
        let msg = self.msg;
        let len = self.uint(name)? as usize;
        let words = len.div_ceil(WORD_SIZE);
        if self.pos + words > msg.len() {
            return Err(ParseError::MissingArgument(name));
        }
        let bytes = &uapi::as_bytes(&msg[self.pos..])[..len];
        self.pos += words;
        Ok(bytes)
    }

    pub(crate) fn fd(
        &mut self,
        fds: &mut VecDeque<Rc<OwnedFd>>,
        name: &'static str,
    ) -> Result<Rc<OwnedFd>, ParseError> {
        fds.pop_front().ok_or(ParseError::MissingFd(name))
    }

    pub(crate) fn finish(&self) -> Result<(), ParseError> {
        if self.pos != self.msg.len() {
            return Err(ParseError::TrailingWords);
        }
        Ok(())
    }
}
