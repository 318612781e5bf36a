use {
    crate::{
        fixed::Fixed,
        test_framework::socketpair,
        trans::{FlushResult, InBuf, MsgBuilder, MsgParser, TransError},
    },
    std::{
        io::{Read, Seek, SeekFrom, Write},
        os::fd::{AsRawFd, OwnedFd},
        rc::Rc,
    },
    uapi::c,
};

fn read_all(socket: &OwnedFd, incoming: &mut InBuf) -> Vec<Vec<u32>> {
    let mut msgs = Vec::new();
    let mut may_read = true;
    while let Some(msg) = incoming
        .buffer
        .read_message(socket.as_raw_fd(), &mut may_read, &mut incoming.fds)
        .unwrap()
    {
        msgs.push(msg.to_vec());
    }
    msgs
}

#[test]
fn round_trip() {
    let (a, b) = socketpair();
    let mut out = crate::trans::OutBuf::default();
    let mut builder = MsgBuilder::new(3, 7);
    builder.uint(42);
    builder.int(-5);
    builder.fixed(Fixed::from_i32_saturating(2));
    builder.string("hello");
    builder.array(&[1, 2, 3]);
    out.submit(builder.finish());
    assert_eq!(out.flush(a.as_raw_fd()).unwrap(), FlushResult::Done);

    let mut incoming = InBuf::default();
    let msgs = read_all(&b, &mut incoming);
    assert_eq!(msgs.len(), 1);
    let msg = &msgs[0];
    assert_eq!(msg[0], 3);
    assert_eq!(msg[1] & 0xffff, 7);
    let mut p = MsgParser::new(msg);
    assert_eq!(p.uint("a").unwrap(), 42);
    assert_eq!(p.int("b").unwrap(), -5);
    assert_eq!(p.fixed("c").unwrap(), Fixed::from_i32_saturating(2));
    assert_eq!(p.string("d").unwrap(), "hello");
    assert_eq!(p.array("e").unwrap(), &[1, 2, 3]);
    p.finish().unwrap();
}

#[test]
fn batched_messages() {
    let (a, b) = socketpair();
    let mut out = crate::trans::OutBuf::default();
    for i in 0..10 {
        let mut builder = MsgBuilder::new(i, 0);
        builder.uint(i * i);
        out.submit(builder.finish());
    }
    out.flush(a.as_raw_fd()).unwrap();
    let mut incoming = InBuf::default();
    let mut msgs = Vec::new();
    // A batch is limited to one read from the socket per call.
    while msgs.len() < 10 {
        let more = read_all(&b, &mut incoming);
        assert!(!more.is_empty());
        msgs.extend(more);
    }
    for (i, msg) in msgs.iter().enumerate() {
        assert_eq!(msg[0], i as u32);
        assert_eq!(msg[2], (i * i) as u32);
    }
}

#[test]
fn fd_passing() {
    let (a, b) = socketpair();
    let memfd = uapi::memfd_create("trans-test", c::MFD_CLOEXEC).unwrap();
    let mut file = std::fs::File::from(OwnedFd::from(memfd));
    file.write_all(b"payload").unwrap();

    let mut out = crate::trans::OutBuf::default();
    let mut builder = MsgBuilder::new(1, 2);
    builder.uint(9);
    builder.fd(Rc::new(file.into()));
    out.submit(builder.finish());
    out.flush(a.as_raw_fd()).unwrap();

    let mut incoming = InBuf::default();
    let msgs = read_all(&b, &mut incoming);
    assert_eq!(msgs.len(), 1);
    assert_eq!(incoming.fds.len(), 1);
    let fd = incoming.fds.pop_front().unwrap();
    let fd = Rc::try_unwrap(fd).unwrap();
    let mut file = std::fs::File::from(fd);
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = String::new();
    file.read_to_string(&mut buf).unwrap();
    assert_eq!(buf, "payload");
}

#[test]
fn null_string() {
    // A null string is a 0 length word.
    let mut builder = MsgBuilder::new(1, 0);
    builder.uint(0);
    let msg = builder.finish();
    let mut p = MsgParser::new(&msg.words);
    assert_eq!(p.string_opt("s").unwrap(), None);
    assert!(p.finish().is_ok());

    let mut p = MsgParser::new(&msg.words);
    assert!(p.string("s").is_err());
}

#[test]
fn closed_peer() {
    let (a, b) = socketpair();
    drop(a);
    let mut incoming = InBuf::default();
    let mut may_read = true;
    let err = incoming
        .buffer
        .read_message(b.as_raw_fd(), &mut may_read, &mut incoming.fds)
        .unwrap_err();
    assert!(matches!(err, TransError::Closed));
}

#[test]
fn short_message_rejected() {
    let (a, b) = socketpair();
    // A header claiming a 4-byte message.
    let mut out = crate::trans::OutBuf::default();
    out.submit(crate::trans::OutMsg {
        words: vec![5, 4 << 16],
        fds: Vec::new(),
    });
    out.flush(a.as_raw_fd()).unwrap();
    let mut incoming = InBuf::default();
    let mut may_read = true;
    let err = incoming
        .buffer
        .read_message(b.as_raw_fd(), &mut may_read, &mut incoming.fds)
        .unwrap_err();
    assert!(matches!(err, TransError::MessageTooSmall(4)));
}
