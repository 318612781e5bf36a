use crate::{
    protocols::Interface,
    test_framework::{Arg, TestSetup, setup, setup_virtwl, shm_file},
};

struct Shm {
    pool: u32,
    buffer: u32,
    surface: u32,
    map: memmap2::MmapMut,
    fd: std::rc::Rc<std::os::fd::OwnedFd>,
}

/// Binds wl_shm and wl_compositor, creates a 4096-byte pool with one 16×16
/// buffer (stride 64) and a surface.
fn shm_setup(t: &mut TestSetup) -> Shm {
    t.guest.get_registry();
    t.pump();
    let shm = t.guest.bind("wl_shm", 1);
    let compositor = t.guest.bind("wl_compositor", 5);
    let (map, fd) = shm_file(4096);
    let pool = t.guest.alloc_id();
    t.guest.send(
        shm,
        0,
        &[
            Arg::NewId(pool, Interface::WlShmPool),
            Arg::Fd(fd.clone()),
            Arg::Int(4096),
        ],
    );
    let buffer = t.guest.alloc_id();
    t.guest.send(
        pool,
        0,
        &[
            Arg::NewId(buffer, Interface::WlBuffer),
            Arg::Int(0),
            Arg::Int(16),
            Arg::Int(16),
            Arg::Int(64),
            Arg::Uint(1),
        ],
    );
    let surface = t.guest.alloc_id();
    t.guest
        .send(compositor, 0, &[Arg::NewId(surface, Interface::WlSurface)]);
    t.pump();
    Shm {
        pool,
        buffer,
        surface,
        map,
        fd,
    }
}

fn attach_and_commit(t: &mut TestSetup, s: &Shm) {
    t.guest
        .send(s.surface, 1, &[Arg::Uint(s.buffer), Arg::Int(0), Arg::Int(0)]);
    t.guest.send(s.surface, 6, &[]);
    t.pump();
}

/// Pools that are never attached never touch the gpu.
#[test]
fn lazy_pool_is_never_allocated() {
    let mut t = setup_virtwl();
    let s = shm_setup(&mut t);
    t.guest.send(s.buffer, 0, &[]);
    t.guest.send(s.pool, 1, &[]);
    t.pump();
    assert_eq!(t.gpu.as_ref().unwrap().allocs.get(), 0);
    assert!(t.host.requests_named("create_pool").is_empty());
    assert!(t.host.requests_named("create_buffer").is_empty());
    assert!(t.guest.deleted.contains(&s.buffer));
    assert!(t.guest.deleted.contains(&s.pool));
}

/// The first attach allocates, maps, and mirrors the pool; commit copies the
/// guest's pixels into the host buffer.
#[test]
fn commit_copies_pixels() {
    let mut t = setup_virtwl();
    let mut s = shm_setup(&mut t);
    s.map[..1024].fill(0xaa);
    attach_and_commit(&mut t, &s);
    let gpu = t.gpu.as_ref().unwrap();
    assert_eq!(gpu.allocs.get(), 1);
    let pools = t.host.requests_named("create_pool");
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].args[2].int(), 4096);
    let buffers = t.host.requests_named("create_buffer");
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers[0].args[1].int(), 0);
    assert_eq!(buffers[0].args[4].int(), 64);
    let attaches = t.host.requests_named("attach");
    assert_ne!(attaches[0].args[0].uint(), 0);
    assert_eq!(t.host.requests_named("commit").len(), 1);
    let host_bytes = gpu.host_bytes(0, 4096);
    assert_eq!(&host_bytes[..1024], &[0xaa; 1024][..]);
    assert!(host_bytes[1024..].iter().all(|&b| b == 0));
}

#[test]
fn release_is_forwarded() {
    let mut t = setup_virtwl();
    let s = shm_setup(&mut t);
    attach_and_commit(&mut t, &s);
    let host_buffer = t.host.object_of(Interface::WlBuffer);
    t.host.send_event(host_buffer, 0, &[]);
    t.pump();
    let releases = t.guest.events_named("release");
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].object, s.buffer);
}

/// Resizing drops the mirror; the next attach maps at the new size.
#[test]
fn resize_remaps_lazily() {
    let mut t = setup_virtwl();
    let s = shm_setup(&mut t);
    attach_and_commit(&mut t, &s);
    assert_eq!(t.gpu.as_ref().unwrap().allocs.get(), 1);
    // The guest grows the file before resizing the pool.
    let file = std::fs::File::from(s.fd.try_clone().unwrap());
    file.set_len(8192).unwrap();
    t.guest.send(s.pool, 2, &[Arg::Int(8192)]);
    t.pump();
    let destroyed = t
        .host
        .requests_named("destroy")
        .iter()
        .filter(|r| r.interface == Interface::WlShmPool)
        .count();
    assert_eq!(destroyed, 1);
    // The guest re-creates its buffer after the resize.
    let buffer = t.guest.alloc_id();
    t.guest.send(
        s.pool,
        0,
        &[
            Arg::NewId(buffer, Interface::WlBuffer),
            Arg::Int(4096),
            Arg::Int(16),
            Arg::Int(16),
            Arg::Int(64),
            Arg::Uint(1),
        ],
    );
    t.guest
        .send(s.surface, 1, &[Arg::Uint(buffer), Arg::Int(0), Arg::Int(0)]);
    t.pump();
    assert_eq!(t.gpu.as_ref().unwrap().allocs.get(), 2);
    let pools = t.host.requests_named("create_pool");
    assert_eq!(pools[1].args[2].int(), 8192);
}

#[test]
fn resize_to_same_size_keeps_mapping() {
    let mut t = setup_virtwl();
    let s = shm_setup(&mut t);
    attach_and_commit(&mut t, &s);
    t.guest.send(s.pool, 2, &[Arg::Int(4096)]);
    attach_and_commit(&mut t, &s);
    assert_eq!(t.gpu.as_ref().unwrap().allocs.get(), 1);
    let destroyed = t
        .host
        .requests_named("destroy")
        .iter()
        .filter(|r| r.interface == Interface::WlShmPool)
        .count();
    assert_eq!(destroyed, 0);
}

/// A realized buffer tears down through the host round-trip.
#[test]
fn destroy_realized_buffer() {
    let mut t = setup_virtwl();
    let s = shm_setup(&mut t);
    attach_and_commit(&mut t, &s);
    t.guest.send(s.buffer, 0, &[]);
    t.pump();
    let destroyed = t
        .host
        .requests_named("destroy")
        .iter()
        .filter(|r| r.interface == Interface::WlBuffer)
        .count();
    assert_eq!(destroyed, 1);
    assert!(t.guest.deleted.contains(&s.buffer));
}

/// Without a gpu the relay is a plain proxy: the guest fd goes to the host.
#[test]
fn direct_mode_passes_the_pool_through() {
    let mut t = setup();
    let s = shm_setup(&mut t);
    let pools = t.host.requests_named("create_pool");
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].args[2].int(), 4096);
    let buffers = t.host.requests_named("create_buffer");
    assert_eq!(buffers.len(), 1);
    attach_and_commit(&mut t, &s);
    assert!(t.gpu.is_none());
    let attaches = t.host.requests_named("attach");
    assert_ne!(attaches[0].args[0].uint(), 0);
    assert_eq!(t.host.requests_named("commit").len(), 1);
}
