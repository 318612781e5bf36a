//! Guest/host shared-memory virtualization.
//!
//! Guest shm fds cannot be handed to the host compositor, so every guest pool
//! is mirrored into a host-visible virtio-gpu allocation of the same size.
//! Both sides are mapped into the relay and the guest's pixels are copied
//! across on surface commit.
//!
//! Everything is lazy: nothing is allocated or mapped until a buffer from the
//! pool is actually attached to a surface. Xwayland in particular creates
//! large numbers of pools that are never attached.

use {
    crate::{
        object::{Object, ObjectData, Role},
        protocols::Interface,
        relay,
        session::{ProtocolError, Session, SessionError, SessionErrorKind},
        trans::{MsgBuilder, MsgParser},
        virtio_gpu::{self, DRM_FORMAT_R8, ImageQuery},
    },
    memmap2::{Mmap, MmapMut, MmapOptions},
    std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        fs::File,
        io,
        os::fd::OwnedFd,
        rc::{Rc, Weak},
    },
};

#[cfg(test)]
mod tests;

/// A guest memory pool and its lazily created host mirror.
///
/// Shared by the pool object and every buffer carved from it; the guest fd is
/// closed when the last of them is deleted.
#[derive(Debug)]
pub(crate) struct ShmPool {
    size: Cell<i32>,
    /// The host-side wl_shm this pool hangs off (for creating the mirror).
    host_shm: Weak<Object>,
    /// Owned until the refcount reaches zero.
    client_fd: RefCell<Option<File>>,
    refcount: Cell<u32>,
    mapping: RefCell<Option<PoolMapping>>,
}

#[derive(Debug)]
struct PoolMapping {
    /// The host-side wl_shm_pool created from the virtio-gpu fd.
    host_pool: Rc<Object>,
    client_memory: Mmap,
    host_memory: MmapMut,
}

/// A buffer record within a pool. The host twin and the memory range are
/// realized on first attach.
#[derive(Debug)]
pub(crate) struct BufferState {
    pub(crate) pool: Rc<ShmPool>,
    offset: i32,
    width: i32,
    height: i32,
    stride: i32,
    format: u32,
    /// Byte range within the pool, set when the buffer is realized.
    range: Option<(usize, usize)>,
}

/// What a surface attach resolved the buffer to.
pub(crate) enum ResolvedBuffer {
    /// The buffer has a host twin that can be attached directly.
    Direct { host_id: u32 },
    /// A virtualized buffer; commits must copy the range across.
    Virtwl {
        host_id: u32,
        pool: Rc<ShmPool>,
        range: (usize, usize),
    },
}

/// Guest `wl_shm.create_pool` in virtwl mode. The pool is not forwarded;
/// its host mirror is created lazily.
pub(crate) fn create_pool(
    session: &Rc<Session>,
    shm: &Rc<Object>,
    msg: &[u32],
    fds: &mut VecDeque<Rc<OwnedFd>>,
) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "wl_shm",
                message: "create_pool",
                source: e,
            },
        )
    };
    let id = p.uint("id").map_err(parse)?;
    let fd = p.fd(fds, "fd").map_err(parse)?;
    let size = p.int("size").map_err(parse)?;
    p.finish().map_err(parse)?;
    if size <= 0 {
        return Err(relay::wrap_err(
            Role::Guest,
            ProtocolError::InvalidArgument {
                interface: "wl_shm",
                message: "create_pool",
                detail: "the size is not positive",
            },
        ));
    }
    if !session.guest.peer_may_allocate(id) {
        return Err(relay::wrap_err(
            Role::Guest,
            ProtocolError::IllegalNewId(id),
        ));
    }
    let fd = match Rc::try_unwrap(fd) {
        Ok(fd) => fd,
        Err(shared) => shared
            .try_clone()
            .map_err(|e| SessionError::from(SessionErrorKind::Map(e)))?,
    };
    let host_shm = shm
        .twin()
        .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
    let pool = Object::new(Role::Guest, Interface::WlShmPool, 1, id);
    *pool.data.borrow_mut() = ObjectData::Pool(Rc::new(ShmPool {
        size: Cell::new(size),
        host_shm: Rc::downgrade(&host_shm),
        client_fd: RefCell::new(Some(File::from(fd))),
        refcount: Cell::new(1),
        mapping: RefCell::new(None),
    }));
    if !session.guest.insert(&pool) {
        return Err(relay::wrap_err(Role::Guest, ProtocolError::IdInUse(id)));
    }
    Ok(())
}

/// Guest requests on a virtualized wl_shm_pool.
pub(crate) fn pool_request(
    session: &Rc<Session>,
    pool_obj: &Rc<Object>,
    opcode: u32,
    msg: &[u32],
) -> Result<(), SessionError> {
    match opcode {
        0 => create_buffer(session, pool_obj, msg),
        1 => {
            // No host twin exists; the pool is deleted immediately.
            relay::delete_guest_object(session, pool_obj);
            Ok(())
        }
        2 => resize(session, pool_obj, msg),
        _ => Err(relay::wrap_err(
            Role::Guest,
            ProtocolError::UnknownMessage {
                interface: "wl_shm_pool",
                opcode,
            },
        )),
    }
}

fn pool_of(obj: &Object) -> Rc<ShmPool> {
    match &*obj.data.borrow() {
        ObjectData::Pool(pool) => pool.clone(),
        _ => unreachable!("pool requests are only routed for pool objects"),
    }
}

fn create_buffer(
    session: &Rc<Session>,
    pool_obj: &Rc<Object>,
    msg: &[u32],
) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "wl_shm_pool",
                message: "create_buffer",
                source: e,
            },
        )
    };
    let id = p.uint("id").map_err(parse)?;
    let offset = p.int("offset").map_err(parse)?;
    let width = p.int("width").map_err(parse)?;
    let height = p.int("height").map_err(parse)?;
    let stride = p.int("stride").map_err(parse)?;
    let format = p.uint("format").map_err(parse)?;
    p.finish().map_err(parse)?;
    if !session.guest.peer_may_allocate(id) {
        return Err(relay::wrap_err(
            Role::Guest,
            ProtocolError::IllegalNewId(id),
        ));
    }
    let pool = pool_of(pool_obj);
    let buffer = Object::new(Role::Guest, Interface::WlBuffer, 1, id);
    pool.refcount.set(pool.refcount.get() + 1);
    *buffer.data.borrow_mut() = ObjectData::Buffer(BufferState {
        pool,
        offset,
        width,
        height,
        stride,
        format,
        range: None,
    });
    if !session.guest.insert(&buffer) {
        // The insert failure rolls the object back; its data cleanup returns
        // the pool reference.
        let ObjectData::Buffer(state) = buffer.data.take() else {
            unreachable!();
        };
        state.pool.unref(session);
        return Err(relay::wrap_err(Role::Guest, ProtocolError::IdInUse(id)));
    }
    Ok(())
}

fn resize(session: &Rc<Session>, pool_obj: &Rc<Object>, msg: &[u32]) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "wl_shm_pool",
                message: "resize",
                source: e,
            },
        )
    };
    let size = p.int("size").map_err(parse)?;
    p.finish().map_err(parse)?;
    if size <= 0 {
        return Err(relay::wrap_err(
            Role::Guest,
            ProtocolError::InvalidArgument {
                interface: "wl_shm_pool",
                message: "resize",
                detail: "the size is not positive",
            },
        ));
    }
    let pool = pool_of(pool_obj);
    if size == pool.size.get() {
        return Ok(());
    }
    pool.size.set(size);
    // The host mirror has the old size; it is re-created lazily at the new
    // size on the next attach. Existing buffer records are not re-sliced,
    // clients re-create their buffers after a resize.
    pool.drop_mapping(session);
    Ok(())
}

/// Guest `wl_buffer.destroy` for a virtualized buffer.
pub(crate) fn destroy_buffer(session: &Rc<Session>, buffer: &Rc<Object>) -> Result<(), SessionError> {
    if let Ok(twin) = buffer.any_twin() {
        // The buffer was realized; tear down the host side and wait for the
        // confirmation before releasing the guest id.
        session.host.submit(MsgBuilder::new(twin.id, 0).finish());
        relay::destructor_sent(session, buffer);
    } else {
        relay::delete_guest_object(session, buffer);
    }
    Ok(())
}

/// Resolves a buffer for attachment, realizing its host side if necessary.
pub(crate) fn resolve_attach(
    session: &Rc<Session>,
    buffer: &Rc<Object>,
) -> Result<ResolvedBuffer, SessionError> {
    let is_virtwl = matches!(&*buffer.data.borrow(), ObjectData::Buffer(_));
    if !is_virtwl {
        let twin = buffer
            .twin()
            .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
        return Ok(ResolvedBuffer::Direct { host_id: twin.id });
    }
    realize(session, buffer)?;
    let data = &*buffer.data.borrow();
    let ObjectData::Buffer(state) = data else {
        unreachable!();
    };
    let twin = buffer
        .any_twin()
        .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
    Ok(ResolvedBuffer::Virtwl {
        host_id: twin.id,
        pool: state.pool.clone(),
        range: state.range.unwrap_or((0, 0)),
    })
}

/// Forces the lazy slot of a virtualized buffer: maps the pool on both sides
/// and creates the host-side wl_buffer.
fn realize(session: &Rc<Session>, buffer: &Rc<Object>) -> Result<(), SessionError> {
    if buffer.has_twin() {
        return Ok(());
    }
    let (pool, offset, width, height, stride, format) = {
        let data = &*buffer.data.borrow();
        let ObjectData::Buffer(state) = data else {
            unreachable!();
        };
        (
            state.pool.clone(),
            state.offset,
            state.width,
            state.height,
            state.stride,
            state.format,
        )
    };
    let len = (height as i64) * (stride as i64);
    let end = (offset as i64) + len;
    if offset < 0 || width < 0 || height < 0 || stride < 0 || end > pool.size.get() as i64 {
        return Err(relay::wrap_err(
            Role::Guest,
            ProtocolError::InvalidArgument {
                interface: "wl_shm_pool",
                message: "create_buffer",
                detail: "the buffer does not fit into the pool",
            },
        ));
    }
    pool.ensure_mapped(session)?;
    let host_pool_id = pool
        .mapping
        .borrow()
        .as_ref()
        .map(|m| m.host_pool.id)
        .unwrap_or(0);
    let host_id = session.host.allocate_id();
    let host_buffer = Object::new(Role::Host, Interface::WlBuffer, 1, host_id);
    session.host.insert(&host_buffer);
    Object::link(buffer, &host_buffer);
    let mut out = MsgBuilder::new(host_pool_id, 0);
    out.uint(host_id);
    out.int(offset);
    out.int(width);
    out.int(height);
    out.int(stride);
    out.uint(format);
    session.host.submit(out.finish());
    let data = &mut *buffer.data.borrow_mut();
    let ObjectData::Buffer(state) = data else {
        unreachable!();
    };
    state.range = Some((offset as usize, len as usize));
    Ok(())
}

impl ShmPool {
    /// Maps the pool on both sides and creates the host mirror pool. Called
    /// the first time a buffer from this pool is attached.
    fn ensure_mapped(&self, session: &Rc<Session>) -> Result<(), SessionError> {
        if self.mapping.borrow().is_some() {
            return Ok(());
        }
        let size = self.size.get() as usize;
        let Some(gpu) = &session.gpu else {
            unreachable!("virtualized pools only exist with a gpu");
        };
        let image = gpu
            .alloc(&ImageQuery {
                width: size as u32,
                height: 1,
                drm_format: DRM_FORMAT_R8,
            })
            .map_err(|e| SessionError::from(SessionErrorKind::GpuAlloc(size, e)))?;
        let host_file = File::from(image.fd);
        let host_memory = virtio_gpu::map_image(&host_file, image.offset, image.host_size, size)
            .map_err(|e| SessionError::from(SessionErrorKind::Map(e)))?;
        let client_memory = {
            let client_fd = self.client_fd.borrow();
            let Some(file) = &*client_fd else {
                unreachable!("a mapped pool holds its fd");
            };
            map_guest_pool(file, size).map_err(|e| SessionError::from(SessionErrorKind::Map(e)))?
        };
        let Some(host_shm) = self.host_shm.upgrade() else {
            return Err(relay::wrap_err(
                Role::Guest,
                ProtocolError::Binding(crate::object::BindingError::NoTwin {
                    interface: "wl_shm",
                    id: 0,
                }),
            ));
        };
        let host_pool_id = session.host.allocate_id();
        let host_pool = Object::new(Role::Host, Interface::WlShmPool, 1, host_pool_id);
        session.host.insert(&host_pool);
        let mut out = MsgBuilder::new(host_shm.id, 0);
        out.uint(host_pool_id);
        out.fd(Rc::new(OwnedFd::from(host_file)));
        out.int(size as i32);
        session.host.submit(out.finish());
        *self.mapping.borrow_mut() = Some(PoolMapping {
            host_pool,
            client_memory,
            host_memory,
        });
        Ok(())
    }

    /// Copies the guest's bytes into the host mirror for the given range.
    /// Called on surface commit.
    pub(crate) fn copy_to_host(&self, range: (usize, usize)) {
        let mapping = &mut *self.mapping.borrow_mut();
        let Some(mapping) = mapping else {
            // The pool was resized since the attach; the client is expected
            // to attach a fresh buffer before the next commit matters.
            return;
        };
        let (start, len) = range;
        let Some(end) = start.checked_add(len) else {
            return;
        };
        if end > mapping.client_memory.len() || end > mapping.host_memory.len() {
            log::warn!("Skipping a commit copy outside the mapped pool");
            return;
        }
        mapping.host_memory[start..end].copy_from_slice(&mapping.client_memory[start..end]);
    }

    pub(crate) fn unref(&self, session: &Rc<Session>) {
        let refcount = self.refcount.get() - 1;
        self.refcount.set(refcount);
        if refcount > 0 {
            return;
        }
        self.drop_mapping(session);
        self.client_fd.borrow_mut().take();
    }

    /// Drops the double mapping and destroys the host mirror pool if the
    /// host connection is still live.
    fn drop_mapping(&self, session: &Rc<Session>) {
        let Some(mapping) = self.mapping.borrow_mut().take() else {
            return;
        };
        if session.is_destroyed() || !mapping.host_pool.live.get() {
            return;
        }
        session.host.submit(MsgBuilder::new(mapping.host_pool.id, 1).finish());
    }
}

fn map_guest_pool(file: &File, len: usize) -> io::Result<Mmap> {
    let actual = file.metadata()?.len();
    if (len as u64) > actual {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("pool size {len} exceeds the {actual} bytes of the guest fd"),
        ));
    }
    // SAFETY: The mapping is read-only and length-checked against the file.
    unsafe { MmapOptions::new().len(len).map(file) }
}
