//! The virtio-gpu allocation interface consumed by the relay.
//!
//! The relay never talks to the device itself. The embedder supplies an
//! implementation of [`VirtioGpu`] whose [`alloc`](VirtioGpu::alloc) returns a
//! host-resident buffer: a file descriptor that the host compositor accepts as
//! a wayland shm fd, plus the geometry of the allocation. Guest shm pools are
//! mirrored into such buffers; see the crate documentation.
//!
//! When no implementation is supplied, the relay runs in plain proxy mode and
//! passes guest shm fds to the host directly.

use {
    memmap2::{MmapMut, MmapOptions},
    std::{fs::File, io},
};

/// `DRM_FORMAT_R8`: one byte per pixel. Pool mirrors are allocated as R8
/// images of width = pool size and height = 1.
pub const DRM_FORMAT_R8: u32 = fourcc(b"R8  ");

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

/// Geometry of a requested allocation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ImageQuery {
    pub width: u32,
    pub height: u32,
    pub drm_format: u32,
}

/// A host-resident buffer returned by [`VirtioGpu::alloc`].
#[derive(Debug)]
pub struct GpuImage {
    /// Host-visible memory. Acceptable to the host compositor as a wayland
    /// fd and mappable in the relay's address space.
    pub fd: std::os::fd::OwnedFd,
    /// Total size of the allocation backing `fd`.
    pub host_size: u64,
    /// Byte offset of the image within the allocation.
    pub offset: u32,
    /// Bytes per row.
    pub stride: u32,
}

/// The allocation primitive of the virtio-gpu device.
pub trait VirtioGpu {
    /// Allocates a host-resident buffer for the given geometry.
    fn alloc(&self, query: &ImageQuery) -> io::Result<GpuImage>;
}

/// Maps `len` bytes of a host image, verifying the bounds against the
/// allocation size reported by the device.
pub(crate) fn map_image(file: &File, offset: u32, host_size: u64, len: usize) -> io::Result<MmapMut> {
    if (offset as u64).saturating_add(len as u64) > host_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("mapping of {len} bytes at {offset} exceeds the allocation size {host_size}"),
        ));
    }
    // SAFETY: The mapping is private to the relay and the bounds were checked
    // against the allocation size.
    unsafe {
        MmapOptions::new()
            .offset(offset as u64)
            .len(len)
            .map_mut(file)
    }
}
