//! A memfd-backed virtio-gpu allocator.

use {
    crate::virtio_gpu::{GpuImage, ImageQuery, VirtioGpu},
    memmap2::MmapOptions,
    std::{
        cell::{Cell, RefCell},
        fs::File,
        io,
    },
    uapi::c,
};

#[derive(Default)]
pub(crate) struct FakeGpu {
    pub(crate) allocs: Cell<usize>,
    images: RefCell<Vec<File>>,
}

impl FakeGpu {
    /// Reads back the bytes of the nth allocation, as the host compositor
    /// would see them.
    pub(crate) fn host_bytes(&self, index: usize, len: usize) -> Vec<u8> {
        let images = self.images.borrow();
        let file = &images[index];
        // SAFETY: Read-only mapping of a memfd the gpu owns.
        let map = unsafe { MmapOptions::new().len(len).map(file).unwrap() };
        map[..].to_vec()
    }
}

impl VirtioGpu for FakeGpu {
    fn alloc(&self, query: &ImageQuery) -> io::Result<GpuImage> {
        let size = (query.width as u64) * (query.height as u64);
        let fd = uapi::memfd_create("wl-relay-test-gpu", c::MFD_CLOEXEC)
            .map_err(io::Error::from)?;
        let file = File::from(std::os::fd::OwnedFd::from(fd));
        file.set_len(size)?;
        self.images.borrow_mut().push(file.try_clone()?);
        self.allocs.set(self.allocs.get() + 1);
        Ok(GpuImage {
            fd: file.into(),
            host_size: size,
            offset: 0,
            stride: query.width,
        })
    }
}
