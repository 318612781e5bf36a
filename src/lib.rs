//! This crate relays wayland connections between a guest client and a host
//! compositor.
//!
//! The guest connects to the relay as if it were the compositor. For every
//! object the guest creates, the relay creates a twin object on its own
//! connection to the host, forwards every request guest→host and every event
//! host→guest, and translates object ids between the two connections. A small
//! number of messages are rewritten on the way through:
//!
//! - Shared-memory buffers are virtualized. Guest shm fds cannot be shared
//!   with the host, so each guest pool is mirrored into a host-visible buffer
//!   allocated through virtio-gpu, and the guest's pixels are copied across on
//!   every surface commit. See [`virtio_gpu`].
//! - Clipboard MIME types are namespaced with a per-guest prefix so that a
//!   prefix-aware clipboard manager on the host can route contents between
//!   guests. See [`session::Config::clipname`].
//! - When Xwayland hooks are installed, coordinates are rescaled between the
//!   X11 pixel space and the host's logical space, and surface setup is
//!   deferred until the X11 side has decided what the surface is. See
//!   [`xwayland`].
//! - The host's `zwp_primary_selection_device_manager_v1` global is
//!   advertised twice, once under its own name and once as the wire-compatible
//!   legacy `gtk_primary_selection_device_manager`.
//!
//! # Example
//!
//! ```no_run
//! use wl_relay::session::{Config, Session};
//!
//! # fn connect_sockets() -> (std::os::fd::OwnedFd, std::os::fd::OwnedFd) { unimplemented!() }
//! // The caller is responsible for establishing the two sockets, e.g. by
//! // accepting a guest connection and connecting to $WAYLAND_DISPLAY.
//! let (host_socket, guest_socket) = connect_sockets();
//! let session = Session::builder(Config::default())
//!     .build(host_socket, guest_socket)
//!     .unwrap();
//! // Relays until one side hangs up.
//! match session.run() {
//!     Ok(peer) => eprintln!("{peer} closed the connection"),
//!     Err(e) => eprintln!("session failed: {}", error_reporter::Report::new(e)),
//! }
//! ```
//!
//! # Scheduling model
//!
//! A session is single-threaded and cooperative. [`Session::dispatch`]
//! services both sockets; message handlers run to completion before the next
//! message is dispatched, and nothing blocks except the poll itself. The
//! session can be driven from an external event loop via
//! [`Session::poll_fd`].
//!
//! # Object lifecycle
//!
//! Destruction is ordered: when the guest destroys an object, the relay
//! forwards the destructor to the host and keeps the guest-side object alive
//! until the host confirms the deletion with `wl_display.delete_id`. Only then
//! does the guest receive its own `delete_id`. This guarantees that events the
//! host sent before processing the destructor still reach the guest.
//!
//! [`Session::dispatch`]: session::Session::dispatch
//! [`Session::poll_fd`]: session::Session::poll_fd

mod clipname;
mod endpoint;
pub mod fixed;
mod input;
mod object;
mod output;
mod poll;
mod protocols;
mod registry;
mod relay;
mod selection;
pub mod session;
mod shell;
mod shm;
mod surface;
#[cfg(test)]
mod test_framework;
mod trans;
pub mod virtio_gpu;
pub mod xwayland;
