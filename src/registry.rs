//! The synthetic registry the guest sees, and the host registry bootstrap.
//!
//! At session start the relay performs a `get_registry` + `sync` round-trip
//! against the host. The guest socket is not serviced until the answer is in;
//! the advertised table is then fixed: every host global whose interface the
//! relay supports becomes one guest-visible global at the minimum of the
//! compile-time and host versions. A host `zwp_primary_selection_device_manager_v1`
//! becomes two guest globals, the second under the wire-compatible legacy
//! gtk name. Seats are advertised after the selection managers; some clients
//! bind in advertisement order and break otherwise.

use {
    crate::{
        object::{Object, ObjectData, Role},
        protocols::Interface,
        relay,
        session::{ProtocolError, Session, SessionError},
        shell::WmBaseState,
        trans::{MsgBuilder, MsgParser},
    },
    std::rc::Rc,
};

#[cfg(test)]
mod tests;

/// Guest-visible globals, in advertisement order.
const SUPPORTED: &[Interface] = &[
    Interface::WlShm,
    Interface::WlCompositor,
    Interface::WlDataDeviceManager,
    Interface::ZwpPrimarySelectionDeviceManagerV1,
    Interface::WlSeat,
    Interface::WlOutput,
    Interface::ZxdgOutputManagerV1,
    Interface::XdgWmBase,
];

pub(crate) struct HostGlobal {
    name: u32,
    interface: Interface,
    version: u32,
}

pub(crate) struct GlobalEntry {
    /// The interface advertised to the guest.
    pub(crate) interface: Interface,
    /// The interface bound on the host (differs for the gtk entry).
    pub(crate) host_interface: Interface,
    pub(crate) host_name: u32,
    /// min(compile-time maximum, host version).
    pub(crate) version: u32,
    pub(crate) removed: bool,
}

#[derive(Default)]
pub(crate) struct GlobalTable {
    pub(crate) host_registry: u32,
    pending: Vec<HostGlobal>,
    pub(crate) entries: Vec<GlobalEntry>,
    /// Guest-side registry object ids; the snapshot is replayed onto each.
    registries: Vec<u32>,
}

/// Creates the display pair and queues the host registry round-trip.
pub(crate) fn start_setup(session: &Rc<Session>) {
    let guest_display = Object::new(Role::Guest, Interface::WlDisplay, 1, 1);
    let host_display = Object::new(Role::Host, Interface::WlDisplay, 1, 1);
    Object::link(&guest_display, &host_display);
    session.guest.insert(&guest_display);
    session.host.insert(&host_display);

    let registry_id = session.host.allocate_id();
    let registry = Object::new(Role::Host, Interface::WlRegistry, 1, registry_id);
    session.host.insert(&registry);
    let mut get_registry = MsgBuilder::new(1, 1);
    get_registry.uint(registry_id);
    session.host.submit(get_registry.finish());

    let callback_id = session.host.allocate_id();
    let callback = Object::new(Role::Host, Interface::WlCallback, 1, callback_id);
    *callback.data.borrow_mut() = ObjectData::SetupCallback;
    session.host.insert(&callback);
    let mut sync = MsgBuilder::new(1, 0);
    sync.uint(callback_id);
    session.host.submit(sync.finish());

    session.globals.borrow_mut().host_registry = registry_id;
}

/// Host `wl_registry.global` and `global_remove` events.
pub(crate) fn host_registry_event(
    session: &Rc<Session>,
    opcode: u32,
    msg: &[u32],
) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "wl_registry",
                message: if opcode == 0 { "global" } else { "global_remove" },
                source: e,
            },
        )
    };
    match opcode {
        0 => {
            let name = p.uint("name").map_err(parse)?;
            let interface = p.string("interface").map_err(parse)?;
            let version = p.uint("version").map_err(parse)?;
            let Some(interface) = Interface::from_name(interface) else {
                return Ok(());
            };
            let table = &mut *session.globals.borrow_mut();
            if session.setup_done.get() {
                log::debug!(
                    "Ignoring the global {} added after startup",
                    interface.name(),
                );
                return Ok(());
            }
            table.pending.push(HostGlobal {
                name,
                interface,
                version,
            });
            Ok(())
        }
        1 => {
            let name = p.uint("name").map_err(parse)?;
            remove_global(session, name);
            Ok(())
        }
        _ => Err(relay::wrap_err(
            Role::Host,
            ProtocolError::UnknownMessage {
                interface: "wl_registry",
                opcode,
            },
        )),
    }
}

fn remove_global(session: &Rc<Session>, host_name: u32) {
    let table = &mut *session.globals.borrow_mut();
    table.pending.retain(|g| g.name != host_name);
    for (idx, entry) in table.entries.iter_mut().enumerate() {
        if entry.host_name != host_name || entry.removed {
            continue;
        }
        entry.removed = true;
        for &registry in &table.registries {
            let mut out = MsgBuilder::new(registry, 1);
            out.uint(idx as u32 + 1);
            session.guest.submit(out.finish());
        }
    }
}

/// The setup sync callback fired: the host registry snapshot is complete.
/// Builds the advertised table and starts servicing the guest.
pub(crate) fn finish_setup(session: &Rc<Session>, _callback: &Rc<Object>) -> Result<(), SessionError> {
    {
        let table = &mut *session.globals.borrow_mut();
        let pending = std::mem::take(&mut table.pending);
        for &interface in SUPPORTED {
            for global in pending.iter().filter(|g| g.interface == interface) {
                let version = interface.max_version().min(global.version);
                table.entries.push(GlobalEntry {
                    interface,
                    host_interface: interface,
                    host_name: global.name,
                    version,
                    removed: false,
                });
                // The legacy gtk protocol is wire-compatible; the same host
                // global backs a second advertisement under the gtk name.
                if let Some(gtk) = interface.zwp_to_gtk() {
                    table.entries.push(GlobalEntry {
                        interface: gtk,
                        host_interface: interface,
                        host_name: global.name,
                        version: 1,
                        removed: false,
                    });
                }
            }
        }
    }
    session.enable_guest()
}

/// Guest `wl_display.get_registry`: the registry is synthetic and never
/// forwarded; the global snapshot is replayed onto it.
pub(crate) fn get_registry(
    session: &Rc<Session>,
    _display: &Rc<Object>,
    msg: &[u32],
) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "wl_display",
                message: "get_registry",
                source: e,
            },
        )
    };
    let id = p.uint("registry").map_err(parse)?;
    p.finish().map_err(parse)?;
    if !session.guest.peer_may_allocate(id) {
        return Err(relay::wrap_err(
            Role::Guest,
            ProtocolError::IllegalNewId(id),
        ));
    }
    let registry = Object::new(Role::Guest, Interface::WlRegistry, 1, id);
    *registry.data.borrow_mut() = ObjectData::Registry;
    if !session.guest.insert(&registry) {
        return Err(relay::wrap_err(Role::Guest, ProtocolError::IdInUse(id)));
    }
    let table = &mut *session.globals.borrow_mut();
    table.registries.push(id);
    for (idx, entry) in table.entries.iter().enumerate() {
        if entry.removed {
            continue;
        }
        let mut out = MsgBuilder::new(id, 0);
        out.uint(idx as u32 + 1);
        out.string(entry.interface.name());
        out.uint(entry.version);
        session.guest.submit(out.finish());
    }
    Ok(())
}

/// Guest `wl_registry.bind`: validates the name, interface and version, then
/// creates the pair and binds the host global.
pub(crate) fn bind(
    session: &Rc<Session>,
    _registry: &Rc<Object>,
    msg: &[u32],
) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "wl_registry",
                message: "bind",
                source: e,
            },
        )
    };
    let name = p.uint("name").map_err(parse)?;
    let interface = p.string("interface").map_err(parse)?;
    let version = p.uint("version").map_err(parse)?;
    let id = p.uint("id").map_err(parse)?;
    p.finish().map_err(parse)?;
    let err = |e| relay::wrap_err(Role::Guest, e);
    let (guest_interface, host_interface, host_name) = {
        let table = &*session.globals.borrow();
        let entry = name
            .checked_sub(1)
            .and_then(|idx| table.entries.get(idx as usize))
            .ok_or_else(|| err(ProtocolError::UnknownGlobal(name)))?;
        if interface != entry.interface.name() {
            return Err(err(ProtocolError::GlobalInterfaceMismatch {
                name,
                advertised: entry.interface.name(),
                requested: interface.to_string(),
            }));
        }
        if version == 0 || version > entry.version {
            return Err(err(ProtocolError::GlobalVersion {
                interface: entry.interface.name(),
                requested: version,
                advertised: entry.version,
            }));
        }
        (entry.interface, entry.host_interface, entry.host_name)
    };
    let (guest_obj, host_obj) = relay::create_pair(
        session,
        &session.guest,
        id,
        guest_interface,
        host_interface,
        version,
    )?;
    let mut out = MsgBuilder::new(session.globals.borrow().host_registry, 0);
    out.uint(host_name);
    out.string(host_interface.name());
    out.uint(version);
    out.uint(host_obj.id);
    session.host.submit(out.finish());
    post_bind(session, &guest_obj);
    Ok(())
}

fn post_bind(session: &Rc<Session>, obj: &Rc<Object>) {
    if obj.interface == Interface::XdgWmBase {
        *obj.data.borrow_mut() = ObjectData::WmBase(WmBaseState::default());
        session.wm_bases.borrow_mut().push(Rc::downgrade(obj));
    }
}
