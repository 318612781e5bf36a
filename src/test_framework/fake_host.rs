//! A scripted host compositor.

use {
    super::{Arg, Conn, Recorded, RecordedArg},
    crate::{object::MIN_SERVER_ALLOCATED_ID, protocols::Interface, trans::MsgParser},
    std::os::fd::OwnedFd,
};

pub(crate) struct FakeHost {
    pub(crate) conn: Conn,
    /// Every request the relay sent, in order.
    pub(crate) requests: Vec<Recorded>,
    globals: Vec<(&'static str, u32)>,
    pub(crate) registry: Option<u32>,
    next_server_id: u32,
    /// Whether destructors are confirmed with delete_id immediately.
    pub(crate) auto_delete: bool,
    pending_deletes: Vec<u32>,
}

impl FakeHost {
    pub(crate) fn new(socket: OwnedFd) -> Self {
        Self {
            conn: Conn::new(socket),
            requests: Vec::new(),
            globals: vec![
                ("wl_shm", 1),
                ("wl_compositor", 6),
                ("wl_data_device_manager", 3),
                ("zwp_primary_selection_device_manager_v1", 1),
                ("wl_seat", 8),
                ("wl_output", 4),
                ("zxdg_output_manager_v1", 3),
                ("xdg_wm_base", 6),
            ],
            registry: None,
            next_server_id: MIN_SERVER_ALLOCATED_ID,
            auto_delete: true,
            pending_deletes: Vec::new(),
        }
    }

    pub(crate) fn pump(&mut self) {
        for msg in self.conn.drain() {
            self.handle(&msg);
        }
    }

    fn handle(&mut self, msg: &[u32]) {
        let id = msg[0];
        let opcode = msg[1] & 0xffff;
        if id == 1 {
            let mut p = MsgParser::new(msg);
            match opcode {
                // sync
                0 => {
                    let callback = p.uint("callback").unwrap();
                    self.conn.send(callback, 0, &[Arg::Uint(0)]);
                    self.delete_id(callback);
                }
                // get_registry
                1 => {
                    let registry = p.uint("registry").unwrap();
                    self.conn.objects.insert(registry, Interface::WlRegistry);
                    self.registry = Some(registry);
                    for (idx, (name, version)) in self.globals.clone().into_iter().enumerate() {
                        self.conn.send(
                            registry,
                            0,
                            &[
                                Arg::Uint(idx as u32 + 1),
                                Arg::Str(name.to_string()),
                                Arg::Uint(version),
                            ],
                        );
                    }
                }
                _ => panic!("unknown wl_display request {opcode}"),
            }
            return;
        }
        let interface = *self
            .conn
            .objects
            .get(&id)
            .unwrap_or_else(|| panic!("request for unknown host object {id}"));
        if interface == Interface::WlRegistry && opcode == 0 {
            let mut p = MsgParser::new(msg);
            let name = p.uint("name").unwrap();
            let iface_str = p.string("interface").unwrap().to_string();
            let version = p.uint("version").unwrap();
            let new_id = p.uint("id").unwrap();
            let iface = Interface::from_name(&iface_str)
                .unwrap_or_else(|| panic!("bind of unknown interface {iface_str}"));
            self.conn.objects.insert(new_id, iface);
            self.requests.push(Recorded {
                interface: Interface::WlRegistry,
                object: id,
                message: "bind",
                args: vec![
                    RecordedArg::Uint(name),
                    RecordedArg::Str(iface_str),
                    RecordedArg::Uint(version),
                    RecordedArg::Uint(new_id),
                ],
            });
            return;
        }
        let destructor = interface.spec().requests[opcode as usize].destructor;
        let rec = self.conn.parse(msg, true);
        self.requests.push(rec);
        if destructor {
            self.conn.objects.remove(&id);
            if id < MIN_SERVER_ALLOCATED_ID {
                if self.auto_delete {
                    self.delete_id(id);
                } else {
                    self.pending_deletes.push(id);
                }
            }
        }
    }

    pub(crate) fn delete_id(&mut self, id: u32) {
        self.conn.send(1, 1, &[Arg::Uint(id)]);
    }

    /// Confirms destructors held back while `auto_delete` was off.
    pub(crate) fn confirm_deletes(&mut self) {
        for id in std::mem::take(&mut self.pending_deletes) {
            self.delete_id(id);
        }
    }

    pub(crate) fn send_event(&mut self, id: u32, opcode: u32, args: &[Arg]) {
        self.conn.send(id, opcode, args);
    }

    /// Allocates an id in the range the host may mint for event new-ids.
    pub(crate) fn new_server_id(&mut self) -> u32 {
        let id = self.next_server_id;
        self.next_server_id += 1;
        id
    }

    /// The single object the relay bound with this interface.
    pub(crate) fn object_of(&self, interface: Interface) -> u32 {
        let mut ids = self
            .conn
            .objects
            .iter()
            .filter(|(_, i)| **i == interface)
            .map(|(id, _)| *id);
        let id = ids.next().unwrap_or_else(|| panic!("no {} bound", interface.name()));
        assert!(ids.next().is_none(), "multiple {} bound", interface.name());
        id
    }

    pub(crate) fn requests_named(&self, message: &str) -> Vec<&Recorded> {
        self.requests
            .iter()
            .filter(|r| r.message == message)
            .collect()
    }
}
