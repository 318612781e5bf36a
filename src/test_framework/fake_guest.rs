//! A scripted guest client.

use {
    super::{Arg, Conn, Recorded},
    crate::{protocols::Interface, trans::MsgParser},
    std::os::fd::OwnedFd,
};

pub(crate) struct FakeGuest {
    pub(crate) conn: Conn,
    /// Every event the relay sent, in order, except registry and display
    /// bookkeeping.
    pub(crate) events: Vec<Recorded>,
    /// Advertised globals in advertisement order: (name, interface, version).
    pub(crate) globals: Vec<(u32, String, u32)>,
    /// Names removed via global_remove.
    pub(crate) removed_globals: Vec<u32>,
    /// Ids freed via wl_display.delete_id.
    pub(crate) deleted: Vec<u32>,
    pub(crate) registry: Option<u32>,
    next_id: u32,
}

impl FakeGuest {
    pub(crate) fn new(socket: OwnedFd) -> Self {
        Self {
            conn: Conn::new(socket),
            events: Vec::new(),
            globals: Vec::new(),
            removed_globals: Vec::new(),
            deleted: Vec::new(),
            registry: None,
            next_id: 2,
        }
    }

    pub(crate) fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn send(&mut self, id: u32, opcode: u32, args: &[Arg]) {
        self.conn.send(id, opcode, args);
    }

    pub(crate) fn get_registry(&mut self) -> u32 {
        let id = self.alloc_id();
        self.conn.objects.insert(id, Interface::WlRegistry);
        self.conn.send(1, 1, &[Arg::Uint(id)]);
        self.registry = Some(id);
        id
    }

    /// Binds the advertised global of the given interface.
    pub(crate) fn bind(&mut self, interface: &str, version: u32) -> u32 {
        let registry = self.registry.expect("get_registry first");
        let name = self
            .globals
            .iter()
            .find(|(_, i, _)| i == interface)
            .unwrap_or_else(|| panic!("no {interface} advertised"))
            .0;
        let id = self.alloc_id();
        self.conn
            .objects
            .insert(id, Interface::from_name(interface).unwrap());
        self.conn.send(
            registry,
            0,
            &[
                Arg::Uint(name),
                Arg::Str(interface.to_string()),
                Arg::Uint(version),
                Arg::Uint(id),
            ],
        );
        id
    }

    pub(crate) fn pump(&mut self) {
        for msg in self.conn.drain() {
            let id = msg[0];
            let opcode = msg[1] & 0xffff;
            if id == 1 {
                let mut p = MsgParser::new(msg.as_slice());
                match opcode {
                    0 => {
                        let object = p.uint("object_id").unwrap();
                        let code = p.uint("code").unwrap();
                        let message = p.string("message").unwrap();
                        panic!("the relay sent error {code} on {object}: {message}");
                    }
                    1 => {
                        let freed = p.uint("id").unwrap();
                        self.conn.objects.remove(&freed);
                        self.deleted.push(freed);
                    }
                    _ => panic!("unknown wl_display event {opcode}"),
                }
                continue;
            }
            let interface = *self
                .conn
                .objects
                .get(&id)
                .unwrap_or_else(|| panic!("event for unknown guest object {id}"));
            if interface == Interface::WlRegistry {
                let mut p = MsgParser::new(msg.as_slice());
                match opcode {
                    0 => {
                        let name = p.uint("name").unwrap();
                        let iface = p.string("interface").unwrap().to_string();
                        let version = p.uint("version").unwrap();
                        self.globals.push((name, iface, version));
                    }
                    1 => {
                        let name = p.uint("name").unwrap();
                        self.removed_globals.push(name);
                    }
                    _ => panic!("unknown wl_registry event {opcode}"),
                }
                continue;
            }
            let rec = self.conn.parse(&msg, false);
            self.events.push(rec);
        }
    }

    pub(crate) fn events_named(&self, message: &str) -> Vec<&Recorded> {
        self.events
            .iter()
            .filter(|r| r.message == message)
            .collect()
    }
}
