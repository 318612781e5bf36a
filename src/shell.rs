//! xdg-shell relays: the ping/pong queue and window-title tagging.

use {
    crate::{
        object::{Object, ObjectData, Role},
        relay,
        session::{ProtocolError, Session, SessionError},
        trans::{MsgBuilder, MsgParser},
    },
    std::{collections::VecDeque, rc::Rc},
};


/// Per-wm_base state, attached to the guest-side object at bind time.
#[derive(Default)]
pub(crate) struct WmBaseState {
    /// Dispositions for pongs the guest still owes, strictly FIFO.
    pongs: VecDeque<PendingPong>,
}

impl std::fmt::Debug for WmBaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WmBaseState")
            .field("pongs", &self.pongs.len())
            .finish()
    }
}

enum PendingPong {
    /// Answer a host ping with the given serial.
    Forward(u32),
    /// Complete a supervisor ping.
    Hook(Box<dyn FnOnce()>),
}

/// Host `xdg_wm_base.ping`: queue a forwarding disposition and pass the ping
/// on to the guest.
pub(crate) fn ping(session: &Rc<Session>, wm_base: &Rc<Object>, msg: &[u32]) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "xdg_wm_base",
                message: "ping",
                source: e,
            },
        )
    };
    let serial = p.uint("serial").map_err(parse)?;
    p.finish().map_err(parse)?;
    let twin = wm_base
        .twin()
        .map_err(|e| relay::wrap_err(Role::Host, ProtocolError::Binding(e)))?;
    push_pong(&twin, PendingPong::Forward(serial));
    let mut out = MsgBuilder::new(twin.id, 0);
    out.uint(serial);
    session.guest.submit(out.finish());
    Ok(())
}

/// Guest `xdg_wm_base.pong`: pops exactly one queued disposition, in FIFO
/// order. A pong nobody is waiting for is logged and dropped.
pub(crate) fn pong(session: &Rc<Session>, wm_base: &Rc<Object>, msg: &[u32]) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "xdg_wm_base",
                message: "pong",
                source: e,
            },
        )
    };
    p.uint("serial").map_err(parse)?;
    p.finish().map_err(parse)?;
    let pending = pop_pong(wm_base);
    match pending {
        Some(PendingPong::Forward(serial)) => {
            let twin = wm_base
                .twin()
                .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
            let mut out = MsgBuilder::new(twin.id, 3);
            out.uint(serial);
            session.host.submit(out.finish());
        }
        Some(PendingPong::Hook(done)) => done(),
        None => log::warn!("The guest sent a pong nobody was waiting for"),
    }
    Ok(())
}

/// Guest `xdg_toplevel.set_title`: the configured tag is prepended.
pub(crate) fn set_title(session: &Rc<Session>, toplevel: &Rc<Object>, msg: &[u32]) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Guest,
            ProtocolError::Parse {
                interface: "xdg_toplevel",
                message: "set_title",
                source: e,
            },
        )
    };
    let title = p.string("title").map_err(parse)?;
    p.finish().map_err(parse)?;
    let twin = toplevel
        .twin()
        .map_err(|e| relay::wrap_err(Role::Guest, ProtocolError::Binding(e)))?;
    let mut out = MsgBuilder::new(twin.id, 2);
    out.string(&format!("{}{}", session.config.tag, title));
    session.host.submit(out.finish());
    Ok(())
}

/// A supervisor ping: sends a ping to the guest with a relay-owned serial and
/// queues the completion thunk behind any outstanding host pings.
pub(crate) fn hook_ping(session: &Rc<Session>, done: Box<dyn FnOnce()>) {
    let wm_base = {
        let mut bases = session.wm_bases.borrow_mut();
        bases.retain(|w| w.upgrade().is_some_and(|b| b.live.get()));
        bases.last().and_then(|w| w.upgrade())
    };
    let Some(wm_base) = wm_base else {
        log::warn!("Cannot ping the guest: no xdg_wm_base is bound");
        done();
        return;
    };
    let serial = session.next_ping_serial.get();
    session.next_ping_serial.set(serial.wrapping_add(1));
    push_pong(&wm_base, PendingPong::Hook(done));
    let mut out = MsgBuilder::new(wm_base.id, 0);
    out.uint(serial);
    session.submit_to_guest(out.finish());
}

fn push_pong(wm_base: &Object, pending: PendingPong) {
    let data = &mut *wm_base.data.borrow_mut();
    match data {
        ObjectData::WmBase(state) => state.pongs.push_back(pending),
        _ => log::warn!("Dropping a ping for an object without a pong queue"),
    }
}

fn pop_pong(wm_base: &Object) -> Option<PendingPong> {
    let data = &mut *wm_base.data.borrow_mut();
    match data {
        ObjectData::WmBase(state) => state.pongs.pop_front(),
        _ => None,
    }
}
