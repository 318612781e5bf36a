//! Output relays with Xwayland scale compensation.
//!
//! `wl_output.scale` is divided by the Xwayland factor (Xwayland applies the
//! factor itself), and the xdg-output logical coordinates are multiplied back
//! into the guest's pixel space. Without hooks everything passes through
//! unchanged.

use {
    crate::{
        object::{Object, Role},
        protocols::MessageSpec,
        relay,
        session::{ProtocolError, Session, SessionError},
        trans::{MsgBuilder, MsgParser},
    },
    std::rc::Rc,
};


/// Host `wl_output.scale`.
pub(crate) fn scale(session: &Rc<Session>, output: &Rc<Object>, msg: &[u32]) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "wl_output",
                message: "scale",
                source: e,
            },
        )
    };
    let factor = p.int("factor").map_err(parse)?;
    p.finish().map_err(parse)?;
    let factor = match session.xscale() {
        Some(xscale) => factor / xscale,
        None => factor,
    };
    let twin = output
        .twin()
        .map_err(|e| relay::wrap_err(Role::Host, ProtocolError::Binding(e)))?;
    let mut out = MsgBuilder::new(twin.id, 3);
    out.int(factor);
    session.guest.submit(out.finish());
    Ok(())
}

/// Host `zxdg_output_v1.logical_position` and `logical_size`.
pub(crate) fn logical(
    session: &Rc<Session>,
    xdg_output: &Rc<Object>,
    mspec: &'static MessageSpec,
    opcode: u32,
    msg: &[u32],
) -> Result<(), SessionError> {
    let mut p = MsgParser::new(msg);
    let parse = |e| {
        relay::wrap_err(
            Role::Host,
            ProtocolError::Parse {
                interface: "zxdg_output_v1",
                message: mspec.name,
                source: e,
            },
        )
    };
    let a = p.int("x").map_err(parse)?;
    let b = p.int("y").map_err(parse)?;
    p.finish().map_err(parse)?;
    let twin = xdg_output
        .twin()
        .map_err(|e| relay::wrap_err(Role::Host, ProtocolError::Binding(e)))?;
    let mut out = MsgBuilder::new(twin.id, opcode);
    out.int(session.scale_to_client(a));
    out.int(session.scale_to_client(b));
    session.guest.submit(out.finish());
    Ok(())
}
