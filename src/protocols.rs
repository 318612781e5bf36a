//! Metadata for the interfaces the relay speaks.
//!
//! The relay does not use generated per-interface code. It forwards messages
//! generically, driven by the signature tables in this module, and intercepts
//! individual `(interface, opcode)` pairs at the relay boundary. The tables
//! encode the upstream protocol XML: message order is opcode order.

use phf::phf_map;

#[cfg(test)]
mod tests;

/// An interface supported by the relay.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) enum Interface {
    // wayland
    WlDisplay,
    WlRegistry,
    WlCallback,
    WlCompositor,
    WlSurface,
    WlRegion,
    WlShm,
    WlShmPool,
    WlBuffer,
    WlSeat,
    WlPointer,
    WlKeyboard,
    WlTouch,
    WlOutput,
    WlDataDeviceManager,
    WlDataDevice,
    WlDataSource,
    WlDataOffer,
    // xdg_shell
    XdgWmBase,
    XdgPositioner,
    XdgSurface,
    XdgToplevel,
    XdgPopup,
    // xdg_output_unstable_v1
    ZxdgOutputManagerV1,
    ZxdgOutputV1,
    // wp_primary_selection_unstable_v1
    ZwpPrimarySelectionDeviceManagerV1,
    ZwpPrimarySelectionDeviceV1,
    ZwpPrimarySelectionOfferV1,
    ZwpPrimarySelectionSourceV1,
    // gtk_primary_selection
    GtkPrimarySelectionDeviceManager,
    GtkPrimarySelectionDevice,
    GtkPrimarySelectionOffer,
    GtkPrimarySelectionSource,
}

/// The wire type of a single message argument.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ArgSpec {
    Int,
    Uint,
    Fixed,
    Str {
        nullable: bool,
    },
    Array,
    Fd,
    Object {
        interface: Option<Interface>,
        nullable: bool,
    },
    /// An object created by this message. `interface` is `None` only for
    /// `wl_registry.bind`, where the interface and version precede the id on
    /// the wire.
    NewId {
        interface: Option<Interface>,
    },
}

pub(crate) struct MessageSpec {
    pub(crate) name: &'static str,
    #[expect(dead_code)]
    pub(crate) since: u32,
    pub(crate) destructor: bool,
    pub(crate) args: &'static [ArgSpec],
}

pub(crate) struct InterfaceSpec {
    pub(crate) name: &'static str,
    pub(crate) max_version: u32,
    pub(crate) requests: &'static [MessageSpec],
    pub(crate) events: &'static [MessageSpec],
}

const INT: ArgSpec = ArgSpec::Int;
const UINT: ArgSpec = ArgSpec::Uint;
const FIXED: ArgSpec = ArgSpec::Fixed;
const STR: ArgSpec = ArgSpec::Str { nullable: false };
const STR_NUL: ArgSpec = ArgSpec::Str { nullable: true };
const ARRAY: ArgSpec = ArgSpec::Array;
const FD: ArgSpec = ArgSpec::Fd;
const ANY_OBJ: ArgSpec = ArgSpec::Object {
    interface: None,
    nullable: false,
};
const BIND_NEW_ID: ArgSpec = ArgSpec::NewId { interface: None };

const fn obj(interface: Interface) -> ArgSpec {
    ArgSpec::Object {
        interface: Some(interface),
        nullable: false,
    }
}

const fn obj_nul(interface: Interface) -> ArgSpec {
    ArgSpec::Object {
        interface: Some(interface),
        nullable: true,
    }
}

const fn new_id(interface: Interface) -> ArgSpec {
    ArgSpec::NewId {
        interface: Some(interface),
    }
}

const fn msg(name: &'static str, args: &'static [ArgSpec]) -> MessageSpec {
    MessageSpec {
        name,
        since: 1,
        destructor: false,
        args,
    }
}

const fn msg_since(name: &'static str, since: u32, args: &'static [ArgSpec]) -> MessageSpec {
    MessageSpec {
        name,
        since,
        destructor: false,
        args,
    }
}

const fn dtor(name: &'static str) -> MessageSpec {
    MessageSpec {
        name,
        since: 1,
        destructor: true,
        args: &[],
    }
}

const fn dtor_since(name: &'static str, since: u32) -> MessageSpec {
    MessageSpec {
        name,
        since,
        destructor: true,
        args: &[],
    }
}

use Interface::*;

static WL_DISPLAY: InterfaceSpec = InterfaceSpec {
    name: "wl_display",
    max_version: 1,
    requests: &[
        msg("sync", &[new_id(WlCallback)]),
        msg("get_registry", &[new_id(WlRegistry)]),
    ],
    events: &[
        msg("error", &[ANY_OBJ, UINT, STR]),
        msg("delete_id", &[UINT]),
    ],
};

static WL_REGISTRY: InterfaceSpec = InterfaceSpec {
    name: "wl_registry",
    max_version: 1,
    requests: &[msg("bind", &[UINT, BIND_NEW_ID])],
    events: &[
        msg("global", &[UINT, STR, UINT]),
        msg("global_remove", &[UINT]),
    ],
};

static WL_CALLBACK: InterfaceSpec = InterfaceSpec {
    name: "wl_callback",
    max_version: 1,
    requests: &[],
    events: &[msg("done", &[UINT])],
};

static WL_COMPOSITOR: InterfaceSpec = InterfaceSpec {
    name: "wl_compositor",
    max_version: 5,
    requests: &[
        msg("create_surface", &[new_id(WlSurface)]),
        msg("create_region", &[new_id(WlRegion)]),
    ],
    events: &[],
};

static WL_SURFACE: InterfaceSpec = InterfaceSpec {
    name: "wl_surface",
    max_version: 5,
    requests: &[
        dtor("destroy"),
        msg("attach", &[obj_nul(WlBuffer), INT, INT]),
        msg("damage", &[INT, INT, INT, INT]),
        msg("frame", &[new_id(WlCallback)]),
        msg("set_opaque_region", &[obj_nul(WlRegion)]),
        msg("set_input_region", &[obj_nul(WlRegion)]),
        msg("commit", &[]),
        msg_since("set_buffer_transform", 2, &[INT]),
        msg_since("set_buffer_scale", 3, &[INT]),
        msg_since("damage_buffer", 4, &[INT, INT, INT, INT]),
        msg_since("offset", 5, &[INT, INT]),
    ],
    events: &[
        msg("enter", &[obj(WlOutput)]),
        msg("leave", &[obj(WlOutput)]),
        msg_since("preferred_buffer_scale", 6, &[INT]),
        msg_since("preferred_buffer_transform", 6, &[UINT]),
    ],
};

static WL_REGION: InterfaceSpec = InterfaceSpec {
    name: "wl_region",
    max_version: 1,
    requests: &[
        dtor("destroy"),
        msg("add", &[INT, INT, INT, INT]),
        msg("subtract", &[INT, INT, INT, INT]),
    ],
    events: &[],
};

static WL_SHM: InterfaceSpec = InterfaceSpec {
    name: "wl_shm",
    max_version: 1,
    requests: &[msg("create_pool", &[new_id(WlShmPool), FD, INT])],
    events: &[msg("format", &[UINT])],
};

static WL_SHM_POOL: InterfaceSpec = InterfaceSpec {
    name: "wl_shm_pool",
    max_version: 1,
    requests: &[
        msg("create_buffer", &[new_id(WlBuffer), INT, INT, INT, INT, UINT]),
        dtor("destroy"),
        msg("resize", &[INT]),
    ],
    events: &[],
};

static WL_BUFFER: InterfaceSpec = InterfaceSpec {
    name: "wl_buffer",
    max_version: 1,
    requests: &[dtor("destroy")],
    events: &[msg("release", &[])],
};

static WL_SEAT: InterfaceSpec = InterfaceSpec {
    name: "wl_seat",
    max_version: 7,
    requests: &[
        msg("get_pointer", &[new_id(WlPointer)]),
        msg("get_keyboard", &[new_id(WlKeyboard)]),
        msg("get_touch", &[new_id(WlTouch)]),
        dtor_since("release", 5),
    ],
    events: &[
        msg("capabilities", &[UINT]),
        msg_since("name", 2, &[STR]),
    ],
};

static WL_POINTER: InterfaceSpec = InterfaceSpec {
    name: "wl_pointer",
    max_version: 7,
    requests: &[
        msg("set_cursor", &[UINT, obj_nul(WlSurface), INT, INT]),
        dtor_since("release", 3),
    ],
    events: &[
        msg("enter", &[UINT, obj(WlSurface), FIXED, FIXED]),
        msg("leave", &[UINT, obj(WlSurface)]),
        msg("motion", &[UINT, FIXED, FIXED]),
        msg("button", &[UINT, UINT, UINT, UINT]),
        msg("axis", &[UINT, UINT, FIXED]),
        msg_since("frame", 5, &[]),
        msg_since("axis_source", 5, &[UINT]),
        msg_since("axis_stop", 5, &[UINT, UINT]),
        msg_since("axis_discrete", 5, &[UINT, INT]),
        msg_since("axis_value120", 8, &[UINT, INT]),
        msg_since("axis_relative_direction", 9, &[UINT, UINT]),
    ],
};

static WL_KEYBOARD: InterfaceSpec = InterfaceSpec {
    name: "wl_keyboard",
    max_version: 7,
    requests: &[dtor_since("release", 3)],
    events: &[
        msg("keymap", &[UINT, FD, UINT]),
        msg("enter", &[UINT, obj(WlSurface), ARRAY]),
        msg("leave", &[UINT, obj(WlSurface)]),
        msg("key", &[UINT, UINT, UINT, UINT]),
        msg("modifiers", &[UINT, UINT, UINT, UINT, UINT]),
        msg_since("repeat_info", 4, &[INT, INT]),
    ],
};

static WL_TOUCH: InterfaceSpec = InterfaceSpec {
    name: "wl_touch",
    max_version: 7,
    requests: &[dtor_since("release", 3)],
    events: &[
        msg("down", &[UINT, UINT, obj(WlSurface), INT, FIXED, FIXED]),
        msg("up", &[UINT, UINT, INT]),
        msg("motion", &[UINT, INT, FIXED, FIXED]),
        msg("frame", &[]),
        msg("cancel", &[]),
        msg_since("shape", 6, &[INT, FIXED, FIXED]),
        msg_since("orientation", 6, &[INT, FIXED]),
    ],
};

static WL_OUTPUT: InterfaceSpec = InterfaceSpec {
    name: "wl_output",
    max_version: 4,
    requests: &[dtor_since("release", 3)],
    events: &[
        msg("geometry", &[INT, INT, INT, INT, INT, STR, STR, INT]),
        msg("mode", &[UINT, INT, INT, INT]),
        msg_since("done", 2, &[]),
        msg_since("scale", 2, &[INT]),
        msg_since("name", 4, &[STR]),
        msg_since("description", 4, &[STR]),
    ],
};

static WL_DATA_DEVICE_MANAGER: InterfaceSpec = InterfaceSpec {
    name: "wl_data_device_manager",
    max_version: 3,
    requests: &[
        msg("create_data_source", &[new_id(WlDataSource)]),
        msg("get_data_device", &[new_id(WlDataDevice), obj(WlSeat)]),
    ],
    events: &[],
};

static WL_DATA_DEVICE: InterfaceSpec = InterfaceSpec {
    name: "wl_data_device",
    max_version: 3,
    requests: &[
        msg(
            "start_drag",
            &[
                obj_nul(WlDataSource),
                obj(WlSurface),
                obj_nul(WlSurface),
                UINT,
            ],
        ),
        msg("set_selection", &[obj_nul(WlDataSource), UINT]),
        dtor_since("release", 2),
    ],
    events: &[
        msg("data_offer", &[new_id(WlDataOffer)]),
        msg(
            "enter",
            &[UINT, obj(WlSurface), FIXED, FIXED, obj_nul(WlDataOffer)],
        ),
        msg("leave", &[]),
        msg("motion", &[UINT, FIXED, FIXED]),
        msg("drop", &[]),
        msg("selection", &[obj_nul(WlDataOffer)]),
    ],
};

static WL_DATA_SOURCE: InterfaceSpec = InterfaceSpec {
    name: "wl_data_source",
    max_version: 3,
    requests: &[
        msg("offer", &[STR]),
        dtor("destroy"),
        msg_since("set_actions", 3, &[UINT]),
    ],
    events: &[
        msg("target", &[STR_NUL]),
        msg("send", &[STR, FD]),
        msg("cancelled", &[]),
        msg_since("dnd_drop_performed", 3, &[]),
        msg_since("dnd_finished", 3, &[]),
        msg_since("action", 3, &[UINT]),
    ],
};

static WL_DATA_OFFER: InterfaceSpec = InterfaceSpec {
    name: "wl_data_offer",
    max_version: 3,
    requests: &[
        msg("accept", &[UINT, STR_NUL]),
        msg("receive", &[STR, FD]),
        dtor("destroy"),
        msg_since("finish", 3, &[]),
        msg_since("set_actions", 3, &[UINT, UINT]),
    ],
    events: &[
        msg("offer", &[STR]),
        msg_since("source_actions", 3, &[UINT]),
        msg_since("action", 3, &[UINT]),
    ],
};

static XDG_WM_BASE: InterfaceSpec = InterfaceSpec {
    name: "xdg_wm_base",
    max_version: 5,
    requests: &[
        dtor("destroy"),
        msg("create_positioner", &[new_id(XdgPositioner)]),
        msg("get_xdg_surface", &[new_id(XdgSurface), obj(WlSurface)]),
        msg("pong", &[UINT]),
    ],
    events: &[msg("ping", &[UINT])],
};

static XDG_POSITIONER: InterfaceSpec = InterfaceSpec {
    name: "xdg_positioner",
    max_version: 5,
    requests: &[
        dtor("destroy"),
        msg("set_size", &[INT, INT]),
        msg("set_anchor_rect", &[INT, INT, INT, INT]),
        msg("set_anchor", &[UINT]),
        msg("set_gravity", &[UINT]),
        msg("set_constraint_adjustment", &[UINT]),
        msg("set_offset", &[INT, INT]),
        msg_since("set_reactive", 3, &[]),
        msg_since("set_parent_size", 3, &[INT, INT]),
        msg_since("set_parent_configure", 3, &[UINT]),
    ],
    events: &[],
};

static XDG_SURFACE: InterfaceSpec = InterfaceSpec {
    name: "xdg_surface",
    max_version: 5,
    requests: &[
        dtor("destroy"),
        msg("get_toplevel", &[new_id(XdgToplevel)]),
        msg(
            "get_popup",
            &[new_id(XdgPopup), obj_nul(XdgSurface), obj(XdgPositioner)],
        ),
        msg("set_window_geometry", &[INT, INT, INT, INT]),
        msg("ack_configure", &[UINT]),
    ],
    events: &[msg("configure", &[UINT])],
};

static XDG_TOPLEVEL: InterfaceSpec = InterfaceSpec {
    name: "xdg_toplevel",
    max_version: 5,
    requests: &[
        dtor("destroy"),
        msg("set_parent", &[obj_nul(XdgToplevel)]),
        msg("set_title", &[STR]),
        msg("set_app_id", &[STR]),
        msg("show_window_menu", &[obj(WlSeat), UINT, INT, INT]),
        msg("move", &[obj(WlSeat), UINT]),
        msg("resize", &[obj(WlSeat), UINT, UINT]),
        msg("set_max_size", &[INT, INT]),
        msg("set_min_size", &[INT, INT]),
        msg("set_maximized", &[]),
        msg("unset_maximized", &[]),
        msg("set_fullscreen", &[obj_nul(WlOutput)]),
        msg("unset_fullscreen", &[]),
        msg("set_minimized", &[]),
    ],
    events: &[
        msg("configure", &[INT, INT, ARRAY]),
        msg("close", &[]),
        msg_since("configure_bounds", 4, &[INT, INT]),
        msg_since("wm_capabilities", 5, &[ARRAY]),
    ],
};

static XDG_POPUP: InterfaceSpec = InterfaceSpec {
    name: "xdg_popup",
    max_version: 5,
    requests: &[
        dtor("destroy"),
        msg("grab", &[obj(WlSeat), UINT]),
        msg_since("reposition", 3, &[obj(XdgPositioner), UINT]),
    ],
    events: &[
        msg("configure", &[INT, INT, INT, INT]),
        msg("popup_done", &[]),
        msg_since("repositioned", 3, &[UINT]),
    ],
};

static ZXDG_OUTPUT_MANAGER_V1: InterfaceSpec = InterfaceSpec {
    name: "zxdg_output_manager_v1",
    max_version: 3,
    requests: &[
        dtor("destroy"),
        msg("get_xdg_output", &[new_id(ZxdgOutputV1), obj(WlOutput)]),
    ],
    events: &[],
};

static ZXDG_OUTPUT_V1: InterfaceSpec = InterfaceSpec {
    name: "zxdg_output_v1",
    max_version: 3,
    requests: &[dtor("destroy")],
    events: &[
        msg("logical_position", &[INT, INT]),
        msg("logical_size", &[INT, INT]),
        msg("done", &[]),
        msg_since("name", 2, &[STR]),
        msg_since("description", 2, &[STR]),
    ],
};

static ZWP_PRIMARY_SELECTION_DEVICE_MANAGER_V1: InterfaceSpec = InterfaceSpec {
    name: "zwp_primary_selection_device_manager_v1",
    max_version: 1,
    requests: &[
        msg("create_source", &[new_id(ZwpPrimarySelectionSourceV1)]),
        msg(
            "get_device",
            &[new_id(ZwpPrimarySelectionDeviceV1), obj(WlSeat)],
        ),
        dtor("destroy"),
    ],
    events: &[],
};

static ZWP_PRIMARY_SELECTION_DEVICE_V1: InterfaceSpec = InterfaceSpec {
    name: "zwp_primary_selection_device_v1",
    max_version: 1,
    requests: &[
        msg(
            "set_selection",
            &[obj_nul(ZwpPrimarySelectionSourceV1), UINT],
        ),
        dtor("destroy"),
    ],
    events: &[
        msg("data_offer", &[new_id(ZwpPrimarySelectionOfferV1)]),
        msg("selection", &[obj_nul(ZwpPrimarySelectionOfferV1)]),
    ],
};

static ZWP_PRIMARY_SELECTION_OFFER_V1: InterfaceSpec = InterfaceSpec {
    name: "zwp_primary_selection_offer_v1",
    max_version: 1,
    requests: &[msg("receive", &[STR, FD]), dtor("destroy")],
    events: &[msg("offer", &[STR])],
};

static ZWP_PRIMARY_SELECTION_SOURCE_V1: InterfaceSpec = InterfaceSpec {
    name: "zwp_primary_selection_source_v1",
    max_version: 1,
    requests: &[msg("offer", &[STR]), dtor("destroy")],
    events: &[msg("send", &[STR, FD]), msg("cancelled", &[])],
};

static GTK_PRIMARY_SELECTION_DEVICE_MANAGER: InterfaceSpec = InterfaceSpec {
    name: "gtk_primary_selection_device_manager",
    max_version: 1,
    requests: &[
        msg("create_source", &[new_id(GtkPrimarySelectionSource)]),
        msg(
            "get_device",
            &[new_id(GtkPrimarySelectionDevice), obj(WlSeat)],
        ),
        dtor("destroy"),
    ],
    events: &[],
};

static GTK_PRIMARY_SELECTION_DEVICE: InterfaceSpec = InterfaceSpec {
    name: "gtk_primary_selection_device",
    max_version: 1,
    requests: &[
        msg("set_selection", &[obj_nul(GtkPrimarySelectionSource), UINT]),
        dtor("destroy"),
    ],
    events: &[
        msg("data_offer", &[new_id(GtkPrimarySelectionOffer)]),
        msg("selection", &[obj_nul(GtkPrimarySelectionOffer)]),
    ],
};

static GTK_PRIMARY_SELECTION_OFFER: InterfaceSpec = InterfaceSpec {
    name: "gtk_primary_selection_offer",
    max_version: 1,
    requests: &[msg("receive", &[STR, FD]), dtor("destroy")],
    events: &[msg("offer", &[STR])],
};

static GTK_PRIMARY_SELECTION_SOURCE: InterfaceSpec = InterfaceSpec {
    name: "gtk_primary_selection_source",
    max_version: 1,
    requests: &[msg("offer", &[STR]), dtor("destroy")],
    events: &[msg("send", &[STR, FD]), msg("cancelled", &[])],
};

static INTERFACES: phf::Map<&'static str, Interface> = phf_map! {
    "wl_display" => WlDisplay,
    "wl_registry" => WlRegistry,
    "wl_callback" => WlCallback,
    "wl_compositor" => WlCompositor,
    "wl_surface" => WlSurface,
    "wl_region" => WlRegion,
    "wl_shm" => WlShm,
    "wl_shm_pool" => WlShmPool,
    "wl_buffer" => WlBuffer,
    "wl_seat" => WlSeat,
    "wl_pointer" => WlPointer,
    "wl_keyboard" => WlKeyboard,
    "wl_touch" => WlTouch,
    "wl_output" => WlOutput,
    "wl_data_device_manager" => WlDataDeviceManager,
    "wl_data_device" => WlDataDevice,
    "wl_data_source" => WlDataSource,
    "wl_data_offer" => WlDataOffer,
    "xdg_wm_base" => XdgWmBase,
    "xdg_positioner" => XdgPositioner,
    "xdg_surface" => XdgSurface,
    "xdg_toplevel" => XdgToplevel,
    "xdg_popup" => XdgPopup,
    "zxdg_output_manager_v1" => ZxdgOutputManagerV1,
    "zxdg_output_v1" => ZxdgOutputV1,
    "zwp_primary_selection_device_manager_v1" => ZwpPrimarySelectionDeviceManagerV1,
    "zwp_primary_selection_device_v1" => ZwpPrimarySelectionDeviceV1,
    "zwp_primary_selection_offer_v1" => ZwpPrimarySelectionOfferV1,
    "zwp_primary_selection_source_v1" => ZwpPrimarySelectionSourceV1,
    "gtk_primary_selection_device_manager" => GtkPrimarySelectionDeviceManager,
    "gtk_primary_selection_device" => GtkPrimarySelectionDevice,
    "gtk_primary_selection_offer" => GtkPrimarySelectionOffer,
    "gtk_primary_selection_source" => GtkPrimarySelectionSource,
};

impl Interface {
    pub(crate) fn spec(self) -> &'static InterfaceSpec {
        match self {
            WlDisplay => &WL_DISPLAY,
            WlRegistry => &WL_REGISTRY,
            WlCallback => &WL_CALLBACK,
            WlCompositor => &WL_COMPOSITOR,
            WlSurface => &WL_SURFACE,
            WlRegion => &WL_REGION,
            WlShm => &WL_SHM,
            WlShmPool => &WL_SHM_POOL,
            WlBuffer => &WL_BUFFER,
            WlSeat => &WL_SEAT,
            WlPointer => &WL_POINTER,
            WlKeyboard => &WL_KEYBOARD,
            WlTouch => &WL_TOUCH,
            WlOutput => &WL_OUTPUT,
            WlDataDeviceManager => &WL_DATA_DEVICE_MANAGER,
            WlDataDevice => &WL_DATA_DEVICE,
            WlDataSource => &WL_DATA_SOURCE,
            WlDataOffer => &WL_DATA_OFFER,
            XdgWmBase => &XDG_WM_BASE,
            XdgPositioner => &XDG_POSITIONER,
            XdgSurface => &XDG_SURFACE,
            XdgToplevel => &XDG_TOPLEVEL,
            XdgPopup => &XDG_POPUP,
            ZxdgOutputManagerV1 => &ZXDG_OUTPUT_MANAGER_V1,
            ZxdgOutputV1 => &ZXDG_OUTPUT_V1,
            ZwpPrimarySelectionDeviceManagerV1 => &ZWP_PRIMARY_SELECTION_DEVICE_MANAGER_V1,
            ZwpPrimarySelectionDeviceV1 => &ZWP_PRIMARY_SELECTION_DEVICE_V1,
            ZwpPrimarySelectionOfferV1 => &ZWP_PRIMARY_SELECTION_OFFER_V1,
            ZwpPrimarySelectionSourceV1 => &ZWP_PRIMARY_SELECTION_SOURCE_V1,
            GtkPrimarySelectionDeviceManager => &GTK_PRIMARY_SELECTION_DEVICE_MANAGER,
            GtkPrimarySelectionDevice => &GTK_PRIMARY_SELECTION_DEVICE,
            GtkPrimarySelectionOffer => &GTK_PRIMARY_SELECTION_OFFER,
            GtkPrimarySelectionSource => &GTK_PRIMARY_SELECTION_SOURCE,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        self.spec().name
    }

    pub(crate) fn max_version(self) -> u32 {
        self.spec().max_version
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        INTERFACES.get(name).copied()
    }

    /// The host-side interface of the wire-compatible legacy pair, if this is
    /// one of the legacy gtk_primary_selection interfaces.
    pub(crate) fn gtk_to_zwp(self) -> Option<Self> {
        match self {
            GtkPrimarySelectionDeviceManager => Some(ZwpPrimarySelectionDeviceManagerV1),
            GtkPrimarySelectionDevice => Some(ZwpPrimarySelectionDeviceV1),
            GtkPrimarySelectionOffer => Some(ZwpPrimarySelectionOfferV1),
            GtkPrimarySelectionSource => Some(ZwpPrimarySelectionSourceV1),
            _ => None,
        }
    }

    /// The guest-side legacy interface paired with this zwp_primary_selection
    /// interface.
    pub(crate) fn zwp_to_gtk(self) -> Option<Self> {
        match self {
            ZwpPrimarySelectionDeviceManagerV1 => Some(GtkPrimarySelectionDeviceManager),
            ZwpPrimarySelectionDeviceV1 => Some(GtkPrimarySelectionDevice),
            ZwpPrimarySelectionOfferV1 => Some(GtkPrimarySelectionOffer),
            ZwpPrimarySelectionSourceV1 => Some(GtkPrimarySelectionSource),
            _ => None,
        }
    }

    pub(crate) fn is_gtk_primary_selection(self) -> bool {
        self.gtk_to_zwp().is_some()
    }
}
