//! Clipboard MIME-type namespacing.
//!
//! Every MIME type a guest advertises is prefixed before it reaches the host,
//! and the prefix is stripped again from everything flowing back. Offers whose
//! MIME type does not carry the prefix are invisible to the guest. A
//! prefix-aware clipboard manager on the host can use this to route clipboard
//! contents between guests.

#[cfg(test)]
mod tests;

/// The environment variable consulted when no prefix is configured.
pub const CLIPNAME_ENV: &str = "WAYLAND_PROXY_CLIPNAME";

pub(crate) struct ClipPrefix {
    prefix: String,
}

impl ClipPrefix {
    /// Computes the prefix: the configured value if any, else the
    /// `WAYLAND_PROXY_CLIPNAME` environment variable, else `#PID<pid>#`.
    /// An empty value disables prefixing.
    pub(crate) fn new(configured: Option<&str>) -> Self {
        let prefix = match configured {
            Some(p) => p.to_string(),
            None => match std::env::var(CLIPNAME_ENV) {
                Ok(p) => p,
                Err(_) => format!("#PID{}#", uapi::getpid()),
            },
        };
        Self { prefix }
    }

    pub(crate) fn from_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Namespaces a MIME type advertised by the guest.
    pub(crate) fn to_host(&self, mime: &str) -> String {
        format!("{}{}", self.prefix, mime)
    }

    /// Strips the namespace from a MIME type sent by the host. Returns `None`
    /// if the type does not carry the prefix; the caller must drop the
    /// message entirely in that case.
    pub(crate) fn to_clients<'a>(&self, mime: &'a str) -> Option<&'a str> {
        mime.strip_prefix(&self.prefix)
    }
}
