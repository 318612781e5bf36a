use crate::clipname::ClipPrefix;

#[test]
fn prefix_round_trip() {
    let clip = ClipPrefix::from_prefix("#PID1#");
    let on_host = clip.to_host("text/plain");
    assert_eq!(on_host, "#PID1#text/plain");
    assert_eq!(clip.to_clients(&on_host), Some("text/plain"));
}

#[test]
fn foreign_prefix_is_dropped() {
    let clip = ClipPrefix::from_prefix("#PID1#");
    assert_eq!(clip.to_clients("#other#text/plain"), None);
    assert_eq!(clip.to_clients("text/plain"), None);
}

#[test]
fn empty_prefix_disables_namespacing() {
    let clip = ClipPrefix::from_prefix("");
    assert_eq!(clip.to_host("text/plain"), "text/plain");
    assert_eq!(clip.to_clients("text/plain"), Some("text/plain"));
}

#[test]
fn configured_value_wins() {
    let clip = ClipPrefix::new(Some("#vm#"));
    assert_eq!(clip.to_host("x"), "#vm#x");
}

#[test]
fn default_prefix_contains_pid() {
    // The test environment does not set WAYLAND_PROXY_CLIPNAME.
    if std::env::var_os(crate::clipname::CLIPNAME_ENV).is_some() {
        return;
    }
    let clip = ClipPrefix::new(None);
    let expected = format!("#PID{}#", uapi::getpid());
    assert_eq!(clip.to_host(""), expected);
}
