//! Navigation policy for the primary window: the remote chat client may
//! navigate freely within its own hosts, everything else goes to the system
//! browser after unwrapping the client's link-check redirect.

use tauri::Url;

/// Hosts the primary window is allowed to navigate to.
pub fn is_client_url(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    (host.ends_with("qq.com") && host.contains("wx"))
        || (host.ends_with("wechat.com") && host.starts_with("web"))
}

/// Outbound links are routed through the client's `webwxcheckurl` endpoint
/// with the real destination in the `requrl` parameter; unwrap it so the
/// browser lands on the target directly.
pub fn redirect_target(url: &Url) -> String {
    if url.path().ends_with("/webwxcheckurl") {
        if let Some((_, requrl)) = url.query_pairs().find(|(key, _)| key == "requrl") {
            return requrl.into_owned();
        }
    }
    url.to_string()
}
