//! Fixed shell configuration: window geometry presets, the remote client
//! endpoint, and the transform constants that are ours rather than the
//! remote client's (emoji clamp, anti-recall placeholder).

pub const APP_NAME: &str = "WebChat Shell";

/// Entry point of the remote chat client loaded into the primary window.
pub const WEB_CLIENT_URL: &str = "https://wx.qq.com/";

/// The remote client sniffs the user agent and downgrades unknown browsers.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_3) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/48.0.2564.109 Safari/537.36";

/// Emoji stickers larger than this (either axis) are clamped, px.
pub const EMOJI_MAX_SIZE: u32 = 100;

/// Substituted for both content and digest of a recalled message.
pub const RECALL_PLACEHOLDER: &str = "[A message was recalled, and has been kept]";

/// Digest shown for emoticon messages instead of the raw sticker markup.
pub const EMOTICON_DIGEST: &str = "[Emoticon]";

/// Load-failure code the page reports when it cannot reach the client
/// without a proxy. Terminal for the session.
pub const PROXY_ERROR_CODE: i32 = -101;

/// Opened when the page asks for an update check.
pub const RELEASES_URL: &str = "https://github.com/webchat-shell/webchat-shell/releases/latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// Geometry once a user session is active. Resizable.
pub const LOGGED_IN_SIZE: WindowSize = WindowSize {
    width: 1000,
    height: 670,
};

/// Geometry for the QR login prompt. Fixed size.
pub const LOGIN_PROMPT_SIZE: WindowSize = WindowSize {
    width: 300,
    height: 420,
};
