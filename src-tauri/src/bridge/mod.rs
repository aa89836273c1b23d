//! Typed one-way channels between the page context and the host process.
//!
//! One sender/receiver pair per channel name; delivery order holds within a
//! channel, never across channels. A send to a torn-down receiver drops the
//! message and tells nobody but the log.

use log::debug;
use tokio::sync::mpsc;

pub struct ChannelSender<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<T> ChannelSender<T> {
    /// Non-blocking; never surfaces an error to the sender.
    pub fn send(&self, message: T) {
        if self.tx.send(message).is_err() {
            debug!("bridge channel '{}' has no receiver, dropping message", self.name);
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub struct ChannelReceiver<T> {
    name: &'static str,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> ChannelReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub fn channel<T>(name: &'static str) -> (ChannelSender<T>, ChannelReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSender { name, tx }, ChannelReceiver { name, rx })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub ip: String,
    pub port: u16,
}

/// Page-to-host half handed to the IPC command layer.
#[derive(Clone)]
pub struct BridgeSenders {
    pub badge_changed: ChannelSender<u32>,
    pub user_logged: ChannelSender<()>,
    pub login_rendered: ChannelSender<bool>,
    pub reload: ChannelSender<bool>,
    pub load_failed: ChannelSender<i32>,
    pub log: ChannelSender<String>,
    pub update: ChannelSender<()>,
    pub proxy_settings: ChannelSender<ProxySettings>,
    pub window_hidden: ChannelSender<()>,
    pub window_shown: ChannelSender<()>,
}

/// Host half consumed by the session coordinator's event loop.
pub struct BridgeReceivers {
    pub badge_changed: ChannelReceiver<u32>,
    pub user_logged: ChannelReceiver<()>,
    pub login_rendered: ChannelReceiver<bool>,
    pub reload: ChannelReceiver<bool>,
    pub load_failed: ChannelReceiver<i32>,
    pub log: ChannelReceiver<String>,
    pub update: ChannelReceiver<()>,
    pub proxy_settings: ChannelReceiver<ProxySettings>,
    pub window_hidden: ChannelReceiver<()>,
    pub window_shown: ChannelReceiver<()>,
}

pub fn event_bridge() -> (BridgeSenders, BridgeReceivers) {
    let (badge_tx, badge_rx) = channel("badge-changed");
    let (logged_tx, logged_rx) = channel("user-logged");
    let (rendered_tx, rendered_rx) = channel("wx-rendered");
    let (reload_tx, reload_rx) = channel("reload");
    let (failed_tx, failed_rx) = channel("load-failed");
    let (log_tx, log_rx) = channel("log");
    let (update_tx, update_rx) = channel("update");
    let (proxy_tx, proxy_rx) = channel("proxy-settings");
    let (hidden_tx, hidden_rx) = channel("window-hidden");
    let (shown_tx, shown_rx) = channel("window-shown");

    (
        BridgeSenders {
            badge_changed: badge_tx,
            user_logged: logged_tx,
            login_rendered: rendered_tx,
            reload: reload_tx,
            load_failed: failed_tx,
            log: log_tx,
            update: update_tx,
            proxy_settings: proxy_tx,
            window_hidden: hidden_tx,
            window_shown: shown_tx,
        },
        BridgeReceivers {
            badge_changed: badge_rx,
            user_logged: logged_rx,
            login_rendered: rendered_rx,
            reload: reload_rx,
            load_failed: failed_rx,
            log: log_rx,
            update: update_rx,
            proxy_settings: proxy_rx,
            window_hidden: hidden_rx,
            window_shown: shown_rx,
        },
    )
}
