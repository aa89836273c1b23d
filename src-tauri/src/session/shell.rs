//! Contracts the coordinator drives, and their Tauri implementations.
//!
//! The coordinator never touches OS window or tray APIs directly; it talks
//! to a [`WindowShell`] (the primary window) and a [`HostSurface`] (badge
//! surface, fallback window, process lifetime). Tests substitute fakes.

use anyhow::{Context, Result};
use log::{info, warn};
use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_opener::OpenerExt;

use crate::bridge::ProxySettings;
use crate::config::{self, WindowSize};
use crate::proxy;

pub const MAIN_WINDOW: &str = "main";
pub const FALLBACK_WINDOW: &str = "fallback";
pub const TRAY_ID: &str = "main-tray";

/// Static page shown in the fallback window, served from the app bundle.
const FALLBACK_PAGE: &str = "proxy.html";

pub trait WindowShell {
    fn set_size(&self, size: WindowSize) -> Result<()>;
    fn set_resizable(&self, resizable: bool) -> Result<()>;
    fn center(&self) -> Result<()>;
    fn show(&self) -> Result<()>;
    fn hide(&self) -> Result<()>;
    fn navigate(&self, url: &str) -> Result<()>;
    fn destroy(&self) -> Result<()>;
}

pub trait HostSurface {
    fn set_badge(&self, count: u32);
    fn raise_fallback(&self) -> Result<()>;
    fn check_update(&self);
    fn save_proxy_and_quit(&self, settings: &ProxySettings);
    fn exit(&self);
}

impl WindowShell for tauri::WebviewWindow {
    fn set_size(&self, size: WindowSize) -> Result<()> {
        tauri::WebviewWindow::set_size(
            self,
            tauri::LogicalSize::new(size.width as f64, size.height as f64),
        )
        .context("failed to resize window")
    }

    fn set_resizable(&self, resizable: bool) -> Result<()> {
        tauri::WebviewWindow::set_resizable(self, resizable)
            .context("failed to toggle window resizability")
    }

    fn center(&self) -> Result<()> {
        tauri::WebviewWindow::center(self).context("failed to center window")
    }

    fn show(&self) -> Result<()> {
        tauri::WebviewWindow::show(self).context("failed to show window")?;
        tauri::WebviewWindow::set_focus(self).context("failed to focus window")
    }

    fn hide(&self) -> Result<()> {
        tauri::WebviewWindow::hide(self).context("failed to hide window")
    }

    fn navigate(&self, url: &str) -> Result<()> {
        let url = tauri::Url::parse(url).with_context(|| format!("invalid URL '{url}'"))?;
        self.clone()
            .navigate(url)
            .context("failed to navigate window")
    }

    fn destroy(&self) -> Result<()> {
        tauri::WebviewWindow::destroy(self).context("failed to destroy window")
    }
}

pub struct TauriHost {
    app: AppHandle,
}

impl TauriHost {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl HostSurface for TauriHost {
    fn set_badge(&self, count: u32) {
        if let Some(window) = self.app.get_webview_window(MAIN_WINDOW) {
            let badge = (count > 0).then_some(count as i64);
            if let Err(err) = window.set_badge_count(badge) {
                warn!("failed to set dock badge: {err}");
            }
        }
        if let Some(tray) = self.app.tray_by_id(TRAY_ID) {
            let title = (count > 0).then(|| format!(" {count}"));
            if let Err(err) = tray.set_title(title) {
                warn!("failed to set tray title: {err}");
            }
        }
    }

    fn raise_fallback(&self) -> Result<()> {
        let window = WebviewWindowBuilder::new(
            &self.app,
            FALLBACK_WINDOW,
            WebviewUrl::App(FALLBACK_PAGE.into()),
        )
        .title(config::APP_NAME)
        .inner_size(600.0, 420.0)
        .center()
        .build()
        .context("failed to create fallback window")?;

        window.show().context("failed to show fallback window")?;
        Ok(())
    }

    fn check_update(&self) {
        info!("update check requested, opening releases page");
        if let Err(err) = self
            .app
            .opener()
            .open_url(config::RELEASES_URL, None::<&str>)
        {
            warn!("failed to open releases page: {err}");
        }
    }

    fn save_proxy_and_quit(&self, settings: &ProxySettings) {
        match proxy::save(&self.app, settings) {
            Ok(path) => info!("proxy settings written to {}, quitting", path.display()),
            Err(err) => warn!("failed to write proxy settings: {err:#}"),
        }
        self.app.exit(0);
    }

    fn exit(&self) {
        self.app.exit(0);
    }
}
