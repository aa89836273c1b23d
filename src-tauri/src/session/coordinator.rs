use anyhow::Result;
use log::{error, info, warn};

use crate::bridge::{BridgeReceivers, ProxySettings};
use crate::config::{self, LOGGED_IN_SIZE, LOGIN_PROMPT_SIZE};

use super::shell::{HostSurface, WindowShell};
use super::state::{LoginState, SessionState};

/// Owns the login/window state machine. Consumes bridge signals, drives the
/// primary window's geometry and visibility, mirrors the unread badge, and
/// handles failover to the degraded connectivity window.
pub struct SessionCoordinator<W: WindowShell, H: HostSurface> {
    state: SessionState,
    window: Option<W>,
    host: H,
}

impl<W: WindowShell, H: HostSurface> SessionCoordinator<W, H> {
    pub fn new(window: W, host: H) -> Self {
        Self {
            state: SessionState::default(),
            window: Some(window),
            host,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn handle_login_rendered(&mut self, is_logged: bool) {
        self.apply_login(LoginState::from_rendered(is_logged));
    }

    pub fn handle_user_logged(&mut self) {
        self.apply_login(LoginState::LoggedIn);
    }

    fn apply_login(&mut self, next: LoginState) {
        let Some(window) = &self.window else {
            warn!("login signal after primary window teardown, ignoring");
            return;
        };

        let logged_in = next == LoginState::LoggedIn;
        let size = if logged_in {
            LOGGED_IN_SIZE
        } else {
            LOGIN_PROMPT_SIZE
        };

        if let Err(err) = apply_geometry(window, size, logged_in) {
            error!("failed to apply window geometry: {err:#}");
        }

        if self.state.apply_login(next) {
            info!("login state changed to {next:?}, bringing window to front");
            if let Err(err) = window.show() {
                error!("failed to show window: {err:#}");
            }
        }
    }

    pub fn handle_badge_changed(&mut self, count: u32) {
        self.state.set_badge(count);
        self.host.set_badge(count);
    }

    /// A load failure with the proxy-required code is terminal: the primary
    /// window is torn down, a static fallback window takes its place, and
    /// only a process restart recovers the session.
    pub fn handle_load_failed(&mut self, code: i32) {
        if code != config::PROXY_ERROR_CODE {
            warn!("primary window load failed with code {code}, leaving window up");
            return;
        }

        error!("primary window load failed with proxy-required code {code}, raising fallback");
        if let Some(window) = self.window.take() {
            if let Err(err) = window.destroy() {
                error!("failed to destroy primary window: {err:#}");
            }
        }
        self.state.mark_terminal();

        if let Err(err) = self.host.raise_fallback() {
            error!("failed to raise fallback window: {err:#}");
        }
    }

    pub fn handle_reload(&mut self, repetitive: bool) {
        if repetitive {
            warn!("page requested repeated reload, client may be stuck");
        }
        if let Some(window) = &self.window {
            if let Err(err) = window.navigate(config::WEB_CLIENT_URL) {
                error!("failed to reload client: {err:#}");
            }
        }
    }

    /// User closed the primary window; it was hidden, not destroyed, so the
    /// tray can bring it back. After the terminal failover the process has
    /// nothing left to keep alive.
    pub fn handle_window_hidden(&mut self) {
        if self.state.terminal_failure {
            self.host.exit();
            return;
        }
        self.state.mark_hidden();
    }

    /// The tray brought the window back; only the bookkeeping moves, the
    /// tray handler already showed the window itself.
    pub fn handle_window_shown(&mut self) {
        self.state.mark_shown();
    }

    pub fn handle_update(&self) {
        self.host.check_update();
    }

    pub fn handle_proxy_settings(&mut self, settings: ProxySettings) {
        self.host.save_proxy_and_quit(&settings);
    }

    pub fn handle_page_log(&self, message: String) {
        info!("[page] {message}");
    }

    /// Event loop over the bridge receivers. Per-channel order is the
    /// channel's own FIFO; arrival order across channels is whatever the
    /// select picks. Ends when every sender is gone.
    pub async fn run(mut self, mut rx: BridgeReceivers) {
        loop {
            tokio::select! {
                Some(count) = rx.badge_changed.recv() => self.handle_badge_changed(count),
                Some(()) = rx.user_logged.recv() => self.handle_user_logged(),
                Some(is_logged) = rx.login_rendered.recv() => self.handle_login_rendered(is_logged),
                Some(repetitive) = rx.reload.recv() => self.handle_reload(repetitive),
                Some(code) = rx.load_failed.recv() => self.handle_load_failed(code),
                Some(message) = rx.log.recv() => self.handle_page_log(message),
                Some(()) = rx.update.recv() => self.handle_update(),
                Some(settings) = rx.proxy_settings.recv() => self.handle_proxy_settings(settings),
                Some(()) = rx.window_hidden.recv() => self.handle_window_hidden(),
                Some(()) = rx.window_shown.recv() => self.handle_window_shown(),
                else => break,
            }
        }
        info!("session coordinator shutting down");
    }
}

fn apply_geometry<W: WindowShell>(window: &W, size: config::WindowSize, resizable: bool) -> Result<()> {
    window.set_resizable(resizable)?;
    window.set_size(size)?;
    window.center()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowSize;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum WindowOp {
        Resizable(bool),
        Size(WindowSize),
        Center,
        Show,
        Hide,
        Navigate(String),
        Destroy,
    }

    #[derive(Clone, Default)]
    struct FakeWindow {
        ops: Rc<RefCell<Vec<WindowOp>>>,
    }

    impl FakeWindow {
        fn ops(&self) -> Vec<WindowOp> {
            self.ops.borrow().clone()
        }

        fn last_size(&self) -> Option<WindowSize> {
            self.ops
                .borrow()
                .iter()
                .rev()
                .find_map(|op| match op {
                    WindowOp::Size(size) => Some(*size),
                    _ => None,
                })
        }
    }

    impl WindowShell for FakeWindow {
        fn set_size(&self, size: WindowSize) -> Result<()> {
            self.ops.borrow_mut().push(WindowOp::Size(size));
            Ok(())
        }

        fn set_resizable(&self, resizable: bool) -> Result<()> {
            self.ops.borrow_mut().push(WindowOp::Resizable(resizable));
            Ok(())
        }

        fn center(&self) -> Result<()> {
            self.ops.borrow_mut().push(WindowOp::Center);
            Ok(())
        }

        fn show(&self) -> Result<()> {
            self.ops.borrow_mut().push(WindowOp::Show);
            Ok(())
        }

        fn hide(&self) -> Result<()> {
            self.ops.borrow_mut().push(WindowOp::Hide);
            Ok(())
        }

        fn navigate(&self, url: &str) -> Result<()> {
            self.ops.borrow_mut().push(WindowOp::Navigate(url.into()));
            Ok(())
        }

        fn destroy(&self) -> Result<()> {
            self.ops.borrow_mut().push(WindowOp::Destroy);
            Ok(())
        }
    }

    #[derive(Default)]
    struct HostLog {
        badges: Vec<u32>,
        fallback_raised: bool,
        update_checks: u32,
        saved_proxy: Option<ProxySettings>,
        exited: bool,
    }

    #[derive(Clone, Default)]
    struct FakeHost {
        log: Rc<RefCell<HostLog>>,
    }

    impl HostSurface for FakeHost {
        fn set_badge(&self, count: u32) {
            self.log.borrow_mut().badges.push(count);
        }

        fn raise_fallback(&self) -> Result<()> {
            self.log.borrow_mut().fallback_raised = true;
            Ok(())
        }

        fn check_update(&self) {
            self.log.borrow_mut().update_checks += 1;
        }

        fn save_proxy_and_quit(&self, settings: &ProxySettings) {
            let mut log = self.log.borrow_mut();
            log.saved_proxy = Some(settings.clone());
            log.exited = true;
        }

        fn exit(&self) {
            self.log.borrow_mut().exited = true;
        }
    }

    fn coordinator() -> (SessionCoordinator<FakeWindow, FakeHost>, FakeWindow, FakeHost) {
        let window = FakeWindow::default();
        let host = FakeHost::default();
        (
            SessionCoordinator::new(window.clone(), host.clone()),
            window,
            host,
        )
    }

    #[test]
    fn login_forces_hidden_window_visible_with_logged_in_geometry() {
        let (mut coordinator, window, _host) = coordinator();
        coordinator.handle_window_hidden();
        assert!(!coordinator.state().window_visible);

        coordinator.handle_login_rendered(true);

        assert!(coordinator.state().window_visible);
        assert_eq!(coordinator.state().login_state, LoginState::LoggedIn);
        assert_eq!(window.last_size(), Some(LOGGED_IN_SIZE));
        assert!(window.ops().contains(&WindowOp::Show));
        assert!(window.ops().contains(&WindowOp::Resizable(true)));
    }

    #[test]
    fn repeated_login_signal_resizes_but_does_not_reshow() {
        let (mut coordinator, window, _host) = coordinator();
        coordinator.handle_login_rendered(true);
        let shows_after_first = window
            .ops()
            .iter()
            .filter(|op| **op == WindowOp::Show)
            .count();

        coordinator.handle_login_rendered(true);
        let shows_after_second = window
            .ops()
            .iter()
            .filter(|op| **op == WindowOp::Show)
            .count();

        assert_eq!(shows_after_first, 1);
        assert_eq!(shows_after_second, 1);
        assert_eq!(window.last_size(), Some(LOGGED_IN_SIZE));
    }

    #[test]
    fn logout_applies_fixed_login_prompt_geometry() {
        let (mut coordinator, window, _host) = coordinator();
        coordinator.handle_login_rendered(true);
        coordinator.handle_login_rendered(false);

        assert_eq!(coordinator.state().login_state, LoginState::NotLoggedIn);
        assert_eq!(window.last_size(), Some(LOGIN_PROMPT_SIZE));
        assert!(window.ops().contains(&WindowOp::Resizable(false)));
    }

    #[test]
    fn user_logged_signal_is_a_login_transition() {
        let (mut coordinator, window, _host) = coordinator();
        coordinator.handle_window_hidden();
        coordinator.handle_user_logged();

        assert_eq!(coordinator.state().login_state, LoginState::LoggedIn);
        assert!(window.ops().contains(&WindowOp::Show));
    }

    #[test]
    fn badge_updates_reach_host_without_touching_login() {
        let (mut coordinator, _window, host) = coordinator();
        coordinator.handle_badge_changed(4);
        coordinator.handle_badge_changed(0);

        assert_eq!(host.log.borrow().badges, vec![4, 0]);
        assert_eq!(coordinator.state().unread_badge, 0);
        assert_eq!(coordinator.state().login_state, LoginState::NotLoggedIn);
    }

    #[test]
    fn proxy_load_failure_is_terminal() {
        let (mut coordinator, window, host) = coordinator();
        coordinator.handle_load_failed(config::PROXY_ERROR_CODE);

        assert!(coordinator.state().terminal_failure);
        assert!(window.ops().contains(&WindowOp::Destroy));
        assert!(host.log.borrow().fallback_raised);

        // No automatic retry: login signals after teardown are ignored.
        let ops_before = window.ops().len();
        coordinator.handle_login_rendered(true);
        assert_eq!(window.ops().len(), ops_before);
    }

    #[test]
    fn other_load_failures_leave_the_window_up() {
        let (mut coordinator, window, host) = coordinator();
        coordinator.handle_load_failed(-105);

        assert!(!coordinator.state().terminal_failure);
        assert!(!window.ops().contains(&WindowOp::Destroy));
        assert!(!host.log.borrow().fallback_raised);
    }

    #[test]
    fn close_after_terminal_failure_exits_the_process() {
        let (mut coordinator, _window, host) = coordinator();
        coordinator.handle_window_hidden();
        assert!(!host.log.borrow().exited);

        coordinator.handle_load_failed(config::PROXY_ERROR_CODE);
        coordinator.handle_window_hidden();
        assert!(host.log.borrow().exited);
    }

    #[test]
    fn tray_restore_marks_window_visible_again() {
        let (mut coordinator, _window, _host) = coordinator();
        coordinator.handle_window_hidden();
        assert!(!coordinator.state().window_visible);

        coordinator.handle_window_shown();
        assert!(coordinator.state().window_visible);

        // The next matching login signal is still a no-op for visibility.
        assert!(!coordinator.state.apply_login(LoginState::NotLoggedIn));
    }

    #[test]
    fn reload_navigates_back_to_the_client() {
        let (mut coordinator, window, _host) = coordinator();
        coordinator.handle_reload(false);

        assert_eq!(
            window.ops().last(),
            Some(&WindowOp::Navigate(config::WEB_CLIENT_URL.into()))
        );
    }

    #[test]
    fn proxy_settings_are_saved_and_quit_requested() {
        let (mut coordinator, _window, host) = coordinator();
        coordinator.handle_proxy_settings(ProxySettings {
            ip: "127.0.0.1".into(),
            port: 8118,
        });

        let log = host.log.borrow();
        assert_eq!(
            log.saved_proxy,
            Some(ProxySettings {
                ip: "127.0.0.1".into(),
                port: 8118,
            })
        );
        assert!(log.exited);
    }
}
