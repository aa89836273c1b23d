use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoginState {
    NotLoggedIn,
    LoggedIn,
}

impl LoginState {
    pub fn from_rendered(is_logged: bool) -> Self {
        if is_logged {
            LoginState::LoggedIn
        } else {
            LoginState::NotLoggedIn
        }
    }
}

/// Process-wide session state. Mutated only by the coordinator; everything
/// else reads snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub login_state: LoginState,
    pub window_visible: bool,
    pub unread_badge: u32,
    pub terminal_failure: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            login_state: LoginState::NotLoggedIn,
            window_visible: true,
            unread_badge: 0,
            terminal_failure: false,
        }
    }
}

impl SessionState {
    /// Applies a login signal. Returns true when the state changed value;
    /// a change always forces the window visible, a repeated signal of the
    /// same value leaves visibility alone.
    pub fn apply_login(&mut self, next: LoginState) -> bool {
        let changed = self.login_state != next;
        self.login_state = next;
        if changed {
            self.window_visible = true;
        }
        changed
    }

    pub fn set_badge(&mut self, count: u32) {
        self.unread_badge = count;
    }

    pub fn mark_hidden(&mut self) {
        self.window_visible = false;
    }

    pub fn mark_shown(&mut self) {
        self.window_visible = true;
    }

    pub fn mark_terminal(&mut self) {
        self.terminal_failure = true;
    }
}
