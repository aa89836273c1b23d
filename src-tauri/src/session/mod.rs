pub mod coordinator;
pub mod shell;
pub mod state;

pub use coordinator::SessionCoordinator;
pub use shell::{HostSurface, TauriHost, WindowShell, MAIN_WINDOW, TRAY_ID};
pub use state::{LoginState, SessionState};
