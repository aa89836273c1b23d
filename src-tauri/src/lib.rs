mod bridge;
mod config;
mod history;
mod links;
mod proxy;
mod session;
mod transform;

use std::sync::RwLock;

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde_json::Value;
use tauri::{AppHandle, Manager, State, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_opener::OpenerExt;

use bridge::{BridgeSenders, ProxySettings};
use history::HistoryCache;
use session::{SessionCoordinator, TauriHost, MAIN_WINDOW, TRAY_ID};
use transform::{Message, Payload, RemoteConstants, TransformPipeline};

pub(crate) struct AppState {
    history: HistoryCache,
    // None until the page registers the remote constants table.
    pipeline: RwLock<Option<TransformPipeline>>,
    bridge: BridgeSenders,
}

/// Accepts the remote client's constants table and constructs the transform
/// pipeline around it. Until this runs, payloads pass through unclassified.
#[tauri::command]
fn register_constants(table: Value, state: State<AppState>) -> Result<(), String> {
    let constants = RemoteConstants::from_value(table)
        .ok_or_else(|| "constants table does not satisfy the contract".to_string())?;

    let pipeline = TransformPipeline::new(constants, state.history.clone());
    *state.pipeline.write().unwrap() = Some(pipeline);
    info!("remote constants registered, payload classification enabled");
    Ok(())
}

/// The page's response-transform hook: structured bodies and template
/// strings both come through here and go back rewritten.
#[tauri::command]
fn transform_response(payload: Value, state: State<AppState>) -> Value {
    let guard = state.pipeline.read().unwrap();
    transform_payload(guard.as_ref(), payload)
}

/// Template splicing takes nothing from the remote constants table, so it
/// runs whether or not the table has been registered yet; only message
/// classification waits on the pipeline.
fn transform_payload(pipeline: Option<&TransformPipeline>, payload: Value) -> Value {
    match payload {
        Value::String(source) => Value::String(transform::splice_template_hooks(source)),
        structured => match pipeline {
            Some(pipeline) => match pipeline.transform(Payload::Structured(structured)) {
                Payload::Structured(out) => out,
                Payload::Template(out) => Value::String(out),
            },
            None => structured,
        },
    }
}

#[tauri::command]
async fn read_history(
    peer_user_id: String,
    state: State<'_, AppState>,
) -> Result<Vec<Message>, String> {
    Ok(state.history.read_all(&peer_user_id).await)
}

/// Returns cached messages for the peer only when the page's own chat list
/// is still empty; a populated list means the client already restored from
/// its backend and a second insert would duplicate.
#[tauri::command]
async fn restore_history(
    peer_user_id: String,
    chat_len: usize,
    state: State<'_, AppState>,
) -> Result<Vec<Message>, String> {
    let mut restored = Vec::new();
    if chat_len == 0 {
        state
            .history
            .restore_into(&mut restored, &peer_user_id)
            .await;
    }
    Ok(restored)
}

#[tauri::command]
fn badge_changed(count: u32, state: State<AppState>) {
    state.bridge.badge_changed.send(count);
}

#[tauri::command]
fn user_logged(state: State<AppState>) {
    state.bridge.user_logged.send(());
}

#[tauri::command]
fn wx_rendered(is_logged: bool, state: State<AppState>) {
    state.bridge.login_rendered.send(is_logged);
}

#[tauri::command]
fn reload(repetitive: bool, state: State<AppState>) {
    state.bridge.reload.send(repetitive);
}

#[tauri::command]
fn load_failed(code: i32, state: State<AppState>) {
    state.bridge.load_failed.send(code);
}

#[tauri::command]
fn page_log(message: String, state: State<AppState>) {
    state.bridge.log.send(message);
}

#[tauri::command]
fn check_update(state: State<AppState>) {
    state.bridge.update.send(());
}

#[tauri::command]
fn proxy_settings(ip: String, port: u16, state: State<AppState>) {
    state.bridge.proxy_settings.send(ProxySettings { ip, port });
}

fn create_main_window(app: &AppHandle, senders: &BridgeSenders) -> Result<tauri::WebviewWindow> {
    let url = tauri::Url::parse(config::WEB_CLIENT_URL).context("client URL invalid")?;

    let nav_app = app.clone();
    let mut builder = WebviewWindowBuilder::new(app, MAIN_WINDOW, WebviewUrl::External(url))
        .title(config::APP_NAME)
        .inner_size(
            config::LOGIN_PROMPT_SIZE.width as f64,
            config::LOGIN_PROMPT_SIZE.height as f64,
        )
        .resizable(true)
        .center()
        .user_agent(config::USER_AGENT)
        .on_navigation(move |url| {
            if links::is_client_url(url) {
                return true;
            }
            let target = links::redirect_target(url);
            info!("opening external link in browser: {target}");
            if let Err(err) = nav_app.opener().open_url(&target, None::<&str>) {
                warn!("failed to open external link: {err}");
            }
            false
        });

    if let Some(rules) = proxy::load(app) {
        match tauri::Url::parse(&format!("http://{rules}")) {
            Ok(proxy_url) => {
                info!("applying proxy {rules} to primary window");
                builder = builder.proxy_url(proxy_url);
            }
            Err(err) => warn!("ignoring malformed proxy rules '{rules}': {err}"),
        }
    }

    let window = builder.build().context("failed to create primary window")?;

    // User close hides the window; the tray brings it back. The coordinator
    // decides whether a hide after terminal failover should end the process.
    let hidden = senders.window_hidden.clone();
    let window_for_close = window.clone();
    window.on_window_event(move |event| {
        if let tauri::WindowEvent::CloseRequested { api, .. } = event {
            api.prevent_close();
            if let Err(err) = window_for_close.hide() {
                error!("failed to hide window on close: {err}");
            }
            hidden.send(());
        }
    });

    Ok(window)
}

fn create_tray(app: &AppHandle, senders: &BridgeSenders) -> Result<()> {
    use tauri::tray::{MouseButton, TrayIconBuilder, TrayIconEvent};

    // Restores from the tray go through the window-shown channel so the
    // coordinator's visibility bookkeeping stays in step with the screen.
    let shown = senders.window_shown.clone();
    let mut builder = TrayIconBuilder::with_id(TRAY_ID)
        .tooltip(config::APP_NAME)
        .on_tray_icon_event(move |tray, event| {
            if let TrayIconEvent::Click {
                button: MouseButton::Left,
                ..
            } = event
            {
                if let Some(window) = tray.app_handle().get_webview_window(MAIN_WINDOW) {
                    let _ = window.show();
                    let _ = window.set_focus();
                    shown.send(());
                }
            }
        });

    if let Some(icon) = app.default_window_icon() {
        builder = builder.icon(icon.clone());
    }

    #[cfg(target_os = "linux")]
    {
        use tauri::menu::{MenuBuilder, MenuItemBuilder};

        let show = MenuItemBuilder::with_id("show", "Show").build(app)?;
        let exit = MenuItemBuilder::with_id("exit", "Exit").build(app)?;
        let menu = MenuBuilder::new(app).items(&[&show, &exit]).build()?;

        let shown = senders.window_shown.clone();
        builder = builder.menu(&menu).on_menu_event(move |app, event| {
            match event.id().as_ref() {
                "show" => {
                    if let Some(window) = app.get_webview_window(MAIN_WINDOW) {
                        let _ = window.show();
                        let _ = window.set_focus();
                        shown.send(());
                    }
                }
                "exit" => app.exit(0),
                _ => {}
            }
        });
    }

    builder.build(app).context("failed to create tray icon")?;
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("{} starting up...", config::APP_NAME);

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let history = HistoryCache::new(app_data_dir.join("history.sqlite3"))?;
                let (senders, receivers) = bridge::event_bridge();

                app.manage(AppState {
                    history,
                    pipeline: RwLock::new(None),
                    bridge: senders.clone(),
                });

                let window = create_main_window(app.handle(), &senders)?;
                create_tray(app.handle(), &senders)?;

                let coordinator =
                    SessionCoordinator::new(window, TauriHost::new(app.handle().clone()));
                tauri::async_runtime::spawn(coordinator.run(receivers));

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            register_constants,
            transform_response,
            read_history,
            restore_history,
            badge_changed,
            user_logged,
            wx_rendered,
            reload,
            load_failed,
            page_log,
            check_update,
            proxy_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
