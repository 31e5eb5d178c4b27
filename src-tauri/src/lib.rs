pub mod commands;
pub mod config;
pub mod context;
pub mod dialogs;
pub mod error;
pub mod launcher;
pub mod probe;
pub mod separation;

use anyhow::Context as _;
use tauri::{Manager, RunEvent};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::ShellConfig;
use context::AppContext;

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stem_shell_lib=info,backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn build_context() -> anyhow::Result<AppContext> {
    let config = ShellConfig::from_env().context("failed to load configuration")?;
    info!(mode = ?config.mode, backend = %config.backend_url, "configuration loaded");
    AppContext::new(config)
}

pub fn run() {
    init_tracing();

    let context = match build_context() {
        Ok(context) => context,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    tauri::Builder::default()
        .manage(context)
        .setup(|app| {
            let resource_dir = match app.path().resource_dir() {
                Ok(dir) => Some(dir),
                Err(e) => {
                    error!("Failed to resolve resource dir: {}", e);
                    None
                }
            };
            app.state::<AppContext>()
                .start_backend(resource_dir.as_deref());

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::select_file,
            commands::select_folder,
            commands::separate_track,
            commands::cancel_separation,
            commands::get_audio_metadata
        ])
        .build(tauri::generate_context!())
        .expect("error while building Tauri application")
        .run(|app, event| {
            if let RunEvent::Exit = event {
                app.state::<AppContext>().shutdown();
            }
        });
}
