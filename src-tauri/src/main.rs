// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

#[tokio::main]
async fn main() {
    // Share this runtime with Tauri so commands and the backend monitor run on it.
    tauri::async_runtime::set(tokio::runtime::Handle::current());
    stem_shell_lib::run();
}
