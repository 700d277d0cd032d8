pub mod console;
pub mod db;
pub mod history;
pub mod models;
pub mod settings;
pub mod storage;
pub mod timer;
pub mod utils;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::Serialize;

use db::Database;
use history::HistoryStore;
use settings::{SettingsStore, StorageBackend};
use storage::{FileStore, KeyValueStore};
use timer::TimerController;

/// Screens reachable from the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Screen {
    #[default]
    Timer,
    History,
    Settings,
}

pub struct AppState {
    pub timer: TimerController,
    pub history: HistoryStore,
    pub settings: SettingsStore,
    screen: Screen,
}

impl AppState {
    /// Wires the timer to a history backed by `store`, hydrating the history
    /// before the timer can record anything.
    pub async fn new(settings: SettingsStore, store: Arc<dyn KeyValueStore>) -> Self {
        let current = settings.get();
        let history = HistoryStore::new(store, current.history_key.clone());
        history.load().await;

        let timer = TimerController::new(
            Arc::new(history.clone()),
            current.default_minutes,
            current.tick_interval(),
        );

        Self {
            timer,
            history,
            settings,
            screen: Screen::default(),
        }
    }

    pub async fn bootstrap(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let store: Arc<dyn KeyValueStore> = match settings.get().storage {
            StorageBackend::Sqlite => Arc::new(Database::new(data_dir.join("pomodoro.sqlite3"))?),
            StorageBackend::File => Arc::new(FileStore::new(data_dir.join("store"))),
        };

        Ok(Self::new(settings, store).await)
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn navigate(&mut self, screen: Screen) {
        self.screen = screen;
    }

    /// Cancels the countdown pulse and waits for queued history saves.
    pub async fn shutdown(&self) -> Result<()> {
        self.timer.shutdown();
        self.history.shutdown().await
    }
}

pub fn run() -> Result<()> {
    utils::logging::init(settings::debug_enabled());

    log::info!("Pomodoro starting up...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    let result = runtime.block_on(async {
        let data_dir = settings::data_dir();
        let mut app = AppState::bootstrap(&data_dir).await?;

        let result = console::run_console(&mut app, tokio::io::stdin(), tokio::io::stdout()).await;
        app.shutdown().await?;
        result
    });

    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_background();
    result
}
