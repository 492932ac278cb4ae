use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use egui_notify::Toasts;
use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::api::ApiClient;
use crate::api::SessionInfo;
use crate::api::StartAnalysisRequest;
use crate::api::color_to_hex;
use crate::app::Tab;
use crate::session::AssignmentMode;
use crate::session::SessionId;
use crate::session::TeamConfig;
use crate::settings::Settings;
use crate::task::BackgroundTask;
use crate::ui::metrics::MetricsPageState;
use crate::ui::progress::PipelineProgressState;
use crate::ui::session_setup::SessionSetupState;
use crate::ui::team_assignment::AssignmentPageState;

/// Transient status line shown in the bottom panel.
#[derive(Clone)]
pub struct TimedMessage {
    pub message: String,
    pub expiration: Instant,
}

impl TimedMessage {
    pub fn new(message: String) -> Self {
        TimedMessage { message, expiration: Instant::now() + Duration::from_secs(10) }
    }

    pub fn is_expired(&self) -> bool {
        self.expiration < Instant::now()
    }
}

/// Everything the console knows about the session currently being worked on.
///
/// One value of this struct replaces the ad-hoc bag of session keys the
/// console would otherwise accumulate: frame index, caches, redirect flags
/// and upload bookkeeping all live behind typed fields owned here.
pub struct ActiveSession {
    pub id: SessionId,
    pub mode: AssignmentMode,
    pub team_config: TeamConfig,
    /// Latest artifact flags reported by the backend.
    pub info: SessionInfo,
    pub pipeline: PipelineProgressState,
    pub assignment: AssignmentPageState,
    pub metrics: MetricsPageState,
}

impl ActiveSession {
    pub fn new(id: SessionId, mode: AssignmentMode, team_config: TeamConfig) -> Self {
        ActiveSession {
            id,
            mode,
            team_config,
            info: SessionInfo::default(),
            pipeline: PipelineProgressState::default(),
            assignment: AssignmentPageState::default(),
            metrics: MetricsPageState::default(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct TabState {
    pub settings: Settings,

    #[serde(skip)]
    pub api: ApiClient,

    #[serde(skip)]
    pub session: Option<ActiveSession>,

    /// Bumped whenever the active session changes. Background task results
    /// from an older generation are dropped unapplied.
    #[serde(skip)]
    pub session_generation: u64,

    #[serde(skip)]
    pub background_tasks: Vec<BackgroundTask>,

    #[serde(skip)]
    pub timed_message: RwLock<Option<TimedMessage>>,

    #[serde(skip)]
    pub toasts: Toasts,

    #[serde(skip)]
    pub nav_request: Option<Tab>,

    #[serde(skip)]
    pub setup: SessionSetupState,

    /// Runtime backing the streaming download task.
    #[serde(skip)]
    pub runtime: Arc<Runtime>,
}

impl Default for TabState {
    fn default() -> Self {
        let settings = Settings::default();
        let api = ApiClient::new(&settings.api_base);
        Self {
            settings,
            api,
            session: None,
            session_generation: 0,
            background_tasks: Vec::new(),
            timed_message: RwLock::new(None),
            toasts: Toasts::default(),
            nav_request: None,
            setup: SessionSetupState::default(),
            runtime: Arc::new(Runtime::new().expect("failed to create tokio runtime")),
        }
    }
}

impl TabState {
    /// Recreate the HTTP client after the base URL changed (settings edit or
    /// state restored from disk).
    pub fn rebuild_api_client(&mut self) {
        if self.api.base() != self.settings.api_base.trim_end_matches('/') {
            self.api = ApiClient::new(&self.settings.api_base);
        }
    }

    /// Replace the active session. Everything scoped to the previous session
    /// (including in-flight network results) becomes stale.
    pub fn begin_session(&mut self, id: SessionId, mode: AssignmentMode, team_config: TeamConfig) {
        debug!(%id, "starting session");
        self.session_generation += 1;
        self.session = Some(ActiveSession::new(id, mode, team_config));
    }

    pub fn end_session(&mut self) {
        self.session_generation += 1;
        self.session = None;
    }

    pub fn push_task(&mut self, task: BackgroundTask) {
        self.background_tasks.push(task);
    }

    pub fn navigate_to(&mut self, tab: Tab) {
        self.nav_request = Some(tab);
    }

    pub fn show_timed_message(&self, message: String) {
        *self.timed_message.write() = Some(TimedMessage::new(message));
    }

    /// Payload for re-running pipeline stages of the active session.
    pub fn stage_request(&self, session: &ActiveSession) -> StartAnalysisRequest {
        StartAnalysisRequest {
            session_id: session.id.to_string(),
            team1_name: session.team_config.team1.name.clone(),
            team1_color: color_to_hex(session.team_config.team1.color),
            team2_name: session.team_config.team2.name.clone(),
            team2_color: color_to_hex(session.team_config.team2.color),
            run_tracking: false,
            run_automatic_assignment: false,
            run_manual_assignment: true,
            video_url: None,
        }
    }
}
