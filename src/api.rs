use std::collections::BTreeMap;
use std::time::Duration;

use egui::Color32;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use tracing::debug;

use crate::error::ConsoleError;
use crate::session::SessionId;
use crate::session::Team;
use crate::session::TeamConfig;
use crate::session::TeamSide;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Session-scoped endpoints live under a versioned prefix; the analysis and
/// export endpoints are mounted at the root.
const SESSIONS_PATH: &str = "/api/v1/sessions";

/// Pipeline stages the backend reports progress for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Tracking,
    Transformer,
}

impl PipelineStage {
    pub fn path_segment(self) -> &'static str {
        match self {
            PipelineStage::Tracking => "tracking",
            PipelineStage::Transformer => "transformer",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Tracking => "Tracking",
            PipelineStage::Transformer => "Field calibration",
        }
    }
}

/// Which artifacts exist for a session, plus its team configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub tracking_exists: bool,
    #[serde(default)]
    pub view_exists: bool,
    #[serde(default)]
    pub assign_exists: bool,
    #[serde(default)]
    pub annotated_exists: bool,
    #[serde(default)]
    pub team_config: Option<TeamConfigWire>,
}

/// `{current, total}` progress counter returned by all progress endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct ProgressReport {
    pub current: u64,
    pub total: u64,
}

impl ProgressReport {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 { 0.0 } else { self.current as f32 / self.total as f32 }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.current >= self.total
    }
}

/// `team_config` as the backend sends it: `{"1": {name, color}, "2": ...}`.
pub type TeamConfigWire = BTreeMap<String, TeamSideWire>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSideWire {
    pub name: String,
    pub color: String,
}

pub fn team_config_from_wire(wire: &TeamConfigWire) -> TeamConfig {
    let defaults = TeamConfig::default();
    let side = |key: &str, fallback: &TeamSide| {
        wire.get(key)
            .map(|w| TeamSide {
                name: w.name.clone(),
                color: color_from_hex(&w.color).unwrap_or(fallback.color),
            })
            .unwrap_or_else(|| fallback.clone())
    };
    TeamConfig {
        team1: side(Team::One.key(), &defaults.team1),
        team2: side(Team::Two.key(), &defaults.team2),
    }
}

/// Parse a `#RRGGBB` color as the backend and upload forms exchange them.
pub fn color_from_hex(hex: &str) -> Option<Color32> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Color32::from_rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

pub fn color_to_hex(color: Color32) -> String {
    format!("#{:02X}{:02X}{:02X}", color.r(), color.g(), color.b())
}

/// One representative frame as fetched: base64-encoded raster plus detections.
#[derive(Debug, Clone, Deserialize)]
pub struct WireFrame {
    pub image: String,
    #[serde(default)]
    pub players: Vec<WirePlayer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePlayer {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// `[x1, y1, x2, y2]` corners in natural frame coordinates.
    pub bbox: [f32; 4],
    #[serde(default)]
    pub team: Option<Team>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Num(n) => n.to_string(),
        Raw::Str(s) => s,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamFramesResponse {
    #[serde(default)]
    pub frames: Vec<WireFrame>,
    #[serde(default)]
    pub team_config: TeamConfigWire,
}

/// KPI summary for the analyzed sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSummaryResponse {
    pub metrics: BTreeMap<String, f64>,
    pub team_1: TeamSideWire,
    pub team_2: TeamSideWire,
}

/// Payload for kicking off a new analysis run (upload and link variants) and
/// for re-running pipeline stages of an existing session.
#[derive(Debug, Clone, Serialize)]
pub struct StartAnalysisRequest {
    pub session_id: String,
    pub team1_name: String,
    pub team1_color: String,
    pub team2_name: String,
    pub team2_color: String,
    pub run_tracking: bool,
    pub run_automatic_assignment: bool,
    pub run_manual_assignment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// Blocking HTTP client for the analysis backend. Cheap to clone; used from
/// background threads only, never on the UI thread.
#[derive(Clone)]
pub struct ApiClient {
    base: String,
    http: reqwest::blocking::Client,
}

impl Default for ApiClient {
    fn default() -> Self {
        ApiClient::new(DEFAULT_API_BASE)
    }
}

impl ApiClient {
    pub fn new(base: &str) -> Self {
        ApiClient {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build http client"),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/{}", self.base, tail.trim_start_matches('/'))
    }

    fn sessions_url(&self, tail: &str) -> String {
        format!("{}{}/{}", self.base, SESSIONS_PATH, tail.trim_start_matches('/'))
    }

    pub fn session_info(&self, session: &SessionId) -> Result<SessionInfo, ConsoleError> {
        let response = self.http.get(self.sessions_url(session.as_str())).send()?;
        Ok(expect_success(response)?.json()?)
    }

    pub fn stage_progress(&self, session: &SessionId, stage: PipelineStage) -> Result<ProgressReport, ConsoleError> {
        let url = self.sessions_url(&format!("{}/progress/{}", session, stage.path_segment()));
        let response = self.http.get(url).timeout(Duration::from_secs(10)).send()?;
        Ok(expect_success(response)?.json()?)
    }

    /// Whether the representative frames for manual assignment are available
    /// yet. The endpoint answers 404 until the pipeline has produced them.
    pub fn team_frames_ready(&self, session: &SessionId) -> Result<bool, ConsoleError> {
        let url = self.sessions_url(&format!("{session}/team-assignment/frames"));
        let response = self.http.get(url).timeout(Duration::from_secs(10)).send()?;
        Ok(response.status().is_success())
    }

    pub fn upload_video(
        &self,
        session: &SessionId,
        file_name: &str,
        bytes: Vec<u8>,
        request: &StartAnalysisRequest,
    ) -> Result<(), ConsoleError> {
        use reqwest::blocking::multipart::Form;
        use reqwest::blocking::multipart::Part;

        let part = Part::bytes(bytes).file_name(file_name.to_string()).mime_str("video/mp4")?;
        let mut form = Form::new().part("file", part);
        for (key, value) in form_fields(request) {
            form = form.text(key, value);
        }

        let url = self.sessions_url(&format!("{session}/video"));
        debug!(%session, "uploading video file");
        let response = self.http.post(url).multipart(form).timeout(Duration::from_secs(600)).send()?;
        expect_success(response)?;
        Ok(())
    }

    pub fn submit_video_link(&self, session: &SessionId, request: &StartAnalysisRequest) -> Result<(), ConsoleError> {
        let url = self.sessions_url(&format!("{session}/video-from-link"));
        debug!(%session, "submitting video link");
        let response = self.http.post(url).json(request).timeout(Duration::from_secs(120)).send()?;
        expect_success(response)?;
        Ok(())
    }

    /// Re-run pipeline stages for an already-uploaded session.
    pub fn annotate_only(&self, request: &StartAnalysisRequest) -> Result<(), ConsoleError> {
        let response = self.http.post(self.url("annotate_only")).form(request).timeout(Duration::from_secs(120)).send()?;
        expect_success(response)?;
        Ok(())
    }

    pub fn team_frames(&self, session: &SessionId) -> Result<TeamFramesResponse, ConsoleError> {
        let url = self.url(&format!("team-frames/{session}"));
        // Frames are shipped inline as base64, so this response can be large.
        let response = self.http.get(url).timeout(Duration::from_secs(120)).send()?;
        Ok(expect_success(response)?.json()?)
    }

    pub fn save_assignments<T: Serialize>(&self, session: &SessionId, payload: &T) -> Result<(), ConsoleError> {
        let url = self.url(&format!("team-assignment/save/{session}"));
        let response = self.http.post(url).json(payload).send()?;
        expect_success(response)?;
        Ok(())
    }

    pub fn annotation_progress(&self, session: &SessionId) -> Result<ProgressReport, ConsoleError> {
        let url = self.url(&format!("progress/{session}"));
        let response = self.http.get(url).timeout(Duration::from_secs(10)).send()?;
        Ok(expect_success(response)?.json()?)
    }

    pub fn metrics_summary(&self, session: &SessionId) -> Result<MetricsSummaryResponse, ConsoleError> {
        let response = self.http.get(self.url(&format!("metrics-summary/{session}"))).send()?;
        Ok(expect_success(response)?.json()?)
    }

    pub fn generate_heatmaps(&self, session: &SessionId) -> Result<(), ConsoleError> {
        let response = self.http.post(self.url(&format!("generate-heatmaps/{session}"))).timeout(Duration::from_secs(120)).send()?;
        expect_success(response)?;
        Ok(())
    }

    /// Raw encoded heatmap image for one team.
    pub fn heatmap(&self, session: &SessionId, team_name: &str) -> Result<Vec<u8>, ConsoleError> {
        let response = self.http.get(self.url(&format!("heatmap/{session}/{team_name}"))).send()?;
        Ok(expect_success(response)?.bytes()?.to_vec())
    }

    pub fn metrics_excel_url(&self, session: &SessionId) -> String {
        self.url(&format!("metrics-excel/{session}"))
    }

    pub fn heatmap_archive_url(&self, session: &SessionId) -> String {
        self.url(&format!("generate-heatmaps/{session}"))
    }

    pub fn annotated_video_url(&self, session: &SessionId) -> String {
        self.url(&format!("annotated-video/{session}"))
    }
}

fn expect_success(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ConsoleError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let message = response.text().unwrap_or_default();
        // Backends wrap error text in {"message": ...} when they can.
        let message = serde_json::from_str::<serde_json::Value>(&message)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or(message);
        Err(ConsoleError::Api { status: status.as_u16(), message })
    }
}

fn form_fields(request: &StartAnalysisRequest) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("session_id", request.session_id.clone()),
        ("team1_name", request.team1_name.clone()),
        ("team1_color", request.team1_color.clone()),
        ("team2_name", request.team2_name.clone()),
        ("team2_color", request.team2_color.clone()),
        ("run_tracking", request.run_tracking.to_string()),
        ("run_automatic_assignment", request.run_automatic_assignment.to_string()),
        ("run_manual_assignment", request.run_manual_assignment.to_string()),
    ];
    if let Some(url) = &request.video_url {
        fields.push(("video_url", url.clone()));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_info_defaults_missing_flags() {
        let info: SessionInfo = serde_json::from_str(r#"{"tracking_exists": true}"#).unwrap();
        assert!(info.tracking_exists);
        assert!(!info.view_exists);
        assert!(info.team_config.is_none());
    }

    #[test]
    fn frames_response_accepts_numeric_ids() {
        let json = r##"{
            "frames": [
                {"image": "aGk=", "players": [
                    {"id": 7, "bbox": [10.0, 10.0, 15.0, 18.0], "team": "2"},
                    {"id": "9", "bbox": [0.0, 0.0, 4.0, 4.0]}
                ]}
            ],
            "team_config": {"1": {"name": "VFB", "color": "#0000FF"}}
        }"##;
        let response: TeamFramesResponse = serde_json::from_str(json).unwrap();
        let players = &response.frames[0].players;
        assert_eq!(players[0].id, "7");
        assert_eq!(players[0].team, Some(Team::Two));
        assert_eq!(players[1].id, "9");
        assert_eq!(players[1].team, None);

        let config = team_config_from_wire(&response.team_config);
        assert_eq!(config.team1.name, "VFB");
        assert_eq!(config.team1.color, Color32::from_rgb(0, 0, 0xff));
        // Side 2 is absent from the wire config and falls back to defaults.
        assert_eq!(config.team2.name, "Team 2");
    }

    #[test]
    fn hex_colors_round_trip() {
        assert_eq!(color_from_hex("#14B8A6"), Some(Color32::from_rgb(0x14, 0xb8, 0xa6)));
        assert_eq!(color_from_hex("14B8A6"), None);
        assert_eq!(color_from_hex("#14B8"), None);
        assert_eq!(color_to_hex(Color32::from_rgb(0x14, 0xb8, 0xa6)), "#14B8A6");
    }

    #[test]
    fn progress_fraction_guards_zero_total() {
        assert_eq!(ProgressReport { current: 5, total: 0 }.fraction(), 0.0);
        assert!(ProgressReport { current: 3, total: 3 }.is_complete());
        assert!(!ProgressReport { current: 0, total: 0 }.is_complete());
    }

    #[test]
    fn link_request_omits_missing_video_url() {
        let request = StartAnalysisRequest {
            session_id: "s".into(),
            team1_name: "VFB".into(),
            team1_color: "#0000FF".into(),
            team2_name: "FCB".into(),
            team2_color: "#FF0000".into(),
            run_tracking: true,
            run_automatic_assignment: false,
            run_manual_assignment: true,
            video_url: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("video_url").is_none());
        assert_eq!(value["run_manual_assignment"], true);
    }
}
