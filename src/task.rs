use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::api::ApiClient;
use crate::api::MetricsSummaryResponse;
use crate::api::PipelineStage;
use crate::api::ProgressReport;
use crate::api::SessionInfo;
use crate::api::StartAnalysisRequest;
use crate::api::TeamFramesResponse;
use crate::api::team_config_from_wire;
use crate::assignment::AssignmentSubmission;
use crate::error::ConsoleError;
use crate::session::BBox;
use crate::session::Frame;
use crate::session::FrameBatch;
use crate::session::FrameImage;
use crate::session::Player;
use crate::session::SessionId;
use crate::session::Team;

const FRAME_FETCH_ATTEMPTS: u32 = 5;

pub struct DownloadProgress {
    downloaded: u64,
    total: u64,
}

/// A unit of off-thread work whose result the UI polls from the status panel.
///
/// `generation` is the session generation at spawn time; results for a stale
/// generation are discarded unapplied so a late response can never mutate
/// state the user has already navigated away from.
pub struct BackgroundTask {
    pub receiver: mpsc::Receiver<Result<BackgroundTaskCompletion, ConsoleError>>,
    pub kind: BackgroundTaskKind,
    pub generation: u64,
}

/// Why a pipeline stage is being re-run for an existing session, which also
/// decides where the console navigates once the backend acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageGoal {
    Calibrate,
    ManualAssignment,
    RenderVideo,
}

pub enum BackgroundTaskKind {
    OpeningSession,
    StartingAnalysis,
    TriggeringStage(StageGoal),
    PollingPipeline,
    LoadingFrames,
    SubmittingAssignments,
    PollingAnnotation,
    LoadingMetrics,
    LoadingHeatmaps,
    DownloadingVideo {
        rx: mpsc::Receiver<DownloadProgress>,
        last_progress: Option<DownloadProgress>,
    },
}

impl BackgroundTask {
    pub fn build_description(&mut self, ui: &mut egui::Ui) -> Option<Result<BackgroundTaskCompletion, ConsoleError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => {
                match &mut self.kind {
                    BackgroundTaskKind::OpeningSession => {
                        ui.spinner();
                        ui.label("Loading session info...");
                    }
                    BackgroundTaskKind::StartingAnalysis => {
                        ui.spinner();
                        ui.label("Sending video to the analysis backend...");
                    }
                    BackgroundTaskKind::TriggeringStage(_) => {
                        ui.spinner();
                        ui.label("Starting pipeline stage...");
                    }
                    BackgroundTaskKind::PollingPipeline | BackgroundTaskKind::PollingAnnotation => {
                        // Silent; the owning page renders its own progress bar.
                    }
                    BackgroundTaskKind::LoadingFrames => {
                        ui.spinner();
                        ui.label("Loading team assignment frames...");
                    }
                    BackgroundTaskKind::SubmittingAssignments => {
                        ui.spinner();
                        ui.label("Saving team assignment...");
                    }
                    BackgroundTaskKind::LoadingMetrics => {
                        ui.spinner();
                        ui.label("Loading metrics...");
                    }
                    BackgroundTaskKind::LoadingHeatmaps => {
                        ui.spinner();
                        ui.label("Generating heatmaps...");
                    }
                    BackgroundTaskKind::DownloadingVideo { rx, last_progress } => {
                        match rx.try_recv() {
                            Ok(progress) => {
                                *last_progress = Some(progress);
                            }
                            Err(TryRecvError::Empty) => {}
                            Err(TryRecvError::Disconnected) => {}
                        }

                        if let Some(progress) = last_progress {
                            let fraction = if progress.total == 0 {
                                0.0
                            } else {
                                progress.downloaded as f32 / progress.total as f32
                            };
                            ui.add(egui::ProgressBar::new(fraction).text("Downloading annotated video"));
                        }
                    }
                }
                None
            }
            Err(TryRecvError::Disconnected) => Some(Err(ConsoleError::BackgroundTaskCompleted)),
        }
    }
}

/// Everything a pipeline poll tick learns in one round-trip burst.
pub struct PipelineSnapshot {
    pub info: SessionInfo,
    pub stage: PipelineStage,
    pub progress: ProgressReport,
    pub frames_ready: bool,
}

pub enum BackgroundTaskCompletion {
    SessionOpened(Box<SessionInfo>),
    AnalysisStarted { session: SessionId },
    StageTriggered(StageGoal),
    PipelinePolled(Box<PipelineSnapshot>),
    FramesLoaded(Box<FrameBatch>),
    AssignmentsSubmitted,
    AnnotationProgress(ProgressReport),
    MetricsLoaded(Box<MetricsSummaryResponse>),
    HeatmapsLoaded {
        team1: Option<FrameImage>,
        team2: Option<FrameImage>,
    },
    VideoDownloaded(PathBuf),
}

fn spawn<F>(kind: BackgroundTaskKind, generation: u64, job: F) -> BackgroundTask
where
    F: FnOnce() -> Result<BackgroundTaskCompletion, ConsoleError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let _join_handle = thread::spawn(move || {
        let _ = tx.send(job());
    });
    BackgroundTask { receiver: rx, kind, generation }
}

pub fn open_session(api: ApiClient, session: SessionId, generation: u64) -> BackgroundTask {
    spawn(BackgroundTaskKind::OpeningSession, generation, move || {
        api.session_info(&session).map(|info| BackgroundTaskCompletion::SessionOpened(Box::new(info)))
    })
}

/// The video source for a fresh analysis run.
pub enum VideoSource {
    File(PathBuf),
    Link,
}

pub fn start_analysis(
    api: ApiClient,
    session: SessionId,
    source: VideoSource,
    request: StartAnalysisRequest,
    generation: u64,
) -> BackgroundTask {
    spawn(BackgroundTaskKind::StartingAnalysis, generation, move || {
        match source {
            VideoSource::File(path) => {
                let bytes = std::fs::read(&path)?;
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("upload.mp4").to_string();
                api.upload_video(&session, &file_name, bytes, &request)?;
            }
            VideoSource::Link => {
                api.submit_video_link(&session, &request)?;
            }
        }
        Ok(BackgroundTaskCompletion::AnalysisStarted { session })
    })
}

pub fn trigger_stage(api: ApiClient, request: StartAnalysisRequest, goal: StageGoal, generation: u64) -> BackgroundTask {
    spawn(BackgroundTaskKind::TriggeringStage(goal), generation, move || {
        api.annotate_only(&request)?;
        Ok(BackgroundTaskCompletion::StageTriggered(goal))
    })
}

pub fn poll_pipeline(
    api: ApiClient,
    session: SessionId,
    stage: PipelineStage,
    check_frames: bool,
    generation: u64,
) -> BackgroundTask {
    spawn(BackgroundTaskKind::PollingPipeline, generation, move || {
        let info = api.session_info(&session)?;
        // Progress endpoints can lag behind artifact creation; a failed
        // progress read should not kill the poll loop.
        let progress = api.stage_progress(&session, stage).unwrap_or_default();
        let frames_ready = if check_frames && info.view_exists {
            api.team_frames_ready(&session).unwrap_or(false)
        } else {
            false
        };
        Ok(BackgroundTaskCompletion::PipelinePolled(Box::new(PipelineSnapshot { info, stage, progress, frames_ready })))
    })
}

pub fn load_frames(api: ApiClient, session: SessionId, generation: u64) -> BackgroundTask {
    spawn(BackgroundTaskKind::LoadingFrames, generation, move || {
        // The frames file can still be mid-write right after the transformer
        // finishes, so give the backend a few chances.
        let mut last_error = None;
        for attempt in 1..=FRAME_FETCH_ATTEMPTS {
            match api.team_frames(&session) {
                Ok(response) => {
                    return decode_frames(response).map(|batch| BackgroundTaskCompletion::FramesLoaded(Box::new(batch)));
                }
                Err(e) => {
                    warn!(attempt, "failed to fetch team frames: {e}");
                    last_error = Some(e);
                    if attempt < FRAME_FETCH_ATTEMPTS {
                        thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        }
        Err(last_error.expect("at least one attempt ran"))
    })
}

pub fn submit_assignments(
    api: ApiClient,
    session: SessionId,
    submission: AssignmentSubmission,
    generation: u64,
) -> BackgroundTask {
    spawn(BackgroundTaskKind::SubmittingAssignments, generation, move || {
        api.save_assignments(&session, &submission)?;
        Ok(BackgroundTaskCompletion::AssignmentsSubmitted)
    })
}

pub fn poll_annotation(api: ApiClient, session: SessionId, generation: u64) -> BackgroundTask {
    spawn(BackgroundTaskKind::PollingAnnotation, generation, move || {
        api.annotation_progress(&session).map(BackgroundTaskCompletion::AnnotationProgress)
    })
}

pub fn load_metrics(api: ApiClient, session: SessionId, generation: u64) -> BackgroundTask {
    spawn(BackgroundTaskKind::LoadingMetrics, generation, move || {
        api.metrics_summary(&session).map(|summary| BackgroundTaskCompletion::MetricsLoaded(Box::new(summary)))
    })
}

pub fn load_heatmaps(api: ApiClient, session: SessionId, team_names: [String; 2], generation: u64) -> BackgroundTask {
    spawn(BackgroundTaskKind::LoadingHeatmaps, generation, move || {
        // Generation is idempotent backend-side; a failure here still lets us
        // try fetching previously generated images.
        if let Err(e) = api.generate_heatmaps(&session) {
            warn!("heatmap generation request failed: {e}");
        }

        let fetch = |name: &str| match api.heatmap(&session, name) {
            Ok(bytes) => decode_raster(&bytes).map_err(|e| error!("could not decode heatmap for {name}: {e}")).ok(),
            Err(e) => {
                warn!("heatmap for {name} not available: {e}");
                None
            }
        };

        let team1 = fetch(&team_names[0]);
        let team2 = fetch(&team_names[1]);
        Ok(BackgroundTaskCompletion::HeatmapsLoaded { team1, team2 })
    })
}

async fn download_annotated_video(
    tx: mpsc::Sender<DownloadProgress>,
    url: String,
    dest: PathBuf,
) -> Result<PathBuf, ConsoleError> {
    let mut body = reqwest::get(url).await?;
    let status = body.status();
    if !status.is_success() {
        return Err(ConsoleError::Api { status: status.as_u16(), message: "annotated video not available".to_string() });
    }

    let total = body.content_length().unwrap_or(0);
    let mut downloaded = 0u64;
    let mut data = Vec::new();

    while let Some(chunk) = body.chunk().await? {
        downloaded += chunk.len() as u64;
        let _ = tx.send(DownloadProgress { downloaded, total });
        data.extend_from_slice(&chunk);
    }

    std::fs::write(&dest, &data)?;
    Ok(dest)
}

pub fn start_download_video_task(runtime: &Runtime, url: String, dest: PathBuf, generation: u64) -> BackgroundTask {
    let (tx, rx) = mpsc::channel();
    let (progress_tx, progress_rx) = mpsc::channel();

    runtime.spawn(async move {
        let result = download_annotated_video(progress_tx, url, dest).await.map(BackgroundTaskCompletion::VideoDownloaded);
        let _ = tx.send(result);
    });

    BackgroundTask {
        receiver: rx,
        kind: BackgroundTaskKind::DownloadingVideo { rx: progress_rx, last_progress: None },
        generation,
    }
}

/// Decode the fetched frame batch into ready-to-upload RGBA rasters.
pub fn decode_frames(response: TeamFramesResponse) -> Result<FrameBatch, ConsoleError> {
    if response.frames.is_empty() {
        return Err(ConsoleError::MalformedFrame("the backend returned no representative frames".to_string()));
    }

    let team_config = team_config_from_wire(&response.team_config);
    let mut frames = Vec::with_capacity(response.frames.len());
    for (index, wire) in response.frames.into_iter().enumerate() {
        let bytes = data_encoding::BASE64.decode(wire.image.as_bytes())?;
        let image = decode_raster(&bytes)?;
        let players = wire
            .players
            .into_iter()
            .map(|p| Player {
                id: p.id,
                bbox: BBox::from_corners(p.bbox),
                default_team: p.team.unwrap_or(Team::One),
            })
            .collect();
        debug!(index, width = image.width, height = image.height, "decoded assignment frame");
        frames.push(Frame { image, players });
    }

    Ok(FrameBatch { frames, team_config })
}

fn decode_raster(bytes: &[u8]) -> Result<FrameImage, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = decoded.dimensions();
    Ok(FrameImage { rgba: decoded.into_raw(), width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TeamConfigWire;
    use crate::api::WireFrame;
    use crate::api::WirePlayer;

    fn png_base64(width: u32, height: u32) -> String {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        data_encoding::BASE64.encode(&png)
    }

    #[test]
    fn decode_frames_produces_rgba_rasters_and_defaults() {
        let response = TeamFramesResponse {
            frames: vec![WireFrame {
                image: png_base64(4, 2),
                players: vec![
                    WirePlayer { id: "7".to_string(), bbox: [10.0, 10.0, 15.0, 18.0], team: Some(Team::Two) },
                    WirePlayer { id: "9".to_string(), bbox: [3.0, 4.0, 1.0, 2.0], team: None },
                ],
            }],
            team_config: TeamConfigWire::default(),
        };

        let batch = decode_frames(response).unwrap();
        assert_eq!(batch.frames.len(), 1);
        let frame = &batch.frames[0];
        assert_eq!((frame.image.width, frame.image.height), (4, 2));
        assert_eq!(frame.image.rgba.len(), 4 * 2 * 4);
        assert_eq!(frame.players[0].default_team, Team::Two);
        assert_eq!(frame.players[1].default_team, Team::One);
        // Corners arrive unordered; the bbox is normalized.
        assert_eq!(frame.players[1].bbox, BBox::new(1.0, 2.0, 2.0, 2.0));
    }

    #[test]
    fn decode_frames_rejects_empty_batches() {
        let response = TeamFramesResponse::default();
        assert!(matches!(decode_frames(response), Err(ConsoleError::MalformedFrame(_))));
    }

    #[test]
    fn decode_frames_rejects_garbage_base64() {
        let response = TeamFramesResponse {
            frames: vec![WireFrame { image: "!!not base64!!".to_string(), players: Vec::new() }],
            team_config: TeamConfigWire::default(),
        };
        assert!(matches!(decode_frames(response), Err(ConsoleError::Base64(_))));
    }
}
