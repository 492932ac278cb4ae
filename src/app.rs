use std::time::Instant;

use eframe::APP_KEY;
use egui::Context;
use egui::Ui;
use egui::UiKind;
use egui::WidgetText;
use egui_dock::DockArea;
use egui_dock::DockState;
use egui_dock::Style;
use egui_dock::TabViewer;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::api::PipelineStage;
use crate::api::TeamConfigWire;
use crate::api::team_config_from_wire;
use crate::assignment::AssignmentBoard;
use crate::error::ConsoleError;
use crate::icons;
use crate::session::AssignmentMode;
use crate::tab_state::TabState;
use crate::tab_state::TimedMessage;
use crate::task::BackgroundTaskCompletion;
use crate::task::BackgroundTaskKind;
use crate::task::StageGoal;
use crate::ui::metrics::MetricsPageState;
use crate::ui::session_setup::VideoSourceChoice;
use crate::ui::team_assignment::AssignmentPageState;
use crate::ui::team_assignment::FramesState;

const DEFAULT_ZOOM_FACTOR: f32 = 1.15;

/// The console pages. Unlike a browser multi-page app there is no history:
/// navigation just activates the matching dock tab.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    SessionSetup,
    Progress,
    TeamAssignment,
    Metrics,
    Settings,
}

impl Tab {
    fn title(&self) -> String {
        match self {
            Tab::SessionSetup => format!("{} Session Setup", icons::HOUSE),
            Tab::Progress => format!("{} Progress", icons::HOURGLASS),
            Tab::TeamAssignment => format!("{} Team Assignment", icons::USERS_THREE),
            Tab::Metrics => format!("{} Metrics", icons::CHART_LINE),
            Tab::Settings => format!("{} Settings", icons::GEAR_FINE),
        }
    }
}

pub struct ConsoleTabViewer<'a> {
    pub tab_state: &'a mut TabState,
}

impl TabViewer for ConsoleTabViewer<'_> {
    type Tab = Tab;

    fn title(&mut self, tab: &mut Self::Tab) -> WidgetText {
        tab.title().into()
    }

    fn ui(&mut self, ui: &mut egui::Ui, tab: &mut Self::Tab) {
        match tab {
            Tab::SessionSetup => self.build_session_setup_tab(ui),
            Tab::Progress => self.build_progress_tab(ui),
            Tab::TeamAssignment => self.build_team_assignment_tab(ui),
            Tab::Metrics => self.build_metrics_tab(ui),
            Tab::Settings => self.build_settings_tab(ui),
        }
    }
}

/// We derive Deserialize/Serialize so we can persist app state on shutdown.
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct PitchsideApp {
    #[serde(skip)]
    show_about_window: bool,
    #[serde(skip)]
    show_error_window: bool,
    #[serde(skip)]
    error_to_show: Option<String>,

    pub(crate) tab_state: TabState,
    #[serde(skip)]
    dock_state: DockState<Tab>,
}

impl Default for PitchsideApp {
    fn default() -> Self {
        Self {
            show_about_window: false,
            show_error_window: false,
            error_to_show: None,
            tab_state: Default::default(),
            dock_state: DockState::new(
                [Tab::SessionSetup, Tab::Progress, Tab::TeamAssignment, Tab::Metrics, Tab::Settings].to_vec(),
            ),
        }
    }
}

impl PitchsideApp {
    /// Called once before the first frame.
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        // Include phosphor icons
        let mut fonts = egui::FontDefinitions::default();
        egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);
        egui_extras::install_image_loaders(&cc.egui_ctx);

        cc.egui_ctx.set_fonts(fonts);
        cc.egui_ctx.set_theme(egui::Theme::Dark);

        let mut state = if let Some(storage) = cc.storage {
            if storage.get_string(APP_KEY).is_some() {
                // if the app key is present and we get no result back, that means
                // deserialization failed and we should panic because this is an
                // app bug -- likely caused by not setting a default value for a
                // persisted field
                eframe::get_value::<Self>(storage, APP_KEY).expect("could not deserialize app state")
            } else {
                let this = Self::default();
                cc.egui_ctx.set_zoom_factor(DEFAULT_ZOOM_FACTOR);
                this
            }
        } else {
            Default::default()
        };

        // The HTTP client is never persisted; rebuild it against the restored
        // base URL.
        state.tab_state.rebuild_api_client();
        state
    }

    pub fn build_bottom_panel(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            let mut finished = Vec::new();
            let mut tasks = std::mem::take(&mut self.tab_state.background_tasks);
            let mut remaining = Vec::with_capacity(tasks.len());
            for mut task in tasks.drain(..) {
                match task.build_description(ui) {
                    None => remaining.push(task),
                    Some(result) => finished.push((task.kind, task.generation, result)),
                }
            }
            // Completion handlers may spawn follow-up tasks; keep those too.
            remaining.append(&mut self.tab_state.background_tasks);
            self.tab_state.background_tasks = remaining;

            for (kind, generation, result) in finished {
                if generation != self.tab_state.session_generation {
                    debug!("dropping background task result for a stale session generation");
                    continue;
                }
                match result {
                    Ok(completion) => self.handle_completion(completion),
                    Err(ConsoleError::BackgroundTaskCompleted) => {}
                    Err(e) => self.handle_task_error(&kind, e),
                }
            }

            let reset_message = if let Some(timed_message) = &*self.tab_state.timed_message.read() {
                if !timed_message.is_expired() {
                    ui.label(timed_message.message.as_str());
                    false
                } else {
                    true
                }
            } else {
                false
            };

            if reset_message {
                *self.tab_state.timed_message.write() = None;
            }
        });
    }

    fn handle_completion(&mut self, completion: BackgroundTaskCompletion) {
        match completion {
            BackgroundTaskCompletion::SessionOpened(info) => {
                if let Some(session) = &mut self.tab_state.session {
                    if let Some(wire) = &info.team_config {
                        session.team_config = team_config_from_wire(wire);
                    }
                    if info.annotated_exists {
                        session.metrics.annotation_done = true;
                    }
                    session.info = *info;
                    *self.tab_state.timed_message.write() =
                        Some(TimedMessage::new(format!("{} Loaded session info", icons::CHECK_CIRCLE)));
                }
            }
            BackgroundTaskCompletion::AnalysisStarted { session } => {
                self.tab_state.toasts.info(format!("Session id: {session}. Note it down to revisit the results."));
                *self.tab_state.timed_message.write() =
                    Some(TimedMessage::new(format!("{} Video accepted, analysis running", icons::CHECK_CIRCLE)));
                self.tab_state.navigate_to(Tab::Progress);
            }
            BackgroundTaskCompletion::StageTriggered(goal) => {
                let Some(session) = &mut self.tab_state.session else {
                    return;
                };
                match goal {
                    StageGoal::Calibrate => {
                        session.pipeline = Default::default();
                        session.pipeline.stage = PipelineStage::Transformer;
                        self.tab_state.navigate_to(Tab::Progress);
                    }
                    StageGoal::ManualAssignment => {
                        session.assignment = AssignmentPageState::default();
                        self.tab_state.navigate_to(Tab::TeamAssignment);
                    }
                    StageGoal::RenderVideo => {
                        session.metrics = MetricsPageState::default();
                        self.tab_state.navigate_to(Tab::Metrics);
                    }
                }
            }
            BackgroundTaskCompletion::PipelinePolled(snapshot) => {
                let Some(session) = &mut self.tab_state.session else {
                    return;
                };
                session.pipeline.poll_in_flight = false;
                session.pipeline.last_poll = Some(Instant::now());
                match snapshot.stage {
                    PipelineStage::Tracking => session.pipeline.tracking = snapshot.progress,
                    PipelineStage::Transformer => session.pipeline.calibration = snapshot.progress,
                }
                session.info = snapshot.info;

                if session.info.tracking_exists && session.pipeline.stage == PipelineStage::Tracking {
                    session.pipeline.stage = PipelineStage::Transformer;
                }

                if !session.pipeline.routed && session.info.tracking_exists && session.info.view_exists {
                    match session.mode {
                        AssignmentMode::Automatic => {
                            session.pipeline.routed = true;
                            *self.tab_state.timed_message.write() = Some(TimedMessage::new(format!(
                                "{} Automatic team assignment finished",
                                icons::CHECK_CIRCLE
                            )));
                            self.tab_state.navigate_to(Tab::Metrics);
                        }
                        AssignmentMode::Manual if snapshot.frames_ready => {
                            session.pipeline.routed = true;
                            *self.tab_state.timed_message.write() = Some(TimedMessage::new(format!(
                                "{} Tracking and calibration finished",
                                icons::CHECK_CIRCLE
                            )));
                            self.tab_state.navigate_to(Tab::TeamAssignment);
                        }
                        AssignmentMode::Manual => {}
                    }
                }
            }
            BackgroundTaskCompletion::FramesLoaded(batch) => {
                if let Some(session) = &mut self.tab_state.session {
                    session.team_config = batch.team_config.clone();
                    session.assignment.textures.clear();
                    session.assignment.frames = FramesState::Ready(Box::new(AssignmentBoard::new(batch.frames)));
                }
            }
            BackgroundTaskCompletion::AssignmentsSubmitted => {
                if let Some(session) = &mut self.tab_state.session {
                    session.assignment.submit_in_flight = false;
                    session.metrics = MetricsPageState::default();
                }
                self.tab_state.toasts.success("Team assignment saved. The annotated video is being rendered.");
                self.tab_state.navigate_to(Tab::Metrics);
            }
            BackgroundTaskCompletion::AnnotationProgress(progress) => {
                if let Some(session) = &mut self.tab_state.session {
                    session.metrics.annotation = progress;
                    session.metrics.poll_in_flight = false;
                    session.metrics.last_poll = Some(Instant::now());
                    if progress.is_complete() && !session.metrics.annotation_done {
                        session.metrics.annotation_done = true;
                        self.tab_state.toasts.success("Annotated video finished.");
                    }
                }
            }
            BackgroundTaskCompletion::MetricsLoaded(summary) => {
                if let Some(session) = &mut self.tab_state.session {
                    // The summary echoes the authoritative team names/colors;
                    // opened sessions may still be running on placeholders.
                    let wire = TeamConfigWire::from([
                        ("1".to_string(), summary.team_1.clone()),
                        ("2".to_string(), summary.team_2.clone()),
                    ]);
                    session.team_config = team_config_from_wire(&wire);
                    session.metrics.summary = Some(summary);
                    session.metrics.summary_error = None;
                }
            }
            BackgroundTaskCompletion::HeatmapsLoaded { team1, team2 } => {
                if let Some(session) = &mut self.tab_state.session {
                    session.metrics.heatmap_images = [team1, team2];
                    session.metrics.heatmap_textures = [None, None];
                    session.metrics.heatmaps_loaded = true;
                }
            }
            BackgroundTaskCompletion::VideoDownloaded(path) => {
                if let Some(session) = &mut self.tab_state.session {
                    session.metrics.download_in_flight = false;
                }
                self.tab_state.toasts.success(format!("Annotated video saved to {}", path.display()));
            }
        }
    }

    fn handle_task_error(&mut self, kind: &BackgroundTaskKind, e: ConsoleError) {
        error!("background task error: {e}");
        match kind {
            BackgroundTaskKind::OpeningSession => {
                self.tab_state.toasts.error(format!("Could not load session info: {e}"));
            }
            BackgroundTaskKind::StartingAnalysis => {
                // Local edits are worthless without a backend session; reset so
                // the operator can retry the upload from a clean slate.
                self.tab_state.end_session();
                self.tab_state.toasts.error("Upload failed.");
                self.show_err(format!("The analysis could not be started:\n\n{e}"));
            }
            BackgroundTaskKind::TriggeringStage(_) => {
                self.tab_state.toasts.error(format!("The pipeline stage could not be started: {e}"));
            }
            BackgroundTaskKind::PollingPipeline => {
                // Transient; retry on the next tick.
                warn!("pipeline progress unavailable: {e}");
                if let Some(session) = &mut self.tab_state.session {
                    session.pipeline.poll_in_flight = false;
                    session.pipeline.last_poll = Some(Instant::now());
                }
            }
            BackgroundTaskKind::PollingAnnotation => {
                warn!("annotation progress unavailable: {e}");
                if let Some(session) = &mut self.tab_state.session {
                    session.metrics.poll_in_flight = false;
                    session.metrics.last_poll = Some(Instant::now());
                }
            }
            BackgroundTaskKind::LoadingFrames => {
                if let Some(session) = &mut self.tab_state.session {
                    session.assignment.frames = FramesState::Failed(e.to_string());
                }
            }
            BackgroundTaskKind::SubmittingAssignments => {
                // Edits stay intact; only the submit action is re-armed.
                if let Some(session) = &mut self.tab_state.session {
                    session.assignment.submit_in_flight = false;
                }
                self.tab_state.toasts.error("Saving the team assignment failed. Please retry.");
                self.show_err(format!("The team assignment could not be saved:\n\n{e}"));
            }
            BackgroundTaskKind::LoadingMetrics => {
                if let Some(session) = &mut self.tab_state.session {
                    session.metrics.summary_error = Some(e.to_string());
                }
            }
            BackgroundTaskKind::LoadingHeatmaps => {
                if let Some(session) = &mut self.tab_state.session {
                    session.metrics.heatmaps_loaded = true;
                }
                self.tab_state.toasts.error(format!("Heatmaps unavailable: {e}"));
            }
            BackgroundTaskKind::DownloadingVideo { .. } => {
                if let Some(session) = &mut self.tab_state.session {
                    session.metrics.download_in_flight = false;
                }
                self.tab_state.toasts.error(format!("Download failed: {e}"));
            }
        }
    }

    /// Pre-fill the upload form when an .mp4 is dropped onto the window.
    fn ui_file_drag_and_drop(&mut self, ctx: &Context) {
        use egui::Align2;
        use egui::Color32;
        use egui::Id;
        use egui::LayerId;
        use egui::Order;
        use egui::TextStyle;

        // Preview hovering files:
        if !ctx.input(|i| i.raw.hovered_files.is_empty()) {
            let text = ctx.input(|i| {
                if i.raw.hovered_files.len() > 1 {
                    return Some("Only one video at a time, please.".to_owned());
                }

                if let Some(file) = i.raw.hovered_files.first()
                    && let Some(path) = &file.path
                    && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
                {
                    return Some(format!("Drop to select\n{}", path.file_name()?.to_str()?));
                }

                None
            });

            if let Some(text) = text {
                let painter = ctx.layer_painter(LayerId::new(Order::Foreground, Id::new("file_drop_target")));

                let screen_rect = ctx.content_rect();
                painter.rect_filled(screen_rect, 0.0, Color32::from_black_alpha(192));
                painter.text(screen_rect.center(), Align2::CENTER_CENTER, text, TextStyle::Heading.resolve(&ctx.style()), Color32::WHITE);
            }
        }

        let mut dropped_files = Vec::new();
        ctx.input(|i| {
            if !i.raw.dropped_files.is_empty() {
                dropped_files.clone_from(&i.raw.dropped_files);
            }
        });

        if dropped_files.len() == 1
            && let Some(path) = &dropped_files[0].path
            && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
        {
            self.tab_state.setup.picked_file = Some(path.clone());
            self.tab_state.setup.source = VideoSourceChoice::Upload;
            self.tab_state.navigate_to(Tab::SessionSetup);
        }
    }

    fn update_impl(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(tab) = self.tab_state.nav_request.take()
            && let Some(location) = self.dock_state.find_tab(&tab)
        {
            self.dock_state.set_active_tab(location);
        }

        if let Some(error) = self.error_to_show.as_ref() {
            if self.show_error_window {
                egui::Window::new("Error").open(&mut self.show_error_window).show(ctx, |ui| {
                    build_error_window(ui, error);
                });
            } else {
                self.error_to_show = None;
            }
        }

        if self.show_about_window {
            egui::Window::new("About").open(&mut self.show_about_window).show(ctx, |ui| {
                build_about_window(ui);
            });
        }

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("New Analysis").clicked() {
                        self.tab_state.end_session();
                        self.tab_state.navigate_to(Tab::SessionSetup);
                        ui.close_kind(UiKind::Menu);
                    }
                    if ui.add_enabled(self.tab_state.session.is_some(), egui::Button::new("Close Session")).clicked() {
                        self.tab_state.end_session();
                        ui.close_kind(UiKind::Menu);
                    }
                    if ui.button("About").clicked() {
                        self.show_about_window = true;
                        ui.close_kind(UiKind::Menu);
                    }
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.add_space(16.0);

                if let Some(session) = &self.tab_state.session {
                    ui.label(egui::RichText::new(format!("Session: {}", session.id)).weak());
                }
            });
        });

        egui::TopBottomPanel::bottom("status_panel").show(ctx, |ui| {
            self.build_bottom_panel(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            DockArea::new(&mut self.dock_state)
                .style(Style::from_egui(ui.style().as_ref()))
                .allowed_splits(egui_dock::AllowedSplits::None)
                .show_leaf_collapse_buttons(false)
                .show_leaf_close_all_buttons(false)
                .show_close_buttons(false)
                .show_inside(ui, &mut ConsoleTabViewer { tab_state: &mut self.tab_state });
        });

        self.ui_file_drag_and_drop(ctx);
        self.tab_state.toasts.show(ctx);

        // Poll loops and timed messages need repaints even while idle.
        ctx.request_repaint_after_secs(1.0);
    }

    fn show_err(&mut self, message: String) {
        self.show_error_window = true;
        self.error_to_show = Some(message);
    }
}

impl eframe::App for PitchsideApp {
    /// Called by the frame work to save state before shutdown.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, APP_KEY, self);
    }

    /// Called each time the UI needs repainting, which may be many times per second.
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.update_impl(ctx, frame);
    }
}

fn build_about_window(ui: &mut egui::Ui) {
    ui.vertical(|ui| {
        ui.label("Operator console for the FootballAI analysis pipeline.");
        ui.horizontal(|ui| {
            ui.spacing_mut().item_spacing.x = 0.0;
            ui.label("Powered by ");
            ui.hyperlink_to("egui", "https://github.com/emilk/egui");
            ui.label(" and ");
            ui.hyperlink_to("eframe", "https://github.com/emilk/egui/tree/master/crates/eframe");
            ui.label(".");
        });
    });
}

fn build_error_window(ui: &mut egui::Ui, error: &str) {
    ui.vertical(|ui| {
        ui.label(format!("{} An error occurred:", icons::WARNING));
        ui.label(error);
    });
}
