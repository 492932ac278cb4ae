use std::path::PathBuf;

use egui::Color32;
use egui::CollapsingHeader;
use egui::RichText;

use crate::api::StartAnalysisRequest;
use crate::api::color_to_hex;
use crate::app::ConsoleTabViewer;
use crate::app::Tab;
use crate::icon_str;
use crate::icons;
use crate::session::AssignmentMode;
use crate::session::SessionId;
use crate::session::TeamConfig;
use crate::session::TeamSide;
use crate::task;
use crate::task::StageGoal;
use crate::task::VideoSource;

/// How the half-time video reaches the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSourceChoice {
    #[default]
    Upload,
    Link,
}

pub struct SessionSetupState {
    pub session_input: String,
    pub source: VideoSourceChoice,
    pub picked_file: Option<PathBuf>,
    pub cloud_link: String,
    pub automatic_assignment: bool,
}

impl Default for SessionSetupState {
    fn default() -> Self {
        SessionSetupState {
            session_input: String::new(),
            source: VideoSourceChoice::default(),
            picked_file: None,
            cloud_link: String::new(),
            // Mirrors the backend default: automatic assignment unless the
            // operator opts into manual review.
            automatic_assignment: true,
        }
    }
}

/// Team abbreviations are at most three letters, uppercased. Returns whether
/// the input had to be truncated.
pub fn sanitize_team_name(name: &mut String) -> bool {
    *name = name.to_uppercase();
    if name.chars().count() > 3 {
        *name = name.chars().take(3).collect();
        true
    } else {
        false
    }
}

impl ConsoleTabViewer<'_> {
    pub fn build_session_setup_tab(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.heading(format!("{} Football Video Analyzer", icons::SOCCER_BALL));
            ui.separator();

            self.build_existing_session_section(ui);
            ui.separator();
            self.build_new_analysis_section(ui);
        });
    }

    fn build_existing_session_section(&mut self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Analyze an existing session").strong());
        ui.label("If an analysis was already started you received a session id. Enter it here to get back to its results.");

        CollapsingHeader::new("Enter a session id").default_open(true).show(ui, |ui| {
            let mut open_requested = false;
            ui.horizontal(|ui| {
                ui.add(
                    egui::TextEdit::singleline(&mut self.tab_state.setup.session_input)
                        .hint_text("Session id")
                        .desired_width(320.0),
                );
                open_requested = ui.button(icon_str!(icons::FOLDER_OPEN, "Open session")).clicked();
            });

            if open_requested {
                let input = self.tab_state.setup.session_input.trim().to_string();
                if input.is_empty() {
                    self.tab_state.toasts.warning("Please enter a session id first.");
                } else {
                    let id = SessionId::new(input);
                    self.tab_state.begin_session(id.clone(), AssignmentMode::Manual, TeamConfig::default());
                    let api = self.tab_state.api.clone();
                    let generation = self.tab_state.session_generation;
                    self.tab_state.push_task(task::open_session(api, id, generation));
                }
            }
        });

        self.build_session_artifacts(ui);
    }

    /// Artifact checklist plus the next sensible pipeline action for the
    /// active session.
    fn build_session_artifacts(&mut self, ui: &mut egui::Ui) {
        let Some(session) = &self.tab_state.session else {
            return;
        };

        let info = session.info.clone();
        let id = session.id.clone();
        let request = self.tab_state.stage_request(session);

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.label(RichText::new("Session artifacts").strong());
            ui.label(RichText::new(id.to_string()).monospace());
            if ui.button(icons::ARROW_CLOCKWISE).on_hover_text("Refresh artifact status").clicked() {
                let api = self.tab_state.api.clone();
                let generation = self.tab_state.session_generation;
                self.tab_state.push_task(task::open_session(api, id.clone(), generation));
            }
        });

        let artifact = |ui: &mut egui::Ui, exists: bool, label: &str| {
            let (icon, color) =
                if exists { (icons::CHECK_CIRCLE, Color32::LIGHT_GREEN) } else { (icons::X_CIRCLE, Color32::LIGHT_RED) };
            ui.horizontal(|ui| {
                ui.colored_label(color, icon);
                ui.label(label);
            });
        };

        ui.group(|ui| {
            artifact(ui, info.tracking_exists, "Tracking log");
            artifact(ui, info.view_exists, "Field calibration");
            artifact(ui, info.assign_exists, "Team assignment");
            artifact(ui, info.annotated_exists, "Annotated video");
        });

        if !info.tracking_exists && !info.assign_exists && !info.annotated_exists {
            ui.colored_label(ui.visuals().warn_fg_color, "No artifacts found for this session yet.");
            return;
        }

        // Only offer pipeline actions when the backend still knows the team
        // configuration for this session.
        let has_config = info.team_config.is_some();
        let generation = self.tab_state.session_generation;
        let api = self.tab_state.api.clone();

        if info.tracking_exists && !info.view_exists && has_config {
            if ui.button(icon_str!(icons::COMPASS, "Calibrate field")).clicked() {
                self.tab_state.push_task(task::trigger_stage(api, request, StageGoal::Calibrate, generation));
            }
        } else if info.tracking_exists && info.view_exists && !info.assign_exists && has_config {
            if ui.button(icon_str!(icons::USERS_THREE, "Start team assignment")).clicked() {
                self.tab_state.push_task(task::trigger_stage(api, request, StageGoal::ManualAssignment, generation));
            }
        } else if info.tracking_exists && info.view_exists && info.assign_exists && !info.annotated_exists && has_config {
            if ui.button(icon_str!(icons::FILM_SLATE, "Render annotated video")).clicked() {
                self.tab_state.push_task(task::trigger_stage(api, request, StageGoal::RenderVideo, generation));
            }
        } else if info.annotated_exists
            && ui.button(icon_str!(icons::CHART_LINE, "View results")).clicked()
        {
            if let Some(session) = &mut self.tab_state.session {
                session.metrics.annotation_done = true;
            }
            self.tab_state.navigate_to(Tab::Metrics);
        }
    }

    fn build_new_analysis_section(&mut self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Start a new analysis").strong());

        ui.label("Team configuration");
        ui.group(|ui| {
            ui.label(
                "Enter the team abbreviations (e.g. VFB for VfB Stuttgart) and jersey colors. \
                 They are used to tell the two sides apart during the analysis.",
            );

            let settings = &mut self.tab_state.settings;
            let mut truncated = false;
            egui::Grid::new("team_config_grid").num_columns(3).show(ui, |ui| {
                ui.label("Team 1");
                egui::color_picker::color_edit_button_srgba(ui, &mut settings.team1_color, egui::color_picker::Alpha::Opaque);
                if ui.text_edit_singleline(&mut settings.team1_name).changed() {
                    truncated |= sanitize_team_name(&mut settings.team1_name);
                }
                ui.end_row();

                ui.label("Team 2");
                egui::color_picker::color_edit_button_srgba(ui, &mut settings.team2_color, egui::color_picker::Alpha::Opaque);
                if ui.text_edit_singleline(&mut settings.team2_name).changed() {
                    truncated |= sanitize_team_name(&mut settings.team2_name);
                }
                ui.end_row();
            });
            if truncated {
                self.tab_state.toasts.warning("Only the first 3 letters of a team abbreviation are kept.");
            }
        });

        ui.add_space(4.0);
        ui.label("Half-time video");
        ui.group(|ui| {
            ui.label(
                "Upload a short clip (one half-time, ideally under 200 MB) or paste a direct link \
                 to an .mp4 file (Google Drive and Dropbox share links work; OneDrive does not).",
            );

            let setup = &mut self.tab_state.setup;
            ui.horizontal(|ui| {
                ui.radio_value(&mut setup.source, VideoSourceChoice::Upload, icon_str!(icons::UPLOAD_SIMPLE, "Upload"));
                ui.radio_value(&mut setup.source, VideoSourceChoice::Link, icon_str!(icons::LINK_SIMPLE, "Cloud link"));
            });

            match setup.source {
                VideoSourceChoice::Upload => {
                    ui.horizontal(|ui| {
                        if ui.button("Choose MP4...").clicked()
                            && let Some(file) = rfd::FileDialog::new().add_filter("MP4 video", &["mp4"]).pick_file()
                        {
                            setup.picked_file = Some(file);
                        }

                        if let Some(file) = &setup.picked_file {
                            let size = std::fs::metadata(file)
                                .map(|m| humansize::format_size(m.len(), humansize::DECIMAL))
                                .unwrap_or_else(|_| "unknown size".to_string());
                            ui.label(format!("{} ({size})", file.file_name().and_then(|n| n.to_str()).unwrap_or("?")));
                        } else {
                            ui.label(RichText::new("No file selected. You can also drop an .mp4 onto this window.").weak());
                        }
                    });
                }
                VideoSourceChoice::Link => {
                    ui.add(
                        egui::TextEdit::singleline(&mut setup.cloud_link)
                            .hint_text("https://example.com/video.mp4")
                            .desired_width(f32::INFINITY),
                    );
                    ui.label(RichText::new("Make sure the link is publicly reachable and points directly at the video.").weak());
                }
            }
        });

        ui.add_space(4.0);
        ui.group(|ui| {
            let setup = &mut self.tab_state.setup;
            let mut automatic = setup.automatic_assignment;
            let mut manual = !setup.automatic_assignment;
            ui.horizontal(|ui| {
                if ui.checkbox(&mut automatic, "Automatic team assignment").changed() {
                    setup.automatic_assignment = automatic;
                }
                if ui.checkbox(&mut manual, "Manual team assignment").changed() {
                    setup.automatic_assignment = !manual;
                }
            });
        });

        ui.add_space(8.0);
        let ready = match self.tab_state.setup.source {
            VideoSourceChoice::Upload => self.tab_state.setup.picked_file.is_some(),
            VideoSourceChoice::Link => !self.tab_state.setup.cloud_link.trim().is_empty(),
        };
        if ui.add_enabled(ready, egui::Button::new(icon_str!(icons::PLAY, "Start analysis"))).clicked() {
            self.start_analysis();
        }
    }

    fn start_analysis(&mut self) {
        let settings = &self.tab_state.settings;
        let setup = &self.tab_state.setup;

        let id = SessionId::generate();
        let automatic = setup.automatic_assignment;
        let team_config = TeamConfig {
            team1: TeamSide { name: settings.team1_name.clone(), color: settings.team1_color },
            team2: TeamSide { name: settings.team2_name.clone(), color: settings.team2_color },
        };

        let (source, video_url) = match setup.source {
            VideoSourceChoice::Upload => {
                let Some(file) = setup.picked_file.clone() else {
                    return;
                };
                (VideoSource::File(file), None)
            }
            VideoSourceChoice::Link => (VideoSource::Link, Some(setup.cloud_link.trim().to_string())),
        };

        let request = StartAnalysisRequest {
            session_id: id.to_string(),
            team1_name: team_config.team1.name.clone(),
            team1_color: color_to_hex(team_config.team1.color),
            team2_name: team_config.team2.name.clone(),
            team2_color: color_to_hex(team_config.team2.color),
            run_tracking: true,
            run_automatic_assignment: automatic,
            run_manual_assignment: !automatic,
            video_url,
        };

        let mode = if automatic { AssignmentMode::Automatic } else { AssignmentMode::Manual };
        self.tab_state.begin_session(id.clone(), mode, team_config);
        let api = self.tab_state.api.clone();
        let generation = self.tab_state.session_generation;
        self.tab_state.push_task(task::start_analysis(api, id, source, request, generation));
    }
}
