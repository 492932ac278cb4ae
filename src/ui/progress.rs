use std::time::Duration;
use std::time::Instant;

use egui::ProgressBar;
use egui::RichText;

use crate::api::PipelineStage;
use crate::api::ProgressReport;
use crate::app::ConsoleTabViewer;
use crate::app::Tab;
use crate::icon_str;
use crate::icons;
use crate::session::AssignmentMode;
use crate::task;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Poll bookkeeping for the tracking/calibration phase of the pipeline.
pub struct PipelineProgressState {
    pub stage: PipelineStage,
    pub tracking: ProgressReport,
    pub calibration: ProgressReport,
    pub last_poll: Option<Instant>,
    pub poll_in_flight: bool,
    /// Set once the console has routed onward so we stop polling and don't
    /// navigate twice.
    pub routed: bool,
}

impl Default for PipelineProgressState {
    fn default() -> Self {
        PipelineProgressState {
            stage: PipelineStage::Tracking,
            tracking: ProgressReport::default(),
            calibration: ProgressReport::default(),
            last_poll: None,
            poll_in_flight: false,
            routed: false,
        }
    }
}

impl PipelineProgressState {
    pub fn poll_due(&self) -> bool {
        !self.routed && !self.poll_in_flight && self.last_poll.is_none_or(|t| t.elapsed() >= POLL_INTERVAL)
    }
}

impl ConsoleTabViewer<'_> {
    pub fn build_progress_tab(&mut self, ui: &mut egui::Ui) {
        let Some(session) = &self.tab_state.session else {
            ui.label("No analysis is running. Start one from the Session Setup tab.");
            if ui.button(icon_str!(icons::HOUSE, "Go to Session Setup")).clicked() {
                self.tab_state.navigate_to(Tab::SessionSetup);
            }
            return;
        };

        ui.heading(format!("{} Pipeline progress", icons::FILM_SLATE));
        ui.horizontal(|ui| {
            ui.label("Session:");
            ui.label(RichText::new(session.id.to_string()).monospace());
        });
        ui.label(RichText::new("Write this id down to get back to the results later.").weak());
        ui.separator();

        if session.pipeline.routed {
            ui.horizontal(|ui| {
                ui.colored_label(egui::Color32::LIGHT_GREEN, icons::CHECK_CIRCLE);
                ui.label("Tracking and calibration finished.");
            });
            return;
        }

        let pipeline = &session.pipeline;
        let tracking_label = PipelineStage::Tracking.label();
        let tracking_pct = (pipeline.tracking.fraction() * 100.0) as u32;
        ui.label(RichText::new(tracking_label).strong());
        ui.add(ProgressBar::new(pipeline.tracking.fraction()).text(if session.info.tracking_exists {
            format!("{tracking_label}: done")
        } else {
            format!("{tracking_label}: {tracking_pct}%")
        }));

        if pipeline.stage == PipelineStage::Transformer {
            let calibration_label = PipelineStage::Transformer.label();
            let calibration_pct = (pipeline.calibration.fraction() * 100.0) as u32;
            ui.add_space(6.0);
            ui.label(RichText::new(calibration_label).strong());
            ui.add(
                ProgressBar::new(pipeline.calibration.fraction()).text(format!("{calibration_label}: {calibration_pct}%")),
            );
        }

        if session.mode == AssignmentMode::Manual && session.info.view_exists {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Waiting for the representative frames...");
            });
        }

        // Schedule the next poll tick. Results come back through the
        // background task queue; the session generation guards against
        // applying them to a different session.
        if session.pipeline.poll_due() {
            let id = session.id.clone();
            let stage = session.pipeline.stage;
            let check_frames = session.mode == AssignmentMode::Manual;
            let api = self.tab_state.api.clone();
            let generation = self.tab_state.session_generation;
            if let Some(session) = &mut self.tab_state.session {
                session.pipeline.poll_in_flight = true;
            }
            self.tab_state.push_task(task::poll_pipeline(api, id, stage, check_frames, generation));
        }
    }
}
