use std::collections::HashMap;

use egui::Color32;
use egui::CornerRadius;
use egui::RichText;
use egui::Sense;
use egui::TextureHandle;
use egui::Vec2;
use tracing::warn;

use crate::app::ConsoleTabViewer;
use crate::assignment::AssignmentBoard;
use crate::frame_annotator::FrameAnnotator;
use crate::icon_str;
use crate::icons;
use crate::session::FrameImage;
use crate::session::PlayDirection;
use crate::session::Team;
use crate::task;

/// Lifecycle of the frame batch backing the assignment page.
#[derive(Default)]
pub enum FramesState {
    #[default]
    NotRequested,
    Loading,
    Failed(String),
    Ready(Box<AssignmentBoard>),
}

#[derive(Default)]
pub struct AssignmentPageState {
    pub frames: FramesState,
    /// Frame textures are uploaded lazily on first display and kept for the
    /// session so back-navigation is instant.
    pub textures: HashMap<usize, TextureHandle>,
    pub submit_in_flight: bool,
    pub confirm_window_open: bool,
}

/// Small colored square matching the overlay color of a team.
fn color_swatch(ui: &mut egui::Ui, color: Color32) {
    let (rect, _response) = ui.allocate_exact_size(Vec2::splat(12.0), Sense::hover());
    ui.painter().rect_filled(rect, CornerRadius::same(3), color);
}

fn frame_texture(
    ctx: &egui::Context,
    textures: &mut HashMap<usize, TextureHandle>,
    index: usize,
    image: &FrameImage,
) -> TextureHandle {
    textures
        .entry(index)
        .or_insert_with(|| {
            let color_image =
                egui::ColorImage::from_rgba_unmultiplied([image.width as usize, image.height as usize], &image.rgba);
            ctx.load_texture(format!("assignment_frame_{index}"), color_image, egui::TextureOptions::LINEAR)
        })
        .clone()
}

enum PageContent {
    Request,
    Loading,
    Failed(String),
    Board,
}

impl ConsoleTabViewer<'_> {
    pub fn build_team_assignment_tab(&mut self, ui: &mut egui::Ui) {
        let content = match &self.tab_state.session {
            None => {
                ui.label("No active session. Open or start one from the Session Setup tab.");
                return;
            }
            Some(session) => match &session.assignment.frames {
                FramesState::NotRequested => PageContent::Request,
                FramesState::Loading => PageContent::Loading,
                FramesState::Failed(message) => PageContent::Failed(message.clone()),
                FramesState::Ready(_) => PageContent::Board,
            },
        };

        match content {
            PageContent::Request => {
                self.request_frames();
                ui.spinner();
            }
            PageContent::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading team assignment data...");
                });
            }
            PageContent::Failed(message) => {
                ui.colored_label(ui.visuals().error_fg_color, format!("{} Could not load frames: {message}", icons::WARNING));
                if ui.button("Retry").clicked() {
                    self.request_frames();
                }
            }
            PageContent::Board => self.build_board(ui),
        }
    }

    fn request_frames(&mut self) {
        let Some(session) = &mut self.tab_state.session else {
            return;
        };
        session.assignment.frames = FramesState::Loading;
        let id = session.id.clone();
        let api = self.tab_state.api.clone();
        let generation = self.tab_state.session_generation;
        self.tab_state.push_task(task::load_frames(api, id, generation));
    }

    fn build_board(&mut self, ui: &mut egui::Ui) {
        let display_width = self.tab_state.settings.annotator_display_width;
        let confirm_submit = self.tab_state.settings.confirm_submit;
        let api = self.tab_state.api.clone();
        let generation = self.tab_state.session_generation;

        let Some(session) = &mut self.tab_state.session else {
            return;
        };
        let session_id = session.id.clone();
        let team_config = session.team_config.clone();
        let palette = team_config.palette();

        let state = &mut session.assignment;
        let FramesState::Ready(board) = &mut state.frames else {
            return;
        };

        ui.horizontal(|ui| {
            ui.heading("Team assignment:");
            color_swatch(ui, team_config.team1.color);
            ui.heading(RichText::new(&team_config.team1.name));
            ui.heading("vs.");
            color_swatch(ui, team_config.team2.color);
            ui.heading(RichText::new(&team_config.team2.name));
        });

        ui.horizontal(|ui| {
            ui.label("Session:");
            ui.label(RichText::new(session_id.to_string()).monospace());
            if ui.button(icons::COPY).on_hover_text("Copy session id").clicked() {
                match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(session_id.to_string())) {
                    Ok(()) => {
                        self.tab_state.toasts.info("Session id copied.");
                    }
                    Err(e) => {
                        warn!("could not access clipboard: {e}");
                    }
                }
            }
        });

        ui.label(format!(
            "Click a player to assign them to {}. Clicking again assigns them back to {}. \
             People detected by mistake (referees, staff) can be excluded with Shift+Click; \
             they turn gray and are ignored by the analysis. Shift+Click again to bring a player back.",
            team_config.team2.name, team_config.team1.name,
        ));
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            ui.label(RichText::new("Play direction:").strong());
            let team1_ltr = board.directions.direction_of(Team::One) == Some(PlayDirection::LeftToRight);
            let team2_ltr = board.directions.direction_of(Team::Two) == Some(PlayDirection::LeftToRight);
            if ui
                .selectable_label(team1_ltr, format!("{} {} plays left to right", icons::SOCCER_BALL, team_config.team1.name))
                .clicked()
            {
                board.directions.set_left_to_right(Team::One);
            }
            if ui
                .selectable_label(team2_ltr, format!("{} {} plays left to right", icons::SOCCER_BALL, team_config.team2.name))
                .clicked()
            {
                board.directions.set_left_to_right(Team::Two);
            }
        });

        ui.add_space(4.0);

        let mut nav_delta: Option<isize> = None;
        let mut save_clicked = false;
        ui.horizontal(|ui| {
            if ui
                .add_enabled(board.current_index() > 0, egui::Button::new(icon_str!(icons::ARROW_LEFT, "Back")))
                .clicked()
            {
                nav_delta = Some(-1);
            }

            ui.label(format!("Frame {} / {}", board.current_index() + 1, board.frame_count()));

            if board.is_last_frame() {
                let save_button = egui::Button::new(icon_str!(icons::FLOPPY_DISK, "Save assignment"));
                if ui.add_enabled(!state.submit_in_flight, save_button).clicked() {
                    if confirm_submit {
                        state.confirm_window_open = true;
                    } else {
                        save_clicked = true;
                    }
                }
            } else if ui.button(const_format::concatcp!("Next ", icons::ARROW_RIGHT)).clicked() {
                nav_delta = Some(1);
            }
        });

        if state.confirm_window_open {
            let mut open = state.confirm_window_open;
            egui::Window::new("Save team assignment?").collapsible(false).open(&mut open).show(ui.ctx(), |ui| {
                ui.label("The assignment is submitted once for the whole session. Continue?");
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        save_clicked = true;
                        state.confirm_window_open = false;
                    }
                    if ui.button("Keep editing").clicked() {
                        state.confirm_window_open = false;
                    }
                });
            });
            state.confirm_window_open &= open;
        }

        if let Some(delta) = nav_delta {
            board.advance(delta);
        }

        if save_clicked && !state.submit_in_flight {
            if let Some(submission) = board.submission() {
                state.submit_in_flight = true;
                self.tab_state.push_task(task::submit_assignments(api, session_id, submission, generation));
                return;
            }
        }

        let frame_index = board.current_index();
        let frame = board.current_frame();
        if frame.players.is_empty() {
            ui.colored_label(ui.visuals().warn_fg_color, "No player detections in this frame.");
        }

        let natural_size = Vec2::new(frame.image.width as f32, frame.image.height as f32);
        let scale = if frame.image.width == 0 { 1.0 } else { display_width / frame.image.width as f32 };
        let texture = frame_texture(ui.ctx(), &mut state.textures, frame_index, &frame.image);
        let working = board.working_assignments();

        let emitted = egui::ScrollArea::both()
            .show(ui, |ui| {
                let output = FrameAnnotator::new(&texture, natural_size, scale, &frame.players, &working, palette).show(ui);
                output.response.on_hover_cursor(egui::CursorIcon::PointingHand);
                output.emitted
            })
            .inner;

        if let Some(report) = emitted {
            board.record_report(report);
        }
    }
}
