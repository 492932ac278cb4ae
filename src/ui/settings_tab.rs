use egui::Color32;
use egui::Slider;

use crate::app::ConsoleTabViewer;
use crate::ui::session_setup::sanitize_team_name;

const DEFAULT_ZOOM_FACTOR: f32 = 1.15;

impl ConsoleTabViewer<'_> {
    pub fn build_settings_tab(&mut self, ui: &mut egui::Ui) {
        ui.vertical(|ui| {
            ui.label("Application Settings");
            ui.group(|ui| {
                ui.horizontal(|ui| {
                    let mut zoom = ui.ctx().zoom_factor();
                    if ui.add(Slider::new(&mut zoom, 0.5..=2.0).text("Zoom Factor (Ctrl + and Ctrl - also changes this)")).changed() {
                        ui.ctx().set_zoom_factor(zoom);
                    }
                    if ui.button("Reset").clicked() {
                        ui.ctx().set_zoom_factor(DEFAULT_ZOOM_FACTOR);
                    }
                });
                ui.add(
                    Slider::new(&mut self.tab_state.settings.annotator_display_width, 600.0..=1600.0)
                        .text("Annotation frame display width (px)"),
                );
                ui.checkbox(&mut self.tab_state.settings.confirm_submit, "Ask for confirmation before saving a team assignment");
            });

            ui.label("Analysis Backend");
            ui.group(|ui| {
                let show_text_error = {
                    let base = self.tab_state.settings.api_base.as_str();
                    !(base.starts_with("http://") || base.starts_with("https://"))
                };

                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.tab_state.settings.api_base)
                        .hint_text("Backend base URL")
                        .desired_width(f32::INFINITY)
                        .text_color_opt(show_text_error.then_some(Color32::LIGHT_RED)),
                );

                if response.changed() {
                    self.tab_state.rebuild_api_client();
                }
            });

            ui.label("Team Defaults");
            ui.group(|ui| {
                ui.label("Pre-filled into the new-analysis form.");
                let settings = &mut self.tab_state.settings;
                egui::Grid::new("team_defaults_grid").num_columns(3).show(ui, |ui| {
                    ui.label("Team 1");
                    egui::color_picker::color_edit_button_srgba(ui, &mut settings.team1_color, egui::color_picker::Alpha::Opaque);
                    if ui.text_edit_singleline(&mut settings.team1_name).changed() {
                        sanitize_team_name(&mut settings.team1_name);
                    }
                    ui.end_row();

                    ui.label("Team 2");
                    egui::color_picker::color_edit_button_srgba(ui, &mut settings.team2_color, egui::color_picker::Alpha::Opaque);
                    if ui.text_edit_singleline(&mut settings.team2_name).changed() {
                        sanitize_team_name(&mut settings.team2_name);
                    }
                    ui.end_row();
                });
            });
        });
    }
}
