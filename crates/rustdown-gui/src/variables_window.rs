use std::collections::BTreeMap;

use eframe::egui;
use rustdown_core::settings::Preferences;

/// What the user asked for in the variables window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariablesRequest {
    Apply(BTreeMap<String, String>),
    Import,
    Export,
}

/// Editable copy of the global variables. Nothing is stored until Apply.
#[derive(Debug, Default)]
pub struct VariablesWindow {
    open: bool,
    rows: Vec<(String, String)>,
}

impl VariablesWindow {
    pub fn open(&mut self, prefs: &Preferences) {
        self.load(prefs);
        self.open = true;
    }

    /// Replaces the draft with the stored variables.
    pub fn load(&mut self, prefs: &Preferences) {
        self.rows = prefs
            .global_variables
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
    }

    /// The draft as stored variables: names trimmed, blank names dropped,
    /// later rows win.
    fn collect(&self) -> BTreeMap<String, String> {
        let mut prefs = Preferences::default();
        for (name, value) in &self.rows {
            prefs.set_variable(name, value);
        }
        prefs.global_variables
    }

    pub fn show(&mut self, ctx: &egui::Context) -> Option<VariablesRequest> {
        if !self.open {
            return None;
        }
        let mut open = self.open;
        let mut request = None;
        let mut remove = None;

        egui::Window::new("Variables")
            .open(&mut open)
            .collapsible(false)
            .default_width(360.0)
            .show(ctx, |ui| {
                ui.label("Used for {{ name }} when a file does not define it.");
                ui.add_space(4.0);
                egui::Grid::new("variables")
                    .num_columns(3)
                    .striped(true)
                    .show(ui, |ui| {
                        for (index, (name, value)) in self.rows.iter_mut().enumerate() {
                            ui.add(egui::TextEdit::singleline(name).hint_text("name"));
                            ui.add(egui::TextEdit::singleline(value).hint_text("value"));
                            if ui.small_button("x").on_hover_text("Remove").clicked() {
                                remove = Some(index);
                            }
                            ui.end_row();
                        }
                    });
                if ui.button("Add").clicked() {
                    self.rows.push((String::new(), String::new()));
                }
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Apply").clicked() {
                        request = Some(VariablesRequest::Apply(self.collect()));
                    }
                    if ui.button("Import...").clicked() {
                        request = Some(VariablesRequest::Import);
                    }
                    if ui.button("Export...").clicked() {
                        request = Some(VariablesRequest::Export);
                    }
                });
            });

        if let Some(index) = remove {
            self.rows.remove(index);
        }
        self.open = open;
        request
    }
}
