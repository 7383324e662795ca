#![forbid(unsafe_code)]
#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]

#[cfg(target_arch = "wasm32")]
compile_error!("rustdown is a native desktop app; web/wasm builds are not supported.");

use std::{
    ffi::OsString,
    fs,
    path::PathBuf,
    time::Instant,
};

use eframe::egui;
use rustdown_core::{
    DocumentId,
    disk_io::write_atomic,
    gateway::{DialogGateway, LocalFiles},
    reconcile::{Decision, DecisionRequest},
    session::{SessionService, TomlFileStore},
    settings::{Preferences, TabLayout, Theme},
    variables,
    workspace::{CloseChoice, Effect, Level, Notice, POLL_INTERVAL, Workspace},
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod dialogs;
mod prompts;
mod variables_window;
mod watch;
mod worker;

use dialogs::RfdDialogs;
use prompts::ClosePrompts;
use variables_window::{VariablesRequest, VariablesWindow};
use watch::FileWatcher;
use worker::Worker;

const ZOOM_STEP: f32 = 0.1;
const MIN_ZOOM_FACTOR: f32 = 0.5;
const MAX_ZOOM_FACTOR: f32 = 3.0;
const MAX_NOTICES: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
struct LaunchOptions {
    mode: Mode,
    paths: Vec<PathBuf>,
}

fn parse_launch_options<I, S>(args: I) -> LaunchOptions
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut mode = Mode::Edit;
    let mut paths = Vec::new();

    for arg in args {
        let arg = arg.into();
        if arg == "-p" {
            mode = Mode::Preview;
            continue;
        }
        if arg == "-s" {
            mode = Mode::SideBySide;
            continue;
        }

        let path = PathBuf::from(arg);
        paths.push(std::path::absolute(&path).unwrap_or(path));
    }

    LaunchOptions { mode, paths }
}

fn main() -> eframe::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rustdown=info,rustdown_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let launch_options = parse_launch_options(std::env::args_os().skip(1));
    let session = SessionService::new(Box::new(TomlFileStore::in_config_dir()));
    let prefs = Preferences::load(session.store());

    // Viewport sizes are in points, so they scale with the OS DPI factor.
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 768.0])
            .with_min_inner_size([480.0, 320.0]),
        ..Default::default()
    };
    eframe::run_native(
        "rustdown",
        options,
        Box::new(move |cc| {
            let app = RustdownApp::start(&cc.egui_ctx, session, prefs, launch_options)?;
            Ok(Box::new(app))
        }),
    )
}

struct RustdownApp {
    workspace: Workspace,
    worker: Worker,
    watcher: FileWatcher,
    dialogs: RfdDialogs,
    prefs: Preferences,
    mode: Mode,
    notices: Vec<Notice>,
    conflicts: Vec<DecisionRequest>,
    close_prompts: ClosePrompts,
    variables: VariablesWindow,
    last_poll: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Edit,
    Preview,
    SideBySide,
}

impl Mode {
    fn cycle(self) -> Self {
        [Self::Preview, Self::SideBySide, Self::Edit][self as usize]
    }

    fn label(self) -> &'static str {
        ["Edit", "Preview", "Side-by-side"][self as usize]
    }
}

enum TabAction {
    Activate(DocumentId),
    Close(DocumentId),
    Move(DocumentId, isize),
}

impl eframe::App for RustdownApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for outcome in self.worker.poll() {
            self.workspace.apply_outcome(outcome);
        }
        for path in self.watcher.changed() {
            self.workspace.file_changed(&path);
        }
        let since_poll = self.last_poll.elapsed();
        if since_poll >= POLL_INTERVAL {
            self.workspace.poll();
            self.last_poll = Instant::now();
            ctx.request_repaint_after(POLL_INTERVAL);
        } else {
            ctx.request_repaint_after(POLL_INTERVAL - since_poll);
        }

        self.handle_shortcuts(ctx);

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| self.show_status(ui));
        match self.prefs.tab_layout {
            TabLayout::Horizontal => {
                egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
                    egui::ScrollArea::horizontal().show(ui, |ui| {
                        ui.horizontal(|ui| self.show_tabs(ui));
                    });
                });
            }
            TabLayout::Vertical => {
                egui::SidePanel::left("tabs")
                    .resizable(true)
                    .default_width(180.0)
                    .show(ctx, |ui| {
                        egui::ScrollArea::vertical().show(ui, |ui| self.show_tabs(ui));
                    });
            }
        }

        let panel_frame = egui::Frame::new().fill(ctx.style().visuals.panel_fill);
        if self.mode == Mode::SideBySide {
            egui::SidePanel::right("preview")
                .resizable(true)
                .min_width(240.0)
                .default_width(420.0)
                .frame(panel_frame)
                .show(ctx, |ui| self.show_preview(ui));
        }

        egui::CentralPanel::default()
            .frame(panel_frame)
            .show(ctx, |ui| match self.mode {
                Mode::Edit | Mode::SideBySide => self.show_editor(ui),
                Mode::Preview => self.show_preview(ui),
            });

        self.show_conflicts(ctx);
        self.show_close_prompt(ctx);
        if let Some(request) = self.variables.show(ctx) {
            self.handle_variables(request);
        }
        self.run_effects();

        let watched = self
            .workspace
            .active()
            .and_then(|doc| doc.tracked())
            .map(|(path, _)| path.to_path_buf());
        self.watcher.follow(watched.as_deref());
        self.update_viewport_title(ctx);
    }
}

impl RustdownApp {
    fn start(
        ctx: &egui::Context,
        session: SessionService,
        prefs: Preferences,
        options: LaunchOptions,
    ) -> std::io::Result<Self> {
        let mut workspace = Workspace::new();
        workspace.restore(session.load_snapshot(), &LocalFiles);
        for path in options.paths {
            workspace.open_path(path);
        }

        let worker = Worker::spawn(session, ctx.clone())?;
        let mut app = Self {
            workspace,
            worker,
            watcher: FileWatcher::new(ctx.clone()),
            dialogs: RfdDialogs,
            prefs,
            mode: options.mode,
            notices: Vec::new(),
            conflicts: Vec::new(),
            close_prompts: ClosePrompts::default(),
            variables: VariablesWindow::default(),
            last_poll: Instant::now(),
        };
        app.apply_theme(ctx);
        app.run_effects();
        info!(documents = app.workspace.store().len(), "started");
        Ok(app)
    }

    fn modal_open(&self) -> bool {
        !self.close_prompts.is_empty() || !self.conflicts.is_empty()
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if self.modal_open() {
            return;
        }
        let (open, save, save_as, new_doc, close, cycle_mode, zoom_in, zoom_out) =
            ctx.input(|i| {
                let cmd = i.modifiers.command;
                (
                    cmd && i.key_pressed(egui::Key::O),
                    cmd && i.key_pressed(egui::Key::S) && !i.modifiers.shift,
                    cmd && i.key_pressed(egui::Key::S) && i.modifiers.shift,
                    cmd && i.key_pressed(egui::Key::N),
                    cmd && i.key_pressed(egui::Key::W),
                    cmd && i.key_pressed(egui::Key::Enter),
                    cmd && i.key_pressed(egui::Key::Equals),
                    cmd && i.key_pressed(egui::Key::Minus),
                )
            });

        let active = self.workspace.store().active_id();
        if open {
            self.workspace.request_open();
        }
        if let Some(id) = active {
            if save {
                self.workspace.save(id);
            }
            if save_as {
                self.workspace.save_as(id);
            }
            if close {
                self.workspace.request_close(id);
            }
        }
        if new_doc {
            self.workspace.new_document();
        }
        if cycle_mode {
            self.mode = self.mode.cycle();
        }
        if zoom_in {
            Self::adjust_zoom(ctx, ZOOM_STEP);
        }
        if zoom_out {
            Self::adjust_zoom(ctx, -ZOOM_STEP);
        }
    }

    fn adjust_zoom(ctx: &egui::Context, delta: f32) {
        let zoom = (ctx.zoom_factor() + delta).clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR);
        ctx.set_zoom_factor(zoom);
    }

    fn apply_theme(&self, ctx: &egui::Context) {
        ctx.set_theme(match self.prefs.theme {
            Theme::Light => egui::Theme::Light,
            Theme::Dark => egui::Theme::Dark,
        });
    }

    fn update_viewport_title(&self, ctx: &egui::Context) {
        let Some(doc) = self.workspace.active() else {
            return;
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(format!(
            "rustdown - {}{}",
            doc.title,
            if doc.is_modified { "*" } else { "" },
        )));
    }

    fn show_tabs(&mut self, ui: &mut egui::Ui) {
        let store = self.workspace.store();
        let active = store.active_id();
        let tabs: Vec<_> = store
            .documents()
            .iter()
            .map(|doc| {
                let label = if doc.is_modified {
                    format!("{}*", doc.title)
                } else {
                    doc.title.clone()
                };
                (doc.id, label, doc.path_label().into_owned())
            })
            .collect();

        let mut action = None;
        for (id, label, hover) in tabs {
            ui.horizontal(|ui| {
                let response = ui
                    .selectable_label(active == Some(id), label)
                    .on_hover_text(hover);
                if response.clicked() {
                    action = Some(TabAction::Activate(id));
                }
                response.context_menu(|ui| {
                    if ui.button("Move left").clicked() {
                        action = Some(TabAction::Move(id, -1));
                    }
                    if ui.button("Move right").clicked() {
                        action = Some(TabAction::Move(id, 1));
                    }
                    if ui.button("Close").clicked() {
                        action = Some(TabAction::Close(id));
                    }
                });
                if ui.small_button("x").clicked() {
                    action = Some(TabAction::Close(id));
                }
            });
        }
        if ui.button("+").on_hover_text("New document").clicked() {
            self.workspace.new_document();
        }

        match action {
            Some(TabAction::Activate(id)) => self.workspace.activate(id),
            Some(TabAction::Close(id)) => self.workspace.request_close(id),
            Some(TabAction::Move(id, offset)) => self.workspace.move_tab(id, offset),
            None => {}
        }
    }

    fn show_status(&mut self, ui: &mut egui::Ui) {
        let mut dismiss = None;
        let mut toggle_theme = false;
        let mut toggle_layout = false;
        let mut open_variables = false;

        ui.horizontal(|ui| {
            for mode in [Mode::Edit, Mode::Preview, Mode::SideBySide] {
                if ui
                    .selectable_label(self.mode == mode, mode.label())
                    .clicked()
                {
                    self.mode = mode;
                }
            }

            ui.separator();

            if let Some(doc) = self.workspace.active() {
                ui.label(doc.path_label());
                if doc.is_modified {
                    ui.separator();
                    ui.colored_label(ui.visuals().warn_fg_color, "Modified");
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let theme_label = match self.prefs.theme {
                    Theme::Light => "Dark",
                    Theme::Dark => "Light",
                };
                toggle_theme = ui.button(theme_label).clicked();
                let layout_label = match self.prefs.tab_layout {
                    TabLayout::Horizontal => "Side tabs",
                    TabLayout::Vertical => "Top tabs",
                };
                toggle_layout = ui.button(layout_label).clicked();
                open_variables = ui.button("Variables").clicked();

                if let Some((index, notice)) = self.notices.iter().enumerate().next_back() {
                    ui.separator();
                    if ui.button("x").clicked() {
                        dismiss = Some(index);
                    }
                    let color = match notice.level {
                        Level::Error => ui.visuals().error_fg_color,
                        Level::Info => ui.visuals().text_color(),
                    };
                    ui.colored_label(color, notice.message.as_str());
                }
            });
        });

        if let Some(index) = dismiss {
            self.notices.remove(index);
        }
        if toggle_theme {
            self.prefs.theme = self.prefs.theme.toggled();
            self.apply_theme(ui.ctx());
            self.worker.save_preferences(self.prefs.clone());
        }
        if toggle_layout {
            self.prefs.tab_layout = match self.prefs.tab_layout {
                TabLayout::Horizontal => TabLayout::Vertical,
                TabLayout::Vertical => TabLayout::Horizontal,
            };
            self.worker.save_preferences(self.prefs.clone());
        }
        if open_variables {
            self.variables.open(&self.prefs);
        }
    }

    fn handle_variables(&mut self, request: VariablesRequest) {
        match request {
            VariablesRequest::Apply(globals) => {
                debug!(count = globals.len(), "global variables updated");
                self.prefs.global_variables = globals;
                self.worker.save_preferences(self.prefs.clone());
            }
            VariablesRequest::Import => {
                let Some(path) = self.dialogs.pick_variables_file() else {
                    return;
                };
                let imported = fs::read_to_string(&path)
                    .map_err(|err| err.to_string())
                    .and_then(|raw| {
                        variables::import_toml(&mut self.prefs.global_variables, &raw)
                            .map_err(|err| err.to_string())
                    });
                match imported {
                    Ok(count) => {
                        info!(path = %path.display(), count, "imported variables");
                        self.worker.save_preferences(self.prefs.clone());
                        self.variables.load(&self.prefs);
                        self.notify(Level::Info, format!("Imported {count} variables"));
                    }
                    Err(err) => {
                        error!(path = %path.display(), "variable import failed: {err}");
                        self.notify(Level::Error, format!("Import failed: {err}"));
                    }
                }
            }
            VariablesRequest::Export => {
                let Some(path) = self.dialogs.pick_variables_target() else {
                    return;
                };
                let written = variables::export_toml(&self.prefs.global_variables)
                    .map_err(|err| err.to_string())
                    .and_then(|text| write_atomic(&path, &text).map_err(|err| err.to_string()));
                match written {
                    Ok(()) => {
                        info!(path = %path.display(), "exported variables");
                        self.notify(Level::Info, format!("Exported to {}", path.display()));
                    }
                    Err(err) => {
                        error!(path = %path.display(), "variable export failed: {err}");
                        self.notify(Level::Error, format!("Export failed: {err}"));
                    }
                }
            }
        }
    }

    fn notify(&mut self, level: Level, message: String) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(Notice { level, message });
    }

    fn show_editor(&mut self, ui: &mut egui::Ui) {
        let Some(doc) = self.workspace.active() else {
            return;
        };
        let id = doc.id;
        let mut text = doc.content.clone();

        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                let editor = egui::TextEdit::multiline(&mut text)
                    .desired_width(f32::INFINITY)
                    .font(egui::TextStyle::Monospace)
                    .frame(false)
                    .id(egui::Id::new(("editor", id)));
                if ui.add_sized(ui.available_size(), editor).changed() {
                    self.workspace.edit(id, text);
                }
            });
    }

    fn show_preview(&self, ui: &mut egui::Ui) {
        let Some(doc) = self.workspace.active() else {
            return;
        };
        let expanded = variables::expand(&doc.content, &self.prefs.global_variables);

        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                ui.add(egui::Label::new(expanded).selectable(true).wrap());
            });
    }

    fn show_conflicts(&mut self, ctx: &egui::Context) {
        let mut answered = Vec::new();
        for request in &self.conflicts {
            egui::Window::new("File changed on disk")
                .id(egui::Id::new(("conflict", request.document)))
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(format!(
                        "\"{}\" was changed by another program.",
                        request.title
                    ));
                    ui.add_space(8.0);

                    ui.horizontal(|ui| {
                        if ui.button("Reload").clicked() {
                            answered.push((request.document, Decision::Reload));
                        }
                        if ui.button("Keep my changes").clicked() {
                            answered.push((request.document, Decision::KeepLocal));
                        }
                    });
                });
        }

        for (id, decision) in answered {
            self.conflicts.retain(|request| request.document != id);
            self.workspace.resolve_conflict(id, decision);
        }
        // Closed documents take their prompts with them.
        let store = self.workspace.store();
        self.conflicts.retain(|request| store.contains(request.document));
    }

    fn show_close_prompt(&mut self, ctx: &egui::Context) {
        self.close_prompts.retain_open(self.workspace.store());
        let Some((id, title)) = self.close_prompts.current().cloned() else {
            return;
        };

        let mut choice = ctx
            .input(|i| i.key_pressed(egui::Key::Escape))
            .then_some(CloseChoice::Cancel);

        egui::Window::new("Unsaved changes")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(format!("\"{title}\" has unsaved changes."));
                ui.add_space(8.0);

                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        choice = Some(CloseChoice::Save);
                    }
                    if ui.button("Discard").clicked() {
                        choice = Some(CloseChoice::Discard);
                    }
                    if ui.button("Cancel").clicked() {
                        choice = Some(CloseChoice::Cancel);
                    }
                });
            });

        if let Some(choice) = choice {
            self.close_prompts.answered(id);
            self.workspace.resolve_close(id, choice);
        }
    }

    /// Carries out queued effects. Dialogs run inline and may queue more.
    fn run_effects(&mut self) {
        loop {
            let effects = self.workspace.drain_effects();
            if effects.is_empty() {
                return;
            }
            for effect in effects {
                self.run_effect(effect);
            }
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Run(job) => self.worker.run(job),
            Effect::Persist(snapshot) => self.worker.persist(snapshot),
            Effect::PickOpenPath => {
                if let Some(path) = self.dialogs.pick_open_path() {
                    self.workspace.open_path(path);
                }
            }
            Effect::PickSavePath {
                document,
                suggested_name,
            } => match self.dialogs.pick_save_path(&suggested_name) {
                Some(path) => self.workspace.save_to(document, path),
                None => self.workspace.save_cancelled(document),
            },
            Effect::Decide(request) => {
                if !self
                    .conflicts
                    .iter()
                    .any(|pending| pending.document == request.document)
                {
                    self.conflicts.push(request);
                }
            }
            Effect::ConfirmClose { document, title } => {
                if !self.close_prompts.push(document, title) {
                    debug!(document = %document, "close prompt already queued");
                }
            }
            Effect::Notify(Notice { level, message }) => self.notify(level, message),
        }
    }
}
