//! Background thread for file jobs and session writes.

use std::{
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread,
};

use eframe::egui;
use rustdown_core::{
    gateway::LocalFiles,
    session::{SessionService, SessionSnapshot},
    settings::Preferences,
    workspace::{Job, Outcome},
};
use tracing::{debug, warn};

enum Request {
    Run(Job),
    Persist(SessionSnapshot),
    SavePreferences(Preferences),
}

/// Runs jobs in submission order; results come back through [`Self::poll`].
pub struct Worker {
    requests: Sender<Request>,
    outcomes: Receiver<Outcome>,
}

impl Worker {
    pub fn spawn(session: SessionService, ctx: egui::Context) -> std::io::Result<Self> {
        let (requests, inbox) = mpsc::channel();
        let (outbox, outcomes) = mpsc::channel();
        thread::Builder::new()
            .name("rustdown-io".to_owned())
            .spawn(move || run(&inbox, &outbox, &session, &ctx))?;
        Ok(Self { requests, outcomes })
    }

    pub fn run(&self, job: Job) {
        self.send(Request::Run(job));
    }

    pub fn persist(&self, snapshot: SessionSnapshot) {
        self.send(Request::Persist(snapshot));
    }

    pub fn save_preferences(&self, prefs: Preferences) {
        self.send(Request::SavePreferences(prefs));
    }

    /// Completed jobs, oldest first.
    pub fn poll(&self) -> Vec<Outcome> {
        self.outcomes.try_iter().collect()
    }

    fn send(&self, request: Request) {
        if self.requests.send(request).is_err() {
            warn!("io worker is gone; request dropped");
        }
    }
}

fn run(
    inbox: &Receiver<Request>,
    outbox: &Sender<Outcome>,
    session: &SessionService,
    ctx: &egui::Context,
) {
    let files = LocalFiles;
    while let Ok(first) = inbox.recv() {
        // Drain whatever queued up meanwhile so only the newest snapshot is written.
        let mut batch = vec![first];
        loop {
            match inbox.try_recv() {
                Ok(request) => batch.push(request),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    process(batch, &files, outbox, session, ctx);
                    return;
                }
            }
        }
        process(batch, &files, outbox, session, ctx);
    }
    debug!("io worker stopped");
}

fn process(
    batch: Vec<Request>,
    files: &LocalFiles,
    outbox: &Sender<Outcome>,
    session: &SessionService,
    ctx: &egui::Context,
) {
    let mut snapshot = None;
    for request in batch {
        match request {
            Request::Run(job) => {
                if outbox.send(job.run(files)).is_err() {
                    return;
                }
                ctx.request_repaint();
            }
            Request::Persist(latest) => snapshot = Some(latest),
            Request::SavePreferences(prefs) => {
                if let Err(err) = prefs.save(session.store()) {
                    warn!("failed to save preferences: {err}");
                }
            }
        }
    }
    if let Some(snapshot) = snapshot {
        session.save_snapshot(&snapshot);
    }
}
