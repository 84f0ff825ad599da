//! The session actor.
//!
//! One worker task owns the timers, the current scan, and the stage
//! sequencing. Everything else talks to it through a [`SessionHandle`]:
//! commands go in over an mpsc channel, notifications come out over the
//! [`NotificationBus`]. Stage tasks report back to the worker over a second
//! channel so no timer or stage state is ever shared.

pub mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use cf_core::config::Config;
use cf_core::events::{Envelope, Notification, NotificationBus};
use cf_core::protocol::{Command, SessionSettings};
use cf_core::{Error, FileRecord, Result, ScanId};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheWriter, WriteReport};
use crate::catalog::{Catalog, SharedCatalog};
use crate::enrichment::Enricher;
use crate::remote::RemoteStorage;
use crate::scanner::{ScanReport, Scanner};
use crate::thumbnails::ThumbnailFetcher;

use self::scheduler::{CycleTimers, Timer};

const COMMAND_BUFFER: usize = 32;

/// Process-level knobs that do not arrive with INIT.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub extensions: Vec<String>,
    pub thumbnail_size: String,
    pub cache_dir: PathBuf,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extensions: config.pipeline.extensions.clone(),
            thumbnail_size: config.pipeline.thumbnail_size.clone(),
            cache_dir: config.cache.resolved_dir(),
        }
    }
}

/// A running session.
pub struct Session {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl Session {
    /// Start the worker on the current runtime. Nothing happens until INIT
    /// and GET arrive.
    pub fn spawn(remote: Arc<dyn RemoteStorage>, options: SessionOptions) -> Self {
        let catalog = Catalog::shared();
        let bus = Arc::new(NotificationBus::default());
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);

        let worker = Worker::new(remote, options, Arc::clone(&catalog), Arc::clone(&bus), rx);
        let task = tokio::spawn(worker.run());

        Self {
            handle: SessionHandle {
                commands: tx,
                bus,
                catalog,
            },
            task,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Wait for the worker to stop.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("session worker failed: {e}")))
    }
}

/// Cloneable client side of a session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    bus: Arc<NotificationBus>,
    catalog: SharedCatalog,
}

impl SessionHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    pub async fn init(&self, settings: SessionSettings) -> Result<()> {
        self.send(Command::Init(settings)).await
    }

    pub async fn get(&self) -> Result<()> {
        self.send(Command::Get).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// Subscribe to outbound notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.bus.subscribe()
    }

    pub fn recent(&self, n: usize) -> Vec<Envelope> {
        self.bus.recent(n)
    }

    pub fn catalog_snapshot(&self) -> Vec<FileRecord> {
        self.catalog.lock().snapshot()
    }
}

/// Completion messages from stage tasks.
enum StageDone {
    Scan(ScanReport),
    Save(Result<WriteReport>),
}

struct ActiveScan {
    id: ScanId,
    cancel: CancellationToken,
}

/// Thumbnail fetch followed by cache write.
struct SaveCycle {
    fetcher: ThumbnailFetcher,
    writer: CacheWriter,
}

impl SaveCycle {
    async fn run(&self) -> Result<WriteReport> {
        let fetched = self.fetcher.fetch().await;
        debug!(?fetched, "Thumbnail stage done");
        self.writer.persist().await
    }
}

struct Worker {
    commands: mpsc::Receiver<Command>,
    stage_tx: mpsc::UnboundedSender<StageDone>,
    stage_rx: mpsc::UnboundedReceiver<StageDone>,
    catalog: SharedCatalog,
    bus: Arc<NotificationBus>,
    enricher: Enricher,
    scanner: Arc<Scanner>,
    save_cycle: Arc<SaveCycle>,
    settings: Option<SessionSettings>,
    timers: CycleTimers,
    active_scan: Option<ActiveScan>,
    save_task: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(
        remote: Arc<dyn RemoteStorage>,
        options: SessionOptions,
        catalog: SharedCatalog,
        bus: Arc<NotificationBus>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (stage_tx, stage_rx) = mpsc::unbounded_channel();
        let enricher = Enricher::new(Arc::clone(&remote), Arc::clone(&catalog));
        let scanner = Scanner::new(
            Arc::clone(&remote),
            Arc::clone(&catalog),
            enricher.clone(),
            options.extensions,
        );
        let save_cycle = SaveCycle {
            fetcher: ThumbnailFetcher::new(remote, Arc::clone(&catalog), options.thumbnail_size),
            writer: CacheWriter::new(options.cache_dir, Arc::clone(&catalog)),
        };

        Self {
            commands,
            stage_tx,
            stage_rx,
            catalog,
            bus,
            enricher,
            scanner: Arc::new(scanner),
            save_cycle: Arc::new(save_cycle),
            settings: None,
            timers: CycleTimers::new(),
            active_scan: None,
            save_task: None,
        }
    }

    async fn run(mut self) {
        info!("Session started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(done) = self.stage_rx.recv() => match done {
                    StageDone::Scan(report) => self.handle_scan_done(report),
                    StageDone::Save(result) => self.handle_save_done(result),
                },
                timer = self.timers.fired() => match timer {
                    Timer::Scan => self.start_scan(),
                    Timer::Save => self.sort_cycle(),
                },
            }
        }

        self.shutdown().await;
        info!("Session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Init(settings) => self.init(settings),
            Command::Get => {
                if self.settings.is_none() {
                    warn!("GET received before INIT; ignoring");
                    return;
                }
                self.start_scan();
            }
            Command::Shutdown => {}
        }
    }

    fn init(&mut self, settings: SessionSettings) {
        if let Err(e) = settings.validate() {
            error!(error = %e, "Rejected INIT");
            return;
        }
        if let Err(e) = self.save_cycle.writer.ensure_dir() {
            error!(
                dir = %self.save_cycle.writer.dir().display(),
                error = %e,
                "Failed to create cache directory"
            );
        }

        self.timers.clear();
        self.cancel_active_scan();

        info!(
            root = %settings.search_root(),
            data_update_interval_ms = settings.data_update_interval,
            update_interval_ms = settings.update_interval,
            "Session initialized"
        );
        self.settings = Some(settings);
    }

    fn cancel_active_scan(&mut self) {
        if let Some(scan) = self.active_scan.take() {
            debug!(scan_id = %scan.id, "Cancelling superseded scan");
            scan.cancel.cancel();
        }
    }

    fn start_scan(&mut self) {
        let Some(settings) = self.settings.as_ref() else {
            return;
        };
        let root = settings.search_root();

        self.timers.clear();
        self.cancel_active_scan();

        let id = ScanId::new();
        let cancel = CancellationToken::new();
        self.active_scan = Some(ActiveScan {
            id,
            cancel: cancel.clone(),
        });

        let scanner = Arc::clone(&self.scanner);
        let tx = self.stage_tx.clone();
        tokio::spawn(async move {
            let report = scanner.scan(id, &root, &cancel).await;
            let _ = tx.send(StageDone::Scan(report));
        });
    }

    fn handle_scan_done(&mut self, report: ScanReport) {
        match &self.active_scan {
            Some(active) if active.id == report.scan_id => self.active_scan = None,
            _ => {
                debug!(scan_id = %report.scan_id, "Ignoring result of superseded scan");
                return;
            }
        }

        if report.added == 0 && self.catalog.lock().is_empty() {
            warn!(scan_id = %report.scan_id, "Scan found no files");
            self.bus.publish(Notification::empty_folder());
            self.arm_scan_timer();
            return;
        }

        self.sort_cycle();
    }

    /// Sort, re-arm the scan cadence, then fetch and save.
    fn sort_cycle(&mut self) {
        self.catalog.lock().sort_newest_first();
        self.arm_scan_timer();
        self.start_save_cycle();
    }

    fn arm_scan_timer(&mut self) {
        if let Some(settings) = &self.settings {
            if self.timers.arm_scan_if_idle(settings.scan_interval()) {
                debug!(after = ?settings.scan_interval(), "Scan timer armed");
            }
        }
    }

    fn start_save_cycle(&mut self) {
        if self.save_task.is_some() {
            debug!("Save cycle already in flight");
            return;
        }

        let save_cycle = Arc::clone(&self.save_cycle);
        let tx = self.stage_tx.clone();
        self.save_task = Some(tokio::spawn(async move {
            let result = save_cycle.run().await;
            let _ = tx.send(StageDone::Save(result));
        }));
    }

    fn handle_save_done(&mut self, result: Result<WriteReport>) {
        self.save_task = None;

        if let Err(e) = result {
            warn!(error = %e, "Cache write failed");
        }

        let snapshot = self.catalog.lock().snapshot();
        if snapshot.is_empty() {
            warn!("Catalog empty at save time");
            self.bus.publish(Notification::empty_folder());
            return;
        }

        info!(files = snapshot.len(), "Publishing catalog");
        self.bus.publish(Notification::Files(snapshot));

        if let Some(settings) = &self.settings {
            self.timers.rearm_save(settings.save_interval());
        }
    }

    async fn shutdown(&mut self) {
        self.timers.clear();
        self.cancel_active_scan();

        if let Some(task) = self.save_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Save cycle ended abnormally");
            }
        }

        self.enricher.wait_idle().await;
    }
}
