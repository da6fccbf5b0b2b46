// SPDX-License-Identifier: GPL-3.0-only

//! From finished recording to saved story
//!
//! Each finished recording is exported, the raw file removed, and only a
//! completed export is offered to the destination picker. `saving` is true
//! from the moment a raw file arrives until the export ends.

use super::AppNotice;
use super::recorder::RecorderEvent;
use crate::errors::{AppError, ExportFailure, HandoffError};
use crate::pipelines::transcode::{ExportOutcome, StoryTranscoder};
use crate::storage::{self, DestinationPicker};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

pub type PickerFactory = Box<dyn Fn() -> Arc<dyn DestinationPicker> + Send + Sync>;

/// Destination picker created on first use
pub struct LazyPicker {
    factory: PickerFactory,
    picker: OnceLock<Arc<dyn DestinationPicker>>,
}

impl LazyPicker {
    pub fn new(factory: PickerFactory) -> Self {
        Self {
            factory,
            picker: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Arc<dyn DestinationPicker> {
        Arc::clone(self.picker.get_or_init(|| (self.factory)()))
    }

    pub fn is_created(&self) -> bool {
        self.picker.get().is_some()
    }
}

#[derive(Clone)]
pub struct SaveStage {
    transcoder: Arc<dyn StoryTranscoder>,
    picker: Arc<LazyPicker>,
    saving: Arc<watch::Sender<bool>>,
    notices: mpsc::UnboundedSender<AppNotice>,
    export_cancel: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    /// Set once the app shuts down; nothing new is exported or saved
    closing: Arc<watch::Sender<bool>>,
}

impl SaveStage {
    pub fn new(
        transcoder: Arc<dyn StoryTranscoder>,
        picker: Arc<LazyPicker>,
        notices: mpsc::UnboundedSender<AppNotice>,
    ) -> Self {
        let (saving, _) = watch::channel(false);
        let (closing, _) = watch::channel(false);
        Self {
            transcoder,
            picker,
            saving: Arc::new(saving),
            notices,
            export_cancel: Arc::new(Mutex::new(None)),
            closing: Arc::new(closing),
        }
    }

    pub fn subscribe_saving(&self) -> watch::Receiver<bool> {
        self.saving.subscribe()
    }

    /// Cancel the running export, if any
    pub fn cancel_export(&self) -> bool {
        match self.export_cancel.lock().ok().and_then(|slot| slot.clone()) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Stop exporting: the running export is cancelled and `run` returns
    pub fn close(&self) {
        self.closing.send_replace(true);
        self.cancel_export();
    }

    fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    /// Handle recorder events until the recorder goes away or the stage closes
    ///
    /// Raw files still queued at close are deleted, not exported.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<RecorderEvent>) {
        let mut closing = self.closing.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = async { closing.wait_for(|closed| *closed).await.map(|_| ()) } => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => return,
                },
            }
        }

        while let Ok(event) = events.try_recv() {
            if let RecorderEvent::Finished { raw_file, .. } = event {
                info!(path = %raw_file.display(), "Discarding recording at shutdown");
                storage::discard(&raw_file);
            }
        }
    }

    pub async fn handle(&self, event: RecorderEvent) {
        match event {
            RecorderEvent::Finished { raw_file, reason } => {
                info!(path = %raw_file.display(), reason = ?reason, "Recording finished, exporting");
                self.export_and_save(raw_file).await;
            }
            RecorderEvent::Failed(e) => self.notify_error(AppError::Recording(e)),
        }
    }

    async fn export_and_save(&self, raw_file: PathBuf) {
        self.saving.send_replace(true);

        let output = storage::temp_export_path();
        let job = match self.transcoder.transcode(raw_file.clone(), output).await {
            Ok(job) => job,
            Err(e) => {
                storage::discard(&raw_file);
                self.saving.send_replace(false);
                self.notify_error(AppError::Transcode(e));
                return;
            }
        };

        self.set_cancel(Some(job.cancel_flag()));
        if self.is_closing() {
            job.cancel();
        }
        let outcome = job.wait().await;
        self.set_cancel(None);

        storage::discard(&raw_file);
        self.saving.send_replace(false);

        match outcome {
            ExportOutcome::Completed(exported) => self.save(exported).await,
            ExportOutcome::Failed(message) => {
                self.notify_error(AppError::Export(ExportFailure::Failed(message)));
            }
            ExportOutcome::Cancelled => self.notify_error(AppError::Export(ExportFailure::Cancelled)),
        }
    }

    async fn save(&self, exported: PathBuf) {
        if self.is_closing() {
            storage::discard(&exported);
            return;
        }
        let notice = match storage::finalize(exported, self.picker.get()).await {
            Ok(path) => AppNotice::Saved(path),
            Err(HandoffError::UserCancelled) => AppNotice::SaveCancelled,
            Err(e) => AppNotice::Error(AppError::from(e).user_message()),
        };
        let _ = self.notices.send(notice);
    }

    fn set_cancel(&self, flag: Option<Arc<AtomicBool>>) {
        if let Ok(mut slot) = self.export_cancel.lock() {
            *slot = flag;
        }
    }

    fn notify_error(&self, error: AppError) {
        warn!(error = %error, "Story not saved");
        let _ = self.notices.send(AppNotice::Error(error.user_message()));
    }
}
