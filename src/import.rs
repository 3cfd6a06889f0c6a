//! Import Pipeline
//!
//! State behind the import modal: one selected bundle, an overwrite switch,
//! and the inline error of the last upload. Upload is only possible while a
//! file is selected, no error is showing and no upload is in flight.

use crate::api::SupersetClient;
use crate::config::{FeatureFlag, FeatureFlags};
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::ResourceKind;
use crate::notify::Notifier;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// A bundle picked for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFile {
    pub name: String,
    pub contents: Vec<u8>,
}

impl ImportFile {
    pub fn new(name: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            contents,
        }
    }

    /// Read a bundle from disk, named after its file name
    pub async fn from_path(path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| validation_error(format!("Not a file: {}", path.display())))?
            .to_string();
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| validation_error(format!("Could not read {}: {}", path.display(), e)))?;
        Ok(Self { name, contents })
    }
}

#[derive(Debug, Default)]
struct ImportState {
    file: Option<ImportFile>,
    error: Option<String>,
    overwrite: bool,
    uploading: bool,
}

impl ImportState {
    fn can_upload(&self) -> bool {
        self.file.is_some() && self.error.is_none() && !self.uploading
    }
}

type HideCallback<E> = Box<dyn FnMut(Option<E>) + Send>;

/// Import modal for dashboards or datasets.
///
/// `on_hide` is called when the modal should close: with `None` after a
/// successful import, with the originating event on cancel. An upload that
/// finishes after a cancel has no effect on the modal.
pub struct ImportModal<E> {
    api: Arc<SupersetClient>,
    kind: ResourceKind,
    notifier: Notifier,
    state: RwLock<ImportState>,
    /// Bumped by every cancel
    session: AtomicU64,
    on_hide: Mutex<HideCallback<E>>,
}

impl<E> ImportModal<E> {
    pub fn new(
        api: Arc<SupersetClient>,
        kind: ResourceKind,
        features: &FeatureFlags,
        notifier: Notifier,
        on_hide: impl FnMut(Option<E>) + Send + 'static,
    ) -> ApiResult<Self> {
        if !features.is_enabled(FeatureFlag::VersionedExport) {
            return Err(AppError::FeatureDisabled(
                "Import requires the VERSIONED_EXPORT feature flag".to_string(),
            ));
        }
        if !kind.is_importable() {
            return Err(validation_error(format!("{}s cannot be imported", kind)));
        }

        Ok(Self {
            api,
            kind,
            notifier,
            state: RwLock::new(ImportState::default()),
            session: AtomicU64::new(0),
            on_hide: Mutex::new(Box::new(on_hide)),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Pick the bundle to upload; clears the previous error
    pub async fn select_file(&self, file: ImportFile) {
        let mut state = self.state.write().await;
        info!("Selected {} for {} import", file.name, self.kind);
        state.file = Some(file);
        state.error = None;
    }

    /// Confirm that existing objects may be overwritten
    pub async fn set_overwrite(&self, overwrite: bool) {
        self.state.write().await.overwrite = overwrite;
    }

    pub async fn can_upload(&self) -> bool {
        self.state.read().await.can_upload()
    }

    pub async fn file_name(&self) -> Option<String> {
        self.state.read().await.file.as_ref().map(|f| f.name.clone())
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn is_uploading(&self) -> bool {
        self.state.read().await.uploading
    }

    /// Upload the selected bundle.
    ///
    /// Rejected without sending anything unless `can_upload()` holds. A
    /// server failure keeps the file and stores the server's message as the
    /// inline error.
    pub async fn submit(&self) -> ApiResult<()> {
        let (file, overwrite, session) = {
            let mut state = self.state.write().await;
            if !state.can_upload() {
                return Err(validation_error(match (&state.file, state.uploading) {
                    (None, _) => "Select a file to import",
                    (_, true) => "An upload is already in progress",
                    _ => "Select a new file to retry the import",
                }));
            }
            let Some(file) = state.file.clone() else {
                return Err(validation_error("Select a file to import"));
            };
            state.uploading = true;
            (file, state.overwrite, self.session.load(Ordering::SeqCst))
        };

        let result = self
            .api
            .import_bundle(self.kind, &file.name, file.contents, overwrite)
            .await;

        {
            let mut state = self.state.write().await;
            if self.session.load(Ordering::SeqCst) != session {
                warn!("Import of {} finished after the modal was closed", file.name);
                return result;
            }
            state.uploading = false;
            match &result {
                Ok(()) => {
                    state.file = None;
                    state.error = None;
                    state.overwrite = false;
                }
                Err(e) => {
                    error!("Import of {} failed: {}", file.name, e);
                    state.error = Some(e.user_message());
                }
            }
        }
        result?;

        info!("Imported {} from {}", self.kind, file.name);
        self.notifier.success(format!("{} imported", self.kind.title()));
        let mut on_hide = self.on_hide.lock().await;
        (*on_hide)(None);
        Ok(())
    }

    /// Close the modal, dropping the selection and any error
    pub async fn cancel(&self, event: E) {
        {
            let mut state = self.state.write().await;
            self.session.fetch_add(1, Ordering::SeqCst);
            state.file = None;
            state.error = None;
            state.overwrite = false;
            state.uploading = false;
        }
        let mut on_hide = self.on_hide.lock().await;
        (*on_hide)(Some(event));
    }
}
