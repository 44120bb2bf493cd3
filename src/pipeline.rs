// src/pipeline.rs

//! Fetch, translate and write one component, and a single-worker queue that
//! runs such conversions in submission order.

use crate::api::CadSource;
use crate::config::ConverterConfig;
use crate::converter::{convert_3d_model, convert_footprint, convert_symbol_with_units};
use crate::easyeda_models::Ee3dModel;
use crate::error::{Error, Result};
use crate::file_writer::{KicadLibrary, ModelFiles, SymbolWrite};
use crate::importer;
use crate::kicad_models::ModelPathStyle;
use crate::library::KicadVersion;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub lcsc_id: String,
    /// Library prefix such as `out/parts`. Empty selects the configured
    /// default library.
    pub output_prefix: PathBuf,
    pub overwrite: bool,
    pub generate_symbol: bool,
    pub generate_footprint: bool,
    pub generate_model: bool,
    pub kicad_version: KicadVersion,
    pub project_relative: bool,
}

impl ConversionRequest {
    /// A request with every export selected, writing a KiCad 6 library.
    pub fn new(lcsc_id: impl Into<String>, output_prefix: impl Into<PathBuf>) -> Self {
        ConversionRequest {
            lcsc_id: lcsc_id.into(),
            output_prefix: output_prefix.into(),
            overwrite: false,
            generate_symbol: true,
            generate_footprint: true,
            generate_model: true,
            kicad_version: KicadVersion::V6,
            project_relative: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lcsc_id.starts_with('C') {
            return Err(Error::InvalidInput(format!(
                "LCSC ID must start with 'C', got '{}'",
                self.lcsc_id
            )));
        }
        if !(self.generate_symbol || self.generate_footprint || self.generate_model) {
            return Err(Error::InvalidInput(format!(
                "At least one export target must be selected for {}",
                self.lcsc_id
            )));
        }
        Ok(())
    }

    /// Fetching plus one step per selected export.
    fn steps_total(&self) -> usize {
        1 + [self.generate_symbol, self.generate_footprint, self.generate_model]
            .iter()
            .filter(|selected| **selected)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionStage {
    Queued,
    Fetching,
    ExportSymbol,
    ExportFootprint,
    ExportModel,
    Finalising,
    Completed,
    Failed,
}

impl ConversionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionStage::Completed | ConversionStage::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionResult {
    pub symbol_path: Option<PathBuf>,
    pub footprint_path: Option<PathBuf>,
    pub model_paths: ModelFiles,
    /// Non-fatal findings, e.g. pads whose anchor could not be fitted.
    pub messages: Vec<String>,
}

/// Progress sink: stage, percent in `0..=100`, human readable message.
pub type ProgressFn<'a> = dyn FnMut(ConversionStage, u8, &str) + Send + 'a;

struct Progress<'a, 'f> {
    callback: &'a mut ProgressFn<'f>,
    done: usize,
    total: usize,
}

impl Progress<'_, '_> {
    fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        (self.done * 100 / self.total).min(100) as u8
    }

    fn notify(&mut self, stage: ConversionStage, message: &str) {
        let percent = self.percent();
        (self.callback)(stage, percent, message);
    }

    fn step_done(&mut self, stage: ConversionStage, message: &str) {
        self.done += 1;
        self.notify(stage, message);
    }
}

/// Prefixes importer errors with the component they came from.
fn in_component(lcsc_id: &str, err: Error) -> Error {
    match err {
        Error::ParseError(msg) => Error::ParseError(format!("{}: {}", lcsc_id, msg)),
        Error::MissingData(msg) => Error::MissingData(format!("{}: {}", lcsc_id, msg)),
        Error::ModelConversionError(msg) => Error::ModelConversionError(format!("{}: {}", lcsc_id, msg)),
        other => other,
    }
}

async fn fetch_cad_data<S: CadSource>(source: &S, lcsc_id: &str) -> Result<Value> {
    let data = source
        .get_cad_data_of_component(lcsc_id)
        .await
        .map_err(|e| match e {
            e @ (Error::FetchFailure { .. } | Error::EmptyData(_)) => e,
            other => Error::FetchFailure {
                lcsc_id: lcsc_id.to_string(),
                reason: other.to_string(),
            },
        })?;

    let empty = match &data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    };
    if empty {
        return Err(Error::EmptyData(lcsc_id.to_string()));
    }
    Ok(data)
}

/// Downloads the OBJ and STEP payloads of a model. A missing payload is
/// reported in `messages` and does not fail the conversion.
async fn fetch_model_payloads<S: CadSource>(source: &S, model: &mut Ee3dModel, messages: &mut Vec<String>) {
    let uuid = model.uuid.clone();
    let (raw_obj, step) = tokio::join!(
        source.get_raw_3d_model_obj(&uuid),
        source.get_step_3d_model(&uuid)
    );
    match raw_obj {
        Ok(obj) => model.raw_obj = Some(obj),
        Err(e) => {
            log::warn!("OBJ model of '{}' unavailable: {}", model.name, e);
            messages.push(format!("OBJ model of '{}' unavailable: {}", model.name, e));
        }
    }
    match step {
        Ok(step) => model.step = Some(step),
        Err(e) => {
            log::warn!("STEP model of '{}' unavailable: {}", model.name, e);
            messages.push(format!("STEP model of '{}' unavailable: {}", model.name, e));
        }
    }
    model.fit_to_obj_bounds();
}

fn export_symbol(
    request: &ConversionRequest,
    library: &KicadLibrary,
    cad_data: &Value,
    result: &mut ConversionResult,
) -> Result<()> {
    let lcsc_id = request.lcsc_id.as_str();
    let primary = importer::import_symbol(cad_data).map_err(|e| in_component(lcsc_id, e))?;
    let subparts = importer::import_subparts(cad_data).map_err(|e| in_component(lcsc_id, e))?;
    let (symbol, warnings) =
        convert_symbol_with_units(primary, subparts, &library.name(), request.kicad_version);

    if !request.overwrite && library.symbol_exists(&symbol.name)? {
        return Err(Error::AlreadyExists {
            kind: "Symbol",
            name: symbol.name,
            lcsc_id: lcsc_id.to_string(),
        });
    }

    let outcome = library.add_symbol(&symbol)?;
    if outcome == SymbolWrite::Updated {
        result.messages.push(format!("Updated existing symbol '{}'", symbol.name));
    }
    result.messages.extend(warnings);
    result.symbol_path = Some(library.symbol_path());
    Ok(())
}

async fn convert<S: CadSource>(
    request: &ConversionRequest,
    source: &S,
    library: &KicadLibrary,
    model_style: &ModelPathStyle,
    progress: &mut Progress<'_, '_>,
) -> Result<ConversionResult> {
    let lcsc_id = request.lcsc_id.as_str();
    progress.notify(ConversionStage::Fetching, "Fetching component data from EasyEDA.");
    library.setup_directories(
        request.generate_symbol,
        request.generate_footprint,
        request.generate_model,
    )?;

    let cad_data = fetch_cad_data(source, lcsc_id).await?;
    progress.step_done(ConversionStage::Fetching, "Component data downloaded.");

    let mut result = ConversionResult::default();
    // Model whose payloads were already downloaded for footprint placement.
    let mut fetched_model: Option<Ee3dModel> = None;

    if request.generate_symbol {
        progress.notify(ConversionStage::ExportSymbol, "Generating symbol.");
        export_symbol(request, library, &cad_data, &mut result)?;
        progress.step_done(ConversionStage::ExportSymbol, "Symbol export completed.");
    }

    if request.generate_footprint {
        progress.notify(ConversionStage::ExportFootprint, "Generating footprint.");
        let mut ee_footprint =
            importer::import_footprint(&cad_data).map_err(|e| in_component(lcsc_id, e))?;

        if !request.overwrite && library.footprint_exists(&ee_footprint.info.name) {
            return Err(Error::AlreadyExists {
                kind: "Footprint",
                name: ee_footprint.info.name,
                lcsc_id: lcsc_id.to_string(),
            });
        }

        // Placement needs the OBJ bounds whether or not model files are written.
        if let Some(model) = ee_footprint.model_3d.as_mut() {
            fetch_model_payloads(source, model, &mut result.messages).await;
        }

        let (ki_footprint, warnings) = convert_footprint(&ee_footprint);
        for warning in &warnings {
            log::warn!("{}: {}", ki_footprint.name, warning);
        }
        result.messages.extend(warnings);
        result.footprint_path = Some(library.add_footprint(&ki_footprint, model_style)?);
        fetched_model = ee_footprint.model_3d.take();
        progress.step_done(ConversionStage::ExportFootprint, "Footprint export completed.");
    }

    if request.generate_model {
        progress.notify(ConversionStage::ExportModel, "Generating 3D model.");
        let model = match fetched_model {
            Some(model) => Some(model),
            None => match importer::import_3d_model_info(&cad_data).map_err(|e| in_component(lcsc_id, e))? {
                Some(mut model) => {
                    fetch_model_payloads(source, &mut model, &mut result.messages).await;
                    Some(model)
                }
                None => None,
            },
        };

        match model {
            Some(model) if model.raw_obj.is_some() || model.step.is_some() => {
                let ki_model = convert_3d_model(model).map_err(|e| in_component(lcsc_id, e))?;
                result.model_paths = library.add_3d_model(&ki_model)?;
            }
            Some(model) => {
                result
                    .messages
                    .push(format!("No 3D model payload could be downloaded for '{}'", model.name));
            }
            None => {
                log::info!("No 3D model found for {}", lcsc_id);
                result.messages.push(format!("No 3D model found for {}", lcsc_id));
            }
        }
        progress.step_done(ConversionStage::ExportModel, "3D model export completed.");
    }

    progress.notify(ConversionStage::Finalising, "Finalising conversion.");
    progress.done = progress.total;
    progress.notify(ConversionStage::Completed, "Conversion finished.");
    Ok(result)
}

/// Runs one conversion request to completion.
///
/// `progress` receives every stage transition. On error it is called once
/// more with [`ConversionStage::Failed`] before the error is returned.
pub async fn run_conversion<S: CadSource>(
    request: &ConversionRequest,
    source: &S,
    config: &ConverterConfig,
    progress: &mut ProgressFn<'_>,
) -> Result<ConversionResult> {
    let mut progress = Progress {
        callback: progress,
        done: 0,
        total: request.steps_total(),
    };
    if let Err(e) = request.validate() {
        progress.notify(ConversionStage::Failed, &e.to_string());
        return Err(e);
    }

    let (prefix, model_style) = config.resolve_prefix(request);
    let library = KicadLibrary::new(prefix, request.kicad_version, config.generator.clone());

    match convert(request, source, &library, &model_style, &mut progress).await {
        Ok(result) => {
            log::info!("Converted {} into {}", request.lcsc_id, library.prefix.display());
            Ok(result)
        }
        Err(e) => {
            log::error!("Conversion of {} failed: {}", request.lcsc_id, e);
            progress.notify(ConversionStage::Failed, &e.to_string());
            Err(e)
        }
    }
}

/// State of one submitted conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: u64,
    pub request: ConversionRequest,
    pub stage: ConversionStage,
    pub percent: u8,
    pub message: String,
    pub result: Option<ConversionResult>,
    pub error: Option<String>,
}

/// Immutable view of every task the queue has seen, in submission order.
pub type TaskSnapshot = Arc<Vec<TaskRecord>>;

struct Job {
    id: u64,
    request: ConversionRequest,
}

fn update_task(status: &watch::Sender<TaskSnapshot>, id: u64, apply: impl FnOnce(&mut TaskRecord)) {
    status.send_modify(|snapshot| {
        let mut tasks: Vec<TaskRecord> = snapshot.as_ref().clone();
        if let Some(task) = tasks.iter_mut().find(|task| task.id == id) {
            apply(task);
        }
        *snapshot = Arc::new(tasks);
    });
}

/// Runs conversions one at a time on a background task.
///
/// Library files are rewritten whole, so a single worker is what keeps two
/// conversions from interleaving their read-modify-write cycles.
pub struct ConversionQueue {
    sender: mpsc::UnboundedSender<Job>,
    status: Arc<watch::Sender<TaskSnapshot>>,
    next_id: AtomicU64,
    worker: JoinHandle<()>,
}

impl ConversionQueue {
    /// Starts the worker. Must be called from within a tokio runtime.
    pub fn start<S>(source: Arc<S>, config: ConverterConfig) -> Self
    where
        S: CadSource + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let (status_tx, _) = watch::channel::<TaskSnapshot>(Arc::new(Vec::new()));
        let status = Arc::new(status_tx);

        let worker_status = status.clone();
        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let id = job.id;
                let status = worker_status.clone();
                // Terminal stages are published below together with the outcome.
                let mut on_progress = move |stage: ConversionStage, percent: u8, message: &str| {
                    if stage.is_terminal() {
                        return;
                    }
                    update_task(&status, id, |task| {
                        task.stage = stage;
                        task.percent = percent;
                        task.message = message.to_string();
                    });
                };

                let outcome = run_conversion(&job.request, source.as_ref(), &config, &mut on_progress).await;
                update_task(&worker_status, id, |task| match outcome {
                    Ok(result) => {
                        task.stage = ConversionStage::Completed;
                        task.percent = 100;
                        task.message = "Conversion finished.".to_string();
                        task.result = Some(result);
                    }
                    Err(e) => {
                        task.stage = ConversionStage::Failed;
                        task.message = e.to_string();
                        task.error = Some(e.to_string());
                    }
                });
            }
            log::debug!("Conversion queue worker stopped");
        });

        ConversionQueue {
            sender,
            status,
            next_id: AtomicU64::new(1),
            worker,
        }
    }

    /// Queues a request and returns its task id. Invalid requests are
    /// rejected here and never reach the worker.
    pub fn submit(&self, request: ConversionRequest) -> Result<u64> {
        request.validate()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = TaskRecord {
            id,
            request: request.clone(),
            stage: ConversionStage::Queued,
            percent: 0,
            message: "Queued.".to_string(),
            result: None,
            error: None,
        };
        self.status.send_modify(|snapshot| {
            let mut tasks: Vec<TaskRecord> = snapshot.as_ref().clone();
            tasks.push(record);
            *snapshot = Arc::new(tasks);
        });
        if self.sender.send(Job { id, request }).is_err() {
            update_task(&self.status, id, |task| {
                task.stage = ConversionStage::Failed;
                task.error = Some(Error::QueueClosed.to_string());
            });
            return Err(Error::QueueClosed);
        }
        Ok(id)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.status.subscribe()
    }

    /// Waits until task `id` has completed or failed. Ids this queue never
    /// handed out are rejected.
    pub async fn wait(&self, id: u64) -> Result<TaskRecord> {
        let mut receiver = self.status.subscribe();
        if !receiver.borrow().iter().any(|task| task.id == id) {
            return Err(Error::InvalidInput(format!("Unknown conversion task {}", id)));
        }
        let snapshot = receiver
            .wait_for(|tasks| tasks.iter().any(|task| task.id == id && task.stage.is_terminal()))
            .await
            .map_err(|_| Error::QueueClosed)?
            .clone();
        snapshot
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or(Error::QueueClosed)
    }

    /// Stops accepting work, lets the worker drain what is queued and
    /// returns the final snapshot.
    pub async fn shutdown(self) -> TaskSnapshot {
        let ConversionQueue { sender, status, worker, .. } = self;
        drop(sender);
        if let Err(e) = worker.await {
            log::error!("Conversion queue worker panicked: {}", e);
        }
        status.borrow().clone()
    }
}
