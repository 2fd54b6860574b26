// ============================================================================
// Model Session
// ============================================================================
//
// Owns at most one loaded engine context and exposes load / generate /
// release over it. The boundary layers keep a single instance behind a mutex;
// the CLI owns one directly.
// ============================================================================

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

use crate::engine::{ContextParams, DiffusionContext, DiffusionEngine, GenerationRequest};
use crate::error::{BridgeError, Result};
use crate::image_utils::ImageData;
use crate::util::config::BridgeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    NotLoaded,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelStatusInfo {
    pub current_model: Option<String>,
    pub loading_status: LoadState,
    pub is_loaded: bool,
    pub error_message: Option<String>,
}

impl ModelStatusInfo {
    pub fn new() -> Self {
        Self {
            current_model: None,
            loading_status: LoadState::NotLoaded,
            is_loaded: false,
            error_message: None,
        }
    }

    fn set_loading(&mut self, model_path: &str) {
        self.current_model = Some(model_path.to_string());
        self.loading_status = LoadState::Loading;
        self.is_loaded = false;
        self.error_message = None;
    }

    fn set_loaded(&mut self, model_path: &str) {
        self.current_model = Some(model_path.to_string());
        self.loading_status = LoadState::Ready;
        self.is_loaded = true;
        self.error_message = None;
    }

    fn set_error(&mut self, error: &str) {
        self.current_model = None;
        self.loading_status = LoadState::Error;
        self.is_loaded = false;
        self.error_message = Some(error.to_string());
    }

    fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for ModelStatusInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Status shared between a session and its readers. Updated by the session
/// around engine calls, never held across one.
pub type SharedStatus = Arc<Mutex<ModelStatusInfo>>;

pub struct ModelSession<E: DiffusionEngine> {
    engine: E,
    config: BridgeConfig,
    context: Option<E::Context>,
    status: SharedStatus,
}

impl<E: DiffusionEngine> ModelSession<E> {
    pub fn new(engine: E, config: BridgeConfig) -> Self {
        Self::with_status(engine, config, Arc::new(Mutex::new(ModelStatusInfo::new())))
    }

    /// Report status into `status`, which readers can poll without waiting on
    /// a running load or generate.
    pub fn with_status(engine: E, config: BridgeConfig, status: SharedStatus) -> Self {
        Self {
            engine,
            config,
            context: None,
            status,
        }
    }

    /// Replace the current model with a freshly loaded one.
    ///
    /// The previous context is destroyed before the new one is created, so two
    /// models never sit in memory together. On failure no model is loaded.
    pub fn load(&mut self, model_path: &str, vae_path: &str, n_threads: i32) -> Result<()> {
        self.release();

        if model_path.is_empty() {
            return self.fail(BridgeError::InvalidArgument("empty model path".into()));
        }
        if n_threads <= 0 {
            return self.fail(BridgeError::InvalidArgument(format!(
                "thread count must be positive, got {}",
                n_threads
            )));
        }

        self.status_mut().set_loading(model_path);
        let params = ContextParams {
            model_path: model_path.to_string(),
            vae_path: vae_path.to_string(),
            n_threads,
            context: self.config.context.clone(),
        };

        match self.engine.new_context(&params) {
            Ok(ctx) => {
                self.context = Some(ctx);
                self.status_mut().set_loaded(model_path);
                info!("Model loaded successfully with {} threads", n_threads);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Generate one image. Blocks for the whole sampling run, so keep it off
    /// latency-sensitive threads.
    pub fn generate(&mut self, request: &GenerationRequest) -> Result<ImageData> {
        let ctx = self.context.as_mut().ok_or(BridgeError::NotLoaded)?;

        if request.width <= 0 || request.height <= 0 {
            warn!(
                "Refusing degenerate image size {}x{}",
                request.width, request.height
            );
            return Err(BridgeError::InvalidArgument(format!(
                "image size must be positive, got {}x{}",
                request.width, request.height
            )));
        }

        info!(
            "Generating {}x{} image, {} steps, seed {}",
            request.width, request.height, request.steps, request.seed
        );
        ctx.txt2img(request, &self.config.sampling)
    }

    /// Drop the loaded model, if any.
    pub fn release(&mut self) {
        if let Some(ctx) = self.context.take() {
            drop(ctx);
            self.status_mut().clear();
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.context.is_some()
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> ModelStatusInfo {
        lock_status(&self.status).clone()
    }

    pub fn status_handle(&self) -> SharedStatus {
        self.status.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn fail(&mut self, e: BridgeError) -> Result<()> {
        error!("Failed to load model! {}", e);
        self.status_mut().set_error(&e.to_string());
        Err(e)
    }

    fn status_mut(&self) -> MutexGuard<'_, ModelStatusInfo> {
        lock_status(&self.status)
    }
}

/// Lock a status record. Each setter leaves the record whole, so a poisoned
/// lock is still readable.
pub fn lock_status(status: &Mutex<ModelStatusInfo>) -> MutexGuard<'_, ModelStatusInfo> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<E: DiffusionEngine> Drop for ModelSession<E> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::config::SamplingConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    /// Records every engine call in order.
    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
        live: AtomicUsize,
    }

    impl Journal {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    struct MockEngine {
        journal: Arc<Journal>,
        channels: u32,
        return_no_data: bool,
        gate: Option<Arc<Barrier>>,
    }

    struct MockContext {
        id: String,
        journal: Arc<Journal>,
        channels: u32,
        return_no_data: bool,
        gate: Option<Arc<Barrier>>,
    }

    /// Park inside the engine call until the test thread has looked around.
    fn hold(gate: &Option<Arc<Barrier>>) {
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
    }

    impl DiffusionEngine for MockEngine {
        type Context = MockContext;

        fn new_context(&self, params: &ContextParams) -> Result<MockContext> {
            self.journal.push(format!("create {}", params.model_path));
            hold(&self.gate);
            if params.model_path.contains("missing") {
                return Err(BridgeError::LoadFailed(params.model_path.clone()));
            }
            self.journal.live.fetch_add(1, Ordering::SeqCst);
            Ok(MockContext {
                id: params.model_path.clone(),
                journal: self.journal.clone(),
                channels: self.channels,
                return_no_data: self.return_no_data,
                gate: self.gate.clone(),
            })
        }
    }

    impl DiffusionContext for MockContext {
        fn txt2img(
            &mut self,
            request: &GenerationRequest,
            sampling: &SamplingConfig,
        ) -> Result<ImageData> {
            self.journal
                .push(format!("txt2img {} batch={}", self.id, sampling.batch_count));
            hold(&self.gate);
            if self.return_no_data {
                return Err(BridgeError::NoImageData);
            }
            let (w, h) = (request.width as u32, request.height as u32);
            Ok(ImageData {
                width: w,
                height: h,
                channels: self.channels,
                data: vec![0; ImageData::expected_len(w, h, self.channels)],
            })
        }
    }

    impl Drop for MockContext {
        fn drop(&mut self) {
            self.journal.push(format!("free {}", self.id));
            self.journal.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn session() -> (ModelSession<MockEngine>, Arc<Journal>) {
        session_with(false)
    }

    fn session_with(return_no_data: bool) -> (ModelSession<MockEngine>, Arc<Journal>) {
        build_session(return_no_data, None)
    }

    fn build_session(
        return_no_data: bool,
        gate: Option<Arc<Barrier>>,
    ) -> (ModelSession<MockEngine>, Arc<Journal>) {
        let journal = Arc::new(Journal::default());
        let engine = MockEngine {
            journal: journal.clone(),
            channels: 3,
            return_no_data,
            gate,
        };
        (ModelSession::new(engine, BridgeConfig::default()), journal)
    }

    fn request(width: i32, height: i32) -> GenerationRequest {
        GenerationRequest {
            prompt: "a cat".to_string(),
            negative_prompt: "blurry".to_string(),
            cfg_scale: 7.0,
            width,
            height,
            steps: 20,
            seed: 42,
        }
    }

    #[test]
    fn test_load_then_generate_returns_full_buffer() {
        let (mut s, _journal) = session();
        s.load("model.bin", "", 4).unwrap();

        let img = s.generate(&request(512, 512)).unwrap();
        assert_eq!(img.len(), 786_432);
        assert_eq!(img.channels, 3);
    }

    #[test]
    fn test_generate_before_load_is_not_loaded() {
        let (mut s, journal) = session();
        let result = s.generate(&request(512, 512));
        assert!(matches!(result, Err(BridgeError::NotLoaded)));
        assert!(journal.events().is_empty());
    }

    #[test]
    fn test_reload_frees_previous_context_first() {
        let (mut s, journal) = session();
        s.load("first.bin", "", 4).unwrap();
        s.load("second.bin", "", 4).unwrap();

        assert_eq!(
            journal.events(),
            vec!["create first.bin", "free first.bin", "create second.bin"]
        );
        assert_eq!(journal.live.load(Ordering::SeqCst), 1);
        assert_eq!(s.status().current_model.as_deref(), Some("second.bin"));
    }

    #[test]
    fn test_failed_load_retains_nothing() {
        let (mut s, journal) = session();
        s.load("first.bin", "", 4).unwrap();

        let result = s.load("missing.bin", "", 4);
        assert!(matches!(result, Err(BridgeError::LoadFailed(_))));
        assert!(!s.is_loaded());
        assert_eq!(journal.live.load(Ordering::SeqCst), 0);
        assert_eq!(s.status().loading_status, LoadState::Error);
        assert!(matches!(
            s.generate(&request(64, 64)),
            Err(BridgeError::NotLoaded)
        ));
    }

    #[test]
    fn test_invalid_threads_rejected_without_engine_call() {
        let (mut s, journal) = session();
        let result = s.load("model.bin", "", 0);
        assert!(matches!(result, Err(BridgeError::InvalidArgument(_))));
        assert!(journal.events().is_empty());
        assert!(!s.is_loaded());
    }

    #[test]
    fn test_release_without_session_is_noop() {
        let (mut s, journal) = session();
        s.release();
        s.release();
        assert!(!s.is_loaded());
        assert!(journal.events().is_empty());
        assert_eq!(s.status().loading_status, LoadState::NotLoaded);
    }

    #[test]
    fn test_release_frees_once() {
        let (mut s, journal) = session();
        s.load("model.bin", "", 4).unwrap();
        s.release();
        s.release();
        assert_eq!(journal.events(), vec!["create model.bin", "free model.bin"]);
        assert!(!s.status().is_loaded);
    }

    #[test]
    fn test_degenerate_dimensions_skip_engine() {
        let (mut s, journal) = session();
        s.load("model.bin", "", 4).unwrap();

        assert!(s.generate(&request(0, 512)).is_err());
        assert!(s.generate(&request(512, 0)).is_err());
        assert!(s.generate(&request(-8, 8)).is_err());
        assert_eq!(journal.events(), vec!["create model.bin"]);
        assert!(s.is_loaded());
    }

    #[test]
    fn test_engine_without_data_keeps_session() {
        let (mut s, _journal) = session_with(true);
        s.load("model.bin", "", 4).unwrap();

        let result = s.generate(&request(64, 64));
        assert!(matches!(result, Err(BridgeError::NoImageData)));
        assert!(s.is_loaded());
    }

    #[test]
    fn test_generate_uses_single_image_batch() {
        let (mut s, journal) = session();
        s.load("model.bin", "", 4).unwrap();
        s.generate(&request(8, 8)).unwrap();
        assert_eq!(journal.events()[1], "txt2img model.bin batch=1");
    }

    #[test]
    fn test_drop_releases_context() {
        let (mut s, journal) = session();
        s.load("model.bin", "", 4).unwrap();
        drop(s);
        assert_eq!(journal.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_status_readable_while_engine_runs() {
        let gate = Arc::new(Barrier::new(2));
        let (s, _journal) = build_session(false, Some(gate.clone()));
        let status = s.status_handle();

        let worker = thread::spawn(move || {
            let mut s = s;
            s.load("model.bin", "", 4).unwrap();
            s.generate(&request(8, 8)).unwrap();
            s
        });

        // inside new_context
        gate.wait();
        {
            let info = lock_status(&status);
            assert_eq!(info.loading_status, LoadState::Loading);
            assert!(!info.is_loaded);
            assert_eq!(info.current_model.as_deref(), Some("model.bin"));
        }
        gate.wait();

        // inside txt2img
        gate.wait();
        {
            let info = lock_status(&status);
            assert_eq!(info.loading_status, LoadState::Ready);
            assert!(info.is_loaded);
        }
        gate.wait();

        let s = worker.join().unwrap();
        assert!(s.is_loaded());
    }

    #[test]
    fn test_with_status_shares_record() {
        let status: SharedStatus = Arc::new(Mutex::new(ModelStatusInfo::new()));
        let engine = MockEngine {
            journal: Arc::new(Journal::default()),
            channels: 3,
            return_no_data: false,
            gate: None,
        };
        let mut s = ModelSession::with_status(engine, BridgeConfig::default(), status.clone());

        s.load("model.bin", "", 4).unwrap();
        assert!(lock_status(&status).is_loaded);
        s.release();
        assert_eq!(lock_status(&status).loading_status, LoadState::NotLoaded);
    }
}
