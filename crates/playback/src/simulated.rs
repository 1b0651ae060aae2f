//! Headless media backend.
//!
//! Simulated elements play a catalog of virtual sources: each source has a
//! duration, a load time, and optionally a failure. The backend advances
//! every live element when pumped, so a preview can run without a decoder
//! (CLI dry runs and tests).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use storyreel_project_model::MediaType;

use crate::media::{
    MediaBackend, MediaElement, MediaError, MediaMetadata, MetadataProbe, ReadyState,
};

/// A virtual source.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedSource {
    pub duration_secs: f64,
    /// Host seconds until the source is fully buffered. Zero loads instantly.
    pub load_secs: f64,
    /// When set, loading fails with this reason.
    pub failure: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl SimulatedSource {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            load_secs: 0.0,
            failure: None,
            width: 1280,
            height: 720,
        }
    }

    pub fn with_load_secs(mut self, secs: f64) -> Self {
        self.load_secs = secs.max(0.0);
        self
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

type Catalog = Arc<HashMap<String, SimulatedSource>>;

#[derive(Debug, Default)]
struct ElementState {
    source: Option<String>,
    spec: Option<SimulatedSource>,
    error: Option<MediaError>,
    time: f64,
    loaded_secs: f64,
    paused: bool,
    ended: bool,
}

impl ElementState {
    fn load_fraction(&self) -> f64 {
        match &self.spec {
            None => 0.0,
            Some(spec) if spec.load_secs <= 0.0 => 1.0,
            Some(spec) => (self.loaded_secs / spec.load_secs).min(1.0),
        }
    }

    fn ready_state(&self) -> ReadyState {
        if self.source.is_none() || self.error.is_some() || self.spec.is_none() {
            return ReadyState::Nothing;
        }
        let f = self.load_fraction();
        if f >= 1.0 {
            ReadyState::EnoughData
        } else if f >= 0.5 {
            ReadyState::FutureData
        } else if f > 0.0 {
            ReadyState::CurrentData
        } else {
            ReadyState::Metadata
        }
    }

    fn advance(&mut self, dt: f64) {
        let Some(spec) = &self.spec else {
            return;
        };
        if self.error.is_some() {
            return;
        }
        let duration = spec.duration_secs;
        self.loaded_secs += dt;
        if !self.paused && self.ready_state() >= ReadyState::CurrentData {
            self.time += dt;
            if self.time >= duration {
                self.time = duration;
                self.paused = true;
                self.ended = true;
            }
        }
    }
}

fn lock(state: &Mutex<ElementState>) -> MutexGuard<'_, ElementState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An element driven by [`SimulatedBackend::pump`].
#[derive(Debug)]
pub struct SimulatedElement {
    kind: MediaType,
    catalog: Catalog,
    state: Arc<Mutex<ElementState>>,
}

impl SimulatedElement {
    pub fn kind(&self) -> MediaType {
        self.kind
    }
}

impl MediaElement for SimulatedElement {
    fn source(&self) -> Option<String> {
        lock(&self.state).source.clone()
    }

    fn set_source(&mut self, url: &str) {
        let mut state = lock(&self.state);
        *state = ElementState {
            source: Some(url.to_string()),
            paused: true,
            ..ElementState::default()
        };
        match self.catalog.get(url) {
            Some(spec) => {
                if let Some(reason) = &spec.failure {
                    state.error = Some(MediaError::Decode {
                        url: url.to_string(),
                        reason: reason.clone(),
                    });
                }
                state.spec = Some(spec.clone());
            }
            None => {
                state.error = Some(MediaError::UnsupportedSource {
                    url: url.to_string(),
                });
            }
        }
    }

    fn clear_source(&mut self) {
        *lock(&self.state) = ElementState {
            paused: true,
            ..ElementState::default()
        };
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).time
    }

    fn seek(&mut self, time: f64) {
        let mut state = lock(&self.state);
        let duration = state.spec.as_ref().map(|s| s.duration_secs).unwrap_or(0.0);
        state.time = time.clamp(0.0, duration.max(0.0));
        state.ended = false;
    }

    fn play(&mut self) -> Result<(), MediaError> {
        let mut state = lock(&self.state);
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        if state.source.is_none() {
            return Err(MediaError::PlayRejected {
                reason: "no source bound".to_string(),
            });
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        lock(&self.state).paused = true;
    }

    fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    fn has_ended(&self) -> bool {
        lock(&self.state).ended
    }

    fn ready_state(&self) -> ReadyState {
        lock(&self.state).ready_state()
    }

    fn buffered_fraction(&self) -> f64 {
        lock(&self.state).load_fraction()
    }

    fn load_error(&self) -> Option<MediaError> {
        lock(&self.state).error.clone()
    }
}

/// Backend that owns the catalog and the clocks of every element it made.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    catalog: Catalog,
    elements: Vec<Weak<Mutex<ElementState>>>,
}

impl SimulatedBackend {
    pub fn new(catalog: HashMap<String, SimulatedSource>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            elements: Vec::new(),
        }
    }

    /// Register a source. Elements created afterwards can load it.
    pub fn with_source(mut self, url: impl Into<String>, source: SimulatedSource) -> Self {
        Arc::make_mut(&mut self.catalog).insert(url.into(), source);
        self
    }

    /// Probe answering from the same catalog.
    pub fn probe(&self) -> SimulatedProbe {
        SimulatedProbe {
            catalog: Arc::clone(&self.catalog),
        }
    }

    /// Number of elements still alive.
    pub fn live_elements(&self) -> usize {
        self.elements.iter().filter(|w| w.strong_count() > 0).count()
    }
}

impl MediaBackend for SimulatedBackend {
    fn create_element(&mut self, kind: MediaType) -> Box<dyn MediaElement> {
        let state = Arc::new(Mutex::new(ElementState {
            paused: true,
            ..ElementState::default()
        }));
        self.elements.push(Arc::downgrade(&state));
        Box::new(SimulatedElement {
            kind,
            catalog: Arc::clone(&self.catalog),
            state,
        })
    }

    fn pump(&mut self, dt: f64) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.elements.retain(|weak| match weak.upgrade() {
            Some(state) => {
                lock(&state).advance(dt);
                true
            }
            None => false,
        });
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Metadata probe over a simulated catalog.
#[derive(Debug, Clone)]
pub struct SimulatedProbe {
    catalog: Catalog,
}

#[async_trait::async_trait]
impl MetadataProbe for SimulatedProbe {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, MediaError> {
        let source = self
            .catalog
            .get(url)
            .ok_or_else(|| MediaError::UnsupportedSource {
                url: url.to_string(),
            })?;
        if let Some(reason) = &source.failure {
            return Err(MediaError::Decode {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(MediaMetadata {
            duration_secs: source.duration_secs,
            width: Some(source.width),
            height: Some(source.height),
        })
    }
}
