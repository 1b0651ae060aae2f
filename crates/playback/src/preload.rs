//! Off-screen preload pool.
//!
//! One hidden element per known video source, loading ahead of time. When a
//! transition needs a source whose preloaded element can already play
//! through, the element is handed over instead of reloading from scratch.

use std::collections::{BTreeMap, HashSet};

use storyreel_project_model::MediaType;

use crate::media::{MediaBackend, MediaElement};

/// Buffering progress of one preloaded source.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadProgress {
    pub url: String,
    /// Buffered percentage in `[0, 100]`.
    pub percent: f64,
    pub ready: bool,
    pub failed: bool,
}

/// Hidden elements keyed by source URL.
#[derive(Default)]
pub struct PreloadPool {
    entries: BTreeMap<String, Box<dyn MediaElement>>,
}

impl PreloadPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the pool hold exactly the `wanted` sources, minus `skip`.
    ///
    /// New sources get a fresh element; entries no longer wanted have their
    /// source cleared and are dropped.
    pub fn refresh<'a>(
        &mut self,
        wanted: impl IntoIterator<Item = &'a str>,
        skip: Option<&str>,
        backend: &mut dyn MediaBackend,
    ) {
        let wanted: HashSet<&str> = wanted
            .into_iter()
            .filter(|url| Some(*url) != skip)
            .collect();

        self.entries.retain(|url, element| {
            let keep = wanted.contains(url.as_str());
            if !keep {
                element.clear_source();
                tracing::debug!(url = %url, "Released preloaded source");
            }
            keep
        });

        for url in wanted {
            if !self.entries.contains_key(url) {
                let mut element = backend.create_element(MediaType::Video);
                element.set_source(url);
                tracing::debug!(url = %url, "Preloading source");
                self.entries.insert(url.to_string(), element);
            }
        }
    }

    /// Take the element for `url` if it can already play through.
    pub fn take_ready(&mut self, url: &str) -> Option<Box<dyn MediaElement>> {
        let ready = self
            .entries
            .get(url)
            .is_some_and(|el| el.load_error().is_none() && el.ready_state().can_play_through());
        if ready {
            self.entries.remove(url)
        } else {
            None
        }
    }

    /// Return an element to the pool under its current source.
    pub fn put_back(&mut self, mut element: Box<dyn MediaElement>) {
        let Some(url) = element.source() else {
            return;
        };
        element.pause();
        self.entries.entry(url).or_insert(element);
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Progress of every entry, sorted by URL.
    pub fn progress(&self) -> Vec<PreloadProgress> {
        self.entries
            .iter()
            .map(|(url, el)| PreloadProgress {
                url: url.clone(),
                percent: (el.buffered_fraction() * 100.0).clamp(0.0, 100.0),
                ready: el.ready_state().can_play_through(),
                failed: el.load_error().is_some(),
            })
            .collect()
    }

    /// Clear every entry.
    pub fn release_all(&mut self) {
        for element in self.entries.values_mut() {
            element.clear_source();
        }
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedBackend, SimulatedSource};

    fn backend() -> SimulatedBackend {
        SimulatedBackend::default()
            .with_source("a.mp4", SimulatedSource::new(5.0))
            .with_source("b.mp4", SimulatedSource::new(5.0).with_load_secs(2.0))
    }

    #[test]
    fn test_refresh_adds_and_releases() {
        let mut backend = backend();
        let mut pool = PreloadPool::new();
        pool.refresh(["a.mp4", "b.mp4"], None, &mut backend);
        assert_eq!(pool.len(), 2);

        pool.refresh(["b.mp4"], None, &mut backend);
        assert!(!pool.contains("a.mp4"));
        assert!(pool.contains("b.mp4"));

        pool.refresh(["a.mp4", "b.mp4"], Some("a.mp4"), &mut backend);
        assert!(!pool.contains("a.mp4"));
    }

    #[test]
    fn test_take_ready_waits_for_buffering() {
        let mut backend = backend();
        let mut pool = PreloadPool::new();
        pool.refresh(["a.mp4", "b.mp4"], None, &mut backend);

        assert!(pool.take_ready("b.mp4").is_none());
        backend.pump(1.0);
        let el = pool.take_ready("b.mp4").expect("half buffered is enough");
        assert_eq!(el.source().as_deref(), Some("b.mp4"));
        assert!(!pool.contains("b.mp4"));

        pool.put_back(el);
        assert!(pool.contains("b.mp4"));
    }

    #[test]
    fn test_progress_report() {
        let mut backend = backend();
        let mut pool = PreloadPool::new();
        pool.refresh(["a.mp4", "b.mp4"], None, &mut backend);
        backend.pump(0.5);
        let progress = pool.progress();
        assert_eq!(progress[0].url, "a.mp4");
        assert_eq!(progress[0].percent, 100.0);
        assert_eq!(progress[1].percent, 25.0);
        assert!(!progress[1].ready);
    }
}
