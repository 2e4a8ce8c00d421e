//! Backend selection
//!
//! Walks the candidate sources in order and, for each, the registered
//! factories in priority order. The first factory whose `can_play_type`
//! accepts a source's MIME type wins.

use crate::adapter::AdapterFactory;
use crate::event::BackendFamily;
use crate::host::MediaElement;
use crate::source::Source;
use crate::{Error, Result};
use std::rc::Rc;
use tracing::debug;

/// Outcome of a selection: which factory plays which source
#[derive(Clone)]
pub struct Selection {
    pub factory: Rc<dyn AdapterFactory>,
    pub source: Source,
}

impl Selection {
    pub fn family(&self) -> BackendFamily {
        self.factory.family()
    }
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("family", &self.family())
            .field("source", &self.source)
            .finish()
    }
}

/// Priority-ordered adapter factories
#[derive(Default, Clone)]
pub struct BackendSelector {
    factories: Vec<Rc<dyn AdapterFactory>>,
}

impl BackendSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factory at the lowest priority
    pub fn register(&mut self, factory: Rc<dyn AdapterFactory>) {
        self.factories.push(factory);
    }

    pub fn select(&self, element: &dyn MediaElement, sources: &[Source]) -> Result<Selection> {
        if sources.is_empty() {
            return Err(Error::NoSources);
        }

        for source in sources {
            let factory = self
                .factories
                .iter()
                .find(|factory| factory.can_play_type(element, &source.mime));

            if let Some(factory) = factory {
                debug!(family = %factory.family(), src = %source.src, "Backend selected");
                return Ok(Selection {
                    factory: factory.clone(),
                    source: source.clone(),
                });
            }
            debug!(src = %source.src, mime = %source.mime, "No backend for source");
        }

        Err(Error::NoSuitableBackend)
    }
}
