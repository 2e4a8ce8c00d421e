//! Event normalizer
//!
//! Translates backend events into canonical events on the shared element:
//! - `error` becomes `playererror` with `{ message, type }` naming the backend
//! - aliased names become their canonical type (e.g. `streamActivated` →
//!   `loadedmetadata` for streaming engines)
//! - everything else keeps its name and carries the raw event in `detail.event`

use crate::event::{BackendEvent, BackendFamily, EventType, MediaEvent};
use crate::host::MediaElement;
use std::rc::Rc;
use tracing::{trace, warn};

/// Maps one backend family's events onto the element
pub struct EventNormalizer {
    element: Rc<dyn MediaElement>,
    family: BackendFamily,
    aliases: Vec<(String, EventType)>,
}

impl EventNormalizer {
    pub fn new(element: Rc<dyn MediaElement>, family: BackendFamily) -> Self {
        Self {
            element,
            family,
            aliases: Vec::new(),
        }
    }

    /// Map a backend event name to a canonical type
    pub fn with_alias(mut self, backend_name: impl Into<String>, canonical: EventType) -> Self {
        self.aliases.push((backend_name.into(), canonical));
        self
    }

    /// Canonical form of a backend event
    pub fn normalize(&self, event: &BackendEvent) -> MediaEvent {
        if event.is_error() {
            return MediaEvent::error(event.message(), self.family);
        }

        let event_type = self
            .aliases
            .iter()
            .find(|(name, _)| *name == event.name)
            .map(|(_, canonical)| canonical.clone())
            .unwrap_or_else(|| EventType::from(event.name.as_str()));

        MediaEvent::raw(event_type, event.clone())
    }

    /// Normalize and dispatch on the element
    pub fn forward(&self, event: &BackendEvent) {
        let canonical = self.normalize(event);
        if canonical.event_type == EventType::PlayerError {
            warn!(family = %self.family, message = %event.message(), "Backend error");
        } else {
            trace!(family = %self.family, event = %event.name, canonical = %canonical.event_type, "Forwarding event");
        }
        self.element.dispatch(canonical);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDetail;
    use crate::headless::HeadlessElement;
    use serde_json::json;

    fn normalizer() -> (Rc<HeadlessElement>, EventNormalizer) {
        let element = Rc::new(HeadlessElement::new());
        let normalizer = EventNormalizer::new(element.clone(), BackendFamily::Dash)
            .with_alias("streamActivated", EventType::LoadedMetadata);
        (element, normalizer)
    }

    #[test]
    fn test_errors_become_playererror() {
        let (element, normalizer) = normalizer();
        let payload = json!({ "error": { "message": "MANIFEST_LOADER_LOADING_FAILURE" } });
        normalizer.forward(&BackendEvent::new("error").with_payload(payload));

        let dispatched = element.dispatched();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].event_type, EventType::PlayerError);
        assert_eq!(
            dispatched[0].detail,
            Some(EventDetail::Error {
                message: "MANIFEST_LOADER_LOADING_FAILURE".into(),
                family: BackendFamily::Dash,
            })
        );
    }

    #[test]
    fn test_unmapped_events_pass_through_with_raw_detail() {
        let (_, normalizer) = normalizer();
        let raw = BackendEvent::new("qualityChangeRendered").with_payload(json!({ "newQuality": 3 }));
        let canonical = normalizer.normalize(&raw);

        assert_eq!(canonical.type_name(), "qualityChangeRendered");
        assert_eq!(canonical.detail, Some(EventDetail::Raw { event: raw }));
    }

    #[test]
    fn test_alias_maps_to_exactly_one_canonical_type() {
        let (element, normalizer) = normalizer();
        normalizer.forward(&BackendEvent::new("streamActivated"));
        assert_eq!(element.dispatched_types(), ["loadedmetadata"]);
    }
}
