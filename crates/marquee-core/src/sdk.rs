//! Third-party SDK resolution
//!
//! Adapters never reach for page globals. The host resolves each SDK once,
//! after its script has loaded, and injects the resulting capability object
//! into the adapter constructors.

use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info, instrument};

/// Loads an external script into the page
#[async_trait(?Send)]
pub trait ScriptLoader {
    async fn load_script(&self, url: &str) -> Result<()>;
}

/// Resolve an SDK capability, loading its script only when the probe fails.
///
/// `probe` inspects the environment for the SDK (for example the `google.ima`
/// namespace) and builds the capability object when present.
#[instrument(skip(loader, probe))]
pub async fn resolve_capability<T, L, P>(loader: &L, sdk: &str, url: &str, probe: P) -> Result<T>
where
    L: ScriptLoader + ?Sized,
    P: Fn() -> Option<T>,
{
    if let Some(capability) = probe() {
        debug!(sdk, "SDK already present");
        return Ok(capability);
    }

    info!(sdk, url, "Loading SDK script");
    loader.load_script(url).await?;

    probe().ok_or_else(|| Error::SdkUnavailable {
        sdk: sdk.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct FakeLoader {
        loaded: Cell<bool>,
        requested: RefCell<Vec<String>>,
        fail: bool,
    }

    impl FakeLoader {
        fn new(fail: bool) -> Self {
            Self {
                loaded: Cell::new(false),
                requested: RefCell::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait(?Send)]
    impl ScriptLoader for FakeLoader {
        async fn load_script(&self, url: &str) -> Result<()> {
            self.requested.borrow_mut().push(url.to_string());
            if self.fail {
                return Err(Error::ScriptLoad {
                    url: url.to_string(),
                    reason: "net::ERR_BLOCKED_BY_CLIENT".into(),
                });
            }
            self.loaded.set(true);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_present_sdk_skips_loading() {
        let loader = FakeLoader::new(false);
        let sdk = resolve_capability(&loader, "ima", "https://sdk/ima3.js", || Some(42)).await;
        assert_eq!(sdk.unwrap(), 42);
        assert!(loader.requested.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_loads_then_probes() {
        let loader = FakeLoader::new(false);
        let sdk = resolve_capability(&loader, "ima", "https://sdk/ima3.js", || {
            loader.loaded.get().then_some("ima")
        })
        .await;
        assert_eq!(sdk.unwrap(), "ima");
        assert_eq!(loader.requested.borrow().as_slice(), ["https://sdk/ima3.js"]);
    }

    #[tokio::test]
    async fn test_missing_after_load_and_blocked_script() {
        let loader = FakeLoader::new(false);
        let missing = resolve_capability(&loader, "dashjs", "https://sdk/dash.js", || None::<u8>).await;
        assert!(matches!(missing, Err(Error::SdkUnavailable { ref sdk }) if sdk == "dashjs"));

        let blocked = FakeLoader::new(true);
        let failed = resolve_capability(&blocked, "ima", "https://sdk/ima3.js", || None::<u8>).await;
        assert!(matches!(failed, Err(Error::ScriptLoad { .. })));
    }
}
