use snip_core::{Context, ShortId, Shortener};
use snip_identity::IdentityProvider;
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, TypedBuilder)]
pub struct AppState {
    shortener: Arc<dyn Shortener>,
    identity: Arc<IdentityProvider>,
    #[builder(setter(into))]
    base_url: String,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    request_timeout: Duration,
}

impl AppState {
    pub fn shortener(&self) -> &dyn Shortener {
        self.shortener.as_ref()
    }

    pub fn shortener_handle(&self) -> Arc<dyn Shortener> {
        self.shortener.clone()
    }

    pub fn identity(&self) -> &IdentityProvider {
        &self.identity
    }

    /// A fresh context bounded by the request timeout.
    pub fn context(&self) -> Context {
        Context::with_timeout(self.request_timeout)
    }

    pub fn short_url(&self, id: &ShortId) -> String {
        id.to_url(&self.base_url)
    }
}
