use url::Url;

/// Interaction report handed over to the attribution service instead of (or
/// next to) direct delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub uri: Url,
    pub event_data: String,
    pub caller_package: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Attribution: Send + Sync {
    async fn register_event(&self, registration: Registration) -> anyhow::Result<()>;
}
