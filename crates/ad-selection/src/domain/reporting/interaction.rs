use {
    super::{Deliveries, Destination, Destinations, deliver},
    crate::{
        domain::{
            Error,
            Status,
            auction::{self, AdTechIdentifier},
            filter::{self, Admission, RequestFilter},
            reporting::impression::{CALLER_PACKAGE_MISMATCH, UNKNOWN_AUCTION_ID},
        },
        infra::{
            Attribution,
            Config,
            HttpClient,
            Persistence,
            Platform,
            attribution::Registration,
            observe,
            throttle::Api,
        },
    },
    std::sync::Arc,
    tokio::time::Instant,
    url::Url,
};

pub const INTERACTION_KEY_SIZE_MAX_EXCEEDED: &str = "Event key size exceeds the maximum allowed";
pub const INTERACTION_DATA_SIZE_MAX_EXCEEDED: &str = "Event data size exceeds the maximum allowed";

/// A user event on a rendered ad, e.g. a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub auction_id: auction::Id,
    pub key: String,
    pub data: String,
    pub destinations: Destinations,
    pub caller_package: String,
}

/// How interaction reports leave the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Notify,
    Register,
    RegisterAndNotify,
}

/// Reports interactions to the URIs registered during impression reporting.
pub struct InteractionReporter {
    config: Arc<Config>,
    filter: Arc<RequestFilter>,
    persistence: Persistence,
    http: Arc<dyn HttpClient>,
    platform: Arc<dyn Platform>,
    attribution: Option<Arc<dyn Attribution>>,
}

impl InteractionReporter {
    pub fn new(
        config: Arc<Config>,
        filter: Arc<RequestFilter>,
        persistence: Persistence,
        http: Arc<dyn HttpClient>,
        platform: Arc<dyn Platform>,
        attribution: Option<Arc<dyn Attribution>>,
    ) -> Self {
        Self {
            config,
            filter,
            persistence,
            http,
            platform,
            attribution,
        }
    }

    /// Validates and gates the interaction, then dispatches one best-effort
    /// report per registered URI. Delivery failures never fail the call.
    pub async fn report_interaction(&self, interaction: Interaction) -> Result<Deliveries, Error> {
        let start = Instant::now();
        let result = self.report(&interaction).await;
        let status = match &result {
            Ok((_, Admission::ConsentRevoked)) => Status::ConsentRevoked,
            Ok(_) => Status::Success,
            Err(err) => err.status(),
        };
        observe::interaction_reported(&interaction, status, start.elapsed());
        result.map(|(deliveries, _)| deliveries)
    }

    async fn report(&self, interaction: &Interaction) -> Result<(Deliveries, Admission), Error> {
        let reporting = &self.config.reporting;
        if interaction.key.len() > reporting.max_interaction_key_size {
            return Err(Error::InvalidArgument(
                INTERACTION_KEY_SIZE_MAX_EXCEEDED.into(),
            ));
        }
        if interaction.data.len() > reporting.max_interaction_data_size {
            return Err(Error::InvalidArgument(
                INTERACTION_DATA_SIZE_MAX_EXCEEDED.into(),
            ));
        }
        let caller = interaction.caller_package.as_str();
        let results = &self.persistence.results;
        if !results.id_exists(interaction.auction_id).await? {
            return Err(Error::InvalidArgument(UNKNOWN_AUCTION_ID.into()));
        }
        if !results
            .id_exists_for_caller(interaction.auction_id, caller)
            .await?
        {
            return Err(Error::InvalidArgument(CALLER_PACKAGE_MISMATCH.into()));
        }

        let admission = self.filter.filter(&filter::Request {
            api: Api::ReportInteraction,
            caller,
            ad_tech: None,
            enforce_foreground: reporting.enforce_foreground_interaction,
            enforce_consent: true,
        })?;
        if admission == Admission::ConsentRevoked {
            return Ok((Deliveries::default(), admission));
        }

        let uris = self.registered_uris(interaction).await?;
        Ok((self.dispatch(interaction, uris), admission))
    }

    /// URIs registered for the requested destinations whose ad tech passes
    /// enrollment. Unenrolled ones are dropped silently.
    async fn registered_uris(
        &self,
        interaction: &Interaction,
    ) -> Result<Vec<(Destination, Url)>, Error> {
        let mut uris = Vec::new();
        for destination in interaction.destinations.iter() {
            let Some(uri) = self
                .persistence
                .results
                .interaction_uri(interaction.auction_id, &interaction.key, destination)
                .await?
            else {
                observe::no_registered_interaction(interaction.auction_id, destination);
                continue;
            };
            if self.config.enrollment_check_enabled {
                let enrolled = AdTechIdentifier::from_uri(&uri)
                    .is_some_and(|ad_tech| self.platform.is_enrolled(&ad_tech));
                if !enrolled {
                    observe::reporting_uri_rejected(destination, &uri);
                    continue;
                }
            }
            uris.push((destination, uri));
        }
        Ok(uris)
    }

    fn delivery(&self, caller: &str) -> Delivery {
        let attribution = &self.config.attribution;
        let registration_permitted = self.attribution.is_some()
            && attribution.is_active()
            && attribution.allowed_packages.allows(caller)
            && self.platform.has_attribution_permission(caller)
            && !self.platform.is_attribution_consent_revoked(caller);
        match (registration_permitted, attribution.fallback_enabled) {
            (false, _) => Delivery::Notify,
            (true, false) => Delivery::Register,
            (true, true) => Delivery::RegisterAndNotify,
        }
    }

    fn dispatch(&self, interaction: &Interaction, uris: Vec<(Destination, Url)>) -> Deliveries {
        let mut deliveries = Deliveries::default();
        if uris.is_empty() {
            return deliveries;
        }
        let delivery = self.delivery(&interaction.caller_package);
        for (destination, uri) in uris {
            if matches!(delivery, Delivery::Register | Delivery::RegisterAndNotify) {
                if let Some(attribution) = &self.attribution {
                    deliveries.push(register(
                        attribution.clone(),
                        destination,
                        Registration {
                            uri: uri.clone(),
                            event_data: interaction.data.clone(),
                            caller_package: interaction.caller_package.clone(),
                        },
                    ));
                }
            }
            if matches!(delivery, Delivery::Notify | Delivery::RegisterAndNotify) {
                deliveries.push(deliver(
                    self.http.clone(),
                    observe::Report::Interaction,
                    destination,
                    uri,
                    Some(interaction.data.clone()),
                ));
            }
        }
        deliveries
    }
}

fn register(
    attribution: Arc<dyn Attribution>,
    destination: Destination,
    registration: Registration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let uri = registration.uri.clone();
        match attribution.register_event(registration).await {
            Ok(()) => observe::attribution_registered(destination, &uri),
            Err(err) => observe::attribution_registration_failed(destination, &uri, &err),
        }
    })
}
