//! Gating shared by every API. All checks are synchronous and run before any
//! work is scheduled.

use {
    crate::{
        domain::{Error, auction::AdTechIdentifier},
        infra::{Config, Platform, Throttler, observe, throttle::Api},
    },
    std::sync::Arc,
};

#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub api: Api,
    pub caller: &'a str,
    /// Ad tech that has to be enrolled for the request to proceed.
    pub ad_tech: Option<&'a AdTechIdentifier>,
    pub enforce_foreground: bool,
    pub enforce_consent: bool,
}

/// Outcome of a request that passed every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    /// The user revoked consent. The call has to succeed without doing
    /// anything.
    ConsentRevoked,
}

pub struct RequestFilter {
    config: Arc<Config>,
    platform: Arc<dyn Platform>,
    throttler: Throttler,
}

impl RequestFilter {
    pub fn new(config: Arc<Config>, platform: Arc<dyn Platform>) -> Self {
        let throttler = Throttler::new(config.throttle.clone());
        Self {
            config,
            platform,
            throttler,
        }
    }

    pub fn filter(&self, request: &Request) -> Result<Admission, Error> {
        let result = self.check(request);
        if let Err(err) = &result {
            observe::request_rejected(request.api, request.caller, err);
        }
        result
    }

    fn check(&self, request: &Request) -> Result<Admission, Error> {
        let caller = request.caller;
        if !self.platform.caller_owns_package(caller) {
            return Err(Error::Unauthorized(format!(
                "caller is not allowed to act on behalf of {caller}"
            )));
        }
        if !self.throttler.try_acquire(request.api, caller) {
            return Err(Error::RateLimited);
        }
        if request.enforce_foreground && !self.platform.is_foreground(caller) {
            return Err(Error::BackgroundCaller);
        }
        if let Some(ad_tech) = request.ad_tech {
            if self.config.enrollment_check_enabled && !self.platform.is_enrolled(ad_tech) {
                return Err(Error::Unauthorized(format!("{ad_tech} is not enrolled")));
            }
        }
        if !self.config.allowed_packages.allows(caller) {
            return Err(Error::CallerNotAllowed);
        }
        if request.enforce_consent && self.platform.is_consent_revoked(caller) {
            return Ok(Admission::ConsentRevoked);
        }
        Ok(Admission::Granted)
    }
}
