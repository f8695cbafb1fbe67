//! In-process stand-ins for the collaborators of ad selection.

use {
    crate::{
        domain::auction::{self, AdTechIdentifier},
        infra::{
            Attribution,
            HttpClient,
            IdGenerator,
            Platform,
            ScriptEngine,
            attribution::Registration,
            http,
            persistence::{self, DebugReportStore},
            script::{self, Function},
        },
    },
    serde_json::{Value, json},
    std::{
        collections::{HashMap, HashSet},
        sync::{
            Mutex,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    },
    url::Url,
};

/// Interprets a handful of named scripts. The script body is the name.
///
/// Buyer scripts:
/// - `bid-from-metadata`: every ad bids `metadata.bid`
/// - `bid-with-debug`: like `bid-from-metadata` with win and loss debug URIs
/// - `slow-bid`: like `bid-from-metadata` after sleeping for a minute
///
/// Seller scripts:
/// - `score-equals-bid`: the score of an ad is its bid
/// - `odd-bids-negative`: odd bids score negative, even bids score the bid
/// - `all-negative`: every ad scores -1
/// - `broken-score`: fails with a validation error
/// - `slow-score`: like `score-equals-bid` after sleeping for a minute
/// - `malformed-report`: scores like `score-equals-bid`, reports garbage
///
/// Every script reports to `https://<ad tech>/report` and registers a
/// `click` interaction at `https://<ad tech>/click`.
#[derive(Debug, Default)]
pub struct Scripts;

#[async_trait::async_trait]
impl ScriptEngine for Scripts {
    async fn evaluate(
        &self,
        script: &str,
        function: Function,
        args: Vec<Value>,
    ) -> Result<Value, script::Error> {
        match function {
            Function::GenerateBid => generate_bid(script, &args).await,
            Function::ScoreAd => score_ad(script, &args).await,
            Function::ReportResult => report_result(script, &args),
            Function::ReportWin => Ok(report_win(&args)),
        }
    }
}

async fn generate_bid(script: &str, args: &[Value]) -> Result<Value, script::Error> {
    if script == "slow-bid" {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    let buyer = args[6]["buyer"].as_str().unwrap_or_default().to_owned();
    let ads = args[0].as_array().cloned().unwrap_or_default();
    let bids = ads
        .into_iter()
        .map(|ad| {
            let bid = ad["metadata"]["bid"].as_f64().unwrap_or_default();
            let mut generated = json!({ "ad": ad, "bid": bid });
            if script == "bid-with-debug" {
                generated["debugReport"] = json!({
                    "win": format!("https://{buyer}/debug/win?bid=${{winningBid}}"),
                    "loss": format!("https://{buyer}/debug/loss?winner=${{winningBid}}"),
                });
            }
            generated
        })
        .collect();
    match script {
        "bid-from-metadata" | "bid-with-debug" | "slow-bid" => Ok(Value::Array(bids)),
        _ => Err(script::Error::Syntax(format!("unknown script {script}"))),
    }
}

async fn score_ad(script: &str, args: &[Value]) -> Result<Value, script::Error> {
    if script == "slow-score" {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    let bids: Vec<f64> = args[0]
        .as_array()
        .into_iter()
        .flatten()
        .map(|ad| ad["bid"].as_f64().unwrap_or_default())
        .collect();
    let scores: Vec<f64> = match script {
        "score-equals-bid" | "slow-score" | "malformed-report" => bids,
        "odd-bids-negative" => bids
            .into_iter()
            .map(|bid| if bid % 2.0 == 1.0 { -bid } else { bid })
            .collect(),
        "all-negative" => bids.iter().map(|_| -1.0).collect(),
        "broken-score" => {
            return Err(script::Error::Validation("score is not a number".into()));
        }
        _ => return Err(script::Error::Syntax(format!("unknown script {script}"))),
    };
    Ok(json!(scores))
}

fn report_result(script: &str, args: &[Value]) -> Result<Value, script::Error> {
    if script == "malformed-report" {
        return Ok(json!({ "reportingUri": 42 }));
    }
    let seller = args[0]["seller"].as_str().unwrap_or_default();
    Ok(json!({
        "signalsForBuyer": { "seller": seller },
        "reportingUri": format!("https://{seller}/report?bid={}", args[2]),
        "interactionReportingUris": [
            { "interactionKey": "click", "uri": format!("https://{seller}/click") },
        ],
    }))
}

fn report_win(args: &[Value]) -> Value {
    let buyer = args[4]["buyer"].as_str().unwrap_or_default();
    json!({
        "reportingUri": format!("https://{buyer}/report"),
        "interactionReportingUris": [
            { "interactionKey": "click", "uri": format!("https://{buyer}/click") },
            { "interactionKey": "view", "uri": "https://elsewhere.com/view" },
        ],
    })
}

/// Serves fixed bodies and records every notification.
#[derive(Debug, Default)]
pub struct Http {
    bodies: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    fetches: Mutex<Vec<Url>>,
    notifications: Mutex<Vec<(Url, Option<String>)>>,
}

impl Http {
    pub fn serve(&self, url: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_owned(), body.to_owned());
    }

    /// Makes notifications to `url` fail.
    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_owned());
    }

    pub fn fetches(&self) -> Vec<Url> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<(Url, Option<String>)> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn notified(&self) -> Vec<String> {
        let mut notified: Vec<_> = self
            .notifications()
            .into_iter()
            .map(|(url, _)| url.to_string())
            .collect();
        notified.sort();
        notified
    }
}

#[async_trait::async_trait]
impl HttpClient for Http {
    async fn fetch(&self, url: &Url) -> Result<String, http::Error> {
        self.fetches.lock().unwrap().push(url.clone());
        self.bodies
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| http::Error::Unreachable(url.clone()))
    }

    async fn notify(&self, url: &Url, body: Option<String>) -> Result<(), http::Error> {
        self.notifications
            .lock()
            .unwrap()
            .push((url.clone(), body));
        if self.failing.lock().unwrap().contains(url.as_str()) {
            return Err(http::Error::Unreachable(url.clone()));
        }
        Ok(())
    }
}

/// Platform state of the device. Everything is permitted by default.
#[derive(Debug, Clone)]
pub struct Device {
    pub foreground: bool,
    pub consent_revoked: bool,
    pub developer_mode: bool,
    pub unenrolled: HashSet<AdTechIdentifier>,
    pub attribution_permission: bool,
    pub attribution_consent_revoked: bool,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            foreground: true,
            consent_revoked: false,
            developer_mode: false,
            unenrolled: HashSet::new(),
            attribution_permission: true,
            attribution_consent_revoked: false,
        }
    }
}

impl Platform for Device {
    fn caller_owns_package(&self, _: &str) -> bool {
        true
    }

    fn is_foreground(&self, _: &str) -> bool {
        self.foreground
    }

    fn is_consent_revoked(&self, _: &str) -> bool {
        self.consent_revoked
    }

    fn is_developer_mode_enabled(&self, _: &str) -> bool {
        self.developer_mode
    }

    fn is_enrolled(&self, ad_tech: &AdTechIdentifier) -> bool {
        !self.unenrolled.contains(ad_tech)
    }

    fn has_attribution_permission(&self, _: &str) -> bool {
        self.attribution_permission
    }

    fn is_attribution_consent_revoked(&self, _: &str) -> bool {
        self.attribution_consent_revoked
    }
}

/// Hands out 1, 2, 3, ...
#[derive(Debug, Default)]
pub struct SequentialIds(AtomicU64);

impl IdGenerator for SequentialIds {
    fn generate(&self) -> auction::Id {
        auction::Id(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Records registrations.
#[derive(Debug, Default)]
pub struct Registrar(Mutex<Vec<Registration>>);

impl Registrar {
    pub fn registrations(&self) -> Vec<Registration> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Attribution for Registrar {
    async fn register_event(&self, registration: Registration) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(registration);
        Ok(())
    }
}

/// Debug report queue that takes `delay` to accept reports and then drops
/// them.
#[derive(Debug)]
pub struct SlowDebugReports(pub Duration);

#[async_trait::async_trait]
impl DebugReportStore for SlowDebugReports {
    async fn enqueue_debug_reports(&self, _: Vec<Url>) -> Result<(), persistence::Error> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }

    async fn take_debug_reports(&self, _: usize) -> Result<Vec<Url>, persistence::Error> {
        Ok(Vec::new())
    }
}
