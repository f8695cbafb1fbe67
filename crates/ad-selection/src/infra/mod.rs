pub mod attribution;
pub mod config;
pub mod http;
pub mod id;
pub mod observe;
pub mod persistence;
pub mod platform;
pub mod script;
pub mod throttle;

pub use {
    attribution::Attribution,
    config::Config,
    http::HttpClient,
    id::IdGenerator,
    persistence::Persistence,
    platform::Platform,
    script::ScriptEngine,
    throttle::Throttler,
};
