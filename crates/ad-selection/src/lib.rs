//! On-device ad selection: runs auctions between candidate groups of buyers,
//! persists the winner and reports impressions and interactions afterwards.

pub mod domain;
pub mod infra;


pub use {
    domain::{Error, Status},
    infra::Config,
};
