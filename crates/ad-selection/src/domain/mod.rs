pub mod auction;
pub mod bidding;
pub mod candidate;
pub mod error;
pub mod filter;
pub mod maintenance;
pub mod overrides;
pub mod reporting;
pub mod scoring;

pub use {
    auction::{AdTechIdentifier, AuctionConfig, AuctionResult, Signals},
    candidate::CandidateGroup,
    error::{Error, Status},
};
