use crate::domain::auction;

/// Source of auction ids.
#[cfg_attr(test, mockall::automock)]
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> auction::Id;
}

/// Uniformly random 64 bit ids. Zero is never produced so it can't be
/// confused with an unset id.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&self) -> auction::Id {
        auction::Id(rand::random::<u64>().max(1))
    }
}
