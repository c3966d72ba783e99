use anchor_lang::prelude::*;

#[error_code]
pub enum FlowpassError {
    #[msg("Tier rate must be positive and above the previous tier's rate")]
    InvalidRate,

    #[msg("Signer is not authorized for this operation")]
    Unauthorized,

    #[msg("Account already has an active subscription")]
    AlreadySubscribed,

    #[msg("Account has no active subscription")]
    NotSubscribed,

    #[msg("Subscription and badge records disagree")]
    InvariantViolation,

    #[msg("Tier registry is at capacity")]
    TierRegistryFull,

    #[msg("Stream token is not the accepted payment token")]
    UnsupportedToken,

    #[msg("Collection name or symbol exceeds the stored length")]
    MetadataTooLong,
}
