//! Credential endpoint access: request signing, token parsing, issuing and caching.

pub mod broker;
pub mod issuer;
pub mod signature;
pub mod token;

pub use broker::{
    BrokerState, CredentialBroker, DEFAULT_REFRESH_MARGIN, EndpointCredential, EndpointProvider,
};
pub use issuer::{
    CredentialIssuer, DEFAULT_ENDPOINT_URL, DEFAULT_SIGNING_KEY, DEFAULT_USER_AGENT,
    TranslatorCredentialIssuer,
};
pub use signature::{decode_signing_key, sign_request};
pub use token::parse_token_expiry;
