//! Third-party vendor clients for AdReel.
//!
//! Everything that talks to an outside API lives here:
//! - [`prompts`]: LLM client that expands a product prompt into per-segment
//!   motion prompts
//! - [`generation`]: queue-style video render vendor (submit/status/result)
//! - [`merge`]: segment concatenation vendor with webhook callbacks
//! - [`email`]: transactional email for team invitations
//! - [`webhook`]: HMAC-signed tokens that gate the public callback endpoints

pub mod email;
pub mod error;
pub mod generation;
pub mod merge;
pub mod prompts;
pub mod webhook;

pub use email::{invitation_email, EmailClient};
pub use error::{VendorError, VendorResult};
pub use generation::{GenerationClient, RenderRequest, RenderStatus, RenderStatusPayload};
pub use merge::{MergeCallback, MergeClient, MergeOutcome};
pub use prompts::PromptClient;
pub use webhook::{
    merge_webhook_url, render_webhook_url, WebhookScope, WebhookToken,
    DEFAULT_WEBHOOK_TTL_SECS,
};
