//! Typed repositories over the Firestore client.

mod invitations;
mod subscriptions;
mod teams;
mod videos;

pub use invitations::InvitationRepository;
pub use subscriptions::SubscriptionRepository;
pub use teams::{CreditChargeOutcome, CreditChargeResult, TeamRepository};
pub use videos::{
    normalize_page_size, PageCursor, VideoPage, VideoRepository, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
