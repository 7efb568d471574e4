//! Request handlers.

pub mod admin;
pub mod health;
pub mod invitations;
pub mod subscription;
pub mod teams;
pub mod uploads;
pub mod videos;
pub mod webhooks;

pub use admin::*;
pub use health::*;
pub use invitations::*;
pub use subscription::*;
pub use teams::*;
pub use uploads::*;
pub use videos::*;
pub use webhooks::*;
