//! Discord binding for the Desk ticket core.
//!
//! Implements [`desk_tickets::TicketPlatform`] over the serenity HTTP client,
//! renders core notices as embeds and components, and routes gateway
//! interactions and prefix commands into the ticket lifecycle.

pub mod discord_runtime;

pub use discord_runtime::{run_discord_runtime, DiscordRuntimeConfig, SerenityPlatform};
