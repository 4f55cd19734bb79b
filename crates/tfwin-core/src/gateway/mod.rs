//! Gateway and connection-profile resolution
//!
//! A network connection profile does not carry its gateway, and a gateway
//! address does not always identify a single profile. This module works both
//! out from the host's default routes and profiles.
//!
//! When the passive analysis is inconclusive and disconnections are allowed,
//! the resolver temporarily disables the other address family's binding and
//! removes routes one at a time, watching which profile disappears, then puts
//! everything back.
//!
//! ## Phases
//!
//! ```text
//! Probing ─► Disabling ─► Observing ─► Restoring ─► Reconnected
//!                                                └► TimedOut
//! ```
//!
//! Every phase change is logged and, when a channel is attached, emitted as a
//! [`ResolverEvent`]. Time and host access are injected through [`Clock`] and
//! [`HostProbe`].

mod probe;
mod resolver;

pub use probe::{AddressFamily, Clock, ConnectionProfile, GatewayRoute, HostProbe, TokioClock};
pub use resolver::{GatewayMatch, GatewayResolver, ReconnectOutcome, ResolverEvent, ResolverPhase};
