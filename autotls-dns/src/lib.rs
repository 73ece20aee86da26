//! Concrete DNS-01 challenge provider adapters for `autotls-core`.
//!
//! Each adapter implements `autotls_core::dns::DnsChallengeProvider` directly rather than
//! the engine dispatching on a vendor enum; callers register whichever adapter they need
//! when building an `EngineConfig`. Real deployments reach for ~100 vendor SDKs; this
//! crate carries the two the teacher repo wires up (Cloudflare, RFC 2136) as a
//! representative, explicitly-registered set rather than the full switchboard.

mod zone;

pub mod cloudflare;
pub mod rfc2136;

pub use cloudflare::CloudflareDnsProvider;
pub use rfc2136::Rfc2136DnsProvider;
