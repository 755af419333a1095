// =============================================================================
// Hard Gate & Exit Gate — tri-state safety and exitability filters
// =============================================================================
//
// Both gates are sequential checks over a `ChainSnapshot`, chain-parameterized
// because SOL and BSC have materially different liquidity regimes. Grounded
// on the feature-flag-gated sequential check shape of the legacy smart
// filter engine, generalized from a binary pass/block outcome to the
// tri-state `GateVerdict` (Pass/Greylist/Reject) so "no data" and "bad data"
// are never conflated (I7).
//
// Top-10 concentration exclusion of known DEX/curve/burn addresses is a
// snapshot-service computation, not a gate concern — by the time a
// `ChainSnapshot` reaches either gate, `top10_holder_percent` already
// reflects that exclusion.

pub mod exit_gate;
pub mod hard_gate;

pub use exit_gate::{ExitGate, ExitGateConfig};
pub use hard_gate::{HardGate, HardGateConfig};
