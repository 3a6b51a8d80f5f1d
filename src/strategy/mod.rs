//! Pricing and gating: edge/EV against market odds, then the
//! settlement-risk gate.

pub mod edge;
pub mod risk;

pub use edge::{EdgeConfig, EdgeEvaluation, EdgeEvaluator};
pub use risk::{GateInputs, GateVerdict, RiskConfig, SettlementRiskGate};
