//! Sui chain gateway: sponsor key handling, JSON-RPC plumbing, Move-call
//! construction, and the submit / poll / extract protocol.
//!
//! The dispatcher is programmed against the [`ChainGateway`] trait; the
//! production implementation is [`SuiGateway`] over a [`ChainRpc`] fullnode
//! client. Tests substitute both seams.

pub mod classify;
pub mod gateway;
pub mod rpc;
pub mod sponsor;

pub use classify::{backoff_base_ms, classify, is_suppressed, ErrorClass};
pub use gateway::{
    build_move_call, build_set_authorized_minter, extract_object_id, ChainContext, ChainGateway,
    MoveCallSpec, SuiGateway,
};
pub use rpc::{
    ChainEvent, ChainRpc, CreatedObject, ExecuteResult, GasCoin, JsonRpcChain, MoveCallRequest,
    TxEffects,
};
pub use sponsor::SponsorKeypair;

/// Shared clock object consumed by the on-chain `game` module entry points.
pub const SUI_CLOCK_OBJECT_ID: &str = "0x6";
