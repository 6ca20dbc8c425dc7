//! The submit / poll / extract protocol.
//!
//! `build_move_call` is pure construction per intent kind. [`SuiGateway`]
//! glues it to a [`ChainRpc`]: sponsor gas attachment, signing, execution,
//! and effects polling with created-object extraction.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use bcr_schemas::IntentPayload;

use crate::rpc::{ChainRpc, MoveCallRequest, TxEffects};
use crate::sponsor::SponsorKeypair;
use crate::SUI_CLOCK_OBJECT_ID;

/// Effects polling: 15 attempts at 1-second intervals.
const EXTRACT_MAX_ATTEMPTS: u32 = 15;
const EXTRACT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Static chain identifiers a gateway needs beyond the intent payload.
#[derive(Debug, Clone)]
pub struct ChainContext {
    pub package_id: String,
    pub registry_id: String,
    pub gas_budget: u64,
}

/// A fully-determined Move call, before gas and signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCallSpec {
    pub module: &'static str,
    pub function: &'static str,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

/// Pure per-kind payload construction.
pub fn build_move_call(payload: &IntentPayload, ctx: &ChainContext) -> MoveCallSpec {
    match payload {
        IntentPayload::CreateGame(p) => MoveCallSpec {
            module: "game",
            function: "create_game",
            type_arguments: vec![],
            arguments: vec![json!(p.mode), json!(p.difficulty), json!(SUI_CLOCK_OBJECT_ID)],
        },
        IntentPayload::MakeMove(p) => MoveCallSpec {
            module: "game",
            function: "make_move",
            type_arguments: vec![],
            arguments: vec![
                json!(p.game_object_id),
                json!(p.is_computer),
                json!(p.san),
                json!(p.fen),
                json!(p.move_hash),
                json!(SUI_CLOCK_OBJECT_ID),
            ],
        },
        IntentPayload::EndGame(p) => {
            // Winner as a 0/1-length address vector: empty encodes a draw.
            let winner: Vec<&str> = p.winner.as_deref().into_iter().collect();
            MoveCallSpec {
                module: "game",
                function: "end_game",
                type_arguments: vec![],
                arguments: vec![
                    json!(p.game_object_id),
                    json!(winner),
                    json!(p.result),
                    json!(p.final_fen),
                    json!(SUI_CLOCK_OBJECT_ID),
                ],
            }
        }
        IntentPayload::MintBadge(p) => {
            let registry = p
                .registry_object_id
                .as_deref()
                .unwrap_or(&ctx.registry_id);
            MoveCallSpec {
                module: "badge",
                function: "mint_badge",
                type_arguments: vec![],
                arguments: vec![
                    json!(registry),
                    json!(p.recipient_address),
                    json!(p.badge_type),
                    json!(p.name),
                    json!(p.description),
                    json!(p.source_url),
                ],
            }
        }
    }
}

/// Administrative repair call: rotate the registry's authorized minter to the
/// current sponsor. Used only by the out-of-band CLI command.
pub fn build_set_authorized_minter(registry: &str, new_minter: &str) -> MoveCallSpec {
    MoveCallSpec {
        module: "badge",
        function: "set_authorized_minter",
        type_arguments: vec![],
        arguments: vec![json!(registry), json!(new_minter)],
    }
}

// ---------------------------------------------------------------------------
// ChainGateway
// ---------------------------------------------------------------------------

/// What the dispatcher needs from the chain. One submit per intent attempt;
/// extraction is separate so kinds without created objects skip it.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Build, sponsor, sign and broadcast. Returns the transaction digest;
    /// fails with the chain's verbatim error string on execution failure.
    async fn submit(&self, payload: &IntentPayload) -> Result<String>;

    /// Poll for effects and extract the created object id matching
    /// `type_pattern`. None when nothing matched within the polling window.
    async fn wait_and_extract(&self, digest: &str, type_pattern: &str) -> Result<Option<String>>;
}

pub struct SuiGateway<R: ChainRpc> {
    rpc: R,
    sponsor: SponsorKeypair,
    ctx: ChainContext,
}

impl<R: ChainRpc> SuiGateway<R> {
    pub fn new(rpc: R, sponsor: SponsorKeypair, ctx: ChainContext) -> Self {
        Self { rpc, sponsor, ctx }
    }

    pub fn sponsor_address(&self) -> &str {
        self.sponsor.address()
    }

    async fn submit_spec(&self, spec: MoveCallSpec) -> Result<String> {
        let coins = self
            .rpc
            .gas_coins(self.sponsor.address())
            .await
            .context("listing sponsor gas coins failed")?;
        let gas = coins
            .first()
            .map(|c| c.coin_object_id.clone())
            .ok_or_else(|| anyhow::anyhow!("sponsor has no gas coins"))?;

        let tx_bytes = self
            .rpc
            .build_move_call(&MoveCallRequest {
                signer: self.sponsor.address().to_string(),
                package_object_id: self.ctx.package_id.clone(),
                module: spec.module.to_string(),
                function: spec.function.to_string(),
                type_arguments: spec.type_arguments,
                arguments: spec.arguments,
                gas,
                gas_budget: self.ctx.gas_budget,
            })
            .await?;

        let signature = self.sponsor.sign_transaction(&tx_bytes)?;
        let result = self.rpc.execute(&tx_bytes, &signature).await?;

        if !result.success {
            // The verbatim chain error drives classification upstream.
            bail!(
                "{}",
                result
                    .error
                    .unwrap_or_else(|| "chain reported failure without detail".to_string())
            );
        }

        Ok(result.digest)
    }

    /// Out-of-band repair: submit a `set_authorized_minter` rotation.
    pub async fn submit_set_authorized_minter(&self, new_minter: &str) -> Result<String> {
        let spec = build_set_authorized_minter(&self.ctx.registry_id, new_minter);
        self.submit_spec(spec).await
    }
}

#[async_trait]
impl<R: ChainRpc> ChainGateway for SuiGateway<R> {
    async fn submit(&self, payload: &IntentPayload) -> Result<String> {
        let spec = build_move_call(payload, &self.ctx);
        self.submit_spec(spec).await
    }

    async fn wait_and_extract(&self, digest: &str, type_pattern: &str) -> Result<Option<String>> {
        for attempt in 1..=EXTRACT_MAX_ATTEMPTS {
            if let Some(effects) = self.rpc.transaction_effects(digest).await? {
                // Effects are immutable once readable; one scan decides.
                return Ok(extract_object_id(&effects, type_pattern));
            }
            tracing::debug!(digest, attempt, "effects not yet available");
            tokio::time::sleep(EXTRACT_POLL_INTERVAL).await;
        }
        Ok(None)
    }
}

/// Locate the created object id matching `type_pattern` within effects.
///
/// Match order:
/// 1. a created object whose fully-qualified type contains the pattern
///    (case-insensitive), or shares the "game"/"badge" marker substring;
/// 2. a `GameCreated` event carrying `game_id`, when the pattern mentions
///    "game";
/// 3. a `BadgeMinted` event carrying `badge_id`, when the pattern mentions
///    "badge".
pub fn extract_object_id(effects: &TxEffects, type_pattern: &str) -> Option<String> {
    let pattern = type_pattern.to_ascii_lowercase();

    for created in &effects.created {
        let object_type = created.object_type.to_ascii_lowercase();
        let direct = object_type.contains(&pattern) || object_type.ends_with(&pattern);
        let marker = (pattern.contains("game") && object_type.contains("game"))
            || (pattern.contains("badge") && object_type.contains("badge"));
        if direct || marker {
            return Some(created.object_id.clone());
        }
    }

    if pattern.contains("game") {
        for event in &effects.events {
            if event.event_type.contains("GameCreated") {
                if let Some(id) = event.parsed["game_id"].as_str() {
                    return Some(id.to_string());
                }
            }
        }
    }

    if pattern.contains("badge") {
        for event in &effects.events {
            if event.event_type.contains("BadgeMinted") {
                if let Some(id) = event.parsed["badge_id"].as_str() {
                    return Some(id.to_string());
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{ChainEvent, CreatedObject, ExecuteResult, GasCoin};
    use bcr_schemas::{
        CreateGamePayload, EndGamePayload, MakeMovePayload, MintBadgePayload,
    };
    use std::sync::Mutex;

    fn ctx() -> ChainContext {
        ChainContext {
            package_id: "0xpkg".to_string(),
            registry_id: "0xreg".to_string(),
            gas_budget: 100_000_000,
        }
    }

    #[test]
    fn create_game_call_shape() {
        let spec = build_move_call(
            &IntentPayload::CreateGame(CreateGamePayload {
                mode: 0,
                difficulty: 2,
            }),
            &ctx(),
        );
        assert_eq!(spec.module, "game");
        assert_eq!(spec.function, "create_game");
        assert_eq!(spec.arguments, vec![json!(0), json!(2), json!("0x6")]);
    }

    #[test]
    fn make_move_call_shape() {
        let spec = build_move_call(
            &IntentPayload::MakeMove(MakeMovePayload {
                game_object_id: "0xg".to_string(),
                is_computer: true,
                san: "e4".to_string(),
                fen: "fen".to_string(),
                move_hash: "h".to_string(),
            }),
            &ctx(),
        );
        assert_eq!(spec.function, "make_move");
        assert_eq!(spec.arguments.len(), 6);
        assert_eq!(spec.arguments[1], json!(true));
        assert_eq!(spec.arguments[5], json!("0x6"));
    }

    #[test]
    fn end_game_winner_encodes_as_address_vector() {
        let with_winner = build_move_call(
            &IntentPayload::EndGame(EndGamePayload {
                game_object_id: "0xg".to_string(),
                winner: Some("0xw".to_string()),
                result: "1-0".to_string(),
                final_fen: "fen".to_string(),
            }),
            &ctx(),
        );
        assert_eq!(with_winner.arguments[1], json!(["0xw"]));

        let draw = build_move_call(
            &IntentPayload::EndGame(EndGamePayload {
                game_object_id: "0xg".to_string(),
                winner: None,
                result: "1/2-1/2".to_string(),
                final_fen: "fen".to_string(),
            }),
            &ctx(),
        );
        assert_eq!(draw.arguments[1], Value::Array(vec![]));
    }

    #[test]
    fn mint_badge_registry_override() {
        let payload = |registry: Option<&str>| {
            IntentPayload::MintBadge(MintBadgePayload {
                recipient_address: "0xr".to_string(),
                badge_type: "wins_1".to_string(),
                name: "First Victory".to_string(),
                description: "d".to_string(),
                source_url: "https://example.com/b.png".to_string(),
                registry_object_id: registry.map(str::to_string),
            })
        };

        let default = build_move_call(&payload(None), &ctx());
        assert_eq!(default.module, "badge");
        assert_eq!(default.arguments[0], json!("0xreg"));

        let overridden = build_move_call(&payload(Some("0xother")), &ctx());
        assert_eq!(overridden.arguments[0], json!("0xother"));
    }

    #[test]
    fn set_authorized_minter_shape() {
        let spec = build_set_authorized_minter("0xreg", "0xminter");
        assert_eq!(spec.module, "badge");
        assert_eq!(spec.function, "set_authorized_minter");
        assert_eq!(spec.arguments, vec![json!("0xreg"), json!("0xminter")]);
    }

    #[test]
    fn extraction_prefers_created_objects() {
        let effects = TxEffects {
            created: vec![
                CreatedObject {
                    object_type: "0x2::coin::Coin<0x2::sui::SUI>".to_string(),
                    object_id: "0xcoin".to_string(),
                },
                CreatedObject {
                    object_type: "0xpkg::game::Game".to_string(),
                    object_id: "0xgame".to_string(),
                },
            ],
            events: vec![],
        };
        assert_eq!(
            extract_object_id(&effects, "::game::Game"),
            Some("0xgame".to_string())
        );
    }

    #[test]
    fn extraction_matching_is_case_insensitive() {
        let effects = TxEffects {
            created: vec![CreatedObject {
                object_type: "0xPKG::Badge::Badge".to_string(),
                object_id: "0xbadge".to_string(),
            }],
            events: vec![],
        };
        assert_eq!(
            extract_object_id(&effects, "badge::Badge"),
            Some("0xbadge".to_string())
        );
    }

    #[test]
    fn extraction_falls_back_to_game_created_event() {
        let effects = TxEffects {
            created: vec![],
            events: vec![ChainEvent {
                event_type: "0xpkg::game::GameCreated".to_string(),
                parsed: json!({"game_id": "0xfromevent"}),
            }],
        };
        assert_eq!(
            extract_object_id(&effects, "::game::Game"),
            Some("0xfromevent".to_string())
        );
    }

    #[test]
    fn extraction_falls_back_to_badge_minted_event() {
        let effects = TxEffects {
            created: vec![],
            events: vec![ChainEvent {
                event_type: "0xpkg::badge::BadgeMinted".to_string(),
                parsed: json!({"badge_id": "0xbadge"}),
            }],
        };
        assert_eq!(
            extract_object_id(&effects, "badge::Badge"),
            Some("0xbadge".to_string())
        );
    }

    #[test]
    fn extraction_returns_none_without_a_match() {
        let effects = TxEffects {
            created: vec![CreatedObject {
                object_type: "0x2::coin::Coin<0x2::sui::SUI>".to_string(),
                object_id: "0xcoin".to_string(),
            }],
            events: vec![],
        };
        assert_eq!(extract_object_id(&effects, "::game::Game"), None);
    }

    // -----------------------------------------------------------------------
    // SuiGateway submit against a scripted rpc
    // -----------------------------------------------------------------------

    struct ScriptedRpc {
        coins: Vec<GasCoin>,
        execute_result: ExecuteResult,
        last_move_call: Mutex<Option<MoveCallRequest>>,
    }

    #[async_trait]
    impl ChainRpc for ScriptedRpc {
        async fn build_move_call(&self, req: &MoveCallRequest) -> Result<String> {
            *self.last_move_call.lock().unwrap() = Some(req.clone());
            Ok("dHgtYnl0ZXM=".to_string())
        }

        async fn execute(&self, _tx: &str, _sig: &str) -> Result<ExecuteResult> {
            Ok(self.execute_result.clone())
        }

        async fn transaction_effects(&self, _digest: &str) -> Result<Option<TxEffects>> {
            Ok(Some(TxEffects::default()))
        }

        async fn gas_coins(&self, _owner: &str) -> Result<Vec<GasCoin>> {
            Ok(self.coins.clone())
        }
    }

    const TEST_SECRET: &str = "9bf49a6a0755f953811fce125f2683d50429c3bb49e074147e0089a52eae155f";

    fn gateway(rpc: ScriptedRpc) -> SuiGateway<ScriptedRpc> {
        SuiGateway::new(
            rpc,
            SponsorKeypair::from_encoded(TEST_SECRET).unwrap(),
            ctx(),
        )
    }

    #[tokio::test]
    async fn submit_attaches_sponsor_gas_and_returns_digest() {
        let gw = gateway(ScriptedRpc {
            coins: vec![GasCoin {
                coin_object_id: "0xcoin1".to_string(),
                balance: 1_000_000_000,
            }],
            execute_result: ExecuteResult {
                digest: "d1".to_string(),
                success: true,
                error: None,
            },
            last_move_call: Mutex::new(None),
        });

        let payload = IntentPayload::CreateGame(CreateGamePayload {
            mode: 0,
            difficulty: 1,
        });
        let digest = gw.submit(&payload).await.unwrap();
        assert_eq!(digest, "d1");

        let req = gw.rpc.last_move_call.lock().unwrap().clone().unwrap();
        assert_eq!(req.gas, "0xcoin1");
        assert_eq!(req.gas_budget, 100_000_000);
        assert_eq!(req.package_object_id, "0xpkg");
    }

    #[tokio::test]
    async fn submit_fails_fast_without_gas_coins() {
        let gw = gateway(ScriptedRpc {
            coins: vec![],
            execute_result: ExecuteResult {
                digest: "d1".to_string(),
                success: true,
                error: None,
            },
            last_move_call: Mutex::new(None),
        });

        let payload = IntentPayload::CreateGame(CreateGamePayload {
            mode: 0,
            difficulty: 0,
        });
        let err = gw.submit(&payload).await.unwrap_err();
        assert!(err.to_string().contains("sponsor has no gas coins"));
    }

    #[tokio::test]
    async fn submit_surfaces_chain_error_verbatim() {
        let gw = gateway(ScriptedRpc {
            coins: vec![GasCoin {
                coin_object_id: "0xcoin1".to_string(),
                balance: 1,
            }],
            execute_result: ExecuteResult {
                digest: "d1".to_string(),
                success: false,
                error: Some("Object 0xreg is not available for consumption, current version 42".to_string()),
            },
            last_move_call: Mutex::new(None),
        });

        let payload = IntentPayload::CreateGame(CreateGamePayload {
            mode: 1,
            difficulty: 0,
        });
        let err = gw.submit(&payload).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Object 0xreg is not available for consumption, current version 42"
        );
    }
}
