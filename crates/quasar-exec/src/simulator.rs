//! Dry-run coordination: submit an unsigned envelope, decode what comes back.

use std::sync::Arc;

use serde_json::Value;
use stellar_xdr::curr::{
    Limits, ReadXdr, ScVal, SorobanAuthorizationEntry, SorobanTransactionData,
    TransactionEnvelope,
};
use tracing::{debug, warn};

use crate::error::{ContractError, RpcError};
use crate::rpc::{number_field, string_list, SorobanRpc};
use crate::transaction::envelope_to_base64;
use crate::types::{CostBreakdown, RestorePreamble, SimulationOutcome, SimulationResult};

/// Runs `simulateTransaction` and turns the wire result into a typed outcome.
///
/// Resource numbers are passed through exactly as the server reports them.
#[derive(Clone)]
pub struct SimulationCoordinator {
    rpc: Arc<dyn SorobanRpc>,
}

impl SimulationCoordinator {
    pub fn new(rpc: Arc<dyn SorobanRpc>) -> Self {
        Self { rpc }
    }

    pub async fn simulate(
        &self,
        envelope: &TransactionEnvelope,
    ) -> Result<SimulationOutcome, ContractError> {
        let envelope_b64 = envelope_to_base64(envelope)?;
        let response = self.rpc.simulate_transaction(&envelope_b64).await?;
        let outcome = parse_simulation_outcome(&response)?;

        match &outcome {
            SimulationOutcome::Success(result) => debug!(
                min_resource_fee = result.min_resource_fee,
                cpu = result.cost.cpu_instructions,
                auth_entries = result.auth.len(),
                restore = result.restore_preamble.is_some(),
                latest_ledger = result.latest_ledger,
                "simulation succeeded"
            ),
            SimulationOutcome::Failed { error, .. } => warn!(%error, "simulation failed"),
        }

        Ok(outcome)
    }
}

fn decode_transaction_data(b64: &str) -> Result<SorobanTransactionData, RpcError> {
    SorobanTransactionData::from_xdr_base64(b64, Limits::none())
        .map_err(|e| RpcError::Xdr(format!("transaction data: {}", e)))
}

/// Parse a simulateTransaction result JSON into a `SimulationOutcome`.
pub(crate) fn parse_simulation_outcome(result: &Value) -> Result<SimulationOutcome, RpcError> {
    let events = string_list(result, "events");

    if let Some(error) = result.get("error") {
        let error_str = error.as_str().unwrap_or("unknown simulation error");
        return Ok(SimulationOutcome::Failed {
            error: error_str.to_string(),
            events,
        });
    }

    let transaction_data = result
        .get("transactionData")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RpcError::InvalidResponse("missing 'transactionData'".to_string()))
        .and_then(decode_transaction_data)?;

    let min_resource_fee = number_field(result, "minResourceFee").unwrap_or(0);
    let latest_ledger = number_field(result, "latestLedger").unwrap_or(0);
    let latest_ledger = u32::try_from(latest_ledger).map_err(|_| {
        RpcError::InvalidResponse(format!("latestLedger {} out of range", latest_ledger))
    })?;

    // First entry carries the auth and the return value
    let mut return_value = None;
    let mut auth = Vec::new();
    if let Some(first) = result
        .get("results")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
    {
        if let Some(xdr) = first.get("xdr").and_then(|v| v.as_str()) {
            let value = ScVal::from_xdr_base64(xdr, Limits::none())
                .map_err(|e| RpcError::Xdr(format!("return value: {}", e)))?;
            return_value = Some(value);
        }
        for entry in string_list(first, "auth") {
            let decoded = SorobanAuthorizationEntry::from_xdr_base64(&entry, Limits::none())
                .map_err(|e| RpcError::Xdr(format!("auth entry: {}", e)))?;
            auth.push(decoded);
        }
    }

    let cost = result
        .get("cost")
        .map(|cost| CostBreakdown {
            cpu_instructions: number_field(cost, "cpuInsns").unwrap_or(0),
            memory_bytes: number_field(cost, "memBytes").unwrap_or(0),
        })
        .unwrap_or_default();

    let restore_preamble = match result.get("restorePreamble") {
        Some(preamble) => {
            let data = preamble
                .get("transactionData")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    RpcError::InvalidResponse("restorePreamble without transactionData".into())
                })?;
            Some(RestorePreamble {
                transaction_data: decode_transaction_data(data)?,
                min_resource_fee: number_field(preamble, "minResourceFee").unwrap_or(0),
            })
        }
        None => None,
    };

    Ok(SimulationOutcome::Success(Box::new(SimulationResult {
        transaction_data,
        min_resource_fee,
        cost,
        auth,
        return_value,
        events,
        latest_ledger,
        restore_preamble,
    })))
}

/// Format a simulation outcome as human-readable text.
pub fn format_summary(label: &str, outcome: &SimulationOutcome, base_fee: u32) -> String {
    let mut out = format!("Simulating {}()\n", label);

    match outcome {
        SimulationOutcome::Success(result) => {
            out.push_str("  Status:     success\n");
            match &result.return_value {
                Some(ScVal::Void) | None => out.push_str("  Return:     void\n"),
                Some(ret) => out.push_str(&format!("  Return:     {:?}\n", ret)),
            }
            out.push_str(&format!(
                "  CPU:        {} instructions\n",
                format_number(result.cost.cpu_instructions)
            ));
            out.push_str(&format!(
                "  Memory:     {} bytes\n",
                format_number(result.cost.memory_bytes)
            ));
            let total_fee = result.min_resource_fee.saturating_add(u64::from(base_fee));
            out.push_str(&format!(
                "  Fee:        {} stroops (resource) + {} (base) = {} total\n",
                format_number(result.min_resource_fee),
                base_fee,
                format_number(total_fee)
            ));
            out.push_str(&format!("  Auth:       {} entry(ies)\n", result.auth.len()));
            out.push_str(&format!("  Events:     {} event(s)\n", result.events.len()));
            if result.is_read_call() {
                out.push_str("  Mode:       read-only\n");
            }
            if let Some(preamble) = &result.restore_preamble {
                out.push_str(&format!(
                    "  Restore:    required ({} stroops)\n",
                    format_number(preamble.min_resource_fee)
                ));
            }
        }
        SimulationOutcome::Failed { error, .. } => {
            out.push_str(&format!("  Status:     FAILED\n  Error:      {}\n", error));
        }
    }

    out
}

/// Format a number with thousands separators.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{address_auth_entry, keypair, sim_failure, sim_restore, sim_success, tx_data, MockRpc};
    use crate::types::NextStep;
    use crate::sign::TransactionSigner;
    use serde_json::json;

    #[test]
    fn parses_success_with_auth_and_return() {
        let signer = keypair(2);
        let auth = vec![address_auth_entry(&signer.address(), 7)];
        let raw = sim_success(&auth, true, Some(ScVal::U32(5)));

        let outcome = parse_simulation_outcome(&raw).unwrap();
        assert_eq!(outcome.next_step(), NextStep::Sign);
        let SimulationOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.auth, auth);
        assert_eq!(result.return_value, Some(ScVal::U32(5)));
        assert_eq!(result.min_resource_fee, 50_000);
        assert_eq!(result.latest_ledger, 1000);
        assert_eq!(result.cost.cpu_instructions, 100_000);
        assert_eq!(result.transaction_data, tx_data(true, 50_000));
        assert!(!result.is_read_call());
    }

    #[test]
    fn read_call_detection() {
        let raw = sim_success(&[], false, Some(ScVal::I32(1)));
        let SimulationOutcome::Success(result) = parse_simulation_outcome(&raw).unwrap() else {
            panic!("expected success");
        };
        assert!(result.is_read_call());
    }

    #[test]
    fn error_field_is_failure_verbatim() {
        let raw = sim_failure("HostError: Error(Contract, #3)");
        match parse_simulation_outcome(&raw).unwrap() {
            SimulationOutcome::Failed { error, events } => {
                assert_eq!(error, "HostError: Error(Contract, #3)");
                assert_eq!(events.len(), 1);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn restore_preamble_is_decoded() {
        let outcome = parse_simulation_outcome(&sim_restore()).unwrap();
        assert_eq!(outcome.next_step(), NextStep::Restore);
        let SimulationOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        let preamble = result.restore_preamble.unwrap();
        assert_eq!(preamble.min_resource_fee, 20_000);
    }

    #[test]
    fn missing_transaction_data_is_invalid() {
        let raw = json!({ "latestLedger": 10, "minResourceFee": "1" });
        let err = parse_simulation_outcome(&raw).unwrap_err();
        assert!(matches!(err, RpcError::InvalidResponse(_)));
    }

    #[test]
    fn garbage_transaction_data_is_xdr_error() {
        let raw = json!({ "transactionData": "not-base64!", "latestLedger": 10 });
        let err = parse_simulation_outcome(&raw).unwrap_err();
        assert!(matches!(err, RpcError::Xdr(_)));
    }

    #[tokio::test]
    async fn coordinator_sends_envelope_once() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_success(&[], false, None));
        let coordinator = SimulationCoordinator::new(rpc.clone());

        let envelope = crate::testing::invoke_envelope(&keypair(1).address(), 11);
        let outcome = coordinator.simulate(&envelope).await.unwrap();
        assert_eq!(outcome.next_step(), NextStep::Sign);
        assert_eq!(rpc.simulate_calls(), 1);
    }

    #[tokio::test]
    async fn coordinator_surfaces_transport_errors() {
        let rpc = Arc::new(MockRpc::new(10));
        // no scripted simulation: the mock answers with an RPC error
        let coordinator = SimulationCoordinator::new(rpc);
        let envelope = crate::testing::invoke_envelope(&keypair(1).address(), 11);
        let err = coordinator.simulate(&envelope).await.unwrap_err();
        assert!(matches!(err, ContractError::Transport(RpcError::Rpc { .. })));
    }

    #[test]
    fn summary_lists_costs() {
        let outcome = parse_simulation_outcome(&sim_success(&[], false, None)).unwrap();
        let text = format_summary("CAAA.balance", &outcome, 100);
        assert!(text.contains("Status:     success"));
        assert!(text.contains("100,000 instructions"));
        assert!(text.contains("50,000 stroops (resource) + 100 (base) = 50,100 total"));
        assert!(text.contains("read-only"));
    }

    #[test]
    fn oversized_latest_ledger_is_invalid() {
        let mut raw = sim_success(&[], false, None);
        raw["latestLedger"] = json!(u64::from(u32::MAX) + 1);
        let err = parse_simulation_outcome(&raw).unwrap_err();
        assert!(matches!(err, RpcError::InvalidResponse(_)));
    }

    #[test]
    fn summary_total_fee_saturates() {
        let mut raw = sim_success(&[], false, None);
        raw["minResourceFee"] = json!(u64::MAX.to_string());
        let outcome = parse_simulation_outcome(&raw).unwrap();
        let text = format_summary("CAAA.balance", &outcome, 100);
        assert!(text.contains(&format!("= {} total", format_number(u64::MAX))));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
