use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use quasar_compile::IrValue;
use quasar_exec::{
    format_summary, ClientOptions, ContractClient, DeployRequest, InvokeFailure, Invocation,
    Keypair, Network, TransactionSigner,
};
use quasar_exec::types::NextStep;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "quasar", about = "Invoke and deploy Soroban contracts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct NetworkArgs {
    /// Stellar secret key (S...) of the source account
    #[arg(long, env = "QUASAR_SECRET_KEY", hide_env_values = true)]
    secret_key: String,
    /// Network name (testnet, futurenet, mainnet)
    #[arg(long, default_value = "testnet")]
    network: String,
    /// RPC endpoint URL (overrides QUASAR_RPC_URL env and network default)
    #[arg(long)]
    rpc_url: Option<String>,
    /// Inclusion fee in stroops
    #[arg(long, default_value_t = 100)]
    base_fee: u32,
    /// Seconds to wait for a final ledger status
    #[arg(long, default_value_t = 300)]
    poll_timeout: u64,
    /// Fail instead of restoring archived ledger state
    #[arg(long)]
    no_restore: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a contract function and wait for the result
    Invoke {
        /// Contract address (C...)
        contract: String,
        /// Function name
        function: String,
        /// Arguments as JSON values, e.g. '{"type":"u32","value":5}'
        args: Vec<String>,
        /// Secret keys of additional signers
        #[arg(long = "cosigner")]
        cosigners: Vec<String>,
        #[command(flatten)]
        net: NetworkArgs,
    },
    /// Upload a WASM and create a contract from it
    Deploy {
        /// Path to the contract WASM
        wasm: String,
        /// Constructor argument as name=JSON, repeatable
        #[arg(long = "arg")]
        args: Vec<String>,
        /// 32-byte hex salt for the contract id
        #[arg(long)]
        salt: Option<String>,
        #[command(flatten)]
        net: NetworkArgs,
    },
    /// Simulate a contract call and print its costs
    Simulate {
        /// Contract address (C...)
        contract: String,
        /// Function name
        function: String,
        /// Arguments as JSON values
        args: Vec<String>,
        #[command(flatten)]
        net: NetworkArgs,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn connect(net: &NetworkArgs) -> Result<ContractClient> {
    let network = Network::from_name(&net.network, net.rpc_url.as_deref())?;
    let signer = Keypair::from_secret(&net.secret_key).context("invalid --secret-key")?;
    let defaults = ClientOptions::default();
    let interval = defaults.poll_interval();
    let options = defaults
        .with_base_fee(net.base_fee)
        .with_auto_restore(!net.no_restore)
        .with_poll(interval, Duration::from_secs(net.poll_timeout));
    Ok(ContractClient::connect(network, Arc::new(signer))?.with_options(options))
}

fn parse_args(raw: &[String]) -> Result<Vec<IrValue>> {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).with_context(|| format!("invalid argument: {}", arg)))
        .collect()
}

fn parse_named_args(raw: &[String]) -> Result<Vec<(String, IrValue)>> {
    raw.iter()
        .map(|arg| {
            let (name, value) = arg
                .split_once('=')
                .ok_or_else(|| anyhow!("expected name=JSON, got '{}'", arg))?;
            let value = serde_json::from_str(value)
                .with_context(|| format!("invalid value for '{}'", name))?;
            Ok((name.to_string(), value))
        })
        .collect()
}

fn parse_salt(hex_salt: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_salt).context("salt is not hex")?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow!("salt must be 32 bytes, got {}", b.len()))
}

/// Attach the transaction's last state to a pipeline failure.
fn explain(failure: InvokeFailure) -> anyhow::Error {
    let mut message = failure.error.to_string();
    if let Some(tx) = &failure.transaction {
        message.push_str(&format!(" (transaction state: {:?}", tx.state()));
        if let Some(hash) = tx.hash() {
            message.push_str(&format!(", hash {}", hash));
        }
        message.push(')');
    }
    anyhow!(message)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_invoke(
    contract: String,
    function: String,
    args: Vec<String>,
    cosigners: Vec<String>,
    net: NetworkArgs,
) -> Result<()> {
    let client = connect(&net)?;
    let args = parse_args(&args)?;
    let cosigners = cosigners
        .iter()
        .map(|secret| Keypair::from_secret(secret).context("invalid --cosigner"))
        .collect::<Result<Vec<_>>>()?;
    let cosigners: Vec<&dyn TransactionSigner> =
        cosigners.iter().map(|k| k as &dyn TransactionSigner).collect();

    let result = client
        .invoke(&contract, &function, args, &cosigners)
        .await
        .map_err(explain)?;

    let output = json!({
        "hash": result.hash,
        "ledger": result.ledger,
        "read_only": result.is_read_only(),
        "value": result.native()?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_deploy(
    wasm: String,
    args: Vec<String>,
    salt: Option<String>,
    net: NetworkArgs,
) -> Result<()> {
    let client = connect(&net)?;
    let bytes = fs::read(&wasm).with_context(|| format!("cannot read {}", wasm))?;

    let mut request = DeployRequest::new(bytes);
    request.constructor_args = parse_named_args(&args)?;
    if let Some(salt) = salt {
        request = request.with_salt(parse_salt(&salt)?);
    }

    let result = client.deploy(request).await.map_err(explain)?;
    let output = json!({
        "contract_id": result.contract_id,
        "wasm_hash": result.wasm_hash,
        "upload_hash": result.upload_hash,
        "create_hash": result.create_hash,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_simulate(
    contract: String,
    function: String,
    args: Vec<String>,
    net: NetworkArgs,
) -> Result<()> {
    let client = connect(&net)?;
    let invocation = Invocation::call(&contract, &function, parse_args(&args)?);
    let label = invocation.label();
    let outcome = client.dry_run(invocation).await?;
    println!("{}", format_summary(&label, &outcome, client.options().base_fee));
    if outcome.next_step() == NextStep::Fail {
        bail!("simulation failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Invoke {
            contract,
            function,
            args,
            cosigners,
            net,
        } => cmd_invoke(contract, function, args, cosigners, net).await,
        Commands::Deploy {
            wasm,
            args,
            salt,
            net,
        } => cmd_deploy(wasm, args, salt, net).await,
        Commands::Simulate {
            contract,
            function,
            args,
            net,
        } => cmd_simulate(contract, function, args, net).await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_arguments() {
        let args = parse_args(&[
            r#"{"type":"u32","value":5}"#.to_string(),
            r#"{"type":"symbol","value":"hello"}"#.to_string(),
        ])
        .unwrap();
        assert_eq!(args, vec![IrValue::U32(5), IrValue::Symbol("hello".into())]);
        assert!(parse_args(&["5".to_string()]).is_err());
    }

    #[test]
    fn parses_named_arguments() {
        let args = parse_named_args(&[r#"admin={"type":"bool","value":true}"#.to_string()]).unwrap();
        assert_eq!(args, vec![("admin".to_string(), IrValue::Bool(true))]);
        assert!(parse_named_args(&["admin".to_string()]).is_err());
    }

    #[test]
    fn salt_must_be_32_bytes() {
        assert_eq!(parse_salt(&"ab".repeat(32)).unwrap(), [0xab; 32]);
        assert!(parse_salt("abcd").is_err());
        assert!(parse_salt("zz").is_err());
    }

    #[test]
    fn cli_parses_invoke() {
        let cli = Cli::try_parse_from([
            "quasar",
            "invoke",
            "CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4",
            "hello",
            r#"{"type":"u32","value":1}"#,
            "--secret-key",
            "SXXX",
            "--cosigner",
            "SYYY",
        ])
        .unwrap();
        match cli.command {
            Commands::Invoke {
                function,
                args,
                cosigners,
                net,
                ..
            } => {
                assert_eq!(function, "hello");
                assert_eq!(args.len(), 1);
                assert_eq!(cosigners, vec!["SYYY".to_string()]);
                assert_eq!(net.network, "testnet");
                assert_eq!(net.base_fee, 100);
            }
            _ => panic!("expected invoke"),
        }
    }
}
