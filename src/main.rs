// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use arka_entrypoint::config::DEFAULT_ENTRY_POINT;
use arka_entrypoint::contracts::{SimpleAccountFactory, VerifyingPaymaster};
use arka_entrypoint::paymaster::PaymasterSigner;
use arka_entrypoint::rpc::{build_module, SharedEntryPoint};
use arka_entrypoint::{EntryPoint, EntryPointConfig};
use clap::Parser;
use dotenv::dotenv;
use ethers::types::{Address, U256};
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::RpcModule;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, default_value = "127.0.0.1:8545")]
    rpc_server_addr: String,

    #[clap(short, long, default_value_t = 1337)]
    chain_id: u64,

    #[clap(short, long, default_value = DEFAULT_ENTRY_POINT)]
    entry_point: Address,

    /// Base fee per gas the engine settles against, in wei
    #[clap(short, long, default_value_t = 0)]
    base_fee: u64,

    /// Key of the verifying paymaster's sponsor. Enables `pm_sponsorUserOperation`.
    #[clap(short, long)]
    private_key: Option<String>,

    #[clap(long, default_value = "0x9406Cc6185a346906296840746125a0E44976454")]
    factory_address: Address,

    #[clap(long, default_value = "0xE93ECa6595fe94091DC1af46aaC2A8b5D7990770")]
    paymaster_address: Address,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let args = Args::parse();

    let config = EntryPointConfig {
        chain_id: args.chain_id,
        entry_point: args.entry_point,
        ..Default::default()
    };
    let mut engine = EntryPoint::new(config)?;
    engine
        .chain_mut()
        .install_factory(args.factory_address, Box::new(SimpleAccountFactory))?;
    info!("Installed SimpleAccountFactory at {:?}", args.factory_address);

    let signer = match args.private_key {
        Some(private_key) => {
            let signer = PaymasterSigner::new(
                &private_key,
                args.paymaster_address,
                args.entry_point,
                args.chain_id,
            )?;
            engine.chain_mut().install_paymaster(
                args.paymaster_address,
                Box::new(VerifyingPaymaster::new(
                    signer.signer_address(),
                    args.entry_point,
                    args.chain_id,
                )),
            )?;
            info!("Installed VerifyingPaymaster at {:?}", args.paymaster_address);
            Some(Arc::new(signer))
        }
        None => None,
    };

    // Create the JSON-RPC server
    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    let module = build_module(SharedEntryPoint::new(engine, U256::from(args.base_fee)), signer)?;

    info!("Starting ERC-4337 EntryPoint RPC server on {}", server_addr);

    // Start the JSON-RPC server
    let server_handle = start_server(server_addr, module).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server(
    server_addr: SocketAddr,
    module: RpcModule<()>,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    let server_handle = server.start(module);

    Ok(server_handle)
}
