//! Cairn CLI entry point.

use std::{path::PathBuf, sync::Arc};

use cairn_net_transport::{MulticastTransport, Transport};
use cairn_node_core::{
    args::{DataDirArgs, LogArgs, NetworkArgs, ProtocolArgs},
    config::NodeConfig,
    constants::DEFAULT_REPLICATION_DEGREE,
    dirs::DataDirs,
    logging::init_logging,
};
use cairn_peer::Peer;
use cairn_primitives::{ChunkKey, ChunkNo, FileId, ReplicationDegree};
use cairn_storage::{ChunkStore, FsChunkStore, Ledger, Manifest};
use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use tracing::{debug, info};

/// Cairn - peer-to-peer chunked file backup over IP multicast
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct CairnCli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    logs: LogArgs,

    #[command(flatten)]
    datadir: DataDirArgs,

    #[command(flatten)]
    network: NetworkArgs,

    #[command(flatten)]
    protocol: ProtocolArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: CairnCommands,
}

/// Available cairn commands.
#[derive(Debug, Subcommand)]
enum CairnCommands {
    /// Serve other peers until interrupted.
    Run,

    /// Back up a file to the network.
    Backup {
        path: PathBuf,

        /// Number of distinct peers that should hold each chunk.
        #[arg(long, short = 'd', default_value_t = DEFAULT_REPLICATION_DEGREE)]
        degree: ReplicationDegree,
    },

    /// Restore a file backed up from this peer.
    Restore {
        file_id: FileId,

        /// Where to write the restored file.
        #[arg(long, short = 'o')]
        out: PathBuf,
    },

    /// Ask every peer to drop a backed-up file.
    Delete { path: PathBuf },

    /// Drop a locally stored chunk and announce its removal.
    Reclaim { file_id: FileId, chunk_no: ChunkNo },
}

/// Parse arguments, start the peer and run the requested command.
pub(crate) async fn run() -> Result<()> {
    let cli = CairnCli::parse();
    init_logging(&cli.logs)?;

    let dirs = DataDirs::new(&cli.datadir)?;
    let config_path = dirs.config_file();
    let mut config = NodeConfig::load_or_create(&config_path)
        .wrap_err_with(|| format!("failed to load config: {}", config_path.display()))?;
    if config.apply_cli_args(&cli.network, &cli.protocol) {
        debug!("Config overridden from command line");
    }

    let peer = start_peer(&config, &dirs).await?;

    match cli.command {
        CairnCommands::Run => {
            info!(peer = %peer.local(), datadir = %dirs.root.display(), "Peer running");
            tokio::signal::ctrl_c().await?;
            info!("Interrupted, shutting down");
        }
        CairnCommands::Backup { path, degree } => {
            let report = peer.backup(&path, degree).await?;
            println!("{}", report.file_id);
            for chunk in &report.chunks {
                println!(
                    "  chunk {}: {}/{} peers",
                    chunk.key.chunk_no, chunk.actual, chunk.desired
                );
            }
        }
        CairnCommands::Restore { file_id, out } => {
            let report = peer.restore(&file_id, &out).await?;
            println!(
                "restored {} bytes in {} chunks to {}",
                report.bytes,
                report.chunks,
                out.display()
            );
        }
        CairnCommands::Delete { path } => {
            let file_id = peer.delete(&path).await?;
            println!("{file_id}");
        }
        CairnCommands::Reclaim { file_id, chunk_no } => {
            let key = ChunkKey::new(file_id, chunk_no);
            if !peer.reclaim(&key).await? {
                eyre::bail!("chunk {key} is not stored on this peer");
            }
        }
    }

    Ok(())
}

/// Open local state, join the multicast groups and spawn the peer services.
async fn start_peer(config: &NodeConfig, dirs: &DataDirs) -> Result<Peer> {
    let peer_config = config.peer_config()?;

    let chunks_dir = dirs.chunks_dir(&config.storage);
    let store: Arc<dyn ChunkStore> = Arc::new(
        FsChunkStore::open(&chunks_dir)
            .wrap_err_with(|| format!("failed to open chunk store: {}", chunks_dir.display()))?,
    );
    let ledger_file = dirs.ledger_file(&config.storage);
    let ledger = Arc::new(
        Ledger::open(&ledger_file)
            .wrap_err_with(|| format!("failed to open ledger: {}", ledger_file.display()))?,
    );
    let manifest_file = dirs.manifest_file(&config.storage);
    let manifest = Arc::new(
        Manifest::open(&manifest_file)
            .wrap_err_with(|| format!("failed to open manifest: {}", manifest_file.display()))?,
    );

    let (transport, inbound) = MulticastTransport::bind(config.network.multicast())
        .await
        .wrap_err("failed to join multicast groups")?;
    let transport: Arc<dyn Transport> = transport;

    Ok(Peer::spawn(
        peer_config,
        store,
        ledger,
        manifest,
        transport,
        inbound,
    ))
}
