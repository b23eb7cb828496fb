//! tcf-client command-line interface
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::{fs, io, io::Read, io::Write, path, process, sync::Arc};
use tcf_client::{ClientConfig, DataItem, TcfClient, WorkerQuery, WorkerType};
use tcf_utils::SigningKey;

#[derive(Parser, Debug)]
#[command(rename_all = "kebab")]
struct ClientArgs {
    /// Path to a JSON client configuration file
    #[arg(short, long)]
    config: Option<path::PathBuf>,

    /// JSON-RPC listener URI, overriding the configuration file
    #[arg(long)]
    service_uri: Option<String>,

    /// Requester id, overriding the configuration file
    #[arg(long)]
    requester_id: Option<String>,

    /// Request quiet operation
    ///
    /// Progress is normally printed to stderr so as not to mingle with
    /// results written to stdout.
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab")]
enum Command {
    /// List workers with the given capabilities
    Lookup {
        /// Worker type: tee-sgx, mpc or zk
        #[arg(short, long, default_value = "tee-sgx")]
        worker_type: WorkerType,
        #[arg(short, long)]
        organization_id: Option<String>,
        #[arg(short, long)]
        application_type_id: Option<String>,
    },

    /// Check a worker's attestation evidence against the configured policy
    VerifyAttestation {
        worker_id: String,
    },

    /// Submit a work order and wait for its result
    ///
    /// Each --data file becomes one inData item, indexed in the order given.
    /// "-" reads an item from stdin.  Result items are written to stdout.
    Submit {
        worker_id: String,
        workload_id: String,

        #[arg(short, long, required = true)]
        data: Vec<path::PathBuf>,

        /// PKCS#8 DER requester signing key.  A fresh key is generated when
        /// omitted.
        #[arg(short, long)]
        key: Option<path::PathBuf>,
    },
}

/// A macro to make printing a bit easier with support for --quiet
macro_rules! qprintln {
    ($opt:expr) => (if !$opt.quiet { eprintln!(); });
    ($opt:expr, $($arg:tt)*) => (if !$opt.quiet { eprintln!($($arg)*); });
}

fn load_config(opt: &ClientArgs) -> Result<ClientConfig> {
    let mut config = match &opt.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(uri) = &opt.service_uri {
        config.json_rpc_uri = uri.clone();
    }
    if let Some(requester_id) = &opt.requester_id {
        config.requester_id = requester_id.clone();
    }
    config.assert_valid()?;
    Ok(config)
}

fn load_key(opt: &ClientArgs, path: Option<&path::PathBuf>) -> Result<SigningKey> {
    match path {
        Some(path) => {
            let der = fs::read(path)?;
            Ok(SigningKey::from_pkcs8_der(&der)?)
        }
        None => {
            let key = SigningKey::generate()?;
            qprintln!(opt, "Generated requester key {}", key.verifying_key().to_hex());
            Ok(key)
        }
    }
}

fn read_item(path: &path::Path) -> Result<Vec<u8>> {
    if path == path::Path::new("-") {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        Ok(data)
    } else {
        Ok(fs::read(path)?)
    }
}

async fn run(opt: &ClientArgs) -> Result<()> {
    let config = load_config(opt)?;
    qprintln!(opt, "Connecting to {}", config.json_rpc_uri);

    match &opt.command {
        Command::Lookup {
            worker_type,
            organization_id,
            application_type_id,
        } => {
            let client = TcfClient::connect(config, Arc::new(load_key(opt, None)?))?;
            let query = WorkerQuery {
                worker_type: *worker_type,
                organization_id: organization_id.clone(),
                application_type_id: application_type_id.clone(),
            };
            for id in client.registry().lookup_all(&query).await? {
                println!("{}", id);
            }
        }
        Command::VerifyAttestation { worker_id } => {
            let client = TcfClient::connect(config, Arc::new(load_key(opt, None)?))?;
            let (_, result) = client.verify_worker_attestation(worker_id).await?;
            println!("trusted: {}", result.trusted);
            println!("mr_enclave: {}", result.enclave_measurement.to_hex());
            println!("basename: {}", hex::encode(&result.enclave_basename));
        }
        Command::Submit {
            worker_id,
            workload_id,
            data,
            key,
        } => {
            let client = TcfClient::connect(config, Arc::new(load_key(opt, key.as_ref())?))?;
            let mut in_data = Vec::with_capacity(data.len());
            for (index, path) in data.iter().enumerate() {
                in_data.push(DataItem::new(index as u32, read_item(path)?));
            }

            let mut pending = client
                .build_and_submit_work_order(worker_id, workload_id, in_data)
                .await?;
            qprintln!(
                opt,
                "Submitted work order {} ({})",
                pending.work_order_id(),
                pending.status()
            );
            let result = client.poll_work_order_result(&mut pending).await?;
            qprintln!(opt, "Work order {} completed", result.work_order_id);

            let mut stdout = io::stdout();
            for item in result.items.iter() {
                if item.item_key.is_some() {
                    qprintln!(opt, "outData item {} is encrypted under its own key", item.index);
                }
                stdout.write_all(&item.data)?;
            }
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Entry point
fn main() {
    // parse args
    let opt = ClientArgs::parse();

    // setup logger
    env_logger::init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("{}", anyhow!(err));
            process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run(&opt)) {
        eprintln!("{}", err);
        process::exit(1);
    }
}
