//! AtlasRMS CLI
//!
//! Command-line interface for inspecting and editing record stores on disk.

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use atlasrms::{AuthMode, Config, OwnerId, RecordId, RecordStore, StoreRegistry};

/// AtlasRMS CLI
#[derive(Parser, Debug)]
#[command(name = "atlasrms-cli")]
#[command(about = "CLI for AtlasRMS record stores")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./atlasrms_data")]
    data_dir: String,

    /// Vendor of the owning suite
    #[arg(long, default_value = "atlas")]
    vendor: String,

    /// Name of the owning suite
    #[arg(long, default_value = "cli")]
    suite: String,

    /// Total backend capacity in KiB
    #[arg(long, default_value = "4096")]
    capacity_kb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the suite's record stores
    List,

    /// Create a record store (no-op if it exists)
    Create {
        /// Store name
        store: String,

        /// Let other suites open the store
        #[arg(long, value_enum, default_value = "private")]
        auth: AuthArg,

        /// Let other suites modify records
        #[arg(long)]
        writable: bool,
    },

    /// Delete a record store
    Drop {
        /// Store name
        store: String,
    },

    /// Add a record
    Add {
        /// Store name
        store: String,

        /// Record payload (UTF-8)
        data: String,
    },

    /// Print a record
    Get {
        /// Store name
        store: String,

        /// Record id
        id: RecordId,
    },

    /// Replace a record
    Set {
        /// Store name
        store: String,

        /// Record id
        id: RecordId,

        /// New payload (UTF-8)
        data: String,
    },

    /// Delete a record
    Del {
        /// Store name
        store: String,

        /// Record id
        id: RecordId,
    },

    /// Print every record, optionally filtered and sorted by payload
    Dump {
        /// Store name
        store: String,

        /// Only records whose payload contains this text
        #[arg(long)]
        contains: Option<String>,

        /// Order by payload bytes instead of by id
        #[arg(long)]
        sorted: bool,

        /// Walk from last to first
        #[arg(long)]
        reverse: bool,
    },

    /// Print store metadata
    Info {
        /// Store name
        store: String,
    },

    /// Change who may open and modify a store
    Chmod {
        /// Store name
        store: String,

        #[arg(value_enum)]
        auth: AuthArg,

        /// Let other suites modify records
        #[arg(long)]
        writable: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AuthArg {
    Private,
    Any,
}

impl From<AuthArg> for AuthMode {
    fn from(arg: AuthArg) -> Self {
        match arg {
            AuthArg::Private => AuthMode::Private,
            AuthArg::Any => AuthMode::Any,
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasrms=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("AtlasRMS CLI v{}", atlasrms::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .capacity_bytes(args.capacity_kb * 1024)
        .build();

    let registry = match StoreRegistry::open(config) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Failed to open registry: {}", e);
            process::exit(1);
        }
    };

    let owner = OwnerId::new(args.vendor, args.suite);

    if let Err(e) = run(&registry, &owner, args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(registry: &StoreRegistry, owner: &OwnerId, command: Commands) -> atlasrms::Result<()> {
    match command {
        Commands::List => {
            for name in registry.list_stores(owner)? {
                println!("{}", name);
            }
        }

        Commands::Create { store, auth, writable } => {
            let handle = registry.open_shared(owner, &store, true, auth.into(), writable)?;
            println!("{} ({} records)", store, handle.num_records()?);
            handle.close()?;
        }

        Commands::Drop { store } => {
            registry.delete_store(owner, &store)?;
            println!("dropped {}", store);
        }

        Commands::Add { store, data } => {
            let handle = registry.open_store(owner, &store, false)?;
            let id = handle.add_record(data.as_bytes())?;
            println!("{}", id);
            handle.close()?;
        }

        Commands::Get { store, id } => {
            let handle = registry.open_store(owner, &store, false)?;
            println!("{}", String::from_utf8_lossy(&handle.get_record(id)?));
            handle.close()?;
        }

        Commands::Set { store, id, data } => {
            let handle = registry.open_store(owner, &store, false)?;
            handle.set_record(id, data.as_bytes())?;
            handle.close()?;
        }

        Commands::Del { store, id } => {
            let handle = registry.open_store(owner, &store, false)?;
            handle.delete_record(id)?;
            handle.close()?;
        }

        Commands::Dump {
            store,
            contains,
            sorted,
            reverse,
        } => {
            let handle = registry.open_store(owner, &store, false)?;
            dump(&handle, contains, sorted, reverse)?;
            handle.close()?;
        }

        Commands::Info { store } => {
            let handle = registry.open_store(owner, &store, false)?;
            println!("name:           {}", handle.name()?);
            println!("owner:          {}", handle.owner()?);
            println!("auth mode:      {:?}", handle.auth_mode()?);
            println!("writable:       {}", handle.is_writable()?);
            println!("version:        {}", handle.version()?);
            println!("records:        {}", handle.num_records()?);
            println!("size:           {}", handle.size()?);
            println!("size available: {}", handle.size_available()?);
            println!("last modified:  {}", handle.last_modified()?);
            println!("next record id: {}", handle.next_record_id()?);
            println!("data directory: {}", registry.config().data_dir.display());
            handle.close()?;
        }

        Commands::Chmod { store, auth, writable } => {
            let handle = registry.open_store(owner, &store, false)?;
            handle.set_mode(auth.into(), writable)?;
            handle.close()?;
        }
    }

    Ok(())
}

fn dump(handle: &RecordStore, contains: Option<String>, sorted: bool, reverse: bool) -> atlasrms::Result<()> {
    let filter: Option<Box<dyn atlasrms::RecordFilter>> = contains.map(|needle| {
        let needle = needle.into_bytes();
        Box::new(move |data: &[u8]| {
            needle.is_empty() || data.windows(needle.len()).any(|w| w == needle.as_slice())
        }) as Box<dyn atlasrms::RecordFilter>
    });
    let comparator: Option<Box<dyn atlasrms::RecordComparator>> = if sorted {
        Some(Box::new(|a: &[u8], b: &[u8]| a.cmp(b)))
    } else {
        None
    };

    let records = handle.enumerate_records(filter, comparator, false)?;
    loop {
        let step = if reverse {
            records.previous_record_id()
        } else {
            records.next_record_id()
        };
        let id = match step {
            Ok(id) => id,
            Err(atlasrms::RmsError::NoMoreRecords) => break,
            Err(e) => return Err(e),
        };
        println!("{:>6}  {}", id, String::from_utf8_lossy(&handle.get_record(id)?));
    }
    Ok(())
}
