#![cfg_attr(test, allow(clippy::disallowed_methods, clippy::expect_used))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use strindex::config::IndexConfig;
use strindex::index::{Index, IndexError};
use strindex::store::{ByteStore, FileStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: strindex <insert KEY VALUE | get KEY | scan [FROM] | stats | verify>";

/// A parsed command line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Insert { key: String, value: String },
    Get { key: String },
    Scan { from: Option<String> },
    Stats,
    Verify,
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["insert", key, value] => Some(Self::Insert {
                key: (*key).to_string(),
                value: (*value).to_string(),
            }),
            ["get", key] => Some(Self::Get {
                key: (*key).to_string(),
            }),
            ["scan"] => Some(Self::Scan { from: None }),
            ["scan", from] => Some(Self::Scan {
                from: Some((*from).to_string()),
            }),
            ["stats"] => Some(Self::Stats),
            ["verify"] => Some(Self::Verify),
            _ => None,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strindex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = Command::parse(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    // Load configuration from environment variables
    let config = match IndexConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let mut index = match open_or_create(&config) {
        Ok(index) => index,
        Err(e) => {
            tracing::error!("Failed to open index {}: {e}", config.path.display());
            std::process::exit(1);
        }
    };

    match run(&mut index, command) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

fn open_or_create(config: &IndexConfig) -> Result<Index<FileStore>, IndexError> {
    if config.path.exists() {
        let index = Index::open(FileStore::open(&config.path)?)?;
        if index.fanout() != config.fanout {
            tracing::warn!(
                "Index was created with fanout {}, ignoring configured fanout {}",
                index.fanout(),
                config.fanout
            );
        }
        Ok(index)
    } else {
        Index::create(FileStore::create(&config.path)?, config.index_options())
    }
}

/// Run a command. Returns `false` when the command found nothing or found
/// problems, so the process can exit non-zero.
fn run<S: ByteStore>(index: &mut Index<S>, command: Command) -> Result<bool, IndexError> {
    match command {
        Command::Insert { key, value } => {
            index.insert(&key, &value)?;
            index.sync()?;
        }
        Command::Get { key } => {
            let values = index.search_all(&key)?;
            if values.is_empty() {
                return Ok(false);
            }
            for value in values {
                println!("{value}");
            }
        }
        Command::Scan { from } => {
            let cursor = match from {
                Some(from) => index.iter_from(&from)?,
                None => index.cursor()?,
            };
            for entry in cursor {
                let (key, value) = entry?;
                println!("{key}\t{value}");
            }
        }
        Command::Stats => {
            let stats = index.stats();
            println!("id:       {}", index.id());
            println!("label:    {}", index.label());
            println!("version:  {}", index.version());
            println!("fanout:   {}", stats.fanout);
            println!("height:   {}", stats.height);
            println!("branches: {}", stats.branch_count);
            println!("leaves:   {}", stats.leaf_count);
            println!("entries:  {}", index.len()?);
        }
        Command::Verify => {
            let violations = index.check_invariants()?;
            for violation in &violations {
                println!("{violation}");
            }
            if !violations.is_empty() {
                tracing::warn!("Found {} invariant violations", violations.len());
                return Ok(false);
            }
            println!("ok");
        }
    }
    Ok(true)
}
