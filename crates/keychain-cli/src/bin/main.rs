//! Secure Keychain CLI - read and write typed values in a keychain namespace
//!
//! Namespaces are stored as JSON files in the application data directory.
//! The master key lives in the OS keychain; platforms without a usable OS
//! keychain get plain keychains.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keychain_core::storage::{FileStoreProvider, KEYCHAINS_DIR};
use keychain_core::{
    DefaultProtectionSupport, Keychain, KeychainError, KeychainFactory, KeychainProtection,
    KeyringKeyStore, SettingsManager,
};

/// Secure Keychain - typed secrets at rest
#[derive(Parser, Debug)]
#[command(name = "secure-keychain")]
#[command(author = "Symbia Labs")]
#[command(version = "0.1.0")]
#[command(about = "Secure Keychain - typed secrets at rest with OS keychain backed encryption")]
struct Args {
    /// Data directory holding settings and keychain files
    #[arg(long, env = "SECURE_KEYCHAIN_DIR")]
    dir: Option<PathBuf>,

    /// Keychain namespace identifier
    #[arg(long, short, default_value = "default")]
    identifier: String,

    /// Use plain keychains even when encryption is available
    #[arg(long)]
    disable_encryption: bool,

    /// Refuse to open the keychain below this protection level
    #[arg(long, value_enum, default_value_t = Protection::None)]
    min_protection: Protection,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the protection level and backend of the keychain
    Status,

    /// Print a stored value
    Get {
        key: String,

        #[arg(long, value_enum, default_value_t = ValueKind::String)]
        kind: ValueKind,
    },

    /// Store a value (bytes as Base64, string sets comma separated)
    Put {
        key: String,

        #[arg(long, value_enum, default_value_t = ValueKind::String)]
        kind: ValueKind,

        value: String,
    },

    /// Remove a value
    Remove { key: String },

    /// Remove every value in the keychain
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Protection {
    None,
    Software,
    Hardware,
    Strongbox,
}

impl From<Protection> for KeychainProtection {
    fn from(protection: Protection) -> Self {
        match protection {
            Protection::None => KeychainProtection::None,
            Protection::Software => KeychainProtection::Software,
            Protection::Hardware => KeychainProtection::Hardware,
            Protection::Strongbox => KeychainProtection::StrongBox,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ValueKind {
    Bytes,
    String,
    StringSet,
    Bool,
    Long,
    Float,
}

impl ValueKind {
    fn name(self) -> &'static str {
        match self {
            ValueKind::Bytes => "bytes",
            ValueKind::String => "string",
            ValueKind::StringSet => "string-set",
            ValueKind::Bool => "bool",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
        }
    }
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Invalid {kind} value '{value}': {reason}")]
    InvalidValue {
        kind: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Keychain(#[from] KeychainError),
}

fn invalid(kind: ValueKind, value: &str, reason: impl ToString) -> CliError {
    CliError::InvalidValue {
        kind: kind.name(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_string_set(value: &str) -> BTreeSet<String> {
    if value.is_empty() {
        return BTreeSet::new();
    }
    value.split(',').map(|s| s.to_string()).collect()
}

fn put_value(keychain: &dyn Keychain, key: &str, kind: ValueKind, value: &str) -> Result<(), CliError> {
    match kind {
        ValueKind::Bytes => {
            let data = STANDARD.decode(value).map_err(|e| invalid(kind, value, e))?;
            keychain.put_data(key, Some(&data))?;
        }
        ValueKind::String => keychain.put_string(key, Some(value))?,
        ValueKind::StringSet => keychain.put_string_set(key, Some(&parse_string_set(value)))?,
        ValueKind::Bool => {
            let flag: bool = value.parse().map_err(|e| invalid(kind, value, e))?;
            keychain.put_bool(key, flag)?;
        }
        ValueKind::Long => {
            let number: i64 = value.parse().map_err(|e| invalid(kind, value, e))?;
            keychain.put_long(key, number)?;
        }
        ValueKind::Float => {
            let number: f32 = value.parse().map_err(|e| invalid(kind, value, e))?;
            keychain.put_float(key, number)?;
        }
    }
    Ok(())
}

fn get_value(keychain: &dyn Keychain, key: &str, kind: ValueKind) -> Result<Option<String>, CliError> {
    if !keychain.contains(key)? {
        return Ok(None);
    }
    let value = match kind {
        ValueKind::Bytes => keychain.get_data(key)?.map(|data| STANDARD.encode(data)),
        ValueKind::String => keychain.get_string(key)?,
        ValueKind::StringSet => keychain
            .get_string_set(key)?
            .map(|set| set.into_iter().collect::<Vec<_>>().join(",")),
        ValueKind::Bool => Some(keychain.get_bool(key, false)?.to_string()),
        ValueKind::Long => Some(keychain.get_long(key, 0)?.to_string()),
        ValueKind::Float => Some(keychain.get_float(key, 0.0)?.to_string()),
    };
    Ok(value)
}

fn run(factory: &KeychainFactory, keychain: &dyn Keychain, command: Command) -> Result<(), CliError> {
    match command {
        Command::Status => {
            println!("identifier: {}", keychain.identifier());
            println!("protection: {}", factory.protection_level()?);
            println!("encrypted:  {}", keychain.is_encrypted());
            println!("strongbox:  {}", keychain.is_strongbox_backed());
        }
        Command::Get { key, kind } => match get_value(keychain, &key, kind)? {
            Some(value) => println!("{}", value),
            None => info!("No value stored for '{}'", key),
        },
        Command::Put { key, kind, value } => {
            put_value(keychain, &key, kind, &value)?;
            info!("Stored {} value for '{}'", kind.name(), key);
        }
        Command::Remove { key } => {
            keychain.remove(&key)?;
            info!("Removed '{}'", key);
        }
        Command::Clear => {
            keychain.remove_all()?;
            info!("Removed all values from '{}'", keychain.identifier());
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so values printed on stdout stay scriptable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let dir = match args.dir {
        Some(dir) => dir,
        None => FileStoreProvider::default_dir()?,
    };
    let settings_manager = SettingsManager::new(&dir);
    let mut settings = settings_manager.get().clone();
    if args.disable_encryption {
        settings.encryption_disabled = true;
    }

    let key_store = KeyringKeyStore::new();
    let protection_support = DefaultProtectionSupport::detect(&settings, &key_store);
    let factory = KeychainFactory::new(
        settings,
        Arc::new(protection_support),
        Arc::new(key_store),
        Arc::new(FileStoreProvider::new(dir.join(KEYCHAINS_DIR))),
    );

    let keychain = factory
        .get_keychain_with_protection(&args.identifier, args.min_protection.into())
        .map_err(|e| format!("Failed to open keychain '{}': {}", args.identifier, e))?;

    run(&factory, keychain.as_ref(), args.command)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keychain_core::{KeychainSettings, MemoryKeyStore, MemoryStoreProvider, StaticProtectionSupport};

    fn test_factory() -> KeychainFactory {
        KeychainFactory::new(
            KeychainSettings::default(),
            Arc::new(StaticProtectionSupport::trusted()),
            Arc::new(MemoryKeyStore::new()),
            Arc::new(MemoryStoreProvider::new()),
        )
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "secure-keychain",
            "--identifier",
            "com.example.app",
            "--min-protection",
            "hardware",
            "put",
            "token",
            "--kind",
            "long",
            "42",
        ])
        .unwrap();

        assert_eq!(args.identifier, "com.example.app");
        assert_eq!(KeychainProtection::from(args.min_protection), KeychainProtection::Hardware);
        match args.command {
            Command::Put { key, kind, value } => {
                assert_eq!(key, "token");
                assert_eq!(kind, ValueKind::Long);
                assert_eq!(value, "42");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_put_and_get_values() {
        let factory = test_factory();
        let keychain = factory.get_keychain("cli").unwrap();

        put_value(keychain.as_ref(), "bytes", ValueKind::Bytes, "AAEC").unwrap();
        put_value(keychain.as_ref(), "set", ValueKind::StringSet, "b,a").unwrap();
        put_value(keychain.as_ref(), "flag", ValueKind::Bool, "true").unwrap();
        put_value(keychain.as_ref(), "count", ValueKind::Long, "-303").unwrap();

        assert_eq!(
            get_value(keychain.as_ref(), "bytes", ValueKind::Bytes).unwrap(),
            Some("AAEC".to_string())
        );
        assert_eq!(
            get_value(keychain.as_ref(), "set", ValueKind::StringSet).unwrap(),
            Some("a,b".to_string())
        );
        assert_eq!(
            get_value(keychain.as_ref(), "flag", ValueKind::Bool).unwrap(),
            Some("true".to_string())
        );
        assert_eq!(
            get_value(keychain.as_ref(), "count", ValueKind::Long).unwrap(),
            Some("-303".to_string())
        );
        assert_eq!(get_value(keychain.as_ref(), "missing", ValueKind::Long).unwrap(), None);
    }

    #[test]
    fn test_invalid_value() {
        let factory = test_factory();
        let keychain = factory.get_keychain("cli").unwrap();

        let err = put_value(keychain.as_ref(), "count", ValueKind::Long, "many").unwrap_err();
        assert!(matches!(err, CliError::InvalidValue { kind: "long", .. }));
        assert!(!keychain.contains("count").unwrap());
    }

    #[test]
    fn test_wrong_kind_is_reported() {
        let factory = test_factory();
        let keychain = factory.get_keychain("cli").unwrap();

        put_value(keychain.as_ref(), "flag", ValueKind::Bool, "true").unwrap();
        let err = get_value(keychain.as_ref(), "flag", ValueKind::Long).unwrap_err();
        assert!(matches!(err, CliError::Keychain(KeychainError::TypeMismatch { .. })));
    }
}
