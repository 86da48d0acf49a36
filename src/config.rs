use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

/// Which blob store backend holds chunks and objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Disk,
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "disk" => Ok(Backend::Disk),
            "memory" => Ok(Backend::Memory),
            other => bail!("unknown backend `{}` (expected `disk` or `memory`)", other),
        }
    }
}

/// A `principal:token` pair accepted on the upload endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub principal: String,
    pub token: String,
}

impl std::fmt::Debug for TokenEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEntry")
            .field("principal", &self.principal)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl FromStr for TokenEntry {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.split_once(':') {
            Some((principal, token)) if !principal.trim().is_empty() && !token.is_empty() => {
                Ok(Self {
                    principal: principal.trim().to_string(),
                    token: token.to_string(),
                })
            }
            _ => bail!("auth token entries must look like `principal:token`"),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub auth_tokens: Vec<TokenEntry>,
    pub fetch_concurrency: usize,
    pub lease_ttl: Duration,
    pub max_chunk_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked upload and assembly service")]
pub struct Args {
    /// Host to bind to (overrides CHUNKSTORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CHUNKSTORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Blob store backend (overrides CHUNKSTORE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory where blobs are stored (overrides CHUNKSTORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL for assembly leases (overrides CHUNKSTORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Accepted upload token as `principal:token`; repeatable
    /// (overrides comma-separated CHUNKSTORE_AUTH_TOKENS)
    #[arg(long = "auth-token")]
    pub auth_tokens: Vec<String>,

    /// Parallel chunk fetches per assembly (overrides CHUNKSTORE_FETCH_CONCURRENCY)
    #[arg(long)]
    pub fetch_concurrency: Option<usize>,

    /// Seconds before an abandoned assembly lease can be taken over
    /// (overrides CHUNKSTORE_LEASE_TTL_SECS)
    #[arg(long)]
    pub lease_ttl_secs: Option<u64>,

    /// Largest accepted chunk body in bytes (overrides CHUNKSTORE_MAX_CHUNK_BYTES)
    #[arg(long)]
    pub max_chunk_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("CHUNKSTORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed("CHUNKSTORE_PORT", 3000u16)?;
        let env_backend = env_parsed("CHUNKSTORE_BACKEND", Backend::Disk)?;
        let env_storage =
            env::var("CHUNKSTORE_STORAGE_DIR").unwrap_or_else(|_| "./data/blobs".into());
        let env_db = env::var("CHUNKSTORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/chunk_assembler.db".into());
        let env_concurrency = env_parsed("CHUNKSTORE_FETCH_CONCURRENCY", 8usize)?;
        let env_ttl = env_parsed("CHUNKSTORE_LEASE_TTL_SECS", 300u64)?;
        let env_max_chunk = env_parsed("CHUNKSTORE_MAX_CHUNK_BYTES", 64 * 1024 * 1024usize)?;

        let raw_tokens = if args.auth_tokens.is_empty() {
            match env::var("CHUNKSTORE_AUTH_TOKENS") {
                Ok(value) => value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                Err(env::VarError::NotPresent) => Vec::new(),
                Err(err) => return Err(err).context("reading CHUNKSTORE_AUTH_TOKENS"),
            }
        } else {
            args.auth_tokens
        };
        let auth_tokens = raw_tokens
            .iter()
            .map(|entry| entry.parse::<TokenEntry>())
            .collect::<Result<Vec<_>>>()
            .context("parsing auth tokens")?;

        let fetch_concurrency = args.fetch_concurrency.unwrap_or(env_concurrency);
        if fetch_concurrency == 0 {
            bail!("fetch concurrency must be at least 1");
        }

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            auth_tokens,
            fetch_concurrency,
            lease_ttl: Duration::from_secs(args.lease_ttl_secs.unwrap_or(env_ttl)),
            max_chunk_bytes: args.max_chunk_bytes.unwrap_or(env_max_chunk),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an environment variable, falling back to `default` when unset.
fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_entries_parse() {
        let entry: TokenEntry = "alice:abc:def".parse().unwrap();
        assert_eq!(entry.principal, "alice");
        assert_eq!(entry.token, "abc:def");
        assert!("no-colon".parse::<TokenEntry>().is_err());
        assert!(":token".parse::<TokenEntry>().is_err());
        assert!("alice:".parse::<TokenEntry>().is_err());
    }

    #[test]
    fn token_debug_is_redacted() {
        let entry: TokenEntry = "alice:topsecret".parse().unwrap();
        assert!(!format!("{:?}", entry).contains("topsecret"));
    }

    #[test]
    fn cli_flags_override_defaults() {
        let args = Args::parse_from([
            "chunk-assembler",
            "--port",
            "8081",
            "--backend",
            "memory",
            "--auth-token",
            "ci:t1",
            "--auth-token",
            "ops:t2",
            "--fetch-concurrency",
            "2",
        ]);
        let cfg = AppConfig::merge(args).unwrap();
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.backend, Backend::Memory);
        assert_eq!(cfg.auth_tokens.len(), 2);
        assert_eq!(cfg.auth_tokens[1].principal, "ops");
        assert_eq!(cfg.fetch_concurrency, 2);
        assert_eq!(cfg.addr(), format!("{}:8081", cfg.host));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let args = Args::parse_from(["chunk-assembler", "--fetch-concurrency", "0"]);
        assert!(AppConfig::merge(args).is_err());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("DISK".parse::<Backend>().unwrap(), Backend::Disk);
        assert!("s3".parse::<Backend>().is_err());
    }
}
