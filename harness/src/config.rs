use clap::Parser;

/// Harness configuration, parsed once at startup and passed by reference.
///
/// Every key is a long flag with an environment fallback so the harness works
/// both as a CI step (env-driven) and from a shell.
#[derive(Parser, Debug, Clone)]
pub struct HarnessConfig {
    /// Version selector for the migration CLI: "latest", a dist-tag, or an
    /// exact version.
    #[arg(long, env = "TOOL_VERSION", default_value = "latest")]
    pub tool_version: String,

    /// Database connection strings: a JSON string array, or a comma/newline
    /// separated list. Required; an empty list is a fatal configuration error.
    #[arg(long, env = "DATABASE_URLS", default_value = "")]
    pub database_urls: String,

    /// Schema artifact path, resolved relative to the working directory.
    #[arg(long, env = "SCHEMA", default_value = "prisma/schema.prisma")]
    pub schema: String,

    /// Extra arguments appended to every migrate invocation. Double-quoted
    /// substrings are kept as single tokens.
    #[arg(long, env = "EXTRA_ARGS", default_value = "")]
    pub extra_args: String,

    /// Stop after the first failing database.
    #[arg(long, env = "FAIL_FAST", default_value_t = true, action = clap::ArgAction::Set)]
    pub fail_fast: bool,

    /// Subprocess working directory, also the base for resolving `schema`.
    #[arg(long, env = "WORKING_DIRECTORY", default_value = ".")]
    pub working_directory: String,

    /// Package registry serving the tool's metadata and tarballs.
    #[arg(long, env = "REGISTRY_URL", default_value = "https://registry.npmjs.org")]
    pub registry_url: String,

    /// Registry package name of the migration CLI.
    #[arg(long, env = "TOOL_PACKAGE", default_value = "prisma")]
    pub tool_package: String,

    /// Persistent tool cache root, shared across runs on the same host.
    #[arg(long, env = "TOOL_CACHE_DIR", default_value = ".tool-cache")]
    pub tool_cache_dir: String,

    /// Node interpreter used to execute the CLI entry point.
    #[arg(long, env = "NODE_BIN", default_value = "node")]
    pub node_bin: String,
}

impl HarnessConfig {
    /// Parse config from environment only (no CLI parsing).
    ///
    /// We intentionally parse from a single fake argv element so clap doesn't
    /// try to interpret the harness subcommand flags here.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::parse_from(["migrate-harness"]))
    }
}
