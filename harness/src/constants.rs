/// Relative path of the CLI entry point inside an extracted npm tarball.
///
/// npm tarballs unpack under a top-level `package/` directory; the prisma
/// package's `bin` points at `build/index.js`.
pub const TOOL_ENTRYPOINT: &str = "package/build/index.js";

/// Environment variable the migration CLI reads its target from. The
/// connection string is never passed as an argument, keeping credentials out
/// of process listings.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

pub const HIDE_UPDATE_MESSAGE_ENV: &str = "PRISMA_HIDE_UPDATE_MESSAGE";

/// Step output name carrying the serialized per-database outcomes.
pub const RESULTS_OUTPUT: &str = "results";
