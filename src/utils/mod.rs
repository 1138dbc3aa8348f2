pub mod connection;
pub mod process;

use chrono::Utc;

/// Timestamp embedded in artifact names, e.g. `2024-05-01T03-00-00Z`.
///
/// Colons are avoided so the names stay valid on every filesystem.
pub fn artifact_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string()
}
