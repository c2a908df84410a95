//! Fake MCP servers for process and coordinator tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use agent_notch::config::{NotchConfig, ServerConfig};

/// Answers every stdin line with a successful `xcode_build` result for id 1.
pub const BUILD_SERVER: &str = r#"while IFS= read -r line; do
  printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"{\"success\":true,\"durationMs\":5000}"}]}}'
done
"#;

/// Echoes stdin back to stdout until killed.
pub const ECHO_SERVER: &str = "exec cat\n";

/// Reads stdin forever without answering.
pub const SILENT_SERVER: &str = "exec cat > /dev/null\n";

/// Write an executable `/bin/sh` script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Server config running `binary` in `dir`.
pub fn server_config(binary: PathBuf, dir: &Path) -> ServerConfig {
    ServerConfig {
        binary_path: binary,
        working_dir: Some(dir.to_path_buf()),
        ..ServerConfig::default()
    }
}

/// Full config running `binary` in `dir`.
pub fn notch_config(binary: PathBuf, dir: &Path) -> NotchConfig {
    NotchConfig {
        server: server_config(binary, dir),
        ..NotchConfig::default()
    }
}
