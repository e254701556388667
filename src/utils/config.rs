//! CLI surface and process configuration (spec.md §6). The flag table
//! is parsed by hand, the same way the rest of this crate avoids
//! reaching for a dependency the original stack never carried — there
//! is no argument-parsing crate in `Cargo.toml`, so there is no `clap`
//! here either.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::client::ClientRegistry;
use crate::core::errors::ConfigError;

pub const DEFAULT_AUTH_PORT: u16 = 1812;
pub const LEGACY_AUTH_PORT: u16 = 1645;

/// The reload boundary spec.md §1 carves out as an external
/// collaborator ("user/configuration file loaders") and §4.5 names as
/// the thing a pending `SIGHUP` triggers at the top of the next
/// main-loop iteration. A production deployment backs this with a
/// `clients.conf`/`radiusd.conf` watcher; this crate only specifies the
/// contract the dispatcher reloads through.
pub trait ConfigSource: Send + Sync {
    /// Re-reads configuration and returns a fresh client registry to
    /// swap in atomically. A failure is logged by the caller and the
    /// prior configuration is kept (spec.md §7: "at reload: log; the
    /// server continues with prior configuration").
    fn reload(&self) -> Result<Arc<dyn ClientRegistry>, ConfigError>;
}

/// Always resolves to the registry it was built with. Stands in for a
/// real file-backed `ConfigSource` so the dispatcher's reload path is
/// exercisable without one.
pub struct StaticConfigSource(Arc<dyn ClientRegistry>);

impl StaticConfigSource {
    pub fn new(registry: Arc<dyn ClientRegistry>) -> Self {
        Self(registry)
    }
}

impl ConfigSource for StaticConfigSource {
    fn reload(&self) -> Result<Arc<dyn ClientRegistry>, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Where log output goes; `-l stdout` and `-l syslog` are not directory
/// paths (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Syslog,
    Directory(PathBuf),
}

/// Parsed CLI flags (spec.md §6's flag table). Booleans default to
/// `false`/disabled; `-X` is expanded into its constituent flags at
/// parse time rather than tracked separately.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub auth_detail_log: bool,
    pub accounting_dir: Option<PathBuf>,
    pub cache_passwd: bool,
    pub config_dir: Option<PathBuf>,
    pub foreground: bool,
    pub bind_address: Option<Ipv4Addr>,
    pub log_target: LogTarget,
    pub disable_reverse_dns: bool,
    pub auth_port: u16,
    pub spawn_workers: bool,
    pub log_stripped_names: bool,
    pub print_version: bool,
    pub verbosity: u64,
    pub log_auth_failures: bool,
    pub log_auth_passwords: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            auth_detail_log: false,
            accounting_dir: None,
            cache_passwd: false,
            config_dir: None,
            foreground: false,
            bind_address: None,
            log_target: LogTarget::Directory(PathBuf::from("log")),
            disable_reverse_dns: false,
            auth_port: DEFAULT_AUTH_PORT,
            spawn_workers: true,
            log_stripped_names: false,
            print_version: false,
            verbosity: 0,
            log_auth_failures: false,
            log_auth_passwords: false,
        }
    }
}

impl ServerOptions {
    /// Parses an argv slice (excluding `argv[0]`) into a [`ServerOptions`].
    /// Unknown flags and missing required values are a startup
    /// [`ConfigError`] (spec.md §7: "configuration failure at startup is
    /// fatal").
    pub fn parse<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut opts = Self::default();
        let mut iter = args.into_iter().map(|s| s.as_ref().to_string()).peekable();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-A" => opts.auth_detail_log = true,
                "-a" => opts.accounting_dir = Some(PathBuf::from(Self::require_value(&mut iter, "-a")?)),
                "-c" => opts.cache_passwd = true,
                "-d" => opts.config_dir = Some(PathBuf::from(Self::require_value(&mut iter, "-d")?)),
                "-f" => opts.foreground = true,
                "-i" => {
                    let value = Self::require_value(&mut iter, "-i")?;
                    opts.bind_address = Some(
                        value
                            .parse()
                            .map_err(|_| ConfigError::new(format!("invalid bind address: {value}")))?,
                    );
                }
                "-l" => {
                    let value = Self::require_value(&mut iter, "-l")?;
                    opts.log_target = match value.as_str() {
                        "stdout" => LogTarget::Stdout,
                        "syslog" => LogTarget::Syslog,
                        dir => LogTarget::Directory(PathBuf::from(dir)),
                    };
                }
                "-n" => opts.disable_reverse_dns = true,
                "-p" => {
                    let value = Self::require_value(&mut iter, "-p")?;
                    opts.auth_port = value
                        .parse()
                        .map_err(|_| ConfigError::new(format!("invalid port: {value}")))?;
                }
                "-s" => opts.spawn_workers = false,
                "-S" => opts.log_stripped_names = true,
                "-v" => opts.print_version = true,
                "-x" => opts.verbosity += 1,
                "-X" => {
                    // Shorthand for `-sfxxyz -l stdout` (spec.md §6).
                    opts.spawn_workers = false;
                    opts.foreground = true;
                    opts.verbosity += 2;
                    opts.log_auth_failures = true;
                    opts.log_auth_passwords = true;
                    opts.log_target = LogTarget::Stdout;
                }
                "-y" => opts.log_auth_failures = true,
                "-z" => opts.log_auth_passwords = true,
                other => return Err(ConfigError::new(format!("unrecognized flag: {other}"))),
            }
        }

        Ok(opts)
    }

    fn require_value(
        iter: &mut std::iter::Peekable<impl Iterator<Item = String>>,
        flag: &str,
    ) -> Result<String, ConfigError> {
        iter.next().ok_or_else(|| ConfigError::new(format!("{flag} requires a value")))
    }

    pub fn acct_port(&self) -> u16 {
        self.auth_port + 1
    }
}

/// Probes `[1024, 64000)` starting from `(pid & 0x7fff) + 1024` for an
/// unused proxy port (spec.md §6). `is_free` is injected so tests don't
/// need a real socket table.
pub fn probe_proxy_port(pid: u32, mut is_free: impl FnMut(u16) -> bool) -> Option<u16> {
    let start = (pid & 0x7fff) as u16 + 1024;
    let mut candidate = start;
    loop {
        if candidate >= 64000 {
            return None;
        }
        if is_free(candidate) {
            return Some(candidate);
        }
        candidate += 1;
        if candidate == start {
            return None;
        }
    }
}

/// Best-effort PID file write (spec.md §6: "PID file written at
/// startup if configured"). Daemonization itself — forking, detaching
/// from the controlling terminal — is out of scope (spec.md §1); this
/// just records the already-running process's PID at a path, so a
/// failure to write is logged and never fatal.
pub fn write_pid_file(path: &std::path::Path) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_flag_table() {
        let opts = ServerOptions::default();
        assert_eq!(opts.auth_port, DEFAULT_AUTH_PORT);
        assert!(opts.spawn_workers);
        assert!(!opts.foreground);
    }

    #[test]
    fn acct_port_is_auth_port_plus_one() {
        let mut opts = ServerOptions::default();
        opts.auth_port = LEGACY_AUTH_PORT;
        assert_eq!(opts.acct_port(), LEGACY_AUTH_PORT + 1);
    }

    #[test]
    fn static_config_source_always_resolves_to_the_registry_it_was_built_with() {
        use crate::core::client::InMemoryClientRegistry;

        let registry: Arc<dyn ClientRegistry> = Arc::new(InMemoryClientRegistry::new());
        let source = StaticConfigSource::new(registry.clone());
        let reloaded = source.reload().expect("a static source never fails to reload");
        assert!(Arc::ptr_eq(&registry, &reloaded));
    }

    #[test]
    fn dash_s_disables_worker_spawning() {
        let opts = ServerOptions::parse(["-s"]).unwrap();
        assert!(!opts.spawn_workers);
    }

    #[test]
    fn dash_p_overrides_the_auth_port() {
        let opts = ServerOptions::parse(["-p", "18120"]).unwrap();
        assert_eq!(opts.auth_port, 18120);
    }

    #[test]
    fn dash_capital_x_expands_to_its_shorthand() {
        let opts = ServerOptions::parse(["-X"]).unwrap();
        assert!(!opts.spawn_workers);
        assert!(opts.foreground);
        assert_eq!(opts.log_target, LogTarget::Stdout);
        assert!(opts.log_auth_failures);
        assert!(opts.log_auth_passwords);
    }

    #[test]
    fn unrecognized_flags_are_a_config_error() {
        assert!(ServerOptions::parse(["--nonsense"]).is_err());
    }

    #[test]
    fn missing_value_for_a_value_flag_is_a_config_error() {
        assert!(ServerOptions::parse(["-p"]).is_err());
    }

    #[test]
    fn proxy_port_probe_returns_the_first_free_candidate() {
        let port = probe_proxy_port(42, |p| p == 1066).unwrap();
        assert_eq!(port, 1066);
    }

    #[test]
    fn proxy_port_probe_gives_up_after_a_full_wrap() {
        assert!(probe_proxy_port(42, |_| false).is_none());
    }

    #[test]
    fn pid_file_contains_the_current_process_id() {
        let path = std::env::temp_dir().join(format!("fp_core_test_{}.pid", std::process::id()));
        write_pid_file(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        let _ = std::fs::remove_file(&path);
    }
}
