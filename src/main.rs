use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::Arc;

use fp_core::core::client::InMemoryClientRegistry;
use fp_core::core::pfe::PacketForwardingEngine;
use fp_core::dispatch::dispatcher::{Dispatcher, NullProxyHook};
use fp_core::dispatch::signals::Signals;
use fp_core::hooks::handlers::{register_hooks, AllowAllAuthBackend, NullAccountingBackend};
use fp_core::hooks::hook_registry::HookRegistry;
use fp_core::net::BoundSockets;
use fp_core::utils::config::{ServerOptions, StaticConfigSource};
use fp_core::utils::logger::init_logger;

const DHCP_PORT: u16 = 67;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match ServerOptions::parse(args) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("configuration failure at startup: {err}");
            return ExitCode::FAILURE;
        }
    };

    if opts.print_version {
        println!("fp_core {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    if let Err(err) = init_logger("fp_core", opts.verbosity) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    let bind_ip = opts.bind_address.unwrap_or(Ipv4Addr::UNSPECIFIED);
    let auth_addr = format!("{bind_ip}:{}", opts.auth_port);
    let acct_addr = format!("{bind_ip}:{}", opts.acct_port());
    let proxy_port = fp_core::utils::config::probe_proxy_port(std::process::id(), |port| {
        std::net::UdpSocket::bind((bind_ip, port)).is_ok()
    });
    let proxy_port = match proxy_port {
        Some(port) => port,
        None => {
            log::error!("no free proxy port found in [1024, 64000)");
            return ExitCode::FAILURE;
        }
    };
    let proxy_addr = format!("{bind_ip}:{proxy_port}");
    let dhcp_addr = format!("{bind_ip}:{DHCP_PORT}");

    let sockets = match BoundSockets::bind(&auth_addr, &acct_addr, &proxy_addr, &dhcp_addr).await {
        Ok(sockets) => Arc::new(sockets),
        Err(err) => {
            log::error!("failed to bind sockets: {err}");
            return ExitCode::FAILURE;
        }
    };

    let local_auth = auth_addr.parse().expect("bound address is always parseable");
    let local_acct = acct_addr.parse().expect("bound address is always parseable");
    let local_proxy = proxy_addr.parse().expect("bound address is always parseable");
    let local_dhcp = dhcp_addr.parse().expect("bound address is always parseable");

    let mut registry = HookRegistry::new();
    register_hooks(&mut registry, Arc::new(AllowAllAuthBackend), Arc::new(NullAccountingBackend));
    let engine = Arc::new(PacketForwardingEngine::new(registry));

    if let Some(config_dir) = &opts.config_dir {
        let pid_path = config_dir.join("fp_core.pid");
        if let Err(err) = fp_core::utils::config::write_pid_file(&pid_path) {
            log::warn!("failed to write PID file at {}: {err}", pid_path.display());
        }
    }

    let client_registry = Arc::new(InMemoryClientRegistry::new());
    let config_source = Arc::new(StaticConfigSource::new(client_registry.clone()));
    let signals = match Signals::spawn() {
        Ok(signals) => signals,
        Err(err) => {
            log::error!("failed to install signal handlers: {err}");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "fp_core listening: auth={auth_addr} acct={acct_addr} proxy={proxy_addr} dhcp={dhcp_addr} spawn_mode={}",
        opts.spawn_workers
    );

    let dispatcher = Dispatcher::new(
        sockets,
        local_auth,
        local_acct,
        local_proxy,
        local_dhcp,
        engine,
        client_registry,
        Arc::new(NullProxyHook),
        None,
        Some(config_source),
        opts.spawn_workers,
        signals,
    );

    match dispatcher.run().await {
        0 => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
