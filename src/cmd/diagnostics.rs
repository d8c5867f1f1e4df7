//! Diagnostics command - prints daemon-home layout and persisted state counts

use anyhow::Result;
use sysinfo::System;

use crate::config::Configuration;
use crate::state::StateStore;

/// Run diagnostics and display system and daemon-home information
pub async fn run(config_path: &str) -> Result<()> {
    println!("Vessel Daemon Diagnostics");
    println!("=========================\n");

    println!("System Information:");
    println!("-------------------");

    let mut sys = System::new_all();
    sys.refresh_all();

    println!("  OS: {} {}", System::name().unwrap_or_default(), System::os_version().unwrap_or_default());
    println!("  Kernel: {}", System::kernel_version().unwrap_or_default());
    println!("  Hostname: {}", System::host_name().unwrap_or_default());
    println!("  CPUs: {}", sys.cpus().len());
    println!("  Total Memory: {} MB", sys.total_memory() / 1024 / 1024);
    println!("  Used Memory: {} MB", sys.used_memory() / 1024 / 1024);
    println!("  Uptime: {} seconds", System::uptime());

    println!("\nDaemon Configuration:");
    println!("---------------------");

    let config = Configuration::load(config_path)?;
    println!("  Socket: {}", config.socket.path.display());
    println!("  Data directory: {}", config.system.data_directory.display());
    println!("  Volumes directory: {}", config.system.volumes_directory.display());
    println!("  Log directory: {}", config.system.log_directory.display());
    println!("  State database: {}", config.system.state_db_path().display());

    println!("\nPersisted State:");
    println!("----------------");

    match StateStore::open(config.system.state_db_path()) {
        Ok(store) => {
            let containers = store.list_containers().unwrap_or_default();
            let networks = store.list_networks().unwrap_or_default();
            let volumes = store.list_volumes().unwrap_or_default();
            println!("  Containers: {}", containers.len());
            println!("  Networks: {}", networks.len());
            println!("  Volumes: {}", volumes.len());
        }
        Err(e) => {
            println!("  Error opening state database: {}", e);
        }
    }

    println!("\nDiagnostics complete.");
    Ok(())
}
