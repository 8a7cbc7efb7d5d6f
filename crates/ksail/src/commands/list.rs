use crate::commands;
use crate::docker;
use colored::Colorize;
use ksail_container::{
    CLUSTER_LABEL, ContainerError, DockerInvoker, MIRROR_HOST_LABEL, RegistryManager,
    filter_by_prefix,
};
use ksail_core::ClusterConfig;

pub async fn handle(cluster: &ClusterConfig, all: bool) -> anyhow::Result<()> {
    println!("{}", "レジストリ一覧を取得中...".blue());
    let invoker = docker::init_docker_with_error_handling().await?;
    let registries = RegistryManager::new(invoker.client().await?, commands::probe());

    if all {
        return list_managed(&registries).await;
    }

    let network = cluster.network_name();
    println!("ネットワーク: {}", network.cyan());

    let listed = match registries.list_registries_on_network(&network).await {
        Ok(listed) => filter_by_prefix(listed, cluster.registry_name_prefix()),
        Err(ContainerError::NetworkNotFound { .. }) => {
            println!();
            println!("{}", "ネットワークが存在しません".dimmed());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    if listed.is_empty() {
        println!("{}", "レジストリはありません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!("{:<30} {:<25} {:<8} {:<15}", "NAME", "MIRROR", "PORT", "IP").bold()
    );
    println!("{}", "─".repeat(80).dimmed());
    for registry in listed {
        println!(
            "{:<30} {:<25} {:<8} {:<15}",
            registry.name.cyan(),
            registry.host.as_deref().unwrap_or("-"),
            registry.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            registry.ipv4.as_deref().unwrap_or("-").dimmed()
        );
    }
    Ok(())
}

async fn list_managed(registries: &RegistryManager) -> anyhow::Result<()> {
    let containers = registries.list_managed_registries().await?;

    println!();
    if containers.is_empty() {
        println!("{}", "KSail が管理するレジストリはありません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<30} {:<10} {:<20} {:<25} {:<8}",
            "NAME", "STATUS", "CLUSTER", "MIRROR", "PORT"
        )
        .bold()
    );
    println!("{}", "─".repeat(95).dimmed());
    for container in containers {
        let status = if container.running {
            "running".green()
        } else {
            "stopped".red()
        };
        println!(
            "{:<30} {:<10} {:<20} {:<25} {:<8}",
            container.name.cyan(),
            status,
            container
                .labels
                .get(CLUSTER_LABEL)
                .map(String::as_str)
                .unwrap_or("-"),
            container
                .labels
                .get(MIRROR_HOST_LABEL)
                .map(String::as_str)
                .unwrap_or("-"),
            container
                .registry_host_port()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".into())
        );
    }
    Ok(())
}
