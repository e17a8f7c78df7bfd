use super::{LinkEffector, LinkRoute};
use crate::command::exec;
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use tokio::sync::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Real [`LinkEffector`] driving Linux kernel network state via `ip`,
/// `dhclient`, and `iptables`.
///
/// Mirrors the original netlink-based implementation's behavior
/// (link lookup by MAC, idempotent address add/del, route symmetric-diff
/// skipping kernel-owned routes with a source address) using CLI tools
/// instead of a netlink library binding, matching this crate's command-exec
/// idiom rather than adding a netlink dependency for a single-purpose need.
pub struct LinuxLinkEffector {
    ip_path: String,
    dhclient_path: String,
    iptables_path: String,
    /// Cache of MAC -> link name, invalidated on lookup miss.
    link_cache: RwLock<HashMap<String, String>>,
}

impl LinuxLinkEffector {
    pub fn new(
        ip_path: impl Into<String>,
        dhclient_path: impl Into<String>,
        iptables_path: impl Into<String>,
    ) -> Self {
        Self {
            ip_path: ip_path.into(),
            dhclient_path: dhclient_path.into(),
            iptables_path: iptables_path.into(),
            link_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn resolve_link(&self, mac: &str) -> Result<String> {
        if let Some(name) = self.link_cache.read().await.get(mac) {
            return Ok(name.clone());
        }

        let output = exec(&self.ip_path, &["-o", "link", "show"]).await?;
        for line in output.stdout.lines() {
            if let Some(found_mac) = extract_mac(line) {
                if found_mac.eq_ignore_ascii_case(mac) {
                    let name = extract_link_name(line).ok_or_else(|| {
                        RuntimeError::internal_error(format!(
                            "could not parse interface name from: {}",
                            line
                        ))
                    })?;
                    self.link_cache
                        .write()
                        .await
                        .insert(mac.to_string(), name.clone());
                    return Ok(name);
                }
            }
        }

        Err(RuntimeError::nic_not_found(mac))
    }

    async fn has_address(&self, link: &str, address_cidr: &str) -> Result<bool> {
        let output = exec(&self.ip_path, &["-o", "addr", "show", "dev", link]).await?;
        Ok(output
            .stdout
            .lines()
            .any(|line| line.split_whitespace().any(|tok| tok == address_cidr)))
    }

    /// Per-link marker recording that `dhclient` has an active lease on this
    /// MAC, so configure/teardown stay idempotent across repeated calls.
    fn dhcp_sentinel_path(&self, mac: &str) -> PathBuf {
        let sanitized = mac.replace(':', "-");
        std::env::temp_dir().join(format!("vpc-dhcp-{}.sentinel", sanitized))
    }
}

fn extract_mac(line: &str) -> Option<&str> {
    let idx = line.find("link/ether")?;
    line[idx + "link/ether".len()..].split_whitespace().next()
}

fn extract_link_name(line: &str) -> Option<String> {
    // `ip -o link show` lines look like: "2: eth1: <FLAGS> mtu ..."
    let after_index = line.split_once(": ")?.1;
    let name = after_index.split(':').next()?;
    Some(name.trim().to_string())
}

#[async_trait]
impl LinkEffector for LinuxLinkEffector {
    async fn get_link_name(&self, mac: &str) -> Result<String> {
        self.resolve_link(mac).await
    }

    async fn configure_static(&self, mac: &str, address_cidr: &str) -> Result<()> {
        let link = self.resolve_link(mac).await?;

        if !self.has_address(&link, address_cidr).await? {
            exec(&self.ip_path, &["addr", "add", address_cidr, "dev", &link]).await?;
        } else {
            debug!("{} already has address {}", link, address_cidr);
        }

        exec(&self.ip_path, &["link", "set", &link, "up"]).await?;
        Ok(())
    }

    async fn configure_dhcp(&self, mac: &str) -> Result<String> {
        let link = self.resolve_link(mac).await?;
        let sentinel = self.dhcp_sentinel_path(mac);

        if sentinel.exists() {
            debug!("DHCP sentinel already present for {}, skipping dhclient spawn", link);
        } else {
            exec(&self.dhclient_path, &["-1", &link]).await?;
            std::fs::write(&sentinel, &link).map_err(|e| {
                RuntimeError::internal_error(format!(
                    "failed to write DHCP sentinel for {}: {}",
                    link, e
                ))
            })?;
        }

        let output = exec(&self.ip_path, &["-o", "-4", "addr", "show", "dev", &link, "scope", "global"]).await?;
        let addresses: Vec<&str> = output
            .stdout
            .lines()
            .filter_map(|line| {
                line.split_whitespace()
                    .skip_while(|tok| *tok != "inet")
                    .nth(1)
            })
            .collect();

        if addresses.len() != 1 {
            return Err(RuntimeError::dhcp_lease_failed(link, addresses.len()));
        }

        Ok(addresses[0].to_string())
    }

    async fn tear_down_static(&self, mac: &str, address_cidr: &str) -> Result<()> {
        let link = match self.resolve_link(mac).await {
            Ok(link) => link,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if self.has_address(&link, address_cidr).await? {
            exec(&self.ip_path, &["addr", "del", address_cidr, "dev", &link]).await?;
        }

        exec(&self.ip_path, &["link", "set", &link, "down"]).await?;
        Ok(())
    }

    async fn tear_down_dhcp(&self, mac: &str) -> Result<()> {
        let link = match self.resolve_link(mac).await {
            Ok(link) => link,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        let sentinel = self.dhcp_sentinel_path(mac);
        if sentinel.exists() {
            if let Err(e) = exec(&self.dhclient_path, &["-r", &link]).await {
                warn!("dhclient release on {} failed (continuing): {}", link, e);
            }
            let _ = std::fs::remove_file(&sentinel);
        }

        exec(&self.ip_path, &["link", "set", &link, "down"]).await?;
        Ok(())
    }

    async fn sync_routes(&self, mac: &str, routes: &[LinkRoute]) -> Result<()> {
        let link = self.resolve_link(mac).await?;

        let output = exec(&self.ip_path, &["route", "show", "dev", &link]).await?;
        let existing: Vec<(String, Option<String>, bool)> = output
            .stdout
            .lines()
            .map(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                let to = tokens.first().copied().unwrap_or_default().to_string();
                let via = tokens
                    .iter()
                    .position(|t| *t == "via")
                    .and_then(|i| tokens.get(i + 1))
                    .map(|s| s.to_string());
                let has_src = tokens.iter().any(|t| *t == "src");
                (to, via, has_src)
            })
            .collect();

        for (to, via, has_src) in &existing {
            if *has_src {
                continue;
            }
            let still_desired = routes
                .iter()
                .any(|r| &r.to == to && via.as_deref() == Some(r.via.as_str()));
            if !still_desired {
                let _ = exec(&self.ip_path, &["route", "del", to, "dev", &link]).await;
            }
        }

        for route in routes {
            let already_present = existing
                .iter()
                .any(|(to, via, _)| to == &route.to && via.as_deref() == Some(route.via.as_str()));
            if !already_present {
                exec(
                    &self.ip_path,
                    &["route", "add", &route.to, "via", &route.via, "dev", &link],
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn sync_masquerade(&self, mac: &str, enabled: bool) -> Result<()> {
        let link = self.resolve_link(mac).await?;

        let exists = exec(
            &self.iptables_path,
            &["-t", "nat", "-C", "POSTROUTING", "-o", &link, "-j", "MASQUERADE"],
        )
        .await
        .is_ok();

        match (enabled, exists) {
            (true, false) => {
                exec(
                    &self.iptables_path,
                    &["-t", "nat", "-A", "POSTROUTING", "-o", &link, "-j", "MASQUERADE"],
                )
                .await?;
            }
            (false, true) => {
                exec(
                    &self.iptables_path,
                    &["-t", "nat", "-D", "POSTROUTING", "-o", &link, "-j", "MASQUERADE"],
                )
                .await?;
            }
            _ => {}
        }

        Ok(())
    }
}
