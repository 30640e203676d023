use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use regex::Regex;
use tracing::debug;

const REGISTRY_KEY: &str = r"HKLM\SOFTWARE\WOW6432Node\Riot Games, Inc\League of Legends";
const REGISTRY_VALUE: &str = "Location";

/// Roots of the machine's fixed (non-removable) storage volumes.
pub trait VolumeSource: Send + Sync {
    fn fixed_volumes(&self) -> Vec<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVolumes;

impl VolumeSource for SystemVolumes {
    fn fixed_volumes(&self) -> Vec<PathBuf> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let mut roots: Vec<PathBuf> = Vec::new();
        for disk in disks.list() {
            if disk.is_removable() {
                continue;
            }
            let mount = disk.mount_point().to_path_buf();
            if std::fs::read_dir(&mount).is_err() {
                continue;
            }
            if !roots.contains(&mount) {
                roots.push(mount);
            }
        }
        roots
    }
}

/// Registry-like store holding an explicit install location.
pub trait RegistrySource: Send + Sync {
    fn install_location(&self) -> Option<String>;
}

/// Windows registry via `reg query`; there is no such store elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRegistry;

impl RegistrySource for SystemRegistry {
    fn install_location(&self) -> Option<String> {
        if !cfg!(windows) {
            return None;
        }

        let mut cmd = Command::new("reg");
        cmd.args(["query", REGISTRY_KEY, "/v", REGISTRY_VALUE]);
        hide_console(&mut cmd);
        let output = cmd.output().ok()?;
        if !output.status.success() {
            return None;
        }
        parse_reg_query_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn hide_console(cmd: &mut Command) {
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(windows))]
    let _ = cmd;
}

pub(crate) fn parse_reg_query_output(output: &str) -> Option<String> {
    let re = Regex::new(r"Location\s+REG_SZ\s+(.+)").ok()?;
    let location = re.captures(output)?.get(1)?.as_str().trim();
    if location.is_empty() {
        None
    } else {
        Some(location.to_string())
    }
}

/// Install roots listed by the client's installation manifest
/// (`associated_client` keys, `rc_default`, `rc_live`) whose path mentions
/// `name_hint`. A missing or malformed manifest yields nothing.
pub(crate) fn manifest_roots(manifest: &Path, name_hint: &str) -> Vec<PathBuf> {
    let Ok(raw) = std::fs::read_to_string(manifest) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
        debug!("Installation manifest at {:?} is not valid JSON", manifest);
        return Vec::new();
    };

    let mut raw_paths: Vec<String> = Vec::new();
    if let Some(associated) = value.get("associated_client").and_then(|v| v.as_object()) {
        raw_paths.extend(associated.keys().cloned());
    }
    for key in ["rc_default", "rc_live"] {
        if let Some(path) = value.get(key).and_then(|v| v.as_str()) {
            raw_paths.push(path.to_string());
        }
    }

    let hint = name_hint.to_ascii_lowercase();
    raw_paths
        .into_iter()
        .filter(|p| p.to_ascii_lowercase().contains(&hint))
        .map(PathBuf::from)
        .collect()
}
