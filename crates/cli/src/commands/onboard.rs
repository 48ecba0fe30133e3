//! `pilot onboard` — First-time setup.

use std::path::Path;

use pilot_config::PilotConfig;

use super::CmdResult;

pub fn run(config_path: &Path, force: bool) -> CmdResult {
    println!("AI Pilot — First-Time Setup");
    println!("===========================\n");

    if config_path.exists() && !force {
        println!("  Config file exists: {} (use --force to overwrite)", config_path.display());
    } else {
        write_default_config(config_path)?;
        println!("✅ Wrote default config: {}", config_path.display());
    }

    let config = super::load_config(config_path)?;
    let root = pilot_security::prepare_root(&config.sandbox.fs_root)
        .map_err(|e| format!("Failed to create sandbox root: {e}"))?;
    println!("✅ Sandbox root ready: {}", root.display());

    println!("\nNext steps:");
    println!("  1. Review the [tools] and [routing] sections of {}", config_path.display());
    println!("  2. Run `pilot status` to check the setup");
    println!("  3. Run `pilot tool list` to see which tools the assistant can use");
    Ok(())
}

fn write_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, PilotConfig::default_toml())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/pilot.toml");
        write_default_config(&path).unwrap();

        let loaded = PilotConfig::load_from(&path).unwrap();
        assert_eq!(loaded.meta.name, PilotConfig::default().meta.name);
        assert_eq!(loaded.source_path(), Some(path.as_path()));
    }

    #[test]
    fn existing_config_is_kept_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.toml");
        let custom = format!(
            "[meta]\nname = \"Custom\"\n\n[sandbox]\nfs_root = \"{}\"\n",
            dir.path().join("ws").display().to_string().replace('\\', "/")
        );
        std::fs::write(&path, &custom).unwrap();

        run(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), custom);
        assert!(dir.path().join("ws").is_dir());
    }
}
